//! Cross-service track unification and ranking.
//!
//! Merges per-member "top tracks" lists (Spotify JSON, Last.fm JSON, or
//! previously-unified profile entries) into one deduplicated, ranked
//! list. A track's rank is its match score: the number of distinct party
//! members whose profile contains it. The same machinery builds a single
//! user's unified profile from their per-service lists, where the
//! deduplication merges service IDs instead of counting members.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Ranked tracks reported back to the caller in generation stats.
pub const REPORT_LIMIT: usize = 30;
/// Ranked tracks actually persisted for a party.
pub const PERSIST_LIMIT: usize = 20;

const UNKNOWN_ARTIST: &str = "Unknown";

// ─── Raw service shapes ─────────────────────────────────────────────

/// A track record as stored in a member profile or submitted by a
/// client. Spotify records are recognized by their `artists` array;
/// everything else falls through to the Last.fm-style variant, whose
/// fields are all optional (profile blobs reuse that union shape).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RawTrack {
    Spotify(SpotifyRawTrack),
    LastFm(LastFmRawTrack),
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyRawTrack {
    pub id: Option<String>,
    pub name: Option<String>,
    pub artists: Vec<SpotifyArtist>,
    pub album: Option<AlbumField>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SpotifyArtist {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LastFmRawTrack {
    pub name: Option<String>,
    pub artist: Option<ArtistField>,
    pub album: Option<AlbumField>,
    pub mbid: Option<String>,
    // Passthrough IDs carried by previously-unified profile entries
    pub spotify_id: Option<String>,
    pub lastfm_id: Option<String>,
    pub apple_id: Option<String>,
}

/// Last.fm credits an artist either as a plain string or as an object
/// with `name` and/or `#text`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ArtistField {
    Name(String),
    Detailed(ArtistObject),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ArtistObject {
    pub name: Option<String>,
    #[serde(rename = "#text")]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum AlbumField {
    Title(String),
    Detailed(AlbumObject),
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlbumObject {
    pub name: Option<String>,
    #[serde(rename = "#text")]
    pub text: Option<String>,
}

// ─── Unified shape ──────────────────────────────────────────────────

/// Canonical cross-service track representation.
///
/// Invariants upheld by [`TrackAggregator`]: `match_score` equals
/// `sources.len()`, and each contributing user appears in `sources` at
/// most once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedTrack {
    pub name: String,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    pub sources: Vec<Uuid>,
    pub match_score: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spotify_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lastfm_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apple_id: Option<String>,
}

/// Matching key: `lowercase(name)-lowercase(artist)`. No punctuation,
/// diacritic, or whitespace normalization: "The Beatles" and "Beatles"
/// stay distinct while identically-credited cover songs merge.
pub fn dedup_key(name: &str, artist: &str) -> String {
    format!("{}-{}", name.to_lowercase(), artist.to_lowercase())
}

/// Convert one raw record into a unified seed owned by `owner`.
///
/// Artist policy: plain string as-is; object prefers `name`, then
/// `#text`; else "Unknown". Album: prefer `album.name`, else the album
/// as a string, else absent. Records without a usable name are dropped
/// (a name is the dedup key's backbone).
pub fn normalize(raw: &RawTrack, owner: Uuid) -> Option<UnifiedTrack> {
    let (name, artist, album, spotify_id, lastfm_id, apple_id) = match raw {
        RawTrack::Spotify(t) => {
            let artist = t
                .artists
                .first()
                .and_then(|a| a.name.clone())
                .unwrap_or_else(|| UNKNOWN_ARTIST.to_string());
            (
                t.name.clone(),
                artist,
                t.album.as_ref().and_then(album_title),
                t.id.clone(),
                None,
                None,
            )
        }
        RawTrack::LastFm(t) => {
            let artist = match &t.artist {
                Some(ArtistField::Name(s)) => s.clone(),
                Some(ArtistField::Detailed(obj)) => obj
                    .name
                    .clone()
                    .or_else(|| obj.text.clone())
                    .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
                None => UNKNOWN_ARTIST.to_string(),
            };
            (
                t.name.clone(),
                artist,
                t.album.as_ref().and_then(album_title),
                t.spotify_id.clone(),
                t.lastfm_id.clone().or_else(|| t.mbid.clone()),
                t.apple_id.clone(),
            )
        }
    };

    let name = name.filter(|n| !n.trim().is_empty())?;

    Some(UnifiedTrack {
        name,
        artist,
        album,
        sources: vec![owner],
        match_score: 1,
        spotify_id,
        lastfm_id,
        apple_id,
    })
}

fn album_title(album: &AlbumField) -> Option<String> {
    match album {
        AlbumField::Title(s) => Some(s.clone()),
        AlbumField::Detailed(obj) => obj.name.clone().or_else(|| obj.text.clone()),
    }
    .filter(|s| !s.is_empty())
}

// ─── Aggregation ────────────────────────────────────────────────────

/// Request-local fold of unified seeds into a deduplicated map, keyed
/// by [`dedup_key`], preserving first-seen order. No I/O.
#[derive(Debug, Default)]
pub struct TrackAggregator {
    index: HashMap<String, usize>,
    tracks: Vec<UnifiedTrack>,
}

impl TrackAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// Fold one seed in. A seed carries exactly one source (its owner).
    ///
    /// On a key collision the owner is appended and the match score
    /// incremented only if the owner is not already counted, so a user
    /// contributing the same track through several services (the
    /// profile-analyze path) is counted once. Missing album and service
    /// IDs on the existing entry are filled from the new seed.
    pub fn add(&mut self, seed: UnifiedTrack) {
        let key = dedup_key(&seed.name, &seed.artist);
        match self.index.get(&key) {
            Some(&i) => {
                let existing = &mut self.tracks[i];
                if let Some(owner) = seed.sources.first() {
                    if !existing.sources.contains(owner) {
                        existing.sources.push(*owner);
                        existing.match_score += 1;
                    }
                }
                if existing.album.is_none() {
                    existing.album = seed.album;
                }
                if existing.spotify_id.is_none() {
                    existing.spotify_id = seed.spotify_id;
                }
                if existing.lastfm_id.is_none() {
                    existing.lastfm_id = seed.lastfm_id;
                }
                if existing.apple_id.is_none() {
                    existing.apple_id = seed.apple_id;
                }
            }
            None => {
                self.index.insert(key, self.tracks.len());
                self.tracks.push(seed);
            }
        }
    }

    /// All tracks sorted by match score descending. The sort is stable,
    /// so ties keep first-seen order and identical inputs always rank
    /// identically.
    pub fn into_ranked(self) -> Vec<UnifiedTrack> {
        let mut ranked = self.tracks;
        ranked.sort_by(|a, b| b.match_score.cmp(&a.match_score));
        ranked
    }
}

/// Fold every member's stored profile into one aggregator.
///
/// Members without a profile are skipped. A profile whose JSON does not
/// parse is logged and skipped — one bad member never aborts the run.
/// Returns the aggregator and how many member profiles were used.
pub fn aggregate_member_profiles(profiles: &[(Uuid, Option<String>)]) -> (TrackAggregator, usize) {
    let mut aggregator = TrackAggregator::new();
    let mut members_analyzed = 0;

    for (user_id, top_tracks) in profiles {
        let Some(raw_json) = top_tracks else {
            continue;
        };

        let raw_tracks: Vec<RawTrack> = match serde_json::from_str(raw_json) {
            Ok(tracks) => tracks,
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "skipping member with unparseable profile");
                continue;
            }
        };

        for raw in &raw_tracks {
            if let Some(seed) = normalize(raw, *user_id) {
                aggregator.add(seed);
            }
        }
        members_analyzed += 1;
    }

    (aggregator, members_analyzed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lastfm_track(name: &str, artist: &str) -> RawTrack {
        serde_json::from_value(serde_json::json!({ "name": name, "artist": artist })).unwrap()
    }

    fn user(n: u128) -> Uuid {
        Uuid::from_u128(n)
    }

    #[test]
    fn test_dedup_key_case_folds() {
        assert_eq!(
            dedup_key("Yesterday", "Beatles"),
            dedup_key("yesterday", "beatles")
        );
        assert_eq!(dedup_key("Yesterday", "Beatles"), "yesterday-beatles");
    }

    #[test]
    fn test_dedup_key_no_punctuation_normalization() {
        // Known limitation: formatting differences split keys
        assert_ne!(
            dedup_key("Help!", "The Beatles"),
            dedup_key("Help", "The Beatles")
        );
        assert_ne!(
            dedup_key("Yesterday", "The Beatles"),
            dedup_key("Yesterday", "Beatles")
        );
    }

    #[test]
    fn test_normalize_spotify_track() {
        let raw: RawTrack = serde_json::from_value(serde_json::json!({
            "id": "4u7EnebtmKWzUH433cf5Qv",
            "name": "Bohemian Rhapsody",
            "artists": [{ "name": "Queen" }, { "name": "Someone Else" }],
            "album": { "name": "A Night at the Opera" }
        }))
        .unwrap();
        assert!(matches!(raw, RawTrack::Spotify(_)));

        let owner = user(1);
        let track = normalize(&raw, owner).unwrap();
        assert_eq!(track.name, "Bohemian Rhapsody");
        assert_eq!(track.artist, "Queen"); // primary artist only
        assert_eq!(track.album.as_deref(), Some("A Night at the Opera"));
        assert_eq!(track.spotify_id.as_deref(), Some("4u7EnebtmKWzUH433cf5Qv"));
        assert_eq!(track.sources, vec![owner]);
        assert_eq!(track.match_score, 1);
    }

    #[test]
    fn test_normalize_lastfm_track_with_artist_object() {
        let raw: RawTrack = serde_json::from_value(serde_json::json!({
            "name": "Karma Police",
            "artist": { "name": "Radiohead", "mbid": "a74b1b7f-71a5-4011-9441-d0b5e4122711" },
            "mbid": "ea334b2c-0a0a-4c0c-a9ac-f2c04e3c7fb1"
        }))
        .unwrap();

        let track = normalize(&raw, user(2)).unwrap();
        assert_eq!(track.artist, "Radiohead");
        assert_eq!(
            track.lastfm_id.as_deref(),
            Some("ea334b2c-0a0a-4c0c-a9ac-f2c04e3c7fb1")
        );
        assert!(track.spotify_id.is_none());
    }

    #[test]
    fn test_normalize_lastfm_artist_text_fallback() {
        let raw: RawTrack = serde_json::from_value(serde_json::json!({
            "name": "Song 2",
            "artist": { "#text": "Blur" }
        }))
        .unwrap();
        assert_eq!(normalize(&raw, user(1)).unwrap().artist, "Blur");
    }

    #[test]
    fn test_normalize_missing_artist_is_unknown() {
        let raw: RawTrack = serde_json::from_value(serde_json::json!({ "name": "Mystery" })).unwrap();
        assert_eq!(normalize(&raw, user(1)).unwrap().artist, "Unknown");
    }

    #[test]
    fn test_normalize_album_as_plain_string() {
        let raw: RawTrack = serde_json::from_value(serde_json::json!({
            "name": "Teardrop",
            "artist": "Massive Attack",
            "album": "Mezzanine"
        }))
        .unwrap();
        assert_eq!(normalize(&raw, user(1)).unwrap().album.as_deref(), Some("Mezzanine"));
    }

    #[test]
    fn test_normalize_skips_nameless_track() {
        let raw: RawTrack = serde_json::from_value(serde_json::json!({ "artist": "Nobody" })).unwrap();
        assert!(normalize(&raw, user(1)).is_none());

        let blank: RawTrack =
            serde_json::from_value(serde_json::json!({ "name": "   ", "artist": "Nobody" })).unwrap();
        assert!(normalize(&blank, user(1)).is_none());
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let raw = lastfm_track("Song X", "Artist Y");
        let owner = user(7);
        assert_eq!(normalize(&raw, owner), normalize(&raw, owner));
    }

    #[test]
    fn test_profile_entry_reparses_via_lastfm_variant() {
        // A previously-unified profile entry (union schema) round-trips
        let unified = UnifiedTrack {
            name: "Paranoid Android".into(),
            artist: "Radiohead".into(),
            album: Some("OK Computer".into()),
            sources: vec![user(3)],
            match_score: 1,
            spotify_id: Some("6LgJvl0Xdtc73RJ1mmpotq".into()),
            lastfm_id: None,
            apple_id: None,
        };
        let json = serde_json::to_value(&unified).unwrap();
        let raw: RawTrack = serde_json::from_value(json).unwrap();
        assert!(matches!(raw, RawTrack::LastFm(_)));

        let seed = normalize(&raw, user(4)).unwrap();
        assert_eq!(seed.name, "Paranoid Android");
        assert_eq!(seed.artist, "Radiohead");
        assert_eq!(seed.spotify_id.as_deref(), Some("6LgJvl0Xdtc73RJ1mmpotq"));
    }

    #[test]
    fn test_aggregator_match_score_equals_sources_len() {
        let mut agg = TrackAggregator::new();
        for n in 1..=5 {
            agg.add(normalize(&lastfm_track("Song X", "Artist Y"), user(n)).unwrap());
            agg.add(normalize(&lastfm_track(&format!("Only {n}"), "Solo"), user(n)).unwrap());
        }
        for track in agg.into_ranked() {
            assert_eq!(track.match_score as usize, track.sources.len());
        }
    }

    #[test]
    fn test_aggregator_same_owner_counted_once() {
        let mut agg = TrackAggregator::new();
        let owner = user(9);
        // Same track via two services for one user
        agg.add(normalize(&lastfm_track("One More Time", "Daft Punk"), owner).unwrap());
        let spotify: RawTrack = serde_json::from_value(serde_json::json!({
            "id": "0DiWol3AO6WpXZgp0goxAV",
            "name": "One More Time",
            "artists": [{ "name": "Daft Punk" }]
        }))
        .unwrap();
        agg.add(normalize(&spotify, owner).unwrap());

        let ranked = agg.into_ranked();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].match_score, 1);
        assert_eq!(ranked[0].sources, vec![owner]);
        // Service IDs from both copies merged onto the one entry
        assert_eq!(ranked[0].spotify_id.as_deref(), Some("0DiWol3AO6WpXZgp0goxAV"));
    }

    #[test]
    fn test_aggregation_is_monotonic() {
        let mut agg = TrackAggregator::new();
        agg.add(normalize(&lastfm_track("Song X", "Artist Y"), user(1)).unwrap());
        let before = agg.tracks[0].match_score;
        agg.add(normalize(&lastfm_track("song x", "artist y"), user(2)).unwrap());
        assert!(agg.tracks[0].match_score > before);
    }

    #[test]
    fn test_two_member_overlap_scenario() {
        let a = user(0xA);
        let b = user(0xB);
        let profiles = vec![
            (a, Some(r#"[{"name":"Song X","artist":"Artist Y"}]"#.to_string())),
            (
                b,
                Some(
                    r#"[{"name":"Song X","artist":"Artist Y"},{"name":"Song Z","artist":"Artist W"}]"#
                        .to_string(),
                ),
            ),
        ];

        let (agg, members_analyzed) = aggregate_member_profiles(&profiles);
        assert_eq!(members_analyzed, 2);
        assert_eq!(agg.len(), 2);

        let ranked = agg.into_ranked();
        assert_eq!(ranked[0].name, "Song X");
        assert_eq!(ranked[0].match_score, 2);
        assert_eq!(ranked[0].sources, vec![a, b]);
        assert_eq!(ranked[1].name, "Song Z");
        assert_eq!(ranked[1].match_score, 1);
        assert_eq!(ranked[1].sources, vec![b]);
    }

    #[test]
    fn test_malformed_member_profile_is_skipped() {
        let profiles = vec![
            (user(1), Some("{not json".to_string())),
            (user(2), Some(r#"[{"name":"Song X","artist":"Artist Y"}]"#.to_string())),
            (user(3), None),
        ];

        let (agg, members_analyzed) = aggregate_member_profiles(&profiles);
        assert_eq!(members_analyzed, 1);
        let ranked = agg.into_ranked();
        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].sources, vec![user(2)]);
    }

    #[test]
    fn test_no_profiles_yields_empty_aggregation() {
        let profiles = vec![(user(1), None), (user(2), None)];
        let (agg, members_analyzed) = aggregate_member_profiles(&profiles);
        assert!(agg.is_empty());
        assert_eq!(members_analyzed, 0);
    }

    #[test]
    fn test_ranking_ties_keep_first_seen_order() {
        let mut agg = TrackAggregator::new();
        for name in ["First", "Second", "Third"] {
            agg.add(normalize(&lastfm_track(name, "Same Artist"), user(1)).unwrap());
        }
        let ranked = agg.into_ranked();
        let names: Vec<&str> = ranked.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_ranking_orders_by_match_score_desc() {
        let mut agg = TrackAggregator::new();
        agg.add(normalize(&lastfm_track("Solo", "A"), user(1)).unwrap());
        for n in 1..=3 {
            agg.add(normalize(&lastfm_track("Crowd Pleaser", "B"), user(n)).unwrap());
        }
        for n in 1..=2 {
            agg.add(normalize(&lastfm_track("Middle", "C"), user(n)).unwrap());
        }

        let ranked = agg.into_ranked();
        let scores: Vec<u32> = ranked.iter().map(|t| t.match_score).collect();
        assert_eq!(scores, vec![3, 2, 1]);
        assert_eq!(ranked[0].name, "Crowd Pleaser");
    }

    #[test]
    fn test_report_and_persist_limits() {
        // 40 distinct tracks from one member: both caps apply downstream
        let tracks: Vec<String> = (0..40)
            .map(|i| format!(r#"{{"name":"Track {i}","artist":"Artist"}}"#))
            .collect();
        let json = format!("[{}]", tracks.join(","));
        let (agg, _) = aggregate_member_profiles(&[(user(1), Some(json))]);

        let ranked = agg.into_ranked();
        assert_eq!(ranked.len(), 40);
        assert_eq!(ranked.iter().take(REPORT_LIMIT).count(), 30);
        assert_eq!(ranked.iter().take(PERSIST_LIMIT).count(), 20);
    }
}
