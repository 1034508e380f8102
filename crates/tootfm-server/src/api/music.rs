//! Music profile endpoints.
//!
//! Clients submit their raw per-service top-track lists (Spotify,
//! Last.fm) and the server folds them into one unified profile with the
//! same normalize/dedup machinery the party playlist generator runs,
//! applied to a single owner so duplicates across services merge their
//! service IDs instead of raising the match score.

use axum::{extract::State, http::StatusCode, Json};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use crate::playlist_engine::{normalize, RawTrack, TrackAggregator, UnifiedTrack};
use tootfm_db::entities::music_profile;
use tootfm_db::AppState;

/// Tracks kept in a stored profile.
const PROFILE_TRACK_LIMIT: usize = 50;

// ─── Structs ────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    #[serde(default)]
    pub spotify_tracks: Vec<serde_json::Value>,
    #[serde(default)]
    pub lastfm_tracks: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub analyzed: bool,
    pub track_count: i32,
    pub services: Vec<String>,
    pub analyzed_at: Option<chrono::DateTime<chrono::FixedOffset>>,
    pub tracks: Vec<UnifiedTrack>,
}

// ─── Helpers ────────────────────────────────────────────────────────

/// Merge raw per-service lists into one deduplicated track list for a
/// single owner. Entries that deserialize to neither service shape are
/// skipped; returns the unified list (capped) and the skip count.
fn build_profile_tracks(
    owner: Uuid,
    spotify_tracks: &[serde_json::Value],
    lastfm_tracks: &[serde_json::Value],
) -> (Vec<UnifiedTrack>, usize) {
    let mut aggregator = TrackAggregator::new();
    let mut skipped = 0;

    for value in spotify_tracks.iter().chain(lastfm_tracks.iter()) {
        match serde_json::from_value::<RawTrack>(value.clone()) {
            Ok(raw) => {
                if let Some(seed) = normalize(&raw, owner) {
                    aggregator.add(seed);
                } else {
                    skipped += 1;
                }
            }
            Err(_) => skipped += 1,
        }
    }

    let mut tracks = aggregator.into_ranked();
    tracks.truncate(PROFILE_TRACK_LIMIT);
    (tracks, skipped)
}

async fn find_profile(
    db: &sea_orm::DatabaseConnection,
    user_id: Uuid,
) -> Result<Option<music_profile::Model>, sea_orm::DbErr> {
    music_profile::Entity::find()
        .filter(music_profile::Column::UserId.eq(user_id))
        .one(db)
        .await
}

fn profile_services(model: &music_profile::Model) -> Vec<String> {
    serde_json::from_value(model.services.clone()).unwrap_or_default()
}

// ─── Handlers ───────────────────────────────────────────────────────

/// POST /api/music/analyze (auth required)
///
/// Builds (or rebuilds) the caller's unified profile from submitted
/// per-service track lists. Overwrites any previous profile.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
    Json(body): Json<AnalyzeRequest>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let user_id = auth_user.0.sub;

    if body.spotify_tracks.is_empty() && body.lastfm_tracks.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "No track data submitted. Connect a music service first.".to_string(),
        ));
    }

    let (tracks, skipped) = build_profile_tracks(user_id, &body.spotify_tracks, &body.lastfm_tracks);
    if skipped > 0 {
        tracing::warn!(user_id = %user_id, skipped, "skipped unusable track records during analysis");
    }

    if tracks.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Submitted track data contained no usable tracks".to_string(),
        ));
    }

    let mut services = Vec::new();
    if !body.spotify_tracks.is_empty() {
        services.push("spotify".to_string());
    }
    if !body.lastfm_tracks.is_empty() {
        services.push("lastfm".to_string());
    }

    let top_tracks_json = serde_json::to_string(&tracks)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("Serialization error: {e}")))?;
    let now = chrono::Utc::now().fixed_offset();
    let track_count = tracks.len() as i32;
    let services_json = serde_json::json!(services);

    // Upsert: one profile per user
    let existing = find_profile(&state.db, user_id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    if let Some(existing) = existing {
        let mut model: music_profile::ActiveModel = existing.into();
        model.top_tracks = Set(top_tracks_json);
        model.track_count = Set(track_count);
        model.services = Set(services_json);
        model.analyzed_at = Set(now);
        model
            .update(&state.db)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    } else {
        let model = music_profile::ActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(user_id),
            top_tracks: Set(top_tracks_json),
            track_count: Set(track_count),
            services: Set(services_json),
            analyzed_at: Set(now),
        };
        model
            .insert(&state.db)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    }

    tracing::info!(user_id = %user_id, track_count, "music profile analyzed");

    Ok(Json(ProfileResponse {
        analyzed: true,
        track_count,
        services,
        analyzed_at: Some(now),
        tracks,
    }))
}

/// GET /api/music/profile (auth required)
pub async fn get_profile(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
) -> Result<Json<ProfileResponse>, (StatusCode, String)> {
    let profile = find_profile(&state.db, auth_user.0.sub)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let Some(profile) = profile else {
        return Ok(Json(ProfileResponse {
            analyzed: false,
            track_count: 0,
            services: vec![],
            analyzed_at: None,
            tracks: vec![],
        }));
    };

    // A corrupt blob is still an analyzed profile; it just has no
    // readable tracks (the playlist generator will skip it too)
    let tracks: Vec<UnifiedTrack> = serde_json::from_str(&profile.top_tracks).unwrap_or_else(|e| {
        tracing::warn!(user_id = %profile.user_id, error = %e, "stored profile is unparseable");
        vec![]
    });

    Ok(Json(ProfileResponse {
        analyzed: true,
        track_count: profile.track_count,
        services: profile_services(&profile),
        analyzed_at: Some(profile.analyzed_at),
        tracks,
    }))
}

/// DELETE /api/music/profile (auth required)
pub async fn delete_profile(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
) -> Result<StatusCode, (StatusCode, String)> {
    let profile = find_profile(&state.db, auth_user.0.sub)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?
        .ok_or((StatusCode::NOT_FOUND, "No music profile".to_string()))?;

    profile
        .delete(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_build_profile_merges_services() {
        let owner = Uuid::new_v4();
        let spotify = vec![json!({
            "id": "5ghIJDpPoe3CfHMGu71E6T",
            "name": "Smells Like Teen Spirit",
            "artists": [{ "name": "Nirvana" }],
            "album": { "name": "Nevermind" }
        })];
        let lastfm = vec![
            json!({ "name": "Smells Like Teen Spirit", "artist": "Nirvana", "mbid": "mbid-1" }),
            json!({ "name": "Lithium", "artist": "Nirvana" }),
        ];

        let (tracks, skipped) = build_profile_tracks(owner, &spotify, &lastfm);
        assert_eq!(skipped, 0);
        assert_eq!(tracks.len(), 2);

        // The cross-service duplicate merged, keeping both IDs and one source
        let teen_spirit = &tracks[0];
        assert_eq!(teen_spirit.name, "Smells Like Teen Spirit");
        assert_eq!(teen_spirit.match_score, 1);
        assert_eq!(teen_spirit.sources, vec![owner]);
        assert_eq!(teen_spirit.spotify_id.as_deref(), Some("5ghIJDpPoe3CfHMGu71E6T"));
        assert_eq!(teen_spirit.lastfm_id.as_deref(), Some("mbid-1"));
    }

    #[test]
    fn test_build_profile_skips_unusable_records() {
        let owner = Uuid::new_v4();
        let lastfm = vec![
            json!("just a string"),
            json!({ "artist": "No Name Given" }),
            json!({ "name": "Real Song", "artist": "Real Artist" }),
        ];
        let (tracks, skipped) = build_profile_tracks(owner, &[], &lastfm);
        assert_eq!(tracks.len(), 1);
        assert_eq!(skipped, 2);
    }

    #[test]
    fn test_build_profile_caps_track_count() {
        let owner = Uuid::new_v4();
        let lastfm: Vec<serde_json::Value> = (0..80)
            .map(|i| json!({ "name": format!("Track {i}"), "artist": "Prolific" }))
            .collect();
        let (tracks, _) = build_profile_tracks(owner, &[], &lastfm);
        assert_eq!(tracks.len(), PROFILE_TRACK_LIMIT);
    }

    #[test]
    fn test_analyze_request_defaults() {
        let req: AnalyzeRequest = serde_json::from_str("{}").unwrap();
        assert!(req.spotify_tracks.is_empty());
        assert!(req.lastfm_tracks.is_empty());
    }

    #[test]
    fn test_profile_response_serialization() {
        let resp = ProfileResponse {
            analyzed: false,
            track_count: 0,
            services: vec![],
            analyzed_at: None,
            tracks: vec![],
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["analyzed"], false);
        assert!(json["analyzed_at"].is_null());
    }
}
