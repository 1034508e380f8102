//! Party playlist generation and voting.
//!
//! Generation merges every member's stored music profile through the
//! playlist engine, ranks by match score, and replaces the party's
//! generated tracks with the new top entries. At most one generation
//! runs per party at a time.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use uuid::Uuid;

use super::parties::find_party_by_code;
use crate::auth::middleware::AuthUser;
use crate::playlist_engine::{aggregate_member_profiles, PERSIST_LIMIT, REPORT_LIMIT};
use tootfm_db::entities::{music_profile, party, party_member, party_track};
use tootfm_db::AppState;

// ─── Errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GenerateError {
    #[error("party not found: {0}")]
    PartyNotFound(String),

    #[error("no member of this party has an analyzed music profile")]
    NoMusicData,

    #[error("a playlist generation is already running for this party")]
    GenerationInProgress,

    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),
}

impl GenerateError {
    fn status(&self) -> StatusCode {
        match self {
            GenerateError::PartyNotFound(_) => StatusCode::NOT_FOUND,
            GenerateError::NoMusicData => StatusCode::BAD_REQUEST,
            GenerateError::GenerationInProgress => StatusCode::CONFLICT,
            GenerateError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn hint(&self) -> Option<&'static str> {
        match self {
            GenerateError::NoMusicData => {
                Some("Ask party members to analyze their music before generating a playlist.")
            }
            _ => None,
        }
    }
}

// ─── Structs ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PartyTrackResponse {
    pub id: Uuid,
    pub name: String,
    pub artist: String,
    pub album: Option<String>,
    pub sources: Vec<Uuid>,
    pub match_score: i32,
    pub vote_count: i32,
    pub position: i32,
    pub spotify_id: Option<String>,
    pub lastfm_id: Option<String>,
    pub apple_id: Option<String>,
}

impl From<party_track::Model> for PartyTrackResponse {
    fn from(t: party_track::Model) -> Self {
        let sources: Vec<Uuid> = serde_json::from_value(t.sources.clone()).unwrap_or_default();
        Self {
            id: t.id,
            name: t.name,
            artist: t.artist,
            album: t.album,
            sources,
            match_score: t.match_score,
            vote_count: t.vote_count,
            position: t.position,
            spotify_id: t.spotify_id,
            lastfm_id: t.lastfm_id,
            apple_id: t.apple_id,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GenerationStats {
    /// Ranked tracks considered for the party (capped at the report limit).
    pub total_tracks: usize,
    /// Members whose profile was readable and contributed.
    pub members_analyzed: usize,
    /// Highest match score in the ranked list.
    pub top_match_score: u32,
}

#[derive(Debug, Serialize)]
pub struct GeneratePlaylistResponse {
    pub success: bool,
    pub playlist: Vec<PartyTrackResponse>,
    pub stats: GenerationStats,
}

pub struct GenerationOutcome {
    pub playlist: Vec<party_track::Model>,
    pub stats: GenerationStats,
}

// ─── Generation guard ───────────────────────────────────────────────

/// Marks a party as having a generation in flight; released on drop so
/// every exit path (including errors) clears the flag.
struct GenerationGuard {
    parties: Arc<Mutex<HashSet<Uuid>>>,
    party_id: Uuid,
}

impl GenerationGuard {
    fn acquire(parties: &Arc<Mutex<HashSet<Uuid>>>, party_id: Uuid) -> Option<Self> {
        let mut set = parties.lock().unwrap_or_else(PoisonError::into_inner);
        if !set.insert(party_id) {
            return None;
        }
        Some(Self {
            parties: parties.clone(),
            party_id,
        })
    }
}

impl Drop for GenerationGuard {
    fn drop(&mut self) {
        self.parties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.party_id);
    }
}

// ─── Generation service ─────────────────────────────────────────────

/// Generate (or regenerate) the shared playlist for a party.
///
/// Regeneration replaces previously generated rows rather than
/// appending to them; a row-level insert failure is logged and skipped
/// while the rest of the batch proceeds.
pub async fn generate_party_playlist(
    state: &AppState,
    code: &str,
) -> Result<GenerationOutcome, GenerateError> {
    let party_model = find_party_by_code(&state.db, code)
        .await?
        .ok_or_else(|| GenerateError::PartyNotFound(code.to_string()))?;

    let _guard = GenerationGuard::acquire(&state.generating_parties, party_model.id)
        .ok_or(GenerateError::GenerationInProgress)?;

    let members = party_member::Entity::find()
        .filter(party_member::Column::PartyId.eq(party_model.id))
        .order_by_asc(party_member::Column::JoinedAt)
        .all(&state.db)
        .await?;

    let member_ids: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();
    let profiles: HashMap<Uuid, String> = if member_ids.is_empty() {
        HashMap::new()
    } else {
        music_profile::Entity::find()
            .filter(music_profile::Column::UserId.is_in(member_ids.clone()))
            .all(&state.db)
            .await?
            .into_iter()
            .map(|p| (p.user_id, p.top_tracks))
            .collect()
    };

    // Member iteration order is join order; profiles missing or
    // unparseable are skipped inside the engine
    let member_profiles: Vec<(Uuid, Option<String>)> = member_ids
        .iter()
        .map(|id| (*id, profiles.get(id).cloned()))
        .collect();

    let (aggregator, members_analyzed) = aggregate_member_profiles(&member_profiles);
    if aggregator.is_empty() {
        return Err(GenerateError::NoMusicData);
    }

    let mut ranked = aggregator.into_ranked();
    ranked.truncate(REPORT_LIMIT);
    let top_match_score = ranked.first().map(|t| t.match_score).unwrap_or(0);
    let total_tracks = ranked.len();

    // Regeneration replaces the old playlist
    party_track::Entity::delete_many()
        .filter(party_track::Column::PartyId.eq(party_model.id))
        .exec(&state.db)
        .await?;

    let now = chrono::Utc::now().fixed_offset();
    let mut inserted = Vec::with_capacity(PERSIST_LIMIT);
    for (position, track) in ranked.into_iter().take(PERSIST_LIMIT).enumerate() {
        let entry = party_track::ActiveModel {
            id: Set(Uuid::new_v4()),
            party_id: Set(party_model.id),
            name: Set(track.name.clone()),
            artist: Set(track.artist.clone()),
            album: Set(track.album.clone()),
            sources: Set(serde_json::json!(track.sources)),
            match_score: Set(track.match_score as i32),
            vote_count: Set(0),
            position: Set(position as i32),
            spotify_id: Set(track.spotify_id.clone()),
            lastfm_id: Set(track.lastfm_id.clone()),
            apple_id: Set(track.apple_id.clone()),
            created_at: Set(now),
        };
        match entry.insert(&state.db).await {
            Ok(model) => inserted.push(model),
            Err(e) => {
                tracing::warn!(
                    party_id = %party_model.id,
                    track = %track.name,
                    error = %e,
                    "failed to persist generated track, continuing"
                );
            }
        }
    }

    let inserted_count = inserted.len();
    let mut active: party::ActiveModel = party_model.into();
    active.playlist_generated = Set(true);
    active.total_tracks = Set(inserted_count as i32);
    active.updated_at = Set(now);
    let updated = active.update(&state.db).await?;

    tracing::info!(
        party_id = %updated.id,
        code = %updated.code,
        tracks = inserted_count,
        members_analyzed,
        "party playlist generated"
    );

    Ok(GenerationOutcome {
        playlist: inserted,
        stats: GenerationStats {
            total_tracks,
            members_analyzed,
            top_match_score,
        },
    })
}

// ─── Handlers ───────────────────────────────────────────────────────

/// POST /api/parties/:code/playlist (auth required)
pub async fn generate_playlist(
    State(state): State<Arc<AppState>>,
    axum::Extension(_auth_user): axum::Extension<AuthUser>,
    Path(code): Path<String>,
) -> Result<Json<GeneratePlaylistResponse>, (StatusCode, Json<serde_json::Value>)> {
    match generate_party_playlist(&state, &code).await {
        Ok(outcome) => Ok(Json(GeneratePlaylistResponse {
            success: true,
            playlist: outcome
                .playlist
                .into_iter()
                .map(PartyTrackResponse::from)
                .collect(),
            stats: outcome.stats,
        })),
        Err(e) => {
            if let GenerateError::Database(ref db_err) = e {
                tracing::error!(error = %db_err, code = %code, "playlist generation failed");
            }
            let mut body = serde_json::json!({ "error": e.to_string() });
            if let Some(hint) = e.hint() {
                body["hint"] = serde_json::json!(hint);
            }
            Err((e.status(), Json(body)))
        }
    }
}

/// GET /api/parties/:code/playlist
pub async fn get_playlist(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<Vec<PartyTrackResponse>>, (StatusCode, String)> {
    let party_model = find_party_by_code(&state.db, &code)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?
        .ok_or((StatusCode::NOT_FOUND, "Party not found".to_string()))?;

    let tracks = party_track::Entity::find()
        .filter(party_track::Column::PartyId.eq(party_model.id))
        .order_by_asc(party_track::Column::Position)
        .all(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    Ok(Json(tracks.into_iter().map(PartyTrackResponse::from).collect()))
}

/// POST /api/parties/:code/playlist/tracks/:track_id/vote (auth required, members only)
pub async fn vote_track(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
    Path((code, track_id)): Path<(String, Uuid)>,
) -> Result<Json<PartyTrackResponse>, (StatusCode, String)> {
    let party_model = find_party_by_code(&state.db, &code)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?
        .ok_or((StatusCode::NOT_FOUND, "Party not found".to_string()))?;

    let membership = party_member::Entity::find_by_id((party_model.id, auth_user.0.sub))
        .one(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
    if membership.is_none() {
        return Err((
            StatusCode::FORBIDDEN,
            "Only party members can vote".to_string(),
        ));
    }

    let track = party_track::Entity::find_by_id(track_id)
        .one(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?
        .filter(|t| t.party_id == party_model.id)
        .ok_or((StatusCode::NOT_FOUND, "Track not found".to_string()))?;

    let new_count = track.vote_count + 1;
    let mut active: party_track::ActiveModel = track.into();
    active.vote_count = Set(new_count);
    let updated = active
        .update(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    Ok(Json(PartyTrackResponse::from(updated)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use sea_orm::{DatabaseBackend, MockDatabase};

    fn test_state(db: sea_orm::DatabaseConnection) -> AppState {
        AppState {
            db,
            jwt_secret: "test-jwt-secret".to_string(),
            domain: "test.tootfm.local".to_string(),
            generating_parties: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    fn make_party(code: &str) -> party::Model {
        party::Model {
            id: Uuid::new_v4(),
            code: code.to_string(),
            name: "Test Party".into(),
            host_id: Uuid::new_v4(),
            playlist_generated: false,
            total_tracks: 0,
            created_at: Utc::now().fixed_offset(),
            updated_at: Utc::now().fixed_offset(),
        }
    }

    #[tokio::test]
    async fn test_generate_fails_for_unknown_party() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<party::Model>::new()])
            .into_connection();
        let state = test_state(db);

        let err = generate_party_playlist(&state, "ZZZZZZ").await.unwrap_err();
        assert!(matches!(err, GenerateError::PartyNotFound(_)));
    }

    #[tokio::test]
    async fn test_generate_fails_without_any_profile() {
        let party_model = make_party("AB12CD");
        let member = party_member::Model {
            party_id: party_model.id,
            user_id: Uuid::new_v4(),
            joined_at: Utc::now().fixed_offset(),
        };

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![party_model]])
            .append_query_results([vec![member]])
            .append_query_results([Vec::<music_profile::Model>::new()])
            .into_connection();
        let state = test_state(db);

        let err = generate_party_playlist(&state, "ab12cd").await.unwrap_err();
        assert!(matches!(err, GenerateError::NoMusicData));

        // The guard must be released even on failure
        assert!(state
            .generating_parties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_empty());
    }

    #[tokio::test]
    async fn test_generate_rejects_concurrent_run() {
        let party_model = make_party("AB12CD");
        let party_id = party_model.id;

        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![party_model]])
            .into_connection();
        let state = test_state(db);
        state
            .generating_parties
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(party_id);

        let err = generate_party_playlist(&state, "AB12CD").await.unwrap_err();
        assert!(matches!(err, GenerateError::GenerationInProgress));
    }

    #[test]
    fn test_generate_error_status_mapping() {
        assert_eq!(
            GenerateError::PartyNotFound("ZZZZZZ".into()).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(GenerateError::NoMusicData.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            GenerateError::GenerationInProgress.status(),
            StatusCode::CONFLICT
        );
        assert!(GenerateError::NoMusicData.hint().is_some());
        assert!(GenerateError::PartyNotFound("X".into()).hint().is_none());
    }

    #[test]
    fn test_party_track_response_from_model() {
        let member = Uuid::new_v4();
        let model = party_track::Model {
            id: Uuid::new_v4(),
            party_id: Uuid::new_v4(),
            name: "Song X".into(),
            artist: "Artist Y".into(),
            album: None,
            sources: serde_json::json!([member]),
            match_score: 2,
            vote_count: 0,
            position: 0,
            spotify_id: None,
            lastfm_id: None,
            apple_id: None,
            created_at: Utc::now().fixed_offset(),
        };
        let resp = PartyTrackResponse::from(model);
        assert_eq!(resp.sources, vec![member]);
        assert_eq!(resp.match_score, 2);
    }

    #[test]
    fn test_generate_response_serialization() {
        let resp = GeneratePlaylistResponse {
            success: true,
            playlist: vec![],
            stats: GenerationStats {
                total_tracks: 2,
                members_analyzed: 3,
                top_match_score: 2,
            },
        };
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["stats"]["total_tracks"], 2);
        assert_eq!(json["stats"]["members_analyzed"], 3);
        assert_eq!(json["stats"]["top_match_score"], 2);
    }
}
