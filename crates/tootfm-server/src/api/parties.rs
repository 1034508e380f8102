use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use rand::Rng;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, ModelTrait, PaginatorTrait, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::middleware::AuthUser;
use tootfm_db::entities::{party, party_member, user};
use tootfm_db::AppState;

const PARTY_CODE_LEN: usize = 6;
const PARTY_CODE_CHARS: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
const CODE_GENERATION_ATTEMPTS: usize = 5;

// ─── Structs ────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct PartyResponse {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    pub host_id: Uuid,
    pub playlist_generated: bool,
    pub total_tracks: i32,
    pub member_count: Option<u64>,
    pub created_at: chrono::DateTime<chrono::FixedOffset>,
}

impl From<party::Model> for PartyResponse {
    fn from(p: party::Model) -> Self {
        Self {
            id: p.id,
            code: p.code,
            name: p.name,
            host_id: p.host_id,
            playlist_generated: p.playlist_generated,
            total_tracks: p.total_tracks,
            member_count: None,
            created_at: p.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PartyMemberResponse {
    pub user_id: Uuid,
    pub username: String,
    pub display_name: Option<String>,
    pub joined_at: chrono::DateTime<chrono::FixedOffset>,
}

#[derive(Debug, Serialize)]
pub struct PartyDetailResponse {
    #[serde(flatten)]
    pub party: PartyResponse,
    pub members: Vec<PartyMemberResponse>,
}

#[derive(Debug, Deserialize)]
pub struct CreatePartyRequest {
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct JoinPartyResponse {
    pub joined: bool,
    pub already_member: bool,
}

// ─── Helpers ────────────────────────────────────────────────────────

fn generate_party_code() -> String {
    let mut rng = rand::rng();
    (0..PARTY_CODE_LEN)
        .map(|_| PARTY_CODE_CHARS[rng.random_range(0..PARTY_CODE_CHARS.len())] as char)
        .collect()
}

/// Resolve a party by its join code (case-insensitive).
pub async fn find_party_by_code(
    db: &sea_orm::DatabaseConnection,
    code: &str,
) -> Result<Option<party::Model>, sea_orm::DbErr> {
    party::Entity::find()
        .filter(party::Column::Code.eq(code.trim().to_uppercase()))
        .one(db)
        .await
}

async fn load_members(
    db: &sea_orm::DatabaseConnection,
    party_id: Uuid,
) -> Result<Vec<party_member::Model>, sea_orm::DbErr> {
    party_member::Entity::find()
        .filter(party_member::Column::PartyId.eq(party_id))
        .order_by_asc(party_member::Column::JoinedAt)
        .all(db)
        .await
}

// ─── Handlers ───────────────────────────────────────────────────────

/// POST /api/parties (auth required)
pub async fn create_party(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
    Json(body): Json<CreatePartyRequest>,
) -> Result<(StatusCode, Json<PartyResponse>), (StatusCode, String)> {
    if body.name.trim().is_empty() || body.name.len() > 255 {
        return Err((
            StatusCode::BAD_REQUEST,
            "Party name must be between 1 and 255 characters".to_string(),
        ));
    }

    // Retry on the (unlikely) code collision
    let mut code = None;
    for _ in 0..CODE_GENERATION_ATTEMPTS {
        let candidate = generate_party_code();
        let taken = find_party_by_code(&state.db, &candidate)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;
        if taken.is_none() {
            code = Some(candidate);
            break;
        }
    }
    let code = code.ok_or((
        StatusCode::INTERNAL_SERVER_ERROR,
        "Could not allocate a unique party code".to_string(),
    ))?;

    let now = chrono::Utc::now().fixed_offset();
    let party_id = Uuid::new_v4();

    let new_party = party::ActiveModel {
        id: Set(party_id),
        code: Set(code),
        name: Set(body.name.trim().to_string()),
        host_id: Set(auth_user.0.sub),
        playlist_generated: Set(false),
        total_tracks: Set(0),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = new_party
        .insert(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    // The host is always the first member
    let host_membership = party_member::ActiveModel {
        party_id: Set(party_id),
        user_id: Set(auth_user.0.sub),
        joined_at: Set(now),
    };
    host_membership
        .insert(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    tracing::info!(party_id = %party_id, code = %created.code, "party created");

    let mut resp = PartyResponse::from(created);
    resp.member_count = Some(1);
    Ok((StatusCode::CREATED, Json(resp)))
}

/// GET /api/parties (auth required — parties the caller belongs to)
pub async fn list_my_parties(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
) -> Result<Json<Vec<PartyResponse>>, (StatusCode, String)> {
    let memberships = party_member::Entity::find()
        .filter(party_member::Column::UserId.eq(auth_user.0.sub))
        .all(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let party_ids: Vec<Uuid> = memberships.iter().map(|m| m.party_id).collect();
    if party_ids.is_empty() {
        return Ok(Json(vec![]));
    }

    let parties = party::Entity::find()
        .filter(party::Column::Id.is_in(party_ids))
        .order_by_desc(party::Column::CreatedAt)
        .all(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let mut data: Vec<PartyResponse> = Vec::with_capacity(parties.len());
    for p in parties {
        let count = party_member::Entity::find()
            .filter(party_member::Column::PartyId.eq(p.id))
            .count(&state.db)
            .await
            .unwrap_or(0);
        let mut resp = PartyResponse::from(p);
        resp.member_count = Some(count);
        data.push(resp);
    }

    Ok(Json(data))
}

/// GET /api/parties/:code
pub async fn get_party(
    State(state): State<Arc<AppState>>,
    Path(code): Path<String>,
) -> Result<Json<PartyDetailResponse>, (StatusCode, String)> {
    let party_model = find_party_by_code(&state.db, &code)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?
        .ok_or((StatusCode::NOT_FOUND, "Party not found".to_string()))?;

    let members = load_members(&state.db, party_model.id)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    let user_ids: Vec<Uuid> = members.iter().map(|m| m.user_id).collect();
    let users = if user_ids.is_empty() {
        vec![]
    } else {
        user::Entity::find()
            .filter(user::Column::Id.is_in(user_ids))
            .all(&state.db)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?
    };

    let mut member_responses = Vec::with_capacity(members.len());
    for m in &members {
        if let Some(u) = users.iter().find(|u| u.id == m.user_id) {
            member_responses.push(PartyMemberResponse {
                user_id: u.id,
                username: u.username.clone(),
                display_name: u.display_name.clone(),
                joined_at: m.joined_at,
            });
        }
    }

    let mut resp = PartyResponse::from(party_model);
    resp.member_count = Some(member_responses.len() as u64);

    Ok(Json(PartyDetailResponse {
        party: resp,
        members: member_responses,
    }))
}

/// POST /api/parties/:code/join (auth required)
pub async fn join_party(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
    Path(code): Path<String>,
) -> Result<Json<JoinPartyResponse>, (StatusCode, String)> {
    let party_model = find_party_by_code(&state.db, &code)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?
        .ok_or((StatusCode::NOT_FOUND, "Party not found".to_string()))?;

    let existing = party_member::Entity::find_by_id((party_model.id, auth_user.0.sub))
        .one(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    if existing.is_some() {
        return Ok(Json(JoinPartyResponse {
            joined: true,
            already_member: true,
        }));
    }

    let membership = party_member::ActiveModel {
        party_id: Set(party_model.id),
        user_id: Set(auth_user.0.sub),
        joined_at: Set(chrono::Utc::now().fixed_offset()),
    };
    membership
        .insert(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    tracing::info!(party_id = %party_model.id, user_id = %auth_user.0.sub, "member joined party");

    Ok(Json(JoinPartyResponse {
        joined: true,
        already_member: false,
    }))
}

/// POST /api/parties/:code/leave (auth required)
pub async fn leave_party(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
    Path(code): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let party_model = find_party_by_code(&state.db, &code)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?
        .ok_or((StatusCode::NOT_FOUND, "Party not found".to_string()))?;

    if party_model.host_id == auth_user.0.sub {
        return Err((
            StatusCode::BAD_REQUEST,
            "The host cannot leave; delete the party instead".to_string(),
        ));
    }

    let membership = party_member::Entity::find_by_id((party_model.id, auth_user.0.sub))
        .one(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?
        .ok_or((StatusCode::NOT_FOUND, "Not a member of this party".to_string()))?;

    membership
        .delete(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    Ok(StatusCode::NO_CONTENT)
}

/// DELETE /api/parties/:code (auth required, host only)
pub async fn delete_party(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
    Path(code): Path<String>,
) -> Result<StatusCode, (StatusCode, String)> {
    let party_model = find_party_by_code(&state.db, &code)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?
        .ok_or((StatusCode::NOT_FOUND, "Party not found".to_string()))?;

    if party_model.host_id != auth_user.0.sub {
        return Err((StatusCode::FORBIDDEN, "Not your party".to_string()));
    }

    // Members and generated tracks go with it (FK cascade)
    party::Entity::delete_by_id(party_model.id)
        .exec(&state.db)
        .await
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, format!("DB error: {e}")))?;

    tracing::info!(party_id = %party_model.id, "party deleted");

    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_party_code_shape() {
        for _ in 0..100 {
            let code = generate_party_code();
            assert_eq!(code.len(), PARTY_CODE_LEN);
            assert!(code
                .bytes()
                .all(|b| b.is_ascii_uppercase() || b.is_ascii_digit()));
        }
    }

    #[test]
    fn test_party_response_from_model() {
        let model = party::Model {
            id: Uuid::new_v4(),
            code: "K7KQ2N".into(),
            name: "Flat warming".into(),
            host_id: Uuid::new_v4(),
            playlist_generated: false,
            total_tracks: 0,
            created_at: Utc::now().fixed_offset(),
            updated_at: Utc::now().fixed_offset(),
        };
        let resp = PartyResponse::from(model.clone());
        assert_eq!(resp.code, "K7KQ2N");
        assert!(!resp.playlist_generated);
        assert!(resp.member_count.is_none());
    }

    #[test]
    fn test_party_detail_response_flattens_party() {
        let model = party::Model {
            id: Uuid::new_v4(),
            code: "AAAAAA".into(),
            name: "Test".into(),
            host_id: Uuid::new_v4(),
            playlist_generated: true,
            total_tracks: 12,
            created_at: Utc::now().fixed_offset(),
            updated_at: Utc::now().fixed_offset(),
        };
        let detail = PartyDetailResponse {
            party: PartyResponse::from(model),
            members: vec![],
        };
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["code"], "AAAAAA");
        assert_eq!(json["total_tracks"], 12);
        assert!(json["members"].as_array().unwrap().is_empty());
    }

    #[test]
    fn test_create_party_request_deserialization() {
        let req: CreatePartyRequest = serde_json::from_str(r#"{"name":"Road trip"}"#).unwrap();
        assert_eq!(req.name, "Road trip");
    }
}
