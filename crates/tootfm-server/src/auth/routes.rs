use axum::{extract::State, http::StatusCode, Json};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::jwt::{generate_token_pair, validate_token, TokenPair, TokenType};
use super::middleware::AuthUser;
use super::password::{hash_password, verify_password};
use tootfm_db::entities::user;
use tootfm_db::AppState;

// ─── Request/Response DTOs ──────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub display_name: Option<String>,
    pub avatar_url: Option<String>,
}

impl From<user::Model> for UserResponse {
    fn from(u: user::Model) -> Self {
        Self {
            id: u.id,
            username: u.username,
            email: u.email,
            display_name: u.display_name,
            avatar_url: u.avatar_url,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub tokens: TokenPair,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn bad_request(msg: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: msg.to_string(),
        }),
    )
}

// ─── Handlers ──────────────────────────────────────────────────────

/// POST /api/auth/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), (StatusCode, Json<ErrorResponse>)> {
    if body.username.len() < 3 || body.username.len() > 64 {
        return Err(bad_request("Username must be between 3 and 64 characters"));
    }

    if body.username.contains('@') || body.username.contains('/') || body.username.contains(' ') {
        return Err(bad_request("Username cannot contain @, / or spaces"));
    }

    if body.password.len() < 8 {
        return Err(bad_request("Password must be at least 8 characters"));
    }

    // SECURITY: basic email format validation
    if !body.email.contains('@')
        || body.email.starts_with('@')
        || body.email.ends_with('@')
        || !body
            .email
            .split('@')
            .nth(1)
            .is_some_and(|d| d.contains('.'))
        || body.email.len() > 254
    {
        return Err(bad_request("Invalid email address"));
    }

    let existing = user::Entity::find()
        .filter(
            user::Column::Username
                .eq(&body.username)
                .or(user::Column::Email.eq(&body.email)),
        )
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("DB error: {e}"),
                }),
            )
        })?;

    if existing.is_some() {
        return Err((
            StatusCode::CONFLICT,
            Json(ErrorResponse {
                error: "Username or email already taken".to_string(),
            }),
        ));
    }

    let password_hash = hash_password(&body.password).map_err(|e| {
        tracing::error!(error = %e, "password hashing failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: "Failed to hash password".to_string(),
            }),
        )
    })?;

    let now = chrono::Utc::now().fixed_offset();
    let new_user = user::ActiveModel {
        id: Set(Uuid::new_v4()),
        username: Set(body.username.clone()),
        email: Set(body.email.clone()),
        password_hash: Set(password_hash),
        display_name: Set(body.display_name.clone()),
        avatar_url: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    };

    let created = new_user.insert(&state.db).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("DB error: {e}"),
            }),
        )
    })?;

    let tokens = generate_token_pair(created.id, &created.username, &state.jwt_secret).map_err(
        |e| {
            tracing::error!(error = %e, "token generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to generate tokens".to_string(),
                }),
            )
        },
    )?;

    tracing::info!(user_id = %created.id, username = %created.username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserResponse::from(created),
            tokens,
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, Json<ErrorResponse>)> {
    let found = user::Entity::find()
        .filter(user::Column::Username.eq(&body.username))
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("DB error: {e}"),
                }),
            )
        })?;

    // Same error for unknown user and wrong password
    let invalid = || {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Invalid username or password".to_string(),
            }),
        )
    };

    let found = found.ok_or_else(invalid)?;

    let password_ok = verify_password(&body.password, &found.password_hash).unwrap_or(false);
    if !password_ok {
        return Err(invalid());
    }

    let tokens =
        generate_token_pair(found.id, &found.username, &state.jwt_secret).map_err(|e| {
            tracing::error!(error = %e, "token generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to generate tokens".to_string(),
                }),
            )
        })?;

    Ok(Json(AuthResponse {
        user: UserResponse::from(found),
        tokens,
    }))
}

/// POST /api/auth/refresh
pub async fn refresh(
    State(state): State<Arc<AppState>>,
    Json(body): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, Json<ErrorResponse>)> {
    let claims = validate_token(&body.refresh_token, &state.jwt_secret).map_err(|_| {
        (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Invalid or expired refresh token".to_string(),
            }),
        )
    })?;

    if claims.token_type != TokenType::Refresh {
        return Err((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "Refresh token required".to_string(),
            }),
        ));
    }

    let found = user::Entity::find_by_id(claims.sub)
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("DB error: {e}"),
                }),
            )
        })?
        .ok_or((
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "User no longer exists".to_string(),
            }),
        ))?;

    let tokens =
        generate_token_pair(found.id, &found.username, &state.jwt_secret).map_err(|e| {
            tracing::error!(error = %e, "token generation failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: "Failed to generate tokens".to_string(),
                }),
            )
        })?;

    Ok(Json(AuthResponse {
        user: UserResponse::from(found),
        tokens,
    }))
}

/// GET /api/auth/me
pub async fn me(
    State(state): State<Arc<AppState>>,
    axum::Extension(auth_user): axum::Extension<AuthUser>,
) -> Result<Json<UserResponse>, (StatusCode, Json<ErrorResponse>)> {
    let found = user::Entity::find_by_id(auth_user.0.sub)
        .one(&state.db)
        .await
        .map_err(|e| {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse {
                    error: format!("DB error: {e}"),
                }),
            )
        })?
        .ok_or((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "User not found".to_string(),
            }),
        ))?;

    Ok(Json(UserResponse::from(found)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_request_deserialization() {
        let json = r#"{"username":"ana","email":"ana@example.com","password":"hunter2hunter2"}"#;
        let req: RegisterRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.username, "ana");
        assert!(req.display_name.is_none());
    }

    #[test]
    fn test_user_response_hides_password_hash() {
        let now = chrono::Utc::now().fixed_offset();
        let model = user::Model {
            id: Uuid::new_v4(),
            username: "ana".into(),
            email: "ana@example.com".into(),
            password_hash: "$argon2id$secret".into(),
            display_name: Some("Ana".into()),
            avatar_url: None,
            created_at: now,
            updated_at: now,
        };
        let resp = UserResponse::from(model);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["username"], "ana");
        assert!(json.get("password_hash").is_none());
    }

    #[test]
    fn test_login_request_deserialization() {
        let json = r#"{"username":"ana","password":"pw"}"#;
        let req: LoginRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.username, "ana");
        assert_eq!(req.password, "pw");
    }
}
