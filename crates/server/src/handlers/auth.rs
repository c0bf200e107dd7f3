//! Account and session endpoints.

use crate::auth::CurrentUser;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use shutter_metadata::models::UserRow;
use shutter_metadata::MetadataError;
use time::OffsetDateTime;
use uuid::Uuid;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

/// GET /api/health - Health check.
///
/// Intentionally unauthenticated for load balancers and uptime checks.
pub async fn health_check(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    state.metadata.health_check().await?;
    Ok(Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    }))
}

/// Registration or login request. The password travels inside a
/// symmetric transport envelope, never as plaintext.
#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    /// Base64 transport envelope containing the password.
    pub password: String,
}

/// Session response carrying a fresh identity token.
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub user_id: Uuid,
    pub username: String,
}

fn validate_username(username: &str) -> ApiResult<()> {
    if username.len() < 3 || username.len() > 64 {
        return Err(ApiError::BadRequest(
            "username must be 3 to 64 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::BadRequest(
            "username may only contain letters, digits, '-' and '_'".into(),
        ));
    }
    Ok(())
}

/// POST /api/auth/register - Create an account and start a session.
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> ApiResult<(StatusCode, Json<SessionResponse>)> {
    validate_username(&body.username)?;
    let password = state.passwords.decrypt(&body.password)?;
    if password.len() < 8 {
        return Err(ApiError::BadRequest(
            "password must be at least 8 characters".into(),
        ));
    }

    let now = OffsetDateTime::now_utc();
    let user = UserRow {
        user_id: Uuid::new_v4(),
        username: body.username.clone(),
        password_hash: state.passwords.hash_password(&password)?,
        created_at: now,
        updated_at: now,
    };

    state.metadata.create_user(&user).await.map_err(|e| match e {
        MetadataError::Constraint(_) | MetadataError::AlreadyExists(_) => {
            ApiError::Conflict("username already taken".into())
        }
        other => other.into(),
    })?;

    let token = state.tokens.issue(user.user_id, &user.username)?;
    tracing::info!(user_id = %user.user_id, username = %user.username, "user registered");

    Ok((
        StatusCode::CREATED,
        Json(SessionResponse {
            token,
            user_id: user.user_id,
            username: user.username,
        }),
    ))
}

/// POST /api/auth/login - Authenticate and start a session.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<CredentialsRequest>,
) -> ApiResult<Json<SessionResponse>> {
    let password = state.passwords.decrypt(&body.password)?;

    // One error for both unknown user and wrong password, so login
    // does not leak which usernames exist.
    let invalid = || ApiError::Unauthorized("invalid username or password".into());

    let user = state
        .metadata
        .get_user_by_username(&body.username)
        .await?
        .ok_or_else(invalid)?;

    if !state.passwords.verify_password(&password, &user.password_hash)? {
        return Err(invalid());
    }

    let token = state.tokens.issue(user.user_id, &user.username)?;
    Ok(Json(SessionResponse {
        token,
        user_id: user.user_id,
        username: user.username,
    }))
}

/// Identity response.
#[derive(Debug, Serialize)]
pub struct WhoamiResponse {
    pub user_id: Uuid,
    pub username: String,
}

/// GET /api/auth/whoami - The authenticated identity.
pub async fn whoami(user: CurrentUser) -> Json<WhoamiResponse> {
    Json(WhoamiResponse {
        user_id: user.user_id,
        username: user.username,
    })
}
