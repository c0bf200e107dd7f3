//! Authentication middleware and the current-user extractor.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;
use shutter_core::auth::AuthError;
use tracing::Instrument;
use uuid::Uuid;

/// The authenticated user, attached by the middleware.
#[derive(Clone, Debug)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub username: String,
}

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> ApiResult<Self> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AuthError::MissingToken.into())
    }
}

/// Extract a bearer token from the Authorization header.
/// Per RFC 6750, the "Bearer" scheme is case-insensitive.
fn extract_bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| {
            if v.len() >= 7 && v[..7].eq_ignore_ascii_case("bearer ") {
                Some(&v[7..])
            } else {
                None
            }
        })
}

/// Validate a bearer token when one is present and attach the user.
///
/// A missing header passes through; protected handlers reject via the
/// `CurrentUser` extractor (401). A present but invalid or expired
/// token fails here (403).
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let mut username = None;

    if let Some(token) = extract_bearer_token(&req) {
        let claims = state.tokens.verify(token)?;
        username = Some(claims.username.clone());
        req.extensions_mut().insert(CurrentUser {
            user_id: claims.sub,
            username: claims.username,
        });
    }

    let span = match &username {
        Some(username) => tracing::info_span!("request", user = %username),
        None => tracing::info_span!("request", user = tracing::field::Empty),
    };
    Ok(next.run(req).instrument(span).await)
}
