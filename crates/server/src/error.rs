//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use shutter_core::auth::AuthError;
use shutter_metadata::MetadataError;
use shutter_ml::MlError;
use shutter_storage::StorageError;

/// API error response body: `{"error": "<message>"}`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("payload too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: u64 },

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] MetadataError),

    #[error("ml error: {0}")]
    Ml(#[from] MlError),
}

impl From<AuthError> for ApiError {
    /// A missing token is unauthorized; a token that is present but
    /// invalid or expired is forbidden.
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MissingToken => ApiError::Unauthorized("authentication required".into()),
            AuthError::InvalidToken(_) | AuthError::Expired => ApiError::Forbidden(e.to_string()),
            AuthError::DecryptionFailed => {
                ApiError::BadRequest("could not decrypt password envelope".into())
            }
            AuthError::Hashing(msg) => ApiError::Internal(msg),
        }
    }
}

impl ApiError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                StorageError::InvalidKey(_) => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                MetadataError::Constraint(_) => StatusCode::CONFLICT,
                MetadataError::InvalidStateTransition { .. } => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Ml(e) => match e {
                MlError::SearchTimeout => StatusCode::GATEWAY_TIMEOUT,
                MlError::SearchService(_) | MlError::Platform(_) => StatusCode::BAD_GATEWAY,
                MlError::PlatformUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                MlError::InvalidState(_) => StatusCode::BAD_REQUEST,
                MlError::Metadata(MetadataError::NotFound(_)) => StatusCode::NOT_FOUND,
                MlError::Storage(StorageError::NotFound(_)) => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_mapping() {
        let missing: ApiError = AuthError::MissingToken.into();
        assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);

        let invalid: ApiError = AuthError::InvalidToken("bad".into()).into();
        assert_eq!(invalid.status_code(), StatusCode::FORBIDDEN);

        let expired: ApiError = AuthError::Expired.into();
        assert_eq!(expired.status_code(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_ml_error_mapping() {
        let timeout: ApiError = MlError::SearchTimeout.into();
        assert_eq!(timeout.status_code(), StatusCode::GATEWAY_TIMEOUT);

        let platform: ApiError = MlError::Platform("boom".into()).into();
        assert_eq!(platform.status_code(), StatusCode::BAD_GATEWAY);

        let invalid: ApiError = MlError::InvalidState("not ready".into()).into();
        assert_eq!(invalid.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_constraint_maps_to_conflict() {
        let e: ApiError = MetadataError::Constraint("dup".into()).into();
        assert_eq!(e.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_body_is_single_error_field() {
        let body = ErrorResponse {
            error: "bad request: nope".to_string(),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"error": "bad request: nope"})
        );
    }
}
