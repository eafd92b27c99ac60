use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::{debug, error};

use companion_types::api::ErrorBody;
use companion_types::models::DenialStatus;

/// Every failure a handler can report. Bodies are always `{ "error": ... }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Conflict(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn missing_fields() -> Self {
        Self::Validation("Missing required fields".into())
    }

    pub fn validation(msg: &str) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: &str) -> Self {
        Self::NotFound(msg.into())
    }

    /// Caller asked for something they do not own.
    pub fn denied(status: DenialStatus, msg: &str) -> Self {
        match status {
            DenialStatus::NotFound => Self::NotFound(msg.into()),
            DenialStatus::Forbidden => Self::Forbidden(msg.into()),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("rejected request body: {}", rejection.body_text());
        Self::Validation("Invalid request body".into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match self {
            Self::Internal(e) => {
                error!("internal error: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_variants() {
        assert_eq!(ApiError::missing_fields().into_response().status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::denied(DenialStatus::NotFound, "gone").into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::denied(DenialStatus::Forbidden, "no").into_response().status(),
            StatusCode::FORBIDDEN
        );
        let internal = ApiError::from(anyhow::anyhow!("disk on fire"));
        assert_eq!(internal.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
