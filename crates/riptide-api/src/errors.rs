//! HTTP-facing error taxonomy (§7). Each variant knows its status code and
//! renders the `{"error": {...}}` JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use riptide_types::CoreError;
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("missing or invalid bearer token")]
    Auth,

    #[error("secret not configured")]
    SecretUnconfigured,

    #[error("circuit open, retry in {retry_after_secs}s")]
    CircuitOpen { retry_after_secs: u64 },

    #[error("browser error: {0}")]
    BrowserError(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    kind: &'static str,
    message: String,
    retryable: bool,
    status: u16,
}

impl ApiError {
    fn kind(&self) -> &'static str {
        match self {
            ApiError::Validation(_) => "validation_error",
            ApiError::Auth => "auth_error",
            ApiError::SecretUnconfigured => "secret_unconfigured",
            ApiError::CircuitOpen { .. } => "circuit_open",
            ApiError::BrowserError(_) => "browser_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth => StatusCode::UNAUTHORIZED,
            ApiError::SecretUnconfigured => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::CircuitOpen { .. } => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::BrowserError(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, ApiError::CircuitOpen { .. } | ApiError::BrowserError(_))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, "request rejected");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind(),
                message: self.to_string(),
                retryable: self.retryable(),
                status: status.as_u16(),
            },
        };
        (status, Json(body)).into_response()
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::CircuitOpen { retry_after_secs } => ApiError::CircuitOpen { retry_after_secs },
            CoreError::LaunchFailed(msg) => ApiError::BrowserError(msg),
            CoreError::Disconnected => ApiError::BrowserError("browser disconnected".into()),
            CoreError::Driver(msg) => ApiError::BrowserError(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn circuit_open_maps_to_503_and_is_retryable() {
        let err = ApiError::CircuitOpen { retry_after_secs: 12 };
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(err.retryable());
        assert_eq!(err.kind(), "circuit_open");
    }

    #[test]
    fn auth_error_maps_to_401_and_is_not_retryable() {
        let err = ApiError::Auth;
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
        assert!(!err.retryable());
    }

    #[test]
    fn validation_error_maps_to_400() {
        let err = ApiError::Validation("bad url".into());
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
