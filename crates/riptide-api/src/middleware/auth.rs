//! Bearer-token authentication for `/extract`. `/health` and `/metrics` never
//! pass through this middleware — they are mounted outside it.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use tracing::warn;

use crate::errors::ApiError;
use crate::AppState;

pub async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if !state.config.secret_configured() {
        return Err(ApiError::SecretUnconfigured);
    }

    let token = extract_bearer(&request);
    match token {
        Some(token) if token == state.config.extraction_secret => Ok(next.run(request).await),
        _ => {
            warn!(path = %request.uri().path(), "rejected request with missing or invalid bearer token");
            Err(ApiError::Auth)
        }
    }
}

fn extract_bearer(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}
