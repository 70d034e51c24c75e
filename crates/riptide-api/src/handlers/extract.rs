//! `POST /extract` — the front door's sole extraction endpoint.

use std::str::FromStr;

use axum::extract::State;
use axum::Json;
use riptide_headless::PipelineOutcome;
use riptide_types::{ExtractionHeaders, Priority};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::ApiError;
use crate::validation::validate_embed_url;
use crate::AppState;

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    pub embed_url: String,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub priority: Option<String>,
}

fn default_timeout() -> u64 {
    DEFAULT_TIMEOUT_MS
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[serde(rename = "m3u8Url")]
    pub m3u8_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub headers: Option<ExtractionHeaders>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cookies: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub async fn extract(
    State(state): State<AppState>,
    Json(request): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>, ApiError> {
    let parsed = validate_embed_url(&request.embed_url)?;

    let priority = match request.priority.as_deref() {
        None => Priority::default(),
        Some(raw) => Priority::from_str(raw).map_err(ApiError::Validation)?,
    };

    info!(url = %parsed, timeout = request.timeout, ?priority, "extraction requested");

    let outcome = state
        .pipeline
        .extract(parsed.as_str(), request.timeout, priority)
        .await?;

    let response = match outcome {
        PipelineOutcome::Success(result) => ExtractResponse {
            success: true,
            url: Some(request.embed_url),
            m3u8_url: Some(result.manifest_url),
            headers: Some(result.headers),
            cookies: result.cookies,
            error: None,
        },
        PipelineOutcome::Timeout => ExtractResponse {
            success: false,
            url: None,
            m3u8_url: None,
            headers: None,
            cookies: None,
            error: Some("m3u8 extraction failed".to_string()),
        },
    };

    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_matches_spec() {
        assert_eq!(default_timeout(), 30_000);
    }

    #[test]
    fn request_deserializes_camel_case() {
        let req: ExtractRequest =
            serde_json::from_str(r#"{"embedUrl":"https://example.com/e","priority":"high"}"#).unwrap();
        assert_eq!(req.embed_url, "https://example.com/e");
        assert_eq!(req.timeout, DEFAULT_TIMEOUT_MS);
        assert_eq!(req.priority.as_deref(), Some("high"));
    }

    #[test]
    fn success_response_omits_error_field() {
        let response = ExtractResponse {
            success: true,
            url: Some("https://example.com".to_string()),
            m3u8_url: Some("https://cdn.example.com/x.m3u8".to_string()),
            headers: None,
            cookies: None,
            error: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("\"error\""));
        assert!(json.contains("\"m3u8Url\""));
    }
}
