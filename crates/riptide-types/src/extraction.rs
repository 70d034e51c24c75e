use serde::Serialize;

/// Replay headers captured alongside the manifest URL.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionHeaders {
    #[serde(rename = "Referer")]
    pub referer: String,
    #[serde(rename = "Origin")]
    pub origin: String,
    #[serde(rename = "User-Agent")]
    pub user_agent: String,
}

/// Successful capture of an HLS manifest request.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub manifest_url: String,
    pub headers: ExtractionHeaders,
    pub cookies: Option<String>,
}

/// Final disposition of one extraction, used for metrics labelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Success,
    Timeout,
    CircuitOpen,
    BrowserError,
}

impl ExtractionOutcome {
    pub fn status_label(self) -> &'static str {
        match self {
            ExtractionOutcome::Success => "success",
            _ => "failure",
        }
    }

    pub fn error_type_label(self) -> &'static str {
        match self {
            ExtractionOutcome::Success => "none",
            ExtractionOutcome::Timeout => "timeout",
            ExtractionOutcome::CircuitOpen => "circuit_open",
            ExtractionOutcome::BrowserError => "browser_error",
        }
    }
}
