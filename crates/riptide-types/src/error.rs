use thiserror::Error;

/// Lower-level taxonomy shared by the pool/pipeline (`riptide-headless`) and
/// the HTTP front door (`riptide-api`). `riptide-api` maps each variant to a
/// status code and JSON body; `riptide-headless` only ever constructs them.
#[derive(Debug, Error, Clone)]
pub enum CoreError {
    #[error("browser launch failed: {0}")]
    LaunchFailed(String),

    #[error("circuit open, retry in {retry_after_secs}s")]
    CircuitOpen { retry_after_secs: u64 },

    #[error("browser disconnected during extraction")]
    Disconnected,

    #[error("driver error: {0}")]
    Driver(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
