//! Domain types shared between the browser resource controller (`riptide-headless`)
//! and the HTTP front door (`riptide-api`).

pub mod circuit;
pub mod config;
pub mod error;
pub mod extraction;
pub mod priority;

pub use circuit::{CircuitSnapshot, CircuitState};
pub use config::AppConfig;
pub use error::{CoreError, CoreResult};
pub use extraction::{ExtractionHeaders, ExtractionOutcome, ExtractionResult};
pub use priority::Priority;
