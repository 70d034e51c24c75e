//! Stealth browser-context configuration for anti-detection.
//!
//! Trimmed to exactly what a single-purpose extraction context needs: a
//! believable desktop user-agent and the handful of context flags that keep
//! the target page from noticing it is being automated.

pub mod config;
pub mod user_agent;

pub use config::{ContextOptions, StealthPreset};
pub use user_agent::stealth_user_agent;
