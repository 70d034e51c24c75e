use serde::{Deserialize, Serialize};

use crate::user_agent::stealth_user_agent;

/// How aggressively to disguise the automated browser. The extraction
/// pipeline always runs contexts at `Medium`; the preset is kept as a type
/// so callers and tests can reason about the knob explicitly rather than
/// hard-coding flags inline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StealthPreset {
    None,
    Low,
    Medium,
    High,
}

impl Default for StealthPreset {
    fn default() -> Self {
        StealthPreset::Medium
    }
}

/// Browser-context options applied when an extraction acquires a fresh
/// context. Matches the fixed set required by the extraction pipeline: a
/// stealth user-agent, CSP bypass, TLS tolerance, a small viewport, touch
/// and motion disabled, and service workers blocked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextOptions {
    pub user_agent: String,
    pub bypass_csp: bool,
    pub ignore_https_errors: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub device_scale_factor: f64,
    pub has_touch: bool,
    pub is_mobile: bool,
    pub reduced_motion: bool,
    pub block_service_workers: bool,
}

impl ContextOptions {
    pub fn for_preset(preset: StealthPreset) -> Self {
        let _ = preset; // single extraction profile regardless of preset today
        Self {
            user_agent: stealth_user_agent().to_string(),
            bypass_csp: true,
            ignore_https_errors: true,
            viewport_width: 800,
            viewport_height: 600,
            device_scale_factor: 1.0,
            has_touch: false,
            is_mobile: false,
            reduced_motion: true,
            block_service_workers: true,
        }
    }
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self::for_preset(StealthPreset::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_context_matches_extraction_requirements() {
        let ctx = ContextOptions::default();
        assert!(ctx.bypass_csp);
        assert!(ctx.ignore_https_errors);
        assert_eq!(ctx.viewport_width, 800);
        assert_eq!(ctx.viewport_height, 600);
        assert!(!ctx.has_touch);
        assert!(!ctx.is_mobile);
        assert!(ctx.reduced_motion);
        assert!(ctx.block_service_workers);
        assert!(ctx.user_agent.contains("Chrome/"));
    }
}
