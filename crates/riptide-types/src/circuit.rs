use serde::Serialize;

/// Circuit breaker state. Open iff `reopen_at_ms > now_ms`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed { consecutive_failures: u32 },
    Open { opened_at_ms: u64, reopen_at_ms: u64 },
}

impl Default for CircuitState {
    fn default() -> Self {
        CircuitState::Closed {
            consecutive_failures: 0,
        }
    }
}

/// Snapshot of pool + circuit state, used by `/health` and the watchdog.
#[derive(Debug, Clone, Serialize)]
pub struct CircuitSnapshot {
    pub circuit_open: bool,
    pub consecutive_failures: u32,
    pub reopen_at_ms: u64,
    pub pending: usize,
    pub active: usize,
}
