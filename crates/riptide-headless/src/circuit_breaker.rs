//! Launch circuit breaker (§4.3).
//!
//! State transitions follow the phase-based locking discipline used by the
//! workspace's reliability module: mutate state under a narrowly scoped
//! lock, decide what to log/emit, then log/emit after the lock is released.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use riptide_types::CircuitState;

pub const CIRCUIT_THRESHOLD: u32 = 3;
pub const CIRCUIT_RESET: Duration = Duration::from_secs(30);

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

struct Inner {
    consecutive_failures: u32,
    reopen_at_ms: u64,
}

/// Thread-safe circuit breaker guarding browser relaunch.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    trips_total: AtomicU64,
    launch_failures_total: AtomicU64,
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new()
    }
}

impl CircuitBreaker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                consecutive_failures: 0,
                reopen_at_ms: 0,
            }),
            trips_total: AtomicU64::new(0),
            launch_failures_total: AtomicU64::new(0),
        }
    }

    /// `Err(remaining_secs)` if the circuit is open, else `Ok(())`.
    pub fn guard(&self) -> Result<(), u64> {
        let inner = self.inner.lock().unwrap();
        let now = now_ms();
        if inner.reopen_at_ms > now {
            let remaining_ms = inner.reopen_at_ms - now;
            Err(remaining_ms.div_ceil(1000))
        } else {
            Ok(())
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures = 0;
        inner.reopen_at_ms = 0;
    }

    /// Records a launch failure and returns `true` if this failure tripped
    /// the circuit open.
    pub fn record_failure(&self) -> bool {
        self.launch_failures_total.fetch_add(1, Ordering::Relaxed);
        let mut inner = self.inner.lock().unwrap();
        inner.consecutive_failures += 1;
        let tripped = inner.consecutive_failures >= CIRCUIT_THRESHOLD;
        if tripped {
            inner.reopen_at_ms = now_ms() + CIRCUIT_RESET.as_millis() as u64;
        }
        drop(inner);
        if tripped {
            self.trips_total.fetch_add(1, Ordering::Relaxed);
        }
        tripped
    }

    pub fn state(&self) -> CircuitState {
        let inner = self.inner.lock().unwrap();
        if inner.reopen_at_ms > now_ms() {
            CircuitState::Open {
                opened_at_ms: inner.reopen_at_ms - CIRCUIT_RESET.as_millis() as u64,
                reopen_at_ms: inner.reopen_at_ms,
            }
        } else {
            CircuitState::Closed {
                consecutive_failures: inner.consecutive_failures,
            }
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state(), CircuitState::Open { .. })
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.inner.lock().unwrap().consecutive_failures
    }

    pub fn reopen_at_ms(&self) -> u64 {
        self.inner.lock().unwrap().reopen_at_ms
    }

    pub fn trips_total(&self) -> u64 {
        self.trips_total.load(Ordering::Relaxed)
    }

    pub fn launch_failures_total(&self) -> u64 {
        self.launch_failures_total.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trips_after_threshold_failures() {
        let breaker = CircuitBreaker::new();
        assert!(!breaker.record_failure());
        assert!(!breaker.record_failure());
        assert!(breaker.record_failure());
        assert!(breaker.is_open());
        assert!(breaker.guard().is_err());
    }

    #[test]
    fn resets_on_success() {
        let breaker = CircuitBreaker::new();
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);
        assert!(!breaker.is_open());
    }

    #[test]
    fn success_after_threshold_minus_one_failures_does_not_trip() {
        let breaker = CircuitBreaker::new();
        for _ in 0..(CIRCUIT_THRESHOLD - 1) {
            assert!(!breaker.record_failure());
        }
        breaker.record_success();
        assert_eq!(breaker.consecutive_failures(), 0);
        assert!(!breaker.is_open());
    }
}
