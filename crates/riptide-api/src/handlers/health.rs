//! `GET /health` — liveness and circuit-breaker visibility for the caller's
//! own monitoring, independent of the Prometheus scrape endpoint.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use sysinfo::ProcessesToUpdate;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    timestamp: String,
    memory: MemoryStatus,
    queue: QueueStatus,
    browser: BrowserStatus,
}

#[derive(Serialize)]
struct MemoryStatus {
    #[serde(rename = "rssBytes")]
    rss_bytes: u64,
}

#[derive(Serialize)]
struct QueueStatus {
    pending: usize,
    active: usize,
}

#[derive(Serialize)]
struct BrowserStatus {
    #[serde(rename = "circuitBreaker")]
    circuit_breaker: CircuitBreakerStatus,
}

#[derive(Serialize)]
struct CircuitBreakerStatus {
    open: bool,
    #[serde(rename = "consecutiveFailures")]
    consecutive_failures: u32,
    #[serde(rename = "reopenAtMs")]
    reopen_at_ms: u64,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let snapshot = state.pool.status().await;

    let status = if snapshot.circuit_open {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };

    let body = HealthResponse {
        status: if snapshot.circuit_open { "degraded" } else { "ok" },
        timestamp: chrono::Utc::now().to_rfc3339(),
        memory: MemoryStatus {
            rss_bytes: process_rss_bytes(),
        },
        queue: QueueStatus {
            pending: snapshot.pending,
            active: snapshot.active,
        },
        browser: BrowserStatus {
            circuit_breaker: CircuitBreakerStatus {
                open: snapshot.circuit_open,
                consecutive_failures: snapshot.consecutive_failures,
                reopen_at_ms: snapshot.reopen_at_ms,
            },
        },
    };

    (status, Json(body))
}

fn process_rss_bytes() -> u64 {
    let mut system = sysinfo::System::new();
    system.refresh_processes(ProcessesToUpdate::All, false);
    let pid = sysinfo::get_current_pid().unwrap_or(sysinfo::Pid::from(0));
    system.process(pid).map(|p| p.memory()).unwrap_or(0)
}
