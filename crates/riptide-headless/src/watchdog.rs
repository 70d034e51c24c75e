//! Liveness watchdog (§4.4). The only component permitted to terminate the
//! process unilaterally.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::pool::BrowserPool;

const POLL_INTERVAL: Duration = Duration::from_secs(10);

pub struct Watchdog {
    pool: Arc<BrowserPool>,
    exit_threshold: Duration,
    disabled: Arc<AtomicBool>,
    open_since: Mutex<Option<Instant>>,
}

impl Watchdog {
    pub fn new(pool: Arc<BrowserPool>, exit_threshold: Duration) -> Arc<Self> {
        Arc::new(Self {
            pool,
            exit_threshold,
            disabled: Arc::new(AtomicBool::new(false)),
            open_since: Mutex::new(None),
        })
    }

    pub fn spawn(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let watchdog = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                if watchdog.disabled.load(Ordering::SeqCst) {
                    continue;
                }
                watchdog.tick().await;
            }
        })
    }

    async fn tick(&self) {
        let status = self.pool.status().await;
        let mut open_since = self.open_since.lock().await;

        if status.circuit_open {
            let since = *open_since.get_or_insert_with(Instant::now);
            let elapsed = since.elapsed();
            if elapsed >= self.exit_threshold {
                error!(
                    elapsed_secs = elapsed.as_secs(),
                    "circuit breaker stuck open past exit threshold, terminating process"
                );
                std::process::exit(1);
            } else {
                info!(elapsed_secs = elapsed.as_secs(), "circuit breaker open");
            }
        } else if open_since.take().is_some() {
            info!("circuit breaker recovered");
        }
    }

    /// Disables future exit checks. Called once shutdown begins so a normal
    /// termination never races the watchdog's `process::exit`.
    pub fn disable(&self) {
        self.disabled.store(true, Ordering::SeqCst);
    }
}
