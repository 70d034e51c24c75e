//! Lazy-singleton browser pool (§4.1).
//!
//! The browser is launched on first demand, shared read-only across
//! extractions once established, and restarted on idle timeout, max age, or
//! unexpected disconnect. A single dispatcher task turns the priority queue
//! into admission events under a `tokio::sync::Semaphore` bound.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::Shared;
use futures::FutureExt;
use once_cell::sync::OnceCell;
use riptide_types::{CircuitSnapshot, CoreError, CoreResult, Priority};
use std::sync::Weak;
use tokio::sync::{oneshot, Mutex, Notify, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::circuit_breaker::CircuitBreaker;
use crate::driver::{BrowserDriver, BrowserHandleTrait, LaunchOptions};
use crate::metrics::PoolMetrics;

pub type HandleArc = Arc<dyn BrowserHandleTrait>;
type LaunchResult = Result<HandleArc, Arc<anyhow::Error>>;
type SharedLaunch = Shared<Pin<Box<dyn Future<Output = LaunchResult> + Send>>>;

pub struct BrowserPoolConfig {
    pub max_concurrent: usize,
    pub idle_timeout: Duration,
    pub max_age: Duration,
    pub chrome_path: Option<String>,
}

struct QueueEntry {
    priority: Priority,
    sequence: u64,
    admit_tx: oneshot::Sender<OwnedSemaphorePermit>,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // Max-heap: higher priority first; within equal priority, the
        // smaller (earlier) sequence number sorts as "greater" so it pops
        // first (FIFO tie-break).
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.sequence.cmp(&self.sequence))
    }
}

struct LaunchState {
    handle: Option<HandleArc>,
    launched_at: Option<Instant>,
    launching: Option<SharedLaunch>,
}

struct DispatchState {
    heap: BinaryHeap<QueueEntry>,
}

pub struct BrowserPool {
    driver: Arc<dyn BrowserDriver>,
    config: BrowserPoolConfig,
    launch: Mutex<LaunchState>,
    dispatch: Mutex<DispatchState>,
    dispatch_notify: Arc<Notify>,
    idle_notify: Arc<Notify>,
    semaphore: Arc<Semaphore>,
    sequence: AtomicU64,
    active_count: AtomicU64,
    idle_timer: Mutex<Option<JoinHandle<()>>>,
    pub circuit: Arc<CircuitBreaker>,
    pub metrics: Arc<PoolMetrics>,
    shutting_down: std::sync::atomic::AtomicBool,
    self_ref: OnceCell<Weak<BrowserPool>>,
}

impl BrowserPool {
    pub fn new(
        driver: Arc<dyn BrowserDriver>,
        config: BrowserPoolConfig,
        circuit: Arc<CircuitBreaker>,
        metrics: Arc<PoolMetrics>,
    ) -> Arc<Self> {
        let pool = Arc::new(Self {
            driver,
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            config,
            launch: Mutex::new(LaunchState {
                handle: None,
                launched_at: None,
                launching: None,
            }),
            dispatch: Mutex::new(DispatchState {
                heap: BinaryHeap::new(),
            }),
            dispatch_notify: Arc::new(Notify::new()),
            idle_notify: Arc::new(Notify::new()),
            sequence: AtomicU64::new(0),
            active_count: AtomicU64::new(0),
            idle_timer: Mutex::new(None),
            circuit,
            metrics,
            shutting_down: std::sync::atomic::AtomicBool::new(false),
            self_ref: OnceCell::new(),
        });
        let _ = pool.self_ref.set(Arc::downgrade(&pool));
        pool.clone().spawn_dispatcher();
        pool
    }

    fn spawn_dispatcher(self: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                let Ok(permit) = self.semaphore.clone().acquire_owned().await else {
                    return; // semaphore closed on shutdown
                };
                loop {
                    let mut dispatch = self.dispatch.lock().await;
                    if let Some(entry) = dispatch.heap.pop() {
                        drop(dispatch);
                        self.metrics.queue_depth.dec();
                        self.metrics.active_extractions.inc();
                        self.active_count.fetch_add(1, Ordering::SeqCst);
                        self.cancel_idle_timer().await;
                        if entry.admit_tx.send(permit).is_err() {
                            // Caller vanished (shouldn't happen; submit never
                            // drops the receiver early). Undo bookkeeping.
                            self.metrics.active_extractions.dec();
                            self.active_count.fetch_sub(1, Ordering::SeqCst);
                        }
                        break;
                    }
                    drop(dispatch);
                    self.dispatch_notify.notified().await;
                }
            }
        });
    }

    /// Schedules a task, blocking until it is admitted under the
    /// concurrency bound and run to completion. `task` receives the live
    /// browser handle once admission succeeds.
    pub async fn submit<F, Fut, T>(&self, priority: Priority, task: F) -> CoreResult<T>
    where
        F: FnOnce(HandleArc) -> Fut + Send,
        Fut: Future<Output = CoreResult<T>> + Send,
    {
        let (admit_tx, admit_rx) = oneshot::channel();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        {
            let mut dispatch = self.dispatch.lock().await;
            dispatch.heap.push(QueueEntry {
                priority,
                sequence,
                admit_tx,
            });
        }
        self.metrics.queue_depth.inc();
        self.dispatch_notify.notify_one();

        let permit = admit_rx
            .await
            .map_err(|_| CoreError::Driver("pool shut down before admission".into()))?;

        let result = self.run_admitted(task).await;

        drop(permit);
        let remaining = self.active_count.fetch_sub(1, Ordering::SeqCst) - 1;
        self.metrics.active_extractions.dec();
        if remaining == 0 {
            self.schedule_idle_timer_if_running().await;
            self.idle_notify.notify_waiters();
        }

        result
    }

    async fn run_admitted<F, Fut, T>(&self, task: F) -> CoreResult<T>
    where
        F: FnOnce(HandleArc) -> Fut + Send,
        Fut: Future<Output = CoreResult<T>> + Send,
    {
        let handle = self.acquire_handle().await?;
        task(handle).await
    }

    /// Implements the acquisition/relaunch discipline of §4.1 step 2-5.
    async fn acquire_handle(&self) -> CoreResult<HandleArc> {
        loop {
            let mut state = self.launch.lock().await;

            if let Some(handle) = state.handle.clone() {
                if handle.is_connected() {
                    let age = state.launched_at.map(|t| t.elapsed()).unwrap_or_default();
                    let active = self.active_count.load(Ordering::SeqCst);
                    if age <= self.config.max_age || active > 0 {
                        return Ok(handle);
                    }
                    // Max-age restart: evaluated only with zero active
                    // extractions, on fresh acquisition.
                    state.handle = None;
                    state.launched_at = None;
                    drop(state);
                    self.restart_in_background(handle, "max_age");
                    continue;
                } else {
                    state.handle = None;
                    state.launched_at = None;
                }
            }

            if let Some(shared) = state.launching.clone() {
                drop(state);
                return self.await_launch(shared, false).await;
            }

            if let Err(remaining_secs) = self.circuit.guard() {
                return Err(CoreError::CircuitOpen {
                    retry_after_secs: remaining_secs,
                });
            }

            let driver = self.driver.clone();
            let chrome_path = self.config.chrome_path.clone();
            let fut: Pin<Box<dyn Future<Output = LaunchResult> + Send>> = Box::pin(async move {
                driver
                    .launch(LaunchOptions { chrome_path })
                    .await
                    .map(Arc::<dyn BrowserHandleTrait>::from)
                    .map_err(Arc::new)
            });
            let shared: SharedLaunch = fut.shared();
            state.launching = Some(shared.clone());
            drop(state);

            return self.await_launch(shared, true).await;
        }
    }

    /// Awaits a (possibly shared) launch future. Only the `leader` — the
    /// caller that created the future — performs the one-time bookkeeping
    /// (state update, circuit transition, metrics, disconnect hook);
    /// followers simply observe the same outcome.
    async fn await_launch(&self, shared: SharedLaunch, leader: bool) -> CoreResult<HandleArc> {
        match shared.await {
            Ok(handle) => {
                if leader {
                    let mut state = self.launch.lock().await;
                    state.handle = Some(handle.clone());
                    state.launched_at = Some(Instant::now());
                    state.launching = None;
                    drop(state);
                    self.circuit.record_success();
                    self.metrics.launches_total.inc();
                    self.metrics.circuit_open.set(0);
                    let disconnects = self.metrics.disconnects_total.clone();
                    handle
                        .on_disconnected(Box::new(move || {
                            disconnects.inc();
                        }))
                        .await;
                }
                Ok(handle)
            }
            Err(err) => {
                if leader {
                    let mut state = self.launch.lock().await;
                    state.launching = None;
                    drop(state);
                    let tripped = self.circuit.record_failure();
                    self.metrics.launch_failures_total.inc();
                    if tripped {
                        self.metrics.circuit_open.set(1);
                        self.metrics.circuit_trips_total.inc();
                        warn!("circuit breaker tripped after repeated launch failures");
                    }
                }
                Err(CoreError::LaunchFailed(err.to_string()))
            }
        }
    }

    fn restart_in_background(&self, handle: HandleArc, reason: &'static str) {
        self.metrics
            .restarts_total
            .with_label_values(&[reason])
            .inc();
        info!(reason, "restarting browser");
        tokio::spawn(async move {
            let _ = handle.close().await;
        });
    }

    async fn cancel_idle_timer(&self) {
        if let Some(handle) = self.idle_timer.lock().await.take() {
            handle.abort();
        }
    }

    /// Arms a one-shot idle timer keyed to the active-count 0 transition.
    /// Cancelled by the next submission (via `cancel_idle_timer` in the
    /// dispatcher) or by shutdown.
    async fn schedule_idle_timer_if_running(&self) {
        if self.shutting_down.load(Ordering::SeqCst) {
            return;
        }
        let Some(pool) = self.self_ref.get().and_then(Weak::upgrade) else {
            return;
        };
        let idle_timeout = self.config.idle_timeout;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(idle_timeout).await;
            if pool.shutting_down.load(Ordering::SeqCst) {
                return;
            }
            if pool.active_count.load(Ordering::SeqCst) != 0 {
                return;
            }
            let mut state = pool.launch.lock().await;
            if let Some(handle) = state.handle.take() {
                state.launched_at = None;
                drop(state);
                pool.restart_in_background(handle, "idle");
            }
        });
        *self.idle_timer.lock().await = Some(handle);
    }
}

impl BrowserPool {
    pub async fn status(&self) -> CircuitSnapshot {
        let circuit_state = self.circuit.state();
        let (circuit_open, consecutive_failures, reopen_at_ms) = match circuit_state {
            riptide_types::CircuitState::Open { reopen_at_ms, .. } => (true, 0, reopen_at_ms),
            riptide_types::CircuitState::Closed {
                consecutive_failures,
            } => (false, consecutive_failures, 0),
        };
        let pending = self.dispatch.lock().await.heap.len();
        let active = self.active_count.load(Ordering::SeqCst) as usize;
        CircuitSnapshot {
            circuit_open,
            consecutive_failures,
            reopen_at_ms,
            pending,
            active,
        }
    }

    /// Stops admitting idle-restart timers, races the in-flight drain
    /// against `drain_timeout`, then closes the browser unconditionally.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        self.shutting_down.store(true, Ordering::SeqCst);
        self.cancel_idle_timer().await;

        let _ = tokio::time::timeout(drain_timeout, self.wait_until_idle()).await;

        let mut state = self.launch.lock().await;
        if let Some(handle) = state.handle.take() {
            let _ = handle.close().await;
        }
        state.launched_at = None;
    }

    async fn wait_until_idle(&self) {
        loop {
            let notified = self.idle_notify.notified();
            if self.active_count.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::fake::{FakeDriver, FakeDriverScript};
    use crate::metrics::PoolMetrics;

    fn config(max_concurrent: usize) -> BrowserPoolConfig {
        BrowserPoolConfig {
            max_concurrent,
            idle_timeout: Duration::from_secs(60),
            max_age: Duration::from_secs(7200),
            chrome_path: None,
        }
    }

    fn pool_with(driver: FakeDriver, max_concurrent: usize) -> Arc<BrowserPool> {
        BrowserPool::new(
            Arc::new(driver),
            config(max_concurrent),
            Arc::new(CircuitBreaker::new()),
            Arc::new(PoolMetrics::new()),
        )
    }

    #[tokio::test]
    async fn priority_admission_with_bound_one_orders_high_before_normal() {
        let pool = pool_with(FakeDriver::new(FakeDriverScript::default()), 1);

        let (release_a_tx, release_a_rx) = oneshot::channel::<()>();
        let pool_a = pool.clone();
        let task_a = tokio::spawn(async move {
            pool_a
                .submit(Priority::Normal, move |_handle| async move {
                    let _ = release_a_rx.await;
                    Ok::<_, CoreError>(())
                })
                .await
        });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let order_b = order.clone();
        let pool_b = pool.clone();
        let task_b = tokio::spawn(async move {
            pool_b
                .submit(Priority::Normal, move |_handle| async move {
                    order_b.lock().await.push("B");
                    Ok::<_, CoreError>(())
                })
                .await
        });
        tokio::task::yield_now().await;

        let order_c = order.clone();
        let pool_c = pool.clone();
        let task_c = tokio::spawn(async move {
            pool_c
                .submit(Priority::High, move |_handle| async move {
                    order_c.lock().await.push("C");
                    Ok::<_, CoreError>(())
                })
                .await
        });
        tokio::task::yield_now().await;

        let _ = release_a_tx.send(());
        task_a.await.unwrap().unwrap();
        task_b.await.unwrap().unwrap();
        task_c.await.unwrap().unwrap();

        assert_eq!(*order.lock().await, vec!["C", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn circuit_trips_then_cools_down() {
        let mut initial = FakeDriverScript::default();
        initial.fail_launch = true;
        let driver = FakeDriver::new(initial);
        let script = driver.script.clone();
        let calls = driver.calls.clone();
        let pool = pool_with(driver, 1);

        for _ in 0..3 {
            let err = pool
                .submit(Priority::Normal, |_h| async move { Ok::<_, CoreError>(()) })
                .await
                .unwrap_err();
            assert!(matches!(err, CoreError::LaunchFailed(_)));
        }
        assert_eq!(calls.launch_count.load(Ordering::SeqCst), 3);

        let err = pool
            .submit(Priority::Normal, |_h| async move { Ok::<_, CoreError>(()) })
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::CircuitOpen { .. }));
        assert_eq!(calls.launch_count.load(Ordering::SeqCst), 3);

        tokio::time::advance(Duration::from_secs(30)).await;
        script.lock().unwrap().fail_launch = false;

        let result = pool
            .submit(Priority::Normal, |_h| async move { Ok::<_, CoreError>(()) })
            .await;
        assert!(result.is_ok());
        assert_eq!(calls.launch_count.load(Ordering::SeqCst), 4);
        assert_eq!(pool.circuit.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_timer_restarts_browser_after_timeout() {
        let driver = FakeDriver::new(FakeDriverScript::default());
        let calls = driver.calls.clone();
        let pool = pool_with(driver, 1);

        pool.submit(Priority::Normal, |_h| async move { Ok::<_, CoreError>(()) })
            .await
            .unwrap();
        assert_eq!(calls.launch_count.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        tokio::task::yield_now().await;

        assert_eq!(calls.close_reasons.lock().unwrap().len(), 1);

        pool.submit(Priority::Normal, |_h| async move { Ok::<_, CoreError>(()) })
            .await
            .unwrap();
        assert_eq!(calls.launch_count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_waits_for_active_extraction_then_closes() {
        let driver = FakeDriver::new(FakeDriverScript::default());
        let calls = driver.calls.clone();
        let pool = pool_with(driver, 1);

        let (release_tx, release_rx) = oneshot::channel::<()>();
        let pool_task = pool.clone();
        let task = tokio::spawn(async move {
            pool_task
                .submit(Priority::Normal, move |_handle| async move {
                    let _ = release_rx.await;
                    Ok::<_, CoreError>(())
                })
                .await
        });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;
        assert_eq!(calls.launch_count.load(Ordering::SeqCst), 1);

        let pool_shutdown = pool.clone();
        let shutdown = tokio::spawn(async move {
            pool_shutdown.shutdown(Duration::from_secs(5)).await;
        });
        tokio::task::yield_now().await;
        assert!(calls.close_reasons.lock().unwrap().is_empty());

        let _ = release_tx.send(());
        task.await.unwrap().unwrap();
        shutdown.await.unwrap();

        assert_eq!(calls.close_reasons.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_closes_browser_even_if_drain_times_out() {
        let driver = FakeDriver::new(FakeDriverScript::default());
        let calls = driver.calls.clone();
        let pool = pool_with(driver, 1);

        let (_release_tx, release_rx) = oneshot::channel::<()>();
        let pool_task = pool.clone();
        let task = tokio::spawn(async move {
            pool_task
                .submit(Priority::Normal, move |_handle| async move {
                    let _ = release_rx.await;
                    Ok::<_, CoreError>(())
                })
                .await
        });
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        pool.shutdown(Duration::from_millis(100)).await;
        assert_eq!(calls.close_reasons.lock().unwrap().len(), 1);

        task.abort();
    }
}
