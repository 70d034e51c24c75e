//! Browser resource controller: the lazy Chromium pool, the per-request
//! extraction pipeline, the circuit breaker guarding relaunch, and the
//! watchdog that force-exits a stuck process.

pub mod block_patterns;
pub mod circuit_breaker;
pub mod driver;
pub mod launch_flags;
pub mod metrics;
pub mod pipeline;
pub mod pool;
pub mod watchdog;

pub use circuit_breaker::CircuitBreaker;
pub use driver::chromiumoxide_driver::ChromiumoxideDriver;
pub use driver::BrowserDriver;
pub use metrics::PoolMetrics;
pub use pipeline::{ExtractionPipeline, PipelineOutcome};
pub use pool::{BrowserPool, BrowserPoolConfig};
pub use watchdog::Watchdog;
