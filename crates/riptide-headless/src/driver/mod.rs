//! Thin capability interface over the browser automation protocol.
//!
//! Grounded on the `BrowserEngine`/`PageHandle` trait split used elsewhere in
//! the workspace's browser-abstraction layer, extended to cover the full
//! capability set the extraction pipeline needs: route interception, cookie
//! snapshots, and per-frame element lookup/click.

pub mod chromiumoxide_driver;
#[cfg(test)]
pub mod fake;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

pub type DriverResult<T> = Result<T, anyhow::Error>;

/// A single cookie as observed on the context.
#[derive(Debug, Clone)]
pub struct CookieEntry {
    pub name: String,
    pub value: String,
}

/// What to do with an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteDecision {
    Continue,
    Abort,
}

/// A coarse resource type classification, mirroring what CDP's
/// `Network.requestPaused` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    Document,
    Stylesheet,
    Image,
    Font,
    Script,
    Xhr,
    Fetch,
    Other,
}

/// A single intercepted request, as seen by the route handler.
#[derive(Debug, Clone)]
pub struct InterceptedRequest {
    pub url: String,
    pub resource_type: ResourceType,
    pub headers: HashMap<String, String>,
}

impl InterceptedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Launch-time browser flags. Fixed per §6; kept as a struct so the
/// chromiumoxide adapter and the fake adapter agree on the shape.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub chrome_path: Option<String>,
}

/// Bounding box of a found element, `None` when the element has zero size
/// (treated the same as "not found" by the coaxing step).
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub width: f64,
    pub height: f64,
}

#[async_trait]
pub trait ElementTrait: Send + Sync {
    async fn bounding_box(&self) -> DriverResult<Option<BoundingBox>>;
    async fn click(&self, timeout_ms: u64) -> DriverResult<()>;
}

#[async_trait]
pub trait FrameTrait: Send + Sync {
    async fn find(&self, selector: &str) -> DriverResult<Option<Box<dyn ElementTrait>>>;
}

#[async_trait]
pub trait PageTrait: Send + Sync {
    async fn goto(&self, url: &str, timeout_ms: u64) -> DriverResult<()>;
    async fn wait_for_timeout(&self, ms: u64);
    async fn main_frame(&self) -> DriverResult<Box<dyn FrameTrait>>;
    async fn frames(&self) -> DriverResult<Vec<Box<dyn FrameTrait>>>;
    async fn close(&self) -> DriverResult<()>;
}

/// Callback invoked by the driver for every intercepted request. Async
/// because the manifest-matching branch must snapshot cookies from the
/// context before deciding to abort, which is itself a driver call.
pub type RouteFuture = Pin<Box<dyn Future<Output = RouteDecision> + Send>>;
pub type RouteHandler = Box<dyn Fn(InterceptedRequest) -> RouteFuture + Send + Sync>;

#[async_trait]
pub trait BrowserContextTrait: Send + Sync {
    async fn new_page(&self) -> DriverResult<Box<dyn PageTrait>>;
    /// Registers a single route interceptor for all requests under this
    /// context. Only one may be active at a time per the pipeline's contract.
    async fn route(&self, handler: RouteHandler) -> DriverResult<()>;
    async fn unroute(&self) -> DriverResult<()>;
    async fn cookies(&self) -> DriverResult<Vec<CookieEntry>>;
    /// Registers a callback invoked whenever the site opens a new page
    /// (e.g. a popup); the pipeline uses this to close it immediately.
    async fn on_page_opened(&self, callback: Box<dyn Fn(Box<dyn PageTrait>) + Send + Sync>);
    async fn close(&self) -> DriverResult<()>;
}

#[async_trait]
pub trait BrowserHandleTrait: Send + Sync {
    async fn new_context(
        &self,
        options: &riptide_stealth::ContextOptions,
    ) -> DriverResult<Box<dyn BrowserContextTrait>>;
    fn is_connected(&self) -> bool;
    async fn close(&self) -> DriverResult<()>;
    /// Registers a callback fired exactly once when the underlying process
    /// disconnects unexpectedly (crash, external kill).
    async fn on_disconnected(&self, callback: Box<dyn Fn() + Send + Sync>);
}

#[async_trait]
pub trait BrowserDriver: Send + Sync {
    async fn launch(&self, options: LaunchOptions) -> DriverResult<Box<dyn BrowserHandleTrait>>;
}
