//! Scripted, in-memory [`super::BrowserDriver`] used by the pool/pipeline
//! test suites to drive the literal end-to-end scenarios deterministically,
//! without a real Chromium binary.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio::sync::Mutex as AsyncMutex;

use super::{
    BrowserContextTrait, BrowserDriver, BrowserHandleTrait, CookieEntry, DriverResult,
    ElementTrait, FrameTrait, InterceptedRequest, LaunchOptions, PageTrait, ResourceType,
    RouteDecision, RouteHandler,
};

/// One request the fake driver will feed to the active route handler when
/// `goto` runs, in the order listed — mirroring requests a real page would
/// fire while loading.
#[derive(Clone)]
pub struct ScriptedRequest {
    pub url: String,
    pub resource_type: ResourceType,
    pub headers: HashMap<String, String>,
}

impl ScriptedRequest {
    pub fn manifest(url: &str, referer: Option<&str>) -> Self {
        let mut headers = HashMap::new();
        if let Some(referer) = referer {
            headers.insert("Referer".to_string(), referer.to_string());
        }
        Self {
            url: url.to_string(),
            resource_type: ResourceType::Xhr,
            headers,
        }
    }
}

#[derive(Default)]
pub struct FakeDriverScript {
    pub requests: Vec<ScriptedRequest>,
    /// If `true`, `launch` fails with `"boom"`.
    pub fail_launch: bool,
    /// Cookies returned by `Context.cookies()`.
    pub cookies: Vec<CookieEntry>,
}

#[derive(Default)]
pub struct FakeDriverCalls {
    pub launch_count: AtomicUsize,
    pub abort_count: AtomicUsize,
    pub continue_count: AtomicUsize,
    pub cookies_called_before_abort: StdMutex<Option<bool>>,
    pub close_reasons: StdMutex<Vec<String>>,
}

pub struct FakeDriver {
    pub script: Arc<StdMutex<FakeDriverScript>>,
    pub calls: Arc<FakeDriverCalls>,
}

impl FakeDriver {
    pub fn new(script: FakeDriverScript) -> Self {
        Self {
            script: Arc::new(StdMutex::new(script)),
            calls: Arc::new(FakeDriverCalls::default()),
        }
    }
}

#[async_trait]
impl BrowserDriver for FakeDriver {
    async fn launch(&self, _options: LaunchOptions) -> DriverResult<Box<dyn BrowserHandleTrait>> {
        self.calls.launch_count.fetch_add(1, Ordering::SeqCst);
        if self.script.lock().unwrap().fail_launch {
            return Err(anyhow::anyhow!("boom"));
        }
        Ok(Box::new(FakeHandle {
            script: self.script.clone(),
            calls: self.calls.clone(),
            connected: Arc::new(std::sync::atomic::AtomicBool::new(true)),
        }))
    }
}

struct FakeHandle {
    script: Arc<StdMutex<FakeDriverScript>>,
    calls: Arc<FakeDriverCalls>,
    connected: Arc<std::sync::atomic::AtomicBool>,
}

#[async_trait]
impl BrowserHandleTrait for FakeHandle {
    async fn new_context(
        &self,
        _options: &riptide_stealth::ContextOptions,
    ) -> DriverResult<Box<dyn BrowserContextTrait>> {
        Ok(Box::new(FakeContext {
            script: self.script.clone(),
            calls: self.calls.clone(),
            route: Arc::new(AsyncMutex::new(None)),
        }))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn close(&self) -> DriverResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        self.calls
            .close_reasons
            .lock()
            .unwrap()
            .push("close".to_string());
        Ok(())
    }

    async fn on_disconnected(&self, _callback: Box<dyn Fn() + Send + Sync>) {
        // The fake driver never disconnects spontaneously; tests that need
        // a disconnect drive it by calling `close()` directly.
    }
}

struct FakeContext {
    script: Arc<StdMutex<FakeDriverScript>>,
    calls: Arc<FakeDriverCalls>,
    route: Arc<AsyncMutex<Option<RouteHandler>>>,
}

#[async_trait]
impl BrowserContextTrait for FakeContext {
    async fn new_page(&self) -> DriverResult<Box<dyn PageTrait>> {
        Ok(Box::new(FakePage {
            script: self.script.clone(),
            calls: self.calls.clone(),
            route: self.route.clone(),
        }))
    }

    async fn route(&self, handler: RouteHandler) -> DriverResult<()> {
        *self.route.lock().await = Some(handler);
        Ok(())
    }

    async fn unroute(&self) -> DriverResult<()> {
        *self.route.lock().await = None;
        Ok(())
    }

    async fn cookies(&self) -> DriverResult<Vec<CookieEntry>> {
        let mut flag = self.calls.cookies_called_before_abort.lock().unwrap();
        if flag.is_none() {
            *flag = Some(self.calls.abort_count.load(Ordering::SeqCst) == 0);
        }
        Ok(self.script.lock().unwrap().cookies.clone())
    }

    async fn on_page_opened(&self, _callback: Box<dyn Fn(Box<dyn PageTrait>) + Send + Sync>) {
        // No scripted popups today.
    }

    async fn close(&self) -> DriverResult<()> {
        Ok(())
    }
}

/// `goto` on the fake page plays back every scripted request through the
/// currently installed route handler, in order — standing in for the
/// network activity a real page load would trigger.
struct FakePage {
    script: Arc<StdMutex<FakeDriverScript>>,
    calls: Arc<FakeDriverCalls>,
    route: Arc<AsyncMutex<Option<RouteHandler>>>,
}

#[async_trait]
impl PageTrait for FakePage {
    async fn goto(&self, _url: &str, _timeout_ms: u64) -> DriverResult<()> {
        let requests = self.script.lock().unwrap().requests.clone();
        for req in requests {
            let handler_guard = self.route.lock().await;
            let Some(handler) = handler_guard.as_ref() else {
                continue;
            };
            let intercepted = InterceptedRequest {
                url: req.url,
                resource_type: req.resource_type,
                headers: req.headers,
            };
            let future = handler(intercepted);
            drop(handler_guard);
            match future.await {
                RouteDecision::Abort => {
                    self.calls.abort_count.fetch_add(1, Ordering::SeqCst);
                }
                RouteDecision::Continue => {
                    self.calls.continue_count.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        Ok(())
    }

    async fn wait_for_timeout(&self, ms: u64) {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }

    async fn main_frame(&self) -> DriverResult<Box<dyn FrameTrait>> {
        Ok(Box::new(FakeFrame))
    }

    async fn frames(&self) -> DriverResult<Vec<Box<dyn FrameTrait>>> {
        Ok(vec![])
    }

    async fn close(&self) -> DriverResult<()> {
        Ok(())
    }
}

struct FakeFrame;

#[async_trait]
impl FrameTrait for FakeFrame {
    async fn find(&self, _selector: &str) -> DriverResult<Option<Box<dyn ElementTrait>>> {
        Ok(None)
    }
}
