//! `chromiumoxide`-backed implementation of the [`super::BrowserDriver`]
//! capability set.
//!
//! Route interception is realised through the CDP `Fetch` domain, which is
//! not exercised anywhere else in the workspace today — `Network.setBlockedURLs`
//! and friends only block, they cannot snapshot headers before deciding, so
//! `Fetch.enable` + `Fetch.requestPaused` is the only protocol surface that
//! matches the pipeline's "inspect headers, then abort or continue" contract.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::{
    MediaFeature, SetDeviceMetricsOverrideParams, SetEmulatedMediaParams,
};
use chromiumoxide::cdp::browser_protocol::fetch::{
    ContinueRequestParams, EnableParams as FetchEnableParams, EventRequestPaused,
    FailRequestParams,
};
use chromiumoxide::cdp::browser_protocol::network::{ErrorReason, SetBypassServiceWorkerParams};
use chromiumoxide::cdp::browser_protocol::page::SetBypassCspParams;
use chromiumoxide::cdp::browser_protocol::security::SetIgnoreCertificateErrorsParams;
use chromiumoxide::{Browser, BrowserConfig, Page};
use futures::StreamExt;
use tokio::sync::Mutex;

use super::{
    BoundingBox, BrowserContextTrait, BrowserDriver, BrowserHandleTrait, CookieEntry,
    DriverResult, ElementTrait, FrameTrait, InterceptedRequest, LaunchOptions, PageTrait,
    ResourceType, RouteDecision, RouteHandler,
};
use crate::launch_flags::LAUNCH_ARGS;

pub struct ChromiumoxideDriver;

#[async_trait]
impl BrowserDriver for ChromiumoxideDriver {
    async fn launch(&self, options: LaunchOptions) -> DriverResult<Box<dyn BrowserHandleTrait>> {
        let mut builder = BrowserConfig::builder().args(LAUNCH_ARGS.iter().copied());
        if let Some(path) = options.chrome_path {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("invalid browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config).await?;
        tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Box::new(ChromiumoxideHandle {
            browser: Arc::new(Mutex::new(browser)),
            connected: Arc::new(std::sync::atomic::AtomicBool::new(true)),
        }))
    }
}

struct ChromiumoxideHandle {
    browser: Arc<Mutex<Browser>>,
    connected: Arc<std::sync::atomic::AtomicBool>,
}

#[async_trait]
impl BrowserHandleTrait for ChromiumoxideHandle {
    async fn new_context(
        &self,
        options: &riptide_stealth::ContextOptions,
    ) -> DriverResult<Box<dyn BrowserContextTrait>> {
        // chromiumoxide does not expose Playwright-style isolated browser
        // contexts; each extraction instead gets a fresh incognito-equivalent
        // target via a dedicated page with per-page overrides, which is
        // sufficient since the pipeline never shares a context across
        // extractions.
        Ok(Box::new(ChromiumoxideContext {
            browser: self.browser.clone(),
            options: options.clone(),
            page: Mutex::new(None),
        }))
    }

    fn is_connected(&self) -> bool {
        self.connected.load(std::sync::atomic::Ordering::SeqCst)
    }

    async fn close(&self) -> DriverResult<()> {
        self.connected
            .store(false, std::sync::atomic::Ordering::SeqCst);
        self.browser.lock().await.close().await?;
        Ok(())
    }

    async fn on_disconnected(&self, callback: Box<dyn Fn() + Send + Sync>) {
        let connected = self.connected.clone();
        tokio::spawn(async move {
            // chromiumoxide surfaces process exit via the handler stream
            // ending; callers observe that indirectly through `is_connected`
            // going false on the next poll. This loop bridges the two.
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                if !connected.load(std::sync::atomic::Ordering::SeqCst) {
                    callback();
                    break;
                }
            }
        });
    }
}

struct ChromiumoxideContext {
    browser: Arc<Mutex<Browser>>,
    options: riptide_stealth::ContextOptions,
    page: Mutex<Option<Arc<Page>>>,
}

impl ChromiumoxideContext {
    /// Applies the §4.2/§6 context requirements CDP exposes per-page rather
    /// than per-browser-context: CSP bypass, TLS error tolerance, a fixed
    /// viewport, reduced motion, and blocked service workers.
    async fn apply_context_options(&self, page: &Page) {
        page.execute(SetBypassCspParams::new(self.options.bypass_csp))
            .await
            .ok();
        page.execute(SetIgnoreCertificateErrorsParams::new(
            self.options.ignore_https_errors,
        ))
        .await
        .ok();
        page.execute(
            SetDeviceMetricsOverrideParams::builder()
                .width(self.options.viewport_width as i64)
                .height(self.options.viewport_height as i64)
                .device_scale_factor(self.options.device_scale_factor)
                .mobile(self.options.is_mobile)
                .build()
                .unwrap(),
        )
        .await
        .ok();
        if self.options.reduced_motion {
            page.execute(
                SetEmulatedMediaParams::builder()
                    .features(vec![MediaFeature {
                        name: "prefers-reduced-motion".to_string(),
                        value: "reduce".to_string(),
                    }])
                    .build(),
            )
            .await
            .ok();
        }
        if self.options.block_service_workers {
            page.execute(SetBypassServiceWorkerParams::new(true))
                .await
                .ok();
        }
    }
}

#[async_trait]
impl BrowserContextTrait for ChromiumoxideContext {
    async fn new_page(&self) -> DriverResult<Box<dyn PageTrait>> {
        let page = self.browser.lock().await.new_page("about:blank").await?;
        page.set_user_agent(self.options.user_agent.clone())
            .await?;
        page.execute(FetchEnableParams::default()).await.ok();
        self.apply_context_options(&page).await;

        let page = Arc::new(page);
        *self.page.lock().await = Some(page.clone());
        Ok(Box::new(ChromiumoxidePage { page }))
    }

    async fn route(&self, handler: RouteHandler) -> DriverResult<()> {
        let page = self
            .page
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow::anyhow!("route() called before new_page()"))?;
        let handler = Arc::new(handler);

        let mut events = page.event_listener::<EventRequestPaused>().await?;
        let page_for_task = page.clone();
        tokio::spawn(async move {
            while let Some(event) = events.next().await {
                let headers: HashMap<String, String> = event
                    .request
                    .headers
                    .inner()
                    .as_object()
                    .map(|obj| {
                        obj.iter()
                            .map(|(k, v)| (k.clone(), v.as_str().unwrap_or_default().to_string()))
                            .collect()
                    })
                    .unwrap_or_default();

                let resource_type = classify_resource_type(&event.resource_type);

                let request = InterceptedRequest {
                    url: event.request.url.clone(),
                    resource_type,
                    headers,
                };

                let decision = handler(request).await;
                let result = match decision {
                    RouteDecision::Continue => {
                        page_for_task
                            .execute(ContinueRequestParams::new(event.request_id.clone()))
                            .await
                            .map(|_| ())
                    }
                    RouteDecision::Abort => {
                        page_for_task
                            .execute(
                                FailRequestParams::builder()
                                    .request_id(event.request_id.clone())
                                    .error_reason(ErrorReason::Aborted)
                                    .build()
                                    .unwrap(),
                            )
                            .await
                            .map(|_| ())
                    }
                };
                if let Err(err) = result {
                    tracing::debug!(error = %err, "route response failed, request likely already resolved");
                }
            }
        });

        Ok(())
    }

    async fn unroute(&self) -> DriverResult<()> {
        if let Some(page) = self.page.lock().await.as_ref() {
            page.execute(chromiumoxide::cdp::browser_protocol::fetch::DisableParams::default())
                .await
                .ok();
        }
        Ok(())
    }

    async fn cookies(&self) -> DriverResult<Vec<CookieEntry>> {
        let page = self
            .page
            .lock()
            .await
            .clone()
            .ok_or_else(|| anyhow::anyhow!("cookies() called before new_page()"))?;
        let cookies = page.get_cookies().await?;
        Ok(cookies
            .into_iter()
            .map(|c| CookieEntry {
                name: c.name,
                value: c.value,
            })
            .collect())
    }

    async fn on_page_opened(&self, callback: Box<dyn Fn(Box<dyn PageTrait>) + Send + Sync>) {
        // Popups surface as new targets on the browser; chromiumoxide exposes
        // this via `Browser::new_page` events on some versions and via the
        // `Target.targetCreated` CDP event in general. We subscribe broadly
        // and close anything that is not our tracked page.
        let browser = self.browser.clone();
        let tracked = self.page.lock().await.clone();
        tokio::spawn(async move {
            if let Ok(mut pages) = browser.lock().await.pages().await {
                pages.retain(|p| {
                    tracked
                        .as_ref()
                        .map(|t| t.target_id() != p.target_id())
                        .unwrap_or(true)
                });
                for popup in pages {
                    callback(Box::new(ChromiumoxidePage {
                        page: Arc::new(popup),
                    }));
                }
            }
        });
    }

    async fn close(&self) -> DriverResult<()> {
        if let Some(page) = self.page.lock().await.take() {
            (*page).clone().close().await.ok();
        }
        Ok(())
    }
}

struct ChromiumoxidePage {
    page: Arc<Page>,
}

#[async_trait]
impl PageTrait for ChromiumoxidePage {
    async fn goto(&self, url: &str, timeout_ms: u64) -> DriverResult<()> {
        tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await
        .map_err(|_| anyhow::anyhow!("navigation timed out"))??;
        Ok(())
    }

    async fn wait_for_timeout(&self, ms: u64) {
        tokio::time::sleep(std::time::Duration::from_millis(ms)).await;
    }

    async fn main_frame(&self) -> DriverResult<Box<dyn FrameTrait>> {
        Ok(Box::new(ChromiumoxideFrame {
            page: self.page.clone(),
        }))
    }

    async fn frames(&self) -> DriverResult<Vec<Box<dyn FrameTrait>>> {
        // chromiumoxide evaluates selectors page-wide by default; per-frame
        // isolation for cross-origin iframes requires the `Page.frameTree`
        // walk, which we approximate by returning the single logical frame
        // set chromiumoxide can search directly.
        Ok(vec![Box::new(ChromiumoxideFrame {
            page: self.page.clone(),
        })])
    }

    async fn close(&self) -> DriverResult<()> {
        (*self.page).clone().close().await.ok();
        Ok(())
    }
}

struct ChromiumoxideFrame {
    page: Arc<Page>,
}

#[async_trait]
impl FrameTrait for ChromiumoxideFrame {
    async fn find(&self, selector: &str) -> DriverResult<Option<Box<dyn ElementTrait>>> {
        match self.page.find_element(selector).await {
            Ok(element) => Ok(Some(Box::new(ChromiumoxideElement { element }))),
            Err(_) => Ok(None),
        }
    }
}

struct ChromiumoxideElement {
    element: chromiumoxide::element::Element,
}

#[async_trait]
impl ElementTrait for ChromiumoxideElement {
    async fn bounding_box(&self) -> DriverResult<Option<BoundingBox>> {
        match self.element.bounding_box().await {
            Ok(b) => Ok(Some(BoundingBox {
                width: b.width,
                height: b.height,
            })),
            Err(_) => Ok(None),
        }
    }

    async fn click(&self, timeout_ms: u64) -> DriverResult<()> {
        tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            self.element.click(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("click timed out"))??;
        Ok(())
    }
}

fn classify_resource_type(
    kind: &chromiumoxide::cdp::browser_protocol::network::ResourceType,
) -> ResourceType {
    use chromiumoxide::cdp::browser_protocol::network::ResourceType as Rt;
    match kind {
        Rt::Document => ResourceType::Document,
        Rt::Stylesheet => ResourceType::Stylesheet,
        Rt::Image => ResourceType::Image,
        Rt::Font => ResourceType::Font,
        Rt::Script => ResourceType::Script,
        Rt::Xhr => ResourceType::Xhr,
        Rt::Fetch => ResourceType::Fetch,
        _ => ResourceType::Other,
    }
}

