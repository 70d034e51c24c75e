//! Per-request extraction choreography (§4.2).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Instant;

use riptide_types::{
    CoreError, CoreResult, ExtractionHeaders, ExtractionResult, Priority,
};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::block_patterns::{BLOCK_PATTERN, PLAYER_ALLOWLIST, PLAY_BUTTON_SELECTORS, TELEMETRY_PATTERN};
use crate::driver::{
    BoundingBox, BrowserContextTrait, FrameTrait, InterceptedRequest, PageTrait, ResourceType,
    RouteDecision, RouteFuture, RouteHandler,
};
use crate::pool::{BrowserPool, HandleArc};

/// Outcome of a completed pipeline run. `Timeout` is not an error: it is a
/// well-formed, unsuccessful extraction.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Success(ExtractionResult),
    Timeout,
}

pub struct ExtractionPipeline {
    pool: Arc<BrowserPool>,
}

impl ExtractionPipeline {
    pub fn new(pool: Arc<BrowserPool>) -> Self {
        Self { pool }
    }

    pub async fn extract(
        &self,
        embed_url: &str,
        timeout_ms: u64,
        priority: Priority,
    ) -> CoreResult<PipelineOutcome> {
        let embed_url = embed_url.to_string();
        let enqueued_at = Instant::now();
        let metrics = self.pool.metrics.clone();

        let result = self
            .pool
            .submit(priority, move |handle| {
                let metrics = metrics.clone();
                async move {
                    metrics
                        .queue_wait_seconds
                        .observe(enqueued_at.elapsed().as_secs_f64());
                    let started = Instant::now();
                    let outcome =
                        run_extraction(handle, &embed_url, timeout_ms, metrics.clone(), started).await;
                    let status = match &outcome {
                        Ok(PipelineOutcome::Success(_)) => "success",
                        _ => "failure",
                    };
                    metrics
                        .extraction_duration_seconds
                        .with_label_values(&[status])
                        .observe(started.elapsed().as_secs_f64());
                    outcome
                }
            })
            .await;

        let (status, error_type) = match &result {
            Ok(PipelineOutcome::Success(_)) => ("success", "none"),
            Ok(PipelineOutcome::Timeout) => ("failure", "timeout"),
            Err(CoreError::CircuitOpen { .. }) => ("failure", "circuit_open"),
            Err(_) => ("failure", "browser_error"),
        };
        self.pool
            .metrics
            .extractions_total
            .with_label_values(&[status, error_type])
            .inc();

        result
    }
}

async fn run_extraction(
    handle: HandleArc,
    embed_url: &str,
    timeout_ms: u64,
    metrics: Arc<crate::metrics::PoolMetrics>,
    admitted_at: Instant,
) -> CoreResult<PipelineOutcome> {
    let context_options = riptide_stealth::ContextOptions::for_preset(
        riptide_stealth::StealthPreset::default(),
    );
    let user_agent = context_options.user_agent.clone();

    let context_started = Instant::now();
    let context = handle
        .new_context(&context_options)
        .await
        .map_err(|e| CoreError::Driver(e.to_string()))?;
    let context: Arc<dyn BrowserContextTrait> = Arc::from(context);
    metrics
        .context_creation_seconds
        .observe(context_started.elapsed().as_secs_f64());

    context
        .on_page_opened(Box::new(|page: Box<dyn PageTrait>| {
            tokio::spawn(async move {
                let _ = page.close().await;
            });
        }))
        .await;

    let resolved = Arc::new(AtomicBool::new(false));
    let (result_tx, result_rx) = oneshot::channel::<PipelineOutcome>();
    let result_tx = Arc::new(StdMutex::new(Some(result_tx)));
    let timer_handle: Arc<StdMutex<Option<JoinHandle<()>>>> = Arc::new(StdMutex::new(None));

    // The production driver attaches the Fetch listener to the page, so the
    // page must exist before `route()` is called or the handler is never
    // installed and no request is ever intercepted.
    let page = context.new_page().await.ok();

    let handler = build_route_handler(
        resolved.clone(),
        result_tx.clone(),
        context.clone(),
        embed_url.to_string(),
        user_agent,
        timer_handle.clone(),
        metrics.clone(),
        admitted_at,
    );
    let _ = context.route(handler).await;

    let timeout_task = {
        let resolved = resolved.clone();
        let result_tx = result_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(timeout_ms)).await;
            if !resolved.swap(true, Ordering::SeqCst) {
                if let Some(tx) = result_tx.lock().unwrap().take() {
                    let _ = tx.send(PipelineOutcome::Timeout);
                }
            }
        })
    };
    *timer_handle.lock().unwrap() = Some(timeout_task);

    if let Some(page) = &page {
        let _ = page.goto(embed_url, 15_000).await;
    }

    if !resolved.load(Ordering::SeqCst) {
        if let Some(page) = &page {
            page.wait_for_timeout(500).await;
            if !resolved.load(Ordering::SeqCst) {
                coax_main_frame(page.as_ref()).await;
            }
            page.wait_for_timeout(500).await;
            if !resolved.load(Ordering::SeqCst) {
                coax_all_frames(page.as_ref()).await;
            }
        }
    }

    let outcome = result_rx
        .await
        .unwrap_or(PipelineOutcome::Timeout);

    if let Some(handle) = timer_handle.lock().unwrap().take() {
        handle.abort();
    }
    let _ = context.unroute().await;
    if let Some(page) = page {
        let _ = page.close().await;
    }
    let _ = context.close().await;

    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn build_route_handler(
    resolved: Arc<AtomicBool>,
    result_tx: Arc<StdMutex<Option<oneshot::Sender<PipelineOutcome>>>>,
    context: Arc<dyn BrowserContextTrait>,
    embed_url: String,
    user_agent: String,
    timer_handle: Arc<StdMutex<Option<JoinHandle<()>>>>,
    metrics: Arc<crate::metrics::PoolMetrics>,
    admitted_at: Instant,
) -> RouteHandler {
    Box::new(move |request: InterceptedRequest| -> RouteFuture {
        let resolved = resolved.clone();
        let result_tx = result_tx.clone();
        let context = context.clone();
        let embed_url = embed_url.clone();
        let user_agent = user_agent.clone();
        let timer_handle = timer_handle.clone();
        let metrics = metrics.clone();
        Box::pin(async move {
            classify_and_route(
                request,
                resolved,
                result_tx,
                context,
                embed_url,
                user_agent,
                timer_handle,
                metrics,
                admitted_at,
            )
            .await
        })
    })
}

#[allow(clippy::too_many_arguments)]
async fn classify_and_route(
    request: InterceptedRequest,
    resolved: Arc<AtomicBool>,
    result_tx: Arc<StdMutex<Option<oneshot::Sender<PipelineOutcome>>>>,
    context: Arc<dyn BrowserContextTrait>,
    embed_url: String,
    user_agent: String,
    timer_handle: Arc<StdMutex<Option<JoinHandle<()>>>>,
    metrics: Arc<crate::metrics::PoolMetrics>,
    admitted_at: Instant,
) -> RouteDecision {
    let url = request.url.clone();
    let is_manifest = url.contains(".m3u8") && !url.contains(".ts.m3u8");

    if is_manifest {
        if resolved.swap(true, Ordering::SeqCst) {
            return RouteDecision::Abort;
        }
        if let Some(handle) = timer_handle.lock().unwrap().take() {
            handle.abort();
        }

        let cookies = context.cookies().await.unwrap_or_default();
        let cookie_header = if cookies.is_empty() {
            None
        } else {
            Some(
                cookies
                    .iter()
                    .map(|c| format!("{}={}", c.name, c.value))
                    .collect::<Vec<_>>()
                    .join("; "),
            )
        };

        let origin = request
            .header("Referer")
            .and_then(origin_of)
            .or_else(|| origin_of(&embed_url))
            .unwrap_or_default();
        let referer = format!("{origin}/");

        metrics
            .manifest_detection_seconds
            .observe(admitted_at.elapsed().as_secs_f64());

        let result = ExtractionResult {
            manifest_url: url,
            headers: ExtractionHeaders {
                referer,
                origin,
                user_agent,
            },
            cookies: cookie_header,
        };
        if let Some(tx) = result_tx.lock().unwrap().take() {
            let _ = tx.send(PipelineOutcome::Success(result));
        }
        return RouteDecision::Abort;
    }

    match request.resource_type {
        ResourceType::Image | ResourceType::Font | ResourceType::Stylesheet => RouteDecision::Abort,
        ResourceType::Script => {
            if !PLAYER_ALLOWLIST.is_match(&url) && BLOCK_PATTERN.is_match(&url) {
                RouteDecision::Abort
            } else {
                RouteDecision::Continue
            }
        }
        ResourceType::Xhr | ResourceType::Fetch => {
            if TELEMETRY_PATTERN.is_match(&url) || BLOCK_PATTERN.is_match(&url) {
                RouteDecision::Abort
            } else {
                RouteDecision::Continue
            }
        }
        ResourceType::Document | ResourceType::Other => {
            if BLOCK_PATTERN.is_match(&url) {
                RouteDecision::Abort
            } else {
                RouteDecision::Continue
            }
        }
    }
}

fn origin_of(raw: &str) -> Option<String> {
    url::Url::parse(raw)
        .ok()
        .map(|u| u.origin().ascii_serialization())
}

async fn coax_main_frame(page: &dyn PageTrait) {
    if let Ok(frame) = page.main_frame().await {
        try_click_play_button(frame.as_ref()).await;
    }
}

async fn coax_all_frames(page: &dyn PageTrait) {
    if let Ok(frames) = page.frames().await {
        let clicks = frames
            .into_iter()
            .map(|frame| async move { try_click_play_button(frame.as_ref()).await });
        futures::future::join_all(clicks).await;
    }
}

async fn try_click_play_button(frame: &dyn FrameTrait) -> bool {
    for selector in PLAY_BUTTON_SELECTORS {
        let Ok(Some(element)) = frame.find(selector).await else {
            continue;
        };
        let visible = matches!(
            element.bounding_box().await,
            Ok(Some(BoundingBox { width, height })) if width > 0.0 && height > 0.0
        );
        if !visible {
            continue;
        }
        if element.click(500).await.is_ok() {
            return true;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::circuit_breaker::CircuitBreaker;
    use crate::driver::fake::{FakeDriver, FakeDriverScript, ScriptedRequest};
    use crate::metrics::PoolMetrics;
    use crate::pool::{BrowserPool, BrowserPoolConfig};
    use std::sync::atomic::Ordering as StdOrdering;
    use std::time::Duration;

    #[test]
    fn origin_of_strips_path_and_keeps_scheme_host() {
        assert_eq!(
            origin_of("https://player.example.com/iframe"),
            Some("https://player.example.com".to_string())
        );
        assert_eq!(origin_of("not a url"), None);
    }

    fn pipeline_with(
        script: FakeDriverScript,
    ) -> (ExtractionPipeline, Arc<crate::driver::fake::FakeDriverCalls>) {
        let driver = FakeDriver::new(script);
        let calls = driver.calls.clone();
        let pool = BrowserPool::new(
            Arc::new(driver),
            BrowserPoolConfig {
                max_concurrent: 1,
                idle_timeout: Duration::from_secs(60),
                max_age: Duration::from_secs(7200),
                chrome_path: None,
            },
            Arc::new(CircuitBreaker::new()),
            Arc::new(PoolMetrics::new()),
        );
        (ExtractionPipeline::new(pool), calls)
    }

    #[tokio::test]
    async fn happy_path_resolves_manifest_and_rewrites_referer() {
        let mut script = FakeDriverScript::default();
        script.requests = vec![ScriptedRequest::manifest(
            "https://cdn.example.com/stream.m3u8",
            Some("https://player.example.com/iframe"),
        )];
        let (pipeline, calls) = pipeline_with(script);

        let outcome = pipeline
            .extract("https://embed.example.com/e/abc", 5_000, Priority::Normal)
            .await
            .unwrap();

        let result = match outcome {
            PipelineOutcome::Success(result) => result,
            other => panic!("expected success, got {other:?}"),
        };
        assert_eq!(result.manifest_url, "https://cdn.example.com/stream.m3u8");
        assert_eq!(result.headers.referer, "https://player.example.com/");
        assert_eq!(result.headers.origin, "https://player.example.com");
        assert_eq!(calls.abort_count.load(StdOrdering::SeqCst), 1);
        assert_eq!(
            *calls.cookies_called_before_abort.lock().unwrap(),
            Some(true)
        );
    }

    #[tokio::test]
    async fn segment_playlist_is_continued_then_manifest_is_aborted() {
        let mut script = FakeDriverScript::default();
        script.requests = vec![
            ScriptedRequest::manifest("https://cdn.example.com/seg.ts.m3u8", None),
            ScriptedRequest::manifest("https://cdn.example.com/playlist.m3u8", None),
        ];
        let (pipeline, calls) = pipeline_with(script);

        let outcome = pipeline
            .extract("https://embed.example.com/e/abc", 5_000, Priority::Normal)
            .await
            .unwrap();

        let result = match outcome {
            PipelineOutcome::Success(result) => result,
            other => panic!("expected success, got {other:?}"),
        };
        assert_eq!(result.manifest_url, "https://cdn.example.com/playlist.m3u8");
        assert_eq!(calls.continue_count.load(StdOrdering::SeqCst), 1);
        assert_eq!(calls.abort_count.load(StdOrdering::SeqCst), 1);
    }

    #[tokio::test]
    async fn no_manifest_seen_resolves_as_timeout() {
        let script = FakeDriverScript::default();
        let (pipeline, _calls) = pipeline_with(script);

        let outcome = pipeline
            .extract("https://embed.example.com/e/abc", 100, Priority::Normal)
            .await
            .unwrap();

        assert!(matches!(outcome, PipelineOutcome::Timeout));
    }
}
