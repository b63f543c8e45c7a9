use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::network::ClearBrowserCookiesParams;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::Page;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use super::{BrowserSession, BrowsingContext, FieldSelector, ImageCandidate, Readiness, SearchPage};
use crate::config::BrowserSettings;
use crate::error::PageError;

const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// How long the resource count must stay flat to call the network idle.
const IDLE_WINDOW: Duration = Duration::from_millis(500);
/// Bound on each of the close request and the exit wait before the process is killed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const READY_PROBE: &str = "({ readyState: document.readyState, \
    resources: (performance.getEntriesByType('resource') || []).length })";

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadyProbe {
    ready_state: String,
    resources: u64,
}

#[derive(Deserialize)]
struct TextProbe {
    text: Option<String>,
}

#[derive(Deserialize)]
struct RawImage {
    width: Option<String>,
    src: Option<String>,
}

/// One Chromium process driven over CDP.
pub struct ChromiumSession {
    browser: Arc<Mutex<Browser>>,
    handler_task: std::sync::Mutex<Option<JoinHandle<()>>>,
    closed: AtomicBool,
    settings: BrowserSettings,
}

impl ChromiumSession {
    pub async fn launch(settings: &BrowserSettings) -> Result<Self, PageError> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .window_size(settings.viewport_width, settings.viewport_height)
            .request_timeout(settings.request_timeout())
            .launch_timeout(settings.launch_timeout())
            .arg(format!("--user-agent={}", settings.user_agent));
        if !settings.headless {
            builder = builder.with_head();
        }
        for arg in &settings.args {
            builder = builder.arg(arg.clone());
        }
        let config = builder.build().map_err(PageError::Launch)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| PageError::Launch(e.to_string()))?;

        // The handler drives the CDP connection and must be polled for the browser to respond.
        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("Browser handler event error: {}", e);
                }
            }
        });

        info!(
            "Browser started ({}, {}x{})",
            if settings.headless { "headless" } else { "visible" },
            settings.viewport_width,
            settings.viewport_height
        );

        Ok(Self {
            browser: Arc::new(Mutex::new(browser)),
            handler_task: std::sync::Mutex::new(Some(handler_task)),
            closed: AtomicBool::new(false),
            settings: settings.clone(),
        })
    }

    fn abort_handler(&self) {
        if let Ok(mut guard) = self.handler_task.lock() {
            if let Some(task) = guard.take() {
                task.abort();
            }
        }
    }
}

#[async_trait]
impl BrowserSession for ChromiumSession {
    async fn open_context(&self) -> Result<Box<dyn BrowsingContext>, PageError> {
        let browser = self.browser.lock().await;
        let context_id = browser
            .execute(CreateBrowserContextParams::default())
            .await?
            .result
            .browser_context_id
            .clone();

        let mut target = CreateTargetParams::new("about:blank");
        target.browser_context_id = Some(context_id.clone());
        let page = browser.new_page(target).await?;
        drop(browser);

        page.execute(SetUserAgentOverrideParams::new(self.settings.user_agent.clone()))
            .await?;
        page.execute(SetDeviceMetricsOverrideParams::new(
            i64::from(self.settings.viewport_width),
            i64::from(self.settings.viewport_height),
            1.0,
            false,
        ))
        .await?;

        debug!("Opened browsing context {:?}", context_id);
        Ok(Box::new(ChromiumContext {
            browser: self.browser.clone(),
            context_id,
            page: ChromiumPage { page },
        }))
    }

    async fn shutdown(&self) -> Result<(), PageError> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut browser = self.browser.lock().await;
        let result = stop_process(&mut *browser, SHUTDOWN_GRACE).await;
        drop(browser);
        self.abort_handler();
        result
    }
}

/// The child process side of a browser, as far as shutdown needs it.
#[async_trait]
trait BrowserProcess: Send {
    async fn request_close(&mut self) -> Result<(), PageError>;
    async fn wait_exit(&mut self) -> std::io::Result<()>;
    async fn force_kill(&mut self) -> std::io::Result<()>;
}

#[async_trait]
impl BrowserProcess for Browser {
    async fn request_close(&mut self) -> Result<(), PageError> {
        self.close().await?;
        Ok(())
    }

    async fn wait_exit(&mut self) -> std::io::Result<()> {
        self.wait().await.map(|_| ())
    }

    async fn force_kill(&mut self) -> std::io::Result<()> {
        // `None` means no child process is attached.
        self.kill().await.unwrap_or(Ok(()))
    }
}

/// Asks the browser to close and waits for it to exit, each within `grace`.
/// Kills the process when either step fails or runs out of time.
async fn stop_process<P>(process: &mut P, grace: Duration) -> Result<(), PageError>
where
    P: BrowserProcess + ?Sized,
{
    let closed = match timeout(grace, process.request_close()).await {
        Ok(result) => result,
        Err(_) => Err(PageError::Timeout {
            operation: "browser close",
            after: grace,
        }),
    };

    let exited = match &closed {
        Ok(()) => match timeout(grace, process.wait_exit()).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                warn!("Waiting for the browser process failed: {}", e);
                false
            }
            Err(_) => {
                warn!("Browser did not exit within {:?}", grace);
                false
            }
        },
        Err(e) => {
            warn!("Browser close failed: {}", e);
            false
        }
    };

    if !exited {
        info!("Killing the browser process");
        if let Err(e) = process.force_kill().await {
            warn!("Killing the browser process failed: {}", e);
        }
    }
    closed
}

impl Drop for ChromiumSession {
    fn drop(&mut self) {
        // Dropping `Browser` kills the child process; the handler task has to go too.
        self.abort_handler();
    }
}

pub struct ChromiumContext {
    browser: Arc<Mutex<Browser>>,
    context_id: BrowserContextId,
    page: ChromiumPage,
}

#[async_trait]
impl BrowsingContext for ChromiumContext {
    fn page(&self) -> &dyn SearchPage {
        &self.page
    }

    async fn clear_cookies(&self) -> Result<(), PageError> {
        self.page.page.execute(ClearBrowserCookiesParams::default()).await?;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), PageError> {
        let ChromiumContext {
            browser,
            context_id,
            page,
        } = *self;

        if let Err(e) = page.page.close().await {
            debug!("Closing page failed: {}", e);
        }
        browser
            .lock()
            .await
            .execute(DisposeBrowserContextParams::new(context_id))
            .await?;
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn eval<T: DeserializeOwned>(&self, script: String) -> Result<T, PageError> {
        self.page
            .evaluate(script)
            .await?
            .into_value::<T>()
            .map_err(|e| PageError::Script(e.to_string()))
    }

    async fn navigate_and_wait(&self, url: &str, readiness: Readiness) -> Result<(), PageError> {
        self.page.goto(url).await.map_err(|e| match PageError::from(e) {
            PageError::Protocol(message) => PageError::Navigation(message),
            other => other,
        })?;

        // Evaluation can fail while the document is being swapped; that only means not ready yet.
        let mut tracker = ReadinessTracker::new(readiness);
        loop {
            match self.eval::<ReadyProbe>(READY_PROBE.to_string()).await {
                Ok(probe) => {
                    if tracker.observe(&probe.ready_state, probe.resources) {
                        return Ok(());
                    }
                }
                Err(e) => {
                    debug!("Readiness check failed, polling again: {}", e);
                    tracker.reset();
                }
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

/// Folds successive readiness polls into a verdict for one navigation.
#[derive(Debug)]
struct ReadinessTracker {
    readiness: Readiness,
    last_count: Option<u64>,
    stable: Duration,
}

impl ReadinessTracker {
    fn new(readiness: Readiness) -> Self {
        Self {
            readiness,
            last_count: None,
            stable: Duration::ZERO,
        }
    }

    /// Records one poll; true once the page is ready.
    fn observe(&mut self, ready_state: &str, resources: u64) -> bool {
        let complete = ready_state == "complete";
        match self.readiness {
            Readiness::DomContentLoaded => ready_state != "loading",
            Readiness::Load => complete,
            Readiness::NetworkIdle => {
                if !complete {
                    self.reset();
                    return false;
                }
                if self.last_count == Some(resources) {
                    self.stable += POLL_INTERVAL;
                } else {
                    self.stable = Duration::ZERO;
                }
                self.last_count = Some(resources);
                self.stable >= IDLE_WINDOW
            }
        }
    }

    fn reset(&mut self) {
        self.last_count = None;
        self.stable = Duration::ZERO;
    }
}

/// Renders a Rust string as a JavaScript string literal.
fn js_str(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "\"\"".to_string())
}

#[async_trait]
impl SearchPage for ChromiumPage {
    async fn navigate(
        &self,
        url: &str,
        readiness: Readiness,
        limit: Duration,
    ) -> Result<(), PageError> {
        match timeout(limit, self.navigate_and_wait(url, readiness)).await {
            Ok(result) => result,
            Err(_) => Err(PageError::Timeout {
                operation: "navigation",
                after: limit,
            }),
        }
    }

    async fn current_url(&self) -> Result<String, PageError> {
        Ok(self.page.url().await?.unwrap_or_default())
    }

    async fn has_element(&self, selector: &str) -> Result<bool, PageError> {
        self.eval(format!("document.querySelector({}) !== null", js_str(selector)))
            .await
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>, PageError> {
        // Wrapped in an object: a bare `null` result carries no value over CDP.
        let probe: TextProbe = self
            .eval(format!(
                "(() => {{ const el = document.querySelector({}); return {{ text: el ? el.textContent : null }}; }})()",
                js_str(selector)
            ))
            .await?;
        Ok(probe.text)
    }

    async fn wait_for(&self, selector: &str, limit: Duration) -> Result<(), PageError> {
        let deadline = Instant::now() + limit;
        loop {
            if self.has_element(selector).await? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PageError::Timeout {
                    operation: "selector wait",
                    after: limit,
                });
            }
            sleep(POLL_INTERVAL).await;
        }
    }

    async fn wait_for_text(
        &self,
        selector: &str,
        limit: Duration,
    ) -> Result<Option<String>, PageError> {
        self.wait_for(selector, limit).await?;
        self.text_of(selector).await
    }

    async fn card_fields(
        &self,
        card_selector: &str,
        fields: &[FieldSelector],
        limit: usize,
    ) -> Result<Vec<Vec<Option<String>>>, PageError> {
        let fields_json =
            serde_json::to_string(fields).map_err(|e| PageError::Script(e.to_string()))?;
        self.eval(format!(
            r#"(() => {{
                const fields = {fields};
                return Array.from(document.querySelectorAll({card})).slice(0, {limit}).map(card =>
                    fields.map(f => {{
                        const el = card.querySelector(f.selector);
                        if (!el) return null;
                        return f.attribute ? el.getAttribute(f.attribute) : el.textContent;
                    }}));
            }})()"#,
            fields = fields_json,
            card = js_str(card_selector),
            limit = limit
        ))
        .await
    }

    async fn images(&self, selector: &str) -> Result<Vec<ImageCandidate>, PageError> {
        let raw: Vec<RawImage> = self
            .eval(format!(
                "Array.from(document.querySelectorAll({})).map(img => ({{ \
                    width: img.getAttribute('width'), src: img.getAttribute('src') }}))",
                js_str(selector)
            ))
            .await?;

        Ok(raw
            .into_iter()
            .map(|img| ImageCandidate {
                width: img.width.and_then(|w| w.trim().parse().ok()),
                src: img.src,
            })
            .collect())
    }

    async fn click_with_text(&self, selector: &str, text: &str) -> Result<bool, PageError> {
        let elements = self.page.find_elements(selector).await?;
        for element in elements {
            if let Some(label) = element.inner_text().await? {
                if label.contains(text) {
                    element.click().await?;
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}
