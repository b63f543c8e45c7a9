#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use product_lookup::browser::{
    BrowserSession, BrowsingContext, FieldSelector, ImageCandidate, Readiness, SearchPage,
};
use product_lookup::config::{Config, DelayRange, SiteConfig};
use product_lookup::error::{OutputError, PageError};
use product_lookup::models::{ResultRecord, Site};
use product_lookup::storage::ResultSink;
use product_lookup::utils::delay::StopHandle;

/// What the fake browser shows after navigating to one URL.
#[derive(Debug, Clone, Default)]
pub struct PageScript {
    /// URL reported after navigation, for redirects.
    pub landing_url: Option<String>,
    /// Selector to text of its first match.
    pub elements: HashMap<String, String>,
    pub navigation_error: Option<PageError>,
    pub cards: Vec<Vec<Option<String>>>,
    pub images: Vec<ImageCandidate>,
    pub consent_button: bool,
}

impl PageScript {
    pub fn with_element(mut self, selector: &str, text: &str) -> Self {
        self.elements.insert(selector.to_string(), text.to_string());
        self
    }

    pub fn landing_on(mut self, url: &str) -> Self {
        self.landing_url = Some(url.to_string());
        self
    }

    pub fn failing_with(mut self, error: PageError) -> Self {
        self.navigation_error = Some(error);
        self
    }
}

struct Loaded {
    url: String,
    script: PageScript,
}

/// A page whose DOM is looked up from scripts keyed by exact URL.
#[derive(Default)]
pub struct ScriptedPage {
    routes: HashMap<String, PageScript>,
    current: Mutex<Option<Loaded>>,
    pub navigations: Mutex<Vec<String>>,
    pub rule_attempts: AtomicUsize,
    pub clicks: AtomicUsize,
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, script: PageScript) -> Self {
        self.routes.insert(url.to_string(), script);
        self
    }

    pub fn attempts(&self) -> usize {
        self.rule_attempts.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.navigations.lock().unwrap().clone()
    }

    fn with_script<T>(&self, f: impl FnOnce(&Loaded) -> T) -> Result<T, PageError> {
        let guard = self.current.lock().unwrap();
        match guard.as_ref() {
            Some(loaded) => Ok(f(loaded)),
            None => Err(PageError::Navigation("nothing loaded".to_string())),
        }
    }

    fn lookup_text(&self, selector: &str) -> Result<Option<String>, PageError> {
        self.rule_attempts.fetch_add(1, Ordering::SeqCst);
        self.with_script(|loaded| loaded.script.elements.get(selector).cloned())
    }
}

#[async_trait]
impl SearchPage for ScriptedPage {
    async fn navigate(
        &self,
        url: &str,
        _readiness: Readiness,
        _timeout: Duration,
    ) -> Result<(), PageError> {
        self.navigations.lock().unwrap().push(url.to_string());
        let script = self.routes.get(url).cloned().unwrap_or_default();
        if let Some(error) = &script.navigation_error {
            return Err(error.clone());
        }
        *self.current.lock().unwrap() = Some(Loaded {
            url: script.landing_url.clone().unwrap_or_else(|| url.to_string()),
            script,
        });
        Ok(())
    }

    async fn current_url(&self) -> Result<String, PageError> {
        self.with_script(|loaded| loaded.url.clone())
    }

    async fn has_element(&self, selector: &str) -> Result<bool, PageError> {
        self.with_script(|loaded| loaded.script.elements.contains_key(selector))
    }

    async fn text_of(&self, selector: &str) -> Result<Option<String>, PageError> {
        self.lookup_text(selector)
    }

    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), PageError> {
        if self.with_script(|loaded| loaded.script.elements.contains_key(selector))? {
            Ok(())
        } else {
            Err(PageError::Timeout {
                operation: "selector wait",
                after: timeout,
            })
        }
    }

    async fn wait_for_text(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<String>, PageError> {
        match self.lookup_text(selector)? {
            Some(text) => Ok(Some(text)),
            None => Err(PageError::Timeout {
                operation: "selector wait",
                after: timeout,
            }),
        }
    }

    async fn card_fields(
        &self,
        _card_selector: &str,
        _fields: &[FieldSelector],
        limit: usize,
    ) -> Result<Vec<Vec<Option<String>>>, PageError> {
        self.with_script(|loaded| loaded.script.cards.iter().take(limit).cloned().collect())
    }

    async fn images(&self, _selector: &str) -> Result<Vec<ImageCandidate>, PageError> {
        self.with_script(|loaded| loaded.script.images.clone())
    }

    async fn click_with_text(&self, _selector: &str, _text: &str) -> Result<bool, PageError> {
        let present = self.with_script(|loaded| loaded.script.consent_button)?;
        if present {
            self.clicks.fetch_add(1, Ordering::SeqCst);
        }
        Ok(present)
    }
}

#[derive(Debug, Default)]
pub struct SessionCounters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub cookies_cleared: AtomicUsize,
    pub shutdowns: AtomicUsize,
}

impl SessionCounters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

/// Hands out contexts that all share one scripted page.
pub struct FakeSession {
    page: Arc<ScriptedPage>,
    pub counters: Arc<SessionCounters>,
    /// 1-based index of the `open_context` call that fails.
    fail_open_at: Option<usize>,
}

impl FakeSession {
    pub fn new(page: Arc<ScriptedPage>) -> Self {
        Self {
            page,
            counters: Arc::new(SessionCounters::default()),
            fail_open_at: None,
        }
    }

    pub fn failing_open_at(mut self, call: usize) -> Self {
        self.fail_open_at = Some(call);
        self
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    async fn open_context(&self) -> Result<Box<dyn BrowsingContext>, PageError> {
        let call = self.counters.opened.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_open_at == Some(call) {
            return Err(PageError::Protocol("target crashed".to_string()));
        }
        Ok(Box::new(FakeContext {
            page: self.page.clone(),
            counters: self.counters.clone(),
        }))
    }

    async fn shutdown(&self) -> Result<(), PageError> {
        self.counters.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeContext {
    page: Arc<ScriptedPage>,
    counters: Arc<SessionCounters>,
}

#[async_trait]
impl BrowsingContext for FakeContext {
    fn page(&self) -> &dyn SearchPage {
        self.page.as_ref()
    }

    async fn clear_cookies(&self) -> Result<(), PageError> {
        self.counters.cookies_cleared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), PageError> {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Keeps every snapshot; optionally raises stop after the n-th write.
#[derive(Default)]
pub struct RecordingSink {
    pub snapshots: Mutex<Vec<Vec<ResultRecord>>>,
    stop_after: Mutex<Option<(usize, StopHandle)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stopping_after(writes: usize, handle: StopHandle) -> Self {
        Self {
            snapshots: Mutex::new(Vec::new()),
            stop_after: Mutex::new(Some((writes, handle))),
        }
    }

    pub fn writes(&self) -> usize {
        self.snapshots.lock().unwrap().len()
    }

    pub fn last(&self) -> Vec<ResultRecord> {
        self.snapshots.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

impl ResultSink for RecordingSink {
    fn write_snapshot(&self, records: &[ResultRecord]) -> Result<(), OutputError> {
        let mut snapshots = self.snapshots.lock().unwrap();
        snapshots.push(records.to_vec());
        if let Some((writes, handle)) = self.stop_after.lock().unwrap().as_ref() {
            if snapshots.len() == *writes {
                handle.stop();
            }
        }
        Ok(())
    }
}

/// A preset with all pacing removed so tests run instantly.
pub fn site_config(site: Site) -> SiteConfig {
    let mut config = Config::defaults().site(site.key()).unwrap().clone();
    config.navigation.settle_ms = 0;
    config.batch.query_delay = DelayRange::ZERO;
    config.batch.slice_delay = DelayRange::ZERO;
    config
}
