use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::PageError;

mod chromium;

pub use chromium::{ChromiumContext, ChromiumSession};

/// When a navigation counts as finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// The DOM is parsed; subresources may still be loading.
    DomContentLoaded,
    Load,
    /// `load` fired and the resource count stayed flat for a short window.
    NetworkIdle,
}

/// A selector read either as text or as one of its attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSelector {
    pub selector: String,
    #[serde(default)]
    pub attribute: Option<String>,
}

impl FieldSelector {
    pub fn text(selector: &str) -> Self {
        Self {
            selector: selector.to_string(),
            attribute: None,
        }
    }

    pub fn attribute(selector: &str, attribute: &str) -> Self {
        Self {
            selector: selector.to_string(),
            attribute: Some(attribute.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageCandidate {
    /// Declared `width` attribute, when it parses.
    pub width: Option<u32>,
    pub src: Option<String>,
}

/// The page operations a lookup needs. Every wait is bounded by the caller.
#[async_trait]
pub trait SearchPage: Send + Sync {
    async fn navigate(
        &self,
        url: &str,
        readiness: Readiness,
        timeout: Duration,
    ) -> Result<(), PageError>;

    async fn current_url(&self) -> Result<String, PageError>;

    /// Immediate presence probe, no waiting.
    async fn has_element(&self, selector: &str) -> Result<bool, PageError>;

    /// Text of the first match in the current DOM, no waiting.
    async fn text_of(&self, selector: &str) -> Result<Option<String>, PageError>;

    /// Waits until the selector is attached to the DOM.
    async fn wait_for(&self, selector: &str, timeout: Duration) -> Result<(), PageError>;

    /// Waits for the selector to be attached, then reads its text.
    async fn wait_for_text(
        &self,
        selector: &str,
        timeout: Duration,
    ) -> Result<Option<String>, PageError>;

    /// Reads `fields` inside each of the first `limit` elements matching `card_selector`.
    async fn card_fields(
        &self,
        card_selector: &str,
        fields: &[FieldSelector],
        limit: usize,
    ) -> Result<Vec<Vec<Option<String>>>, PageError>;

    async fn images(&self, selector: &str) -> Result<Vec<ImageCandidate>, PageError>;

    /// Clicks the first `selector` match whose text contains `text`. Returns whether one was clicked.
    async fn click_with_text(&self, selector: &str, text: &str) -> Result<bool, PageError>;
}

/// One isolated browsing context (own cookie jar) with a single page.
#[async_trait]
pub trait BrowsingContext: Send + Sync {
    fn page(&self) -> &dyn SearchPage;

    async fn clear_cookies(&self) -> Result<(), PageError>;

    async fn close(self: Box<Self>) -> Result<(), PageError>;
}

#[async_trait]
pub trait BrowserSession: Send + Sync {
    async fn open_context(&self) -> Result<Box<dyn BrowsingContext>, PageError>;

    /// Closes the engine and its handler task. Safe to call more than once.
    async fn shutdown(&self) -> Result<(), PageError>;
}
