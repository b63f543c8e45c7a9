use serde::{Deserialize, Serialize};
use std::fmt;

/// Fields only some sites fill in (the shopping preset).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDetails {
    pub price: Option<String>,
    pub store: Option<String>,
    pub link: Option<String>,
    pub image: Option<String>,
}

/// How a lookup reached its terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// A rule produced text. `rule` is the label or selector that matched.
    Matched { rule: String },
    /// The landing URL was a product page and its rules produced text.
    Redirected { rule: String },
    /// The site itself reported zero results.
    ConfirmedEmpty,
    /// Every rule was tried without a usable match.
    Exhausted,
    /// Navigation failed or timed out; carries the error class.
    NavigationFailed { class: String },
    /// The lookup itself broke (browser context unusable, panic).
    Failed { class: String },
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Matched { rule } => write!(f, "matched ({})", rule),
            Resolution::Redirected { rule } => write!(f, "product page ({})", rule),
            Resolution::ConfirmedEmpty => write!(f, "empty state"),
            Resolution::Exhausted => write!(f, "no selector matched"),
            Resolution::NavigationFailed { class } => write!(f, "navigation failed: {}", class),
            Resolution::Failed { class } => write!(f, "failed: {}", class),
        }
    }
}

/// One row of output. Built once per query and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub query: String,
    pub found_text: Option<String>,
    pub found: bool,
    pub details: RecordDetails,
    pub resolution: Resolution,
}

impl ResultRecord {
    pub fn found(query: impl Into<String>, text: String, resolution: Resolution) -> Self {
        Self {
            query: query.into(),
            found_text: Some(text),
            found: true,
            details: RecordDetails::default(),
            resolution,
        }
    }

    pub fn not_found(query: impl Into<String>, resolution: Resolution) -> Self {
        Self {
            query: query.into(),
            found_text: None,
            found: false,
            details: RecordDetails::default(),
            resolution,
        }
    }

    pub fn with_details(mut self, details: RecordDetails) -> Self {
        self.details = details;
        self
    }
}
