use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum InputError {
    #[error("input file not found: {}", .0.display())]
    Missing(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    #[error("'{0}' has a decimal point but is not a number")]
    NotNumeric(String),

    #[error("'{0}' does not fit in an integer code")]
    OutOfRange(String),
}

/// Failures talking to the browser. Cloneable so a lookup can keep the
/// error class around after logging it.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PageError {
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("navigation failed: {0}")]
    Navigation(String),

    #[error("element not found: {0}")]
    NoElement(String),

    #[error("script evaluation failed: {0}")]
    Script(String),

    #[error("browser protocol error: {0}")]
    Protocol(String),

    #[error("browser launch failed: {0}")]
    Launch(String),
}

impl PageError {
    /// Short, stable name for logs and record resolutions.
    pub fn class(&self) -> &'static str {
        match self {
            PageError::Timeout { .. } => "timeout",
            PageError::Navigation(_) => "navigation",
            PageError::NoElement(_) => "no_element",
            PageError::Script(_) => "script",
            PageError::Protocol(_) => "protocol",
            PageError::Launch(_) => "launch",
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, PageError::Timeout { .. })
    }
}

impl From<chromiumoxide::error::CdpError> for PageError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        match err {
            chromiumoxide::error::CdpError::Timeout => PageError::Timeout {
                operation: "browser command",
                after: Duration::ZERO,
            },
            chromiumoxide::error::CdpError::NotFound => PageError::NoElement(err.to_string()),
            other => PageError::Protocol(other.to_string()),
        }
    }
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("failed to write {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode CSV row: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown site '{0}'")]
    UnknownSite(String),

    #[error("site '{site}': invalid selector '{selector}'")]
    Selector { site: String, selector: String },

    #[error("site '{site}': invalid pattern '{pattern}': {source}")]
    Pattern {
        site: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("site '{site}': {message}")]
    Invalid { site: String, message: String },

    #[error(transparent)]
    Source(#[from] config::ConfigError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("could not open a browsing context for batch {batch}: {source}")]
    Session {
        batch: usize,
        #[source]
        source: PageError,
    },
}
