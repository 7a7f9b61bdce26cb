//! Progress-callback trait for request lifecycle events.
//!
//! Inject an [`Arc<dyn AssistantProgressCallback>`] via
//! [`crate::config::AssistantConfigBuilder::progress_callback`] to hear about
//! each stage of a request as it happens: a spinner in the CLI, a status bar
//! in a desktop front end.
//!
//! # Example
//!
//! ```rust
//! use pagegloss::{Action, AssistantConfig, AssistantProgressCallback, Stage};
//! use std::sync::Arc;
//!
//! struct StatusLine;
//!
//! impl AssistantProgressCallback for StatusLine {
//!     fn on_stage(&self, action: Action, stage: &Stage) {
//!         eprintln!("{action}: {stage}");
//!     }
//! }
//!
//! let config = AssistantConfig::builder()
//!     .progress_callback(Arc::new(StatusLine))
//!     .build()
//!     .unwrap();
//! ```

use std::fmt;
use std::sync::Arc;

/// The user-triggered operation an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    PageAnalysis,
    WordLookup,
    ConnectionTest,
}

impl Action {
    pub fn as_str(self) -> &'static str {
        match self {
            Action::PageAnalysis => "page analysis",
            Action::WordLookup => "word lookup",
            Action::ConnectionTest => "connection test",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One step of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    QueryingViewer,
    /// 1-based page number.
    RenderingPage { page: usize },
    Encoding,
    AwaitingModel,
    Parsing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::QueryingViewer => f.write_str("Reading viewer state"),
            Stage::RenderingPage { page } => write!(f, "Rendering page {page}"),
            Stage::Encoding => f.write_str("Encoding page image"),
            Stage::AwaitingModel => f.write_str("Waiting for the model"),
            Stage::Parsing => f.write_str("Parsing response"),
        }
    }
}

/// Called by the session as a request moves through its stages.
///
/// Implementations must be `Send + Sync`: requests run as background tasks,
/// and a page analysis and a word lookup may report at the same time. All
/// methods default to no-ops.
pub trait AssistantProgressCallback: Send + Sync {
    /// A new stage has started.
    fn on_stage(&self, action: Action, stage: &Stage) {
        let _ = (action, stage);
    }

    /// The request finished; `summary` is a one-line description such as
    /// "42 words".
    fn on_complete(&self, action: Action, summary: &str) {
        let _ = (action, summary);
    }

    /// The request failed; `error` is the human-readable reason.
    fn on_error(&self, action: Action, error: &str) {
        let _ = (action, error);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl AssistantProgressCallback for NoopProgressCallback {}

/// Alias for the type stored in [`crate::config::AssistantConfig`].
pub type ProgressCallback = Arc<dyn AssistantProgressCallback>;
