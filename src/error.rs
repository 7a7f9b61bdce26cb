//! Error types for the pagegloss library.
//!
//! Errors are layered the same way the request flows:
//!
//! * [`TemplateError`]: the prompt could not be built (bad custom template).
//! * [`TransportError`]: the model call itself failed: timeout, connection,
//!   non-2xx status, an envelope without text. The response pipeline never
//!   runs after one of these.
//! * [`ParseError`]: the model answered, but its text could not be turned
//!   into annotation records.
//! * [`AssistantError`]: what a session operation returns. It wraps the three
//!   above and adds the failures of the surrounding collaborators (viewer,
//!   rasteriser, configuration).
//!
//! Every failure is terminal for the request that produced it. The `Display`
//! text is short enough to show in a status line as-is.

use std::path::PathBuf;
use thiserror::Error;

/// Maximum number of characters of offending text carried in diagnostics.
pub const EXCERPT_CHARS: usize = 200;

/// Take the first [`EXCERPT_CHARS`] characters of `text` (not bytes, so
/// multi-byte scripts are never split mid-character).
pub fn excerpt(text: &str) -> String {
    text.chars().take(EXCERPT_CHARS).collect()
}

/// The prompt template could not be turned into a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    /// The word-lookup template has nowhere to put the target word.
    #[error("Word lookup template has no '{placeholder}' placeholder")]
    MissingPlaceholder { placeholder: &'static str },

    /// Lookup requested for an empty (or whitespace-only) word.
    #[error("Nothing to look up: the target word is empty")]
    EmptyWord,
}

/// Transport-level failure of a single model call. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// No complete response within the configured request timeout.
    #[error("Request timed out after {secs}s. Check your internet connection.")]
    Timeout { secs: u64 },

    /// DNS, TLS, refused connection, reset mid-body, …
    #[error("Connection error: {detail}")]
    ConnectionFailure { detail: String },

    /// The endpoint answered with a non-2xx status.
    #[error("Model API error: HTTP {status_code} - {body_excerpt}")]
    HttpError {
        status_code: u16,
        body_excerpt: String,
    },

    /// 2xx, but the envelope lacks `candidates` / `content` / `parts`.
    #[error("Malformed model response: {detail}")]
    MalformedEnvelope { detail: String },

    /// The envelope was well-formed but all returned text was blank.
    #[error("Empty response from model")]
    EmptyResponse,

    /// A non-Gemini provider (via edgequake-llm) reported a failure.
    #[error("Provider '{provider}' failed: {detail}")]
    ProviderFailure { provider: String, detail: String },
}

/// The model's text could not be normalised into annotation records.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Neither `[` nor `{` appears anywhere in the response.
    #[error("No JSON found in model response")]
    NoJsonFound,

    /// Parsing failed and truncation repair could not salvage anything.
    #[error("Failed to parse model JSON: {reason}\nResponse preview: {excerpt}")]
    UnrecoverableJson { reason: String, excerpt: String },

    /// Valid JSON, but neither an object nor an array of objects.
    #[error("Unexpected response format: expected an object or an array of objects, got {found}")]
    UnexpectedShape { found: String },
}

/// All errors returned by [`crate::assistant::Assistant`] operations.
#[derive(Debug, Error)]
pub enum AssistantError {
    // ── Request pipeline ──────────────────────────────────────────────────
    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A request of the same kind is still in flight.
    #[error("A {action} request is already running; wait for it to finish")]
    Busy { action: &'static str },

    // ── Document viewer ───────────────────────────────────────────────────
    /// The viewer is not running or its service could not be reached.
    #[error("Document viewer unavailable: {detail}")]
    ViewerUnavailable { detail: String },

    /// The viewer kept changing page while it was being queried.
    #[error("Document viewer gave inconsistent answers after {attempts} attempts")]
    ViewerInconsistent { attempts: u32 },

    /// Lookup requested but nothing is selected in the viewer.
    #[error("No text selected in the document viewer")]
    NoSelection,

    // ── Document / rasterisation ──────────────────────────────────────────
    #[error("PDF file not found: '{path}'")]
    DocumentNotFound { path: PathBuf },

    #[error("Permission denied reading '{path}'")]
    PermissionDenied { path: PathBuf },

    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    #[error("PDF '{path}' is encrypted and requires a password")]
    PasswordRequired { path: PathBuf },

    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    #[error("Failed to render page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    #[error("Failed to encode page image: {0}")]
    ImageEncoding(#[from] image::ImageError),

    #[error(
        "Failed to bind to pdfium library: {0}\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium or install pdfium system-wide."
    )]
    PdfiumBindingFailed(String),

    // ── Configuration ─────────────────────────────────────────────────────
    /// The transport cannot be built (missing API key, unknown provider).
    #[error("Model provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read configuration file '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file '{path}': {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    // ── Catch-all ─────────────────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssistantError {
    /// True for failures of the model call itself (as opposed to the
    /// pipeline or a local collaborator).
    pub fn is_transport(&self) -> bool {
        matches!(self, AssistantError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_error_display() {
        let e = TransportError::HttpError {
            status_code: 429,
            body_excerpt: "RESOURCE_EXHAUSTED".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("429"), "got: {msg}");
        assert!(msg.contains("RESOURCE_EXHAUSTED"));
    }

    #[test]
    fn timeout_display() {
        let e = TransportError::Timeout { secs: 60 };
        assert!(e.to_string().contains("60s"));
    }

    #[test]
    fn excerpt_counts_characters_not_bytes() {
        let tamil = "அ".repeat(300);
        let e = excerpt(&tamil);
        assert_eq!(e.chars().count(), EXCERPT_CHARS);
        assert_eq!(excerpt("short"), "short");
    }

    #[test]
    fn layered_errors_convert_into_assistant_error() {
        let e: AssistantError = ParseError::NoJsonFound.into();
        assert!(matches!(e, AssistantError::Parse(ParseError::NoJsonFound)));
        assert!(!e.is_transport());

        let e: AssistantError = TransportError::EmptyResponse.into();
        assert!(e.is_transport());
        assert_eq!(e.to_string(), "Empty response from model");
    }

    #[test]
    fn busy_display_names_action() {
        let e = AssistantError::Busy {
            action: "page analysis",
        };
        assert!(e.to_string().contains("page analysis"));
    }
}
