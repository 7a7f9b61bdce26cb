//! # pagegloss
//!
//! Gloss the PDF page you are reading, word by word, with a Vision Language
//! Model.
//!
//! The assistant asks the document viewer which page is showing, renders it,
//! sends the image to Gemini with an instruction to annotate every word, and
//! turns the reply into [`WordAnnotation`]s: literal translation, meaning in
//! context, and the sentence the word came from. A selected word can be looked
//! up on its own, with grammar notes.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Viewer (Okular)
//!  │
//!  ├─ 1. Snapshot  current document + page, read consistently
//!  ├─ 2. Render    rasterise the page via pdfium (spawn_blocking)
//!  ├─ 3. Encode    JPEG/PNG → base64
//!  ├─ 4. Prompt    page-analysis or word-lookup template
//!  ├─ 5. Model     one generateContent call, no retries
//!  └─ 6. Parse     extract JSON → repair truncation → normalise records
//! ```
//!
//! Model replies are messy: code fences, chatty preambles, HTML entities,
//! and arrays cut off at the output-token ceiling. Step 6 recovers every
//! complete record it can and flags the result as `truncated` when it had to
//! drop a partial one. See [`parse_model_text`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagegloss::{Assistant, AssistantConfig};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // API key from GEMINI_API_KEY
//!     let config = AssistantConfig::builder()
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let assistant = Assistant::new(config)?;
//!
//!     let page = assistant.analyze_page(Path::new("reader.pdf"), 3).await?;
//!     for w in &page.words {
//!         println!("{}  {}  {}", w.word, w.literal_translation, w.contextual_meaning);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pagegloss` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `html-entities` | on | Full HTML entity decoding of model output (html-escape) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pagegloss = { version = "0.1", default-features = false, features = ["html-entities"] }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod assistant;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod viewer;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use assistant::{Assistant, PageContext, RequestGate};
pub use config::{AssistantConfig, AssistantConfigBuilder, ImageEncoding};
pub use error::{AssistantError, ParseError, TemplateError, TransportError};
pub use output::{
    ModelResponse, PageAnalysis, PageSummary, ParsedAnnotations, TokenUsage, WordAnnotation,
    WordLookup,
};
pub use pipeline::encode::EncodedImage;
pub use pipeline::gemini::GeminiTransport;
pub use pipeline::llm::{ModelTransport, ProviderTransport};
pub use pipeline::parse_model_text;
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer};
pub use progress::{Action, AssistantProgressCallback, NoopProgressCallback, ProgressCallback, Stage};
pub use prompts::{ModelRequest, PromptMode, PromptTemplates};
pub use viewer::{DocumentViewer, OkularViewer, ViewerSnapshot};
