//! The assistant session: one place that wires viewer, rasteriser, prompt
//! builder, transport, and response pipeline together.
//!
//! ```text
//! viewer ──▶ resolve ──▶ render ──▶ encode ──▶ prompt ──▶ transport ──▶ parse
//!                                      │
//!                                      └──▶ page context (reused by lookups)
//! ```
//!
//! Each user action (page analysis, word lookup) has its own [`RequestGate`]:
//! while one request of a kind is pending, another of the same kind fails
//! fast with [`AssistantError::Busy`]. The two kinds do not block each other.

use crate::config::AssistantConfig;
use crate::error::AssistantError;
use crate::output::{PageAnalysis, WordLookup};
use crate::pipeline::encode::{encode_page, EncodedImage};
use crate::pipeline::input::{check_pdf, resolve_document};
use crate::pipeline::llm::{transport_from_config, ModelTransport};
use crate::pipeline::parse_model_text;
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use crate::progress::{Action, NoopProgressCallback, ProgressCallback, Stage};
use crate::prompts::{ModelRequest, PromptMode, CONNECTION_TEST_PROMPT};
use crate::viewer::{snapshot, DocumentViewer, OkularViewer};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Output-token ceiling for the connection test.
const CONNECTION_TEST_MAX_TOKENS: u32 = 50;

/// Admits at most one in-flight request of one kind.
#[derive(Debug)]
pub struct RequestGate {
    action: Action,
    busy: AtomicBool,
}

/// Releases its gate when dropped, including on error and panic.
#[derive(Debug)]
pub struct GatePass<'a> {
    gate: &'a RequestGate,
}

impl RequestGate {
    pub fn new(action: Action) -> Self {
        Self {
            action,
            busy: AtomicBool::new(false),
        }
    }

    /// Enter the gate, or fail with [`AssistantError::Busy`].
    pub fn try_enter(&self) -> Result<GatePass<'_>, AssistantError> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| GatePass { gate: self })
            .map_err(|_| AssistantError::Busy {
                action: self.action.as_str(),
            })
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}

impl Drop for GatePass<'_> {
    fn drop(&mut self) {
        self.gate.busy.store(false, Ordering::Release);
    }
}

/// The most recently rendered page, kept as context for word lookups.
#[derive(Debug, Clone, PartialEq)]
pub struct PageContext {
    pub document: PathBuf,
    pub page_number: usize,
    pub image: EncodedImage,
}

/// A running assistant session.
///
/// # Example
///
/// ```rust,no_run
/// use pagegloss::{Assistant, AssistantConfig};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), pagegloss::AssistantError> {
/// let config = AssistantConfig::builder().api_key("AIza...").build()?;
/// let assistant = Arc::new(Assistant::new(config)?);
///
/// let analysis = assistant.spawn_analysis().await.expect("task panicked")?;
/// for word in &analysis.words {
///     println!("{}  {}", word.word, word.literal_translation);
/// }
/// # Ok(())
/// # }
/// ```
pub struct Assistant {
    config: AssistantConfig,
    transport: Arc<dyn ModelTransport>,
    viewer: Arc<dyn DocumentViewer>,
    rasterizer: Arc<dyn PageRasterizer>,
    progress: ProgressCallback,
    analysis_gate: RequestGate,
    lookup_gate: RequestGate,
    context: Mutex<Option<PageContext>>,
}

impl Assistant {
    /// Build a session with the configured transport, the Okular viewer, and
    /// the pdfium rasteriser.
    pub fn new(config: AssistantConfig) -> Result<Self, AssistantError> {
        let transport = transport_from_config(&config)?;
        let viewer = Arc::new(OkularViewer::new(
            config.viewer_service_prefix.clone(),
            config.viewer_object_path.clone(),
        ));
        let rasterizer = Arc::new(PdfiumRasterizer::new(
            config.max_rendered_pixels,
            config.password.clone(),
        ));
        Ok(Self::with_components(config, transport, viewer, rasterizer))
    }

    /// Build a session from explicit collaborators.
    pub fn with_components(
        config: AssistantConfig,
        transport: Arc<dyn ModelTransport>,
        viewer: Arc<dyn DocumentViewer>,
        rasterizer: Arc<dyn PageRasterizer>,
    ) -> Self {
        let progress = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        Self {
            config,
            transport,
            viewer,
            rasterizer,
            progress,
            analysis_gate: RequestGate::new(Action::PageAnalysis),
            lookup_gate: RequestGate::new(Action::WordLookup),
            context: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// The page a lookup would currently use as context.
    pub fn page_context(&self) -> Option<PageContext> {
        self.context.lock().ok().and_then(|c| c.clone())
    }

    /// Forget the cached page; the next lookup renders the viewer's page.
    pub fn clear_page_context(&self) {
        if let Ok(mut c) = self.context.lock() {
            *c = None;
        }
    }

    pub fn is_busy(&self, action: Action) -> bool {
        match action {
            Action::PageAnalysis => self.analysis_gate.is_busy(),
            Action::WordLookup => self.lookup_gate.is_busy(),
            Action::ConnectionTest => false,
        }
    }

    // ── Page analysis ────────────────────────────────────────────────────

    /// Analyse the page currently shown in the viewer.
    pub async fn analyze_current_page(&self) -> Result<PageAnalysis, AssistantError> {
        let _pass = self.analysis_gate.try_enter()?;
        let result = async {
            self.stage(Action::PageAnalysis, Stage::QueryingViewer);
            let snap = snapshot(self.viewer.as_ref()).await?;
            let document = resolve_document(&snap.document)?;
            self.analyze_inner(document, snap.page).await
        }
        .await;
        self.report(Action::PageAnalysis, result, analysis_summary)
    }

    /// Analyse `page_number` (1-based) of `document` without asking the viewer.
    pub async fn analyze_page(
        &self,
        document: &Path,
        page_number: usize,
    ) -> Result<PageAnalysis, AssistantError> {
        let _pass = self.analysis_gate.try_enter()?;
        let result = async {
            let document = check_pdf(document)?;
            self.analyze_inner(document, page_number).await
        }
        .await;
        self.report(Action::PageAnalysis, result, analysis_summary)
    }

    async fn analyze_inner(
        &self,
        document: PathBuf,
        page_number: usize,
    ) -> Result<PageAnalysis, AssistantError> {
        let start = Instant::now();
        info!("Analysing {} page {}", document.display(), page_number);

        let context = self
            .render_context(Action::PageAnalysis, document, page_number)
            .await?;
        let request = self.config.prompts.build_request(
            PromptMode::PageAnalysis,
            context.image.clone(),
            self.config.page_max_output_tokens,
        )?;

        self.stage(Action::PageAnalysis, Stage::AwaitingModel);
        let response = self.transport.send(&request).await?;
        debug!(
            "Model reply: {} chars, {} prompt / {} completion tokens",
            response.text.chars().count(),
            response.prompt_tokens,
            response.completion_tokens
        );

        self.stage(Action::PageAnalysis, Stage::Parsing);
        let parsed = parse_model_text(&response.text)?;

        let analysis = PageAnalysis {
            document: context.document,
            page_number: context.page_number,
            words: parsed.words,
            page_summary: parsed.page_summary,
            truncated: parsed.truncated,
            usage: response.usage(),
            duration_ms: start.elapsed().as_millis() as u64,
        };
        info!(
            "Found {} words on page {} ({} ms)",
            analysis.words.len(),
            analysis.page_number,
            analysis.duration_ms
        );
        Ok(analysis)
    }

    // ── Word lookup ──────────────────────────────────────────────────────

    /// Look up whatever is selected in the viewer.
    pub async fn lookup_selection(&self) -> Result<WordLookup, AssistantError> {
        let _pass = self.lookup_gate.try_enter()?;
        let result = async {
            self.stage(Action::WordLookup, Stage::QueryingViewer);
            let selected = self.viewer.selected_text().await?;
            if selected.trim().is_empty() {
                return Err(AssistantError::NoSelection);
            }
            self.lookup_inner(&selected).await
        }
        .await;
        self.report(Action::WordLookup, result, lookup_summary)
    }

    /// Look up `word` in the context of the most recently rendered page.
    ///
    /// When no page has been rendered yet, the viewer's current page is
    /// rendered first and kept as context.
    pub async fn lookup_word(&self, word: &str) -> Result<WordLookup, AssistantError> {
        let _pass = self.lookup_gate.try_enter()?;
        let result = self.lookup_inner(word).await;
        self.report(Action::WordLookup, result, lookup_summary)
    }

    async fn lookup_inner(&self, word: &str) -> Result<WordLookup, AssistantError> {
        let start = Instant::now();
        let query = word.trim().to_string();
        // Template problems surface before any rendering work.
        self.config
            .prompts
            .render(PromptMode::WordLookup { word: &query })?;
        info!("Looking up '{}'", query);

        let context = match self.page_context() {
            Some(context) => context,
            None => {
                self.stage(Action::WordLookup, Stage::QueryingViewer);
                let snap = snapshot(self.viewer.as_ref()).await?;
                let document = resolve_document(&snap.document)?;
                self.render_context(Action::WordLookup, document, snap.page)
                    .await?
            }
        };

        let request = self.config.prompts.build_request(
            PromptMode::WordLookup { word: &query },
            context.image,
            self.config.lookup_max_output_tokens,
        )?;

        self.stage(Action::WordLookup, Stage::AwaitingModel);
        let response = self.transport.send(&request).await?;

        self.stage(Action::WordLookup, Stage::Parsing);
        let parsed = parse_model_text(&response.text)?;

        Ok(WordLookup {
            query,
            annotation: parsed.words.into_iter().next(),
            truncated: parsed.truncated,
            usage: response.usage(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    // ── Connection test ──────────────────────────────────────────────────

    /// Send a tiny text-only prompt and return the model's reply.
    pub async fn test_connection(&self) -> Result<String, AssistantError> {
        let request = ModelRequest {
            prompt: CONNECTION_TEST_PROMPT.to_string(),
            image: None,
            max_output_tokens: CONNECTION_TEST_MAX_TOKENS,
        };
        self.stage(Action::ConnectionTest, Stage::AwaitingModel);
        let result = self
            .transport
            .send(&request)
            .await
            .map(|r| r.text.trim().to_string())
            .map_err(AssistantError::from);
        self.report(Action::ConnectionTest, result, |reply| reply.clone())
    }

    // ── Background tasks ─────────────────────────────────────────────────

    /// Run [`Self::analyze_current_page`] as a tokio task.
    pub fn spawn_analysis(self: &Arc<Self>) -> JoinHandle<Result<PageAnalysis, AssistantError>> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.analyze_current_page().await })
    }

    /// Run [`Self::lookup_selection`] (no `word`) or [`Self::lookup_word`] as
    /// a tokio task.
    pub fn spawn_lookup(
        self: &Arc<Self>,
        word: Option<String>,
    ) -> JoinHandle<Result<WordLookup, AssistantError>> {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match word {
                Some(word) => this.lookup_word(&word).await,
                None => this.lookup_selection().await,
            }
        })
    }

    // ── Helpers ──────────────────────────────────────────────────────────

    /// Render and encode a page, and keep it as lookup context.
    async fn render_context(
        &self,
        action: Action,
        document: PathBuf,
        page_number: usize,
    ) -> Result<PageContext, AssistantError> {
        self.stage(action, Stage::RenderingPage { page: page_number });
        let image = self
            .rasterizer
            .render_page(&document, page_number, self.config.dpi)
            .await?;

        self.stage(action, Stage::Encoding);
        let image = encode_page(&image, self.config.image_encoding)?;
        debug!(
            "Encoded page {} as {} ({} base64 bytes)",
            page_number,
            image.mime_type,
            image.data.len()
        );

        let context = PageContext {
            document,
            page_number,
            image,
        };
        if let Ok(mut cached) = self.context.lock() {
            *cached = Some(context.clone());
        }
        Ok(context)
    }

    fn stage(&self, action: Action, stage: Stage) {
        debug!("{}: {}", action, stage);
        self.progress.on_stage(action, &stage);
    }

    fn report<T>(
        &self,
        action: Action,
        result: Result<T, AssistantError>,
        summary: impl FnOnce(&T) -> String,
    ) -> Result<T, AssistantError> {
        match &result {
            Ok(value) => self.progress.on_complete(action, &summary(value)),
            Err(e) => {
                info!("{} failed: {}", action, e);
                self.progress.on_error(action, &e.to_string());
            }
        }
        result
    }
}

fn analysis_summary(a: &PageAnalysis) -> String {
    let mut s = match a.words.len() {
        1 => "1 word".to_string(),
        n => format!("{n} words"),
    };
    if a.truncated {
        s.push_str(" (response truncated)");
    }
    s
}

fn lookup_summary(l: &WordLookup) -> String {
    match &l.annotation {
        Some(a) if !a.literal_translation.is_empty() => {
            format!("{}: {}", a.word, a.literal_translation)
        }
        Some(a) => a.word.clone(),
        None => format!("No results for '{}'", l.query),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_admits_one_pass_at_a_time() {
        let gate = RequestGate::new(Action::WordLookup);
        let pass = gate.try_enter().unwrap();
        assert!(gate.is_busy());
        assert!(matches!(
            gate.try_enter(),
            Err(AssistantError::Busy { action: "word lookup" })
        ));
        drop(pass);
        assert!(!gate.is_busy());
        assert!(gate.try_enter().is_ok());
    }

    #[test]
    fn summaries_read_naturally() {
        let mut a = PageAnalysis {
            document: PathBuf::from("/b.pdf"),
            page_number: 1,
            words: vec![Default::default()],
            page_summary: None,
            truncated: false,
            usage: Default::default(),
            duration_ms: 0,
        };
        assert_eq!(analysis_summary(&a), "1 word");
        a.truncated = true;
        a.words.push(Default::default());
        assert_eq!(analysis_summary(&a), "2 words (response truncated)");

        let l = WordLookup {
            query: "அ".into(),
            annotation: None,
            truncated: false,
            usage: Default::default(),
            duration_ms: 0,
        };
        assert_eq!(lookup_summary(&l), "No results for 'அ'");
    }
}
