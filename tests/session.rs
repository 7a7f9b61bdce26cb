//! Session tests with scripted collaborators.
//!
//! The viewer, rasteriser, and transport are replaced by in-memory fakes so
//! the whole request flow (snapshot → render → encode → prompt → send →
//! parse) runs without Okular, pdfium, or the network.

use futures::future::BoxFuture;
use futures::FutureExt;
use image::DynamicImage;
use pagegloss::{
    Action, Assistant, AssistantConfig, AssistantError, AssistantProgressCallback,
    DocumentViewer, ModelRequest, ModelResponse, ModelTransport, PageRasterizer, ParseError,
    Stage, TemplateError, TransportError,
};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Fakes ────────────────────────────────────────────────────────────────────

const PAGE_REPLY: &str = "Sure! Here's the analysis:\n```json\n\
    [{\"tamil_word\":\"வணக்கம்\",\"literal_translation\":\"hello\",\
    \"contextual_meaning\":\"greeting\",\"sentence_context\":\"வணக்கம் தம்பி\"}]\n```";

const LOOKUP_REPLY: &str = "{\"tamil_word\":\"தம்பி\",\"literal_translation\":\"younger brother\",\
    \"contextual_meaning\":\"affectionate address\",\"sentence_context\":\"வணக்கம் தம்பி\",\
    \"grammar_notes\":\"noun, vocative use\"}";

struct FakeViewer {
    document: String,
    page: usize,
    selection: String,
}

impl DocumentViewer for FakeViewer {
    fn current_page(&self) -> BoxFuture<'_, Result<usize, AssistantError>> {
        let page = self.page;
        async move { Ok(page) }.boxed()
    }

    fn current_document(&self) -> BoxFuture<'_, Result<String, AssistantError>> {
        let doc = self.document.clone();
        async move { Ok(doc) }.boxed()
    }

    fn selected_text(&self) -> BoxFuture<'_, Result<String, AssistantError>> {
        let sel = self.selection.clone();
        async move { Ok(sel) }.boxed()
    }
}

#[derive(Default)]
struct FakeRasterizer {
    renders: AtomicUsize,
}

impl PageRasterizer for FakeRasterizer {
    fn render_page<'a>(
        &'a self,
        _document: &'a Path,
        _page_number: usize,
        _dpi: u32,
    ) -> BoxFuture<'a, Result<DynamicImage, AssistantError>> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        async { Ok(DynamicImage::new_rgb8(8, 8)) }.boxed()
    }
}

/// Answers page prompts with `page_reply` and lookup prompts with
/// `LOOKUP_REPLY`, after an optional delay.
struct ScriptedTransport {
    page_reply: Result<String, TransportError>,
    delay: Duration,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedTransport {
    fn replying(page_reply: &str) -> Self {
        Self {
            page_reply: Ok(page_reply.to_string()),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn failing(err: TransportError) -> Self {
        Self {
            page_reply: Err(err),
            delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn sent(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl ModelTransport for ScriptedTransport {
    fn name(&self) -> &str {
        "scripted"
    }

    fn send<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> BoxFuture<'a, Result<ModelResponse, TransportError>> {
        self.requests.lock().unwrap().push(request.clone());
        async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            let text = if request.prompt.contains("grammar_notes") {
                Ok(LOOKUP_REPLY.to_string())
            } else if request.image.is_none() {
                Ok("API is working!".to_string())
            } else {
                self.page_reply.clone()
            }?;
            Ok(ModelResponse {
                text,
                prompt_tokens: 1200,
                completion_tokens: 80,
            })
        }
        .boxed()
    }
}

#[derive(Default)]
struct RecordingProgress {
    events: Mutex<Vec<String>>,
}

impl AssistantProgressCallback for RecordingProgress {
    fn on_stage(&self, action: Action, stage: &Stage) {
        self.events.lock().unwrap().push(format!("{action}: {stage}"));
    }
    fn on_complete(&self, action: Action, summary: &str) {
        self.events.lock().unwrap().push(format!("{action} done: {summary}"));
    }
    fn on_error(&self, action: Action, error: &str) {
        self.events.lock().unwrap().push(format!("{action} failed: {error}"));
    }
}

struct Fixture {
    assistant: Arc<Assistant>,
    transport: Arc<ScriptedTransport>,
    rasterizer: Arc<FakeRasterizer>,
    progress: Arc<RecordingProgress>,
    _dir: tempfile::TempDir,
}

fn fixture(transport: ScriptedTransport, selection: &str) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let pdf = dir.path().join("reader.pdf");
    std::fs::File::create(&pdf)
        .unwrap()
        .write_all(b"%PDF-1.7\n%stub\n")
        .unwrap();

    let progress = Arc::new(RecordingProgress::default());
    let config = AssistantConfig::builder()
        .api_key("unused")
        .progress_callback(progress.clone())
        .build()
        .unwrap();

    let transport = Arc::new(transport);
    let rasterizer = Arc::new(FakeRasterizer::default());
    let viewer = Arc::new(FakeViewer {
        document: format!("file://{}", pdf.display()),
        page: 3,
        selection: selection.to_string(),
    });

    let assistant = Arc::new(Assistant::with_components(
        config,
        transport.clone(),
        viewer,
        rasterizer.clone(),
    ));
    Fixture {
        assistant,
        transport,
        rasterizer,
        progress,
        _dir: dir,
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_analyze_current_page_end_to_end() {
    let f = fixture(ScriptedTransport::replying(PAGE_REPLY), "");
    let analysis = f.assistant.analyze_current_page().await.unwrap();

    assert_eq!(analysis.page_number, 3);
    assert_eq!(analysis.document_name(), "reader.pdf");
    assert_eq!(analysis.words.len(), 1);
    assert_eq!(analysis.words[0].word, "வணக்கம்");
    assert!(!analysis.truncated);
    assert_eq!(analysis.usage.prompt_tokens, 1200);

    let sent = f.transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].max_output_tokens, 8192);
    assert_eq!(sent[0].image.as_ref().unwrap().mime_type, "image/jpeg");

    let context = f.assistant.page_context().expect("page cached");
    assert_eq!(context.page_number, 3);

    let events = f.progress.events.lock().unwrap().clone();
    assert_eq!(
        events,
        [
            "page analysis: Reading viewer state",
            "page analysis: Rendering page 3",
            "page analysis: Encoding page image",
            "page analysis: Waiting for the model",
            "page analysis: Parsing response",
            "page analysis done: 1 word",
        ]
    );
}

#[tokio::test]
async fn test_lookup_reuses_page_context() {
    let f = fixture(ScriptedTransport::replying(PAGE_REPLY), "");
    f.assistant.analyze_current_page().await.unwrap();
    let lookup = f.assistant.lookup_word(" தம்பி ").await.unwrap();

    assert_eq!(f.rasterizer.renders.load(Ordering::SeqCst), 1);
    assert_eq!(lookup.query, "தம்பி");
    let word = lookup.annotation.unwrap();
    assert_eq!(word.literal_translation, "younger brother");
    assert_eq!(word.grammar_notes.as_deref(), Some("noun, vocative use"));

    let sent = f.transport.sent();
    assert_eq!(sent[1].max_output_tokens, 4096);
    assert!(sent[1].prompt.contains("\"தம்பி\""));
    assert_eq!(sent[0].image, sent[1].image);
}

#[tokio::test]
async fn test_lookup_without_context_renders_current_page() {
    let f = fixture(ScriptedTransport::replying(PAGE_REPLY), "தம்பி");
    let lookup = f.assistant.lookup_selection().await.unwrap();
    assert!(lookup.annotation.is_some());
    assert_eq!(f.rasterizer.renders.load(Ordering::SeqCst), 1);
    assert_eq!(f.assistant.page_context().unwrap().page_number, 3);
}

#[tokio::test]
async fn test_blank_selection_is_no_selection() {
    let f = fixture(ScriptedTransport::replying(PAGE_REPLY), "  \n");
    assert!(matches!(
        f.assistant.lookup_selection().await,
        Err(AssistantError::NoSelection)
    ));
    assert!(f.transport.sent().is_empty());
    assert!(!f.assistant.is_busy(Action::WordLookup));
}

#[tokio::test]
async fn test_empty_word_fails_before_rendering() {
    let f = fixture(ScriptedTransport::replying(PAGE_REPLY), "");
    assert!(matches!(
        f.assistant.lookup_word("   ").await,
        Err(AssistantError::Template(TemplateError::EmptyWord))
    ));
    assert_eq!(f.rasterizer.renders.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_http_error_skips_parsing_and_reports() {
    let f = fixture(
        ScriptedTransport::failing(TransportError::HttpError {
            status_code: 429,
            body_excerpt: "RESOURCE_EXHAUSTED".into(),
        }),
        "",
    );
    let err = f.assistant.analyze_current_page().await.unwrap_err();
    assert!(matches!(
        err,
        AssistantError::Transport(TransportError::HttpError { status_code: 429, .. })
    ));
    assert!(err.is_transport());

    let events = f.progress.events.lock().unwrap().clone();
    assert!(!events.iter().any(|e| e.contains("Parsing")));
    assert!(events.last().unwrap().starts_with("page analysis failed: Model API error: HTTP 429"));
}

#[tokio::test]
async fn test_truncated_reply_is_flagged() {
    let f = fixture(
        ScriptedTransport::replying(r#"[{"tamil_word":"அ","literal_translation":"a"},{"tamil_word":"ஆ","lit"#),
        "",
    );
    let analysis = f.assistant.analyze_current_page().await.unwrap();
    assert_eq!(analysis.words.len(), 1);
    assert!(analysis.truncated);
}

#[tokio::test]
async fn test_unparseable_reply_is_parse_error() {
    let f = fixture(ScriptedTransport::replying("No Tamil text is visible."), "");
    assert!(matches!(
        f.assistant.analyze_current_page().await,
        Err(AssistantError::Parse(ParseError::NoJsonFound))
    ));
}

#[tokio::test]
async fn test_second_analysis_while_pending_is_busy() {
    let mut transport = ScriptedTransport::replying(PAGE_REPLY);
    transport.delay = Duration::from_millis(300);
    let f = fixture(transport, "");

    let first = f.assistant.spawn_analysis();
    while !f.assistant.is_busy(Action::PageAnalysis) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    assert!(matches!(
        f.assistant.analyze_current_page().await,
        Err(AssistantError::Busy { action: "page analysis" })
    ));
    // A different action is not blocked.
    assert!(f.assistant.lookup_word("தம்பி").await.is_ok());

    assert_eq!(first.await.unwrap().unwrap().words.len(), 1);
    assert!(!f.assistant.is_busy(Action::PageAnalysis));
}

#[tokio::test]
async fn test_spawn_lookup_with_word() {
    let f = fixture(ScriptedTransport::replying(PAGE_REPLY), "");
    let lookup = f
        .assistant
        .spawn_lookup(Some("தம்பி".into()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(lookup.annotation.unwrap().word, "தம்பி");
}

#[tokio::test]
async fn test_analyze_page_rejects_non_pdf() {
    let f = fixture(ScriptedTransport::replying(PAGE_REPLY), "");
    let dir = tempfile::tempdir().unwrap();
    let fake = dir.path().join("notes.pdf");
    std::fs::write(&fake, b"hello").unwrap();
    assert!(matches!(
        f.assistant.analyze_page(&fake, 1).await,
        Err(AssistantError::NotAPdf { .. })
    ));
    assert_eq!(f.rasterizer.renders.load(Ordering::SeqCst), 0);
}

#[test]
fn test_connection_sends_text_only_prompt() {
    let f = fixture(ScriptedTransport::replying(PAGE_REPLY), "");
    let reply = tokio_test::block_on(f.assistant.test_connection()).unwrap();
    assert_eq!(reply, "API is working!");

    let sent = f.transport.sent();
    assert!(sent[0].image.is_none());
    assert_eq!(sent[0].max_output_tokens, 50);
}

#[test]
fn test_assistant_is_send_sync() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<Assistant>();
}
