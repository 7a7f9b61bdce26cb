//! CLI binary for pagegloss.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AssistantConfig`, runs one action, and prints the result.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pagegloss::{
    Action, Assistant, AssistantConfig, AssistantConfigBuilder, AssistantProgressCallback,
    PageAnalysis, ProgressCallback, Stage, WordAnnotation, WordLookup,
};
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner on stderr whose message follows the request's stages.
struct CliSpinner {
    bar: ProgressBar,
    ticking: Once,
}

impl CliSpinner {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        Arc::new(Self {
            bar,
            ticking: Once::new(),
        })
    }
}

impl AssistantProgressCallback for CliSpinner {
    fn on_stage(&self, action: Action, stage: &Stage) {
        self.ticking
            .call_once(|| self.bar.enable_steady_tick(Duration::from_millis(80)));
        self.bar.set_prefix(action.to_string());
        self.bar.set_message(format!("{stage}…"));
    }

    fn on_complete(&self, _action: Action, summary: &str) {
        self.bar.finish_and_clear();
        eprintln!("{} {}", green("✔"), bold(summary));
    }

    fn on_error(&self, action: Action, error: &str) {
        self.bar.finish_and_clear();
        let first_line = error.lines().next().unwrap_or(error);
        eprintln!("{} {} failed: {}", red("✘"), action, first_line);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Gloss the page currently open in Okular
  pagegloss analyze

  # Gloss page 12 of a file, without a viewer
  pagegloss analyze --pdf reader.pdf --page 12

  # Look up the word selected in Okular
  pagegloss lookup

  # Look up a word in the context of the current page
  pagegloss lookup வணக்கம்

  # Show the effective configuration and any problems
  pagegloss check-config

  # Verify the API key with a tiny request
  pagegloss ping

CONFIGURATION FILE (~/.config/pagegloss/config.toml):
  [gemini]
  api_key = "AIza..."
  model   = "gemini-2.0-flash-exp"

  [render]
  dpi = 200

  [prompts]
  page_analysis_file = "page_analysis.txt"
  word_lookup_file   = "word_lookup.txt"     # must contain {word}

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY     Google Gemini API key (overrides the config file)
  OPENAI_API_KEY     Used with --provider openai
  ANTHROPIC_API_KEY  Used with --provider anthropic
  PDFIUM_LIB_PATH    Path to an existing libpdfium
  RUST_LOG           Log filter (overrides --verbose / --quiet)

SETUP:
  1. Get a key:  https://aistudio.google.com/apikey
  2. export GEMINI_API_KEY=AIza...
  3. Open a PDF in Okular and run: pagegloss analyze
"#;

/// Gloss the PDF page you are reading with a Vision Language Model.
#[derive(Parser, Debug)]
#[command(
    name = "pagegloss",
    version,
    about = "Gloss the PDF page you are reading with a Vision Language Model",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (default: ~/.config/pagegloss/config.toml).
    #[arg(long, global = true, env = "PAGEGLOSS_CONFIG")]
    config: Option<PathBuf>,

    /// Gemini API key.
    #[arg(long, global = true, env = "GEMINI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model ID (e.g. gemini-2.0-flash-exp, gemini-2.5-pro).
    #[arg(long, global = true)]
    model: Option<String>,

    /// Provider: gemini (default), openai, anthropic, ollama.
    #[arg(long, global = true)]
    provider: Option<String>,

    /// Rendering DPI (72–400).
    #[arg(long, global = true, value_parser = clap::value_parser!(u32).range(72..=400))]
    dpi: Option<u32>,

    /// Print the result as JSON.
    #[arg(long, global = true)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, global = true)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except results and errors.
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Annotate every word on a page.
    Analyze {
        /// PDF to read instead of asking the viewer.
        #[arg(long, requires = "page")]
        pdf: Option<PathBuf>,

        /// 1-based page number (with --pdf).
        #[arg(long, requires = "pdf", value_parser = clap::value_parser!(u64).range(1..))]
        page: Option<u64>,
    },
    /// Explain one word in the context of the current page.
    Lookup {
        /// Word to look up (default: the viewer's selection).
        word: Option<String>,
    },
    /// Show the effective configuration and report problems.
    CheckConfig,
    /// Send a tiny request to verify the key and model.
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner already reports each stage; keep INFO logs out of its way.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress: Option<ProgressCallback> = if show_progress && !matches!(cli.command, Command::CheckConfig) {
        Some(CliSpinner::new() as ProgressCallback)
    } else {
        None
    };
    let config = build_config(&cli, progress)?;

    match &cli.command {
        Command::CheckConfig => check_config(&config)?,
        Command::Analyze { pdf, page } => {
            let assistant = start(config)?;
            let analysis = match (pdf, page) {
                (Some(pdf), Some(page)) => {
                    assistant.analyze_page(pdf, *page as usize).await
                }
                _ => assistant.analyze_current_page().await,
            }
            .context("Page analysis failed")?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&analysis).context("Failed to serialise output")?
                );
            } else {
                print_analysis(&analysis);
            }
            if !cli.quiet && !cli.json {
                print_usage_line(analysis.usage.prompt_tokens, analysis.usage.completion_tokens, analysis.duration_ms);
            }
        }
        Command::Lookup { word } => {
            let assistant = start(config)?;
            let lookup = match word {
                Some(word) => assistant.lookup_word(word).await,
                None => assistant.lookup_selection().await,
            }
            .context("Word lookup failed")?;

            if cli.json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&lookup).context("Failed to serialise output")?
                );
            } else {
                print_lookup(&lookup);
            }
            if !cli.quiet && !cli.json {
                print_usage_line(lookup.usage.prompt_tokens, lookup.usage.completion_tokens, lookup.duration_ms);
            }
        }
        Command::Ping => {
            let assistant = start(config)?;
            let reply = assistant
                .test_connection()
                .await
                .context("Connection test failed")?;
            if cli.json {
                println!("{}", serde_json::json!({ "reply": reply }));
            } else {
                println!("{reply}");
            }
        }
    }

    Ok(())
}

fn start(config: AssistantConfig) -> Result<Assistant> {
    Assistant::new(config).context("Could not start the assistant")
}

/// Load the config file (explicit or default location), then apply CLI
/// overrides.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AssistantConfig> {
    let path = cli
        .config
        .clone()
        .or_else(|| AssistantConfig::default_path().filter(|p| p.exists()));

    let mut builder: AssistantConfigBuilder = match path {
        Some(path) => AssistantConfig::from_file(&path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => AssistantConfig::builder(),
    };

    if let Some(ref key) = cli.api_key {
        builder = builder.api_key(key);
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(dpi) = cli.dpi {
        builder = builder.dpi(dpi);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn check_config(config: &AssistantConfig) -> Result<()> {
    println!("{config}");
    println!();
    let problems = config.check();
    if problems.is_empty() {
        println!("{} Configuration looks good", green("✔"));
        return Ok(());
    }
    for problem in &problems {
        println!("{} {}", red("✘"), problem);
    }
    anyhow::bail!("{} configuration problem(s) found", problems.len())
}

// ── Output ───────────────────────────────────────────────────────────────────

fn print_analysis(analysis: &PageAnalysis) {
    println!(
        "{}  {}",
        bold(&analysis.document_name()),
        dim(&format!("page {}", analysis.page_number))
    );
    if analysis.truncated {
        println!(
            "{} The response was cut short; showing the {} complete entries.",
            cyan("⚠"),
            analysis.words.len()
        );
    }
    println!();

    for (i, word) in analysis.words.iter().enumerate() {
        print!("{:>3}. ", i + 1);
        print_word(word);
    }

    if let Some(summary) = &analysis.page_summary {
        let title = if summary.title.is_empty() {
            "Page summary"
        } else {
            summary.title.as_str()
        };
        println!("{}", bold(title));
        if !summary.summary.is_empty() {
            println!("     {}", summary.summary);
        }
        if !summary.full_text.is_empty() {
            println!();
            for line in summary.full_text.lines() {
                println!("     {}", dim(line));
            }
        }
        println!();
    }
}

fn print_lookup(lookup: &WordLookup) {
    match &lookup.annotation {
        Some(word) => print_word(word),
        None => println!("No results for '{}'", lookup.query),
    }
}

fn print_word(word: &WordAnnotation) {
    println!("{}  {}", bold(&word.word), word.literal_translation);
    if !word.contextual_meaning.is_empty() {
        println!("     {}", word.contextual_meaning);
    }
    if let Some(notes) = word.grammar_notes.as_deref().filter(|n| !n.is_empty()) {
        println!("     {} {}", dim("grammar:"), notes);
    }
    if !word.sentence_context.is_empty() {
        println!("     {}", dim(&format!("« {} »", word.sentence_context)));
    }
    for link in word.reference_links() {
        println!("     {}", cyan(link));
    }
    println!();
}

fn print_usage_line(prompt_tokens: u32, completion_tokens: u32, duration_ms: u64) {
    eprintln!(
        "   {} tokens in  /  {} tokens out  ·  {:.1}s",
        dim(&prompt_tokens.to_string()),
        dim(&completion_tokens.to_string()),
        duration_ms as f64 / 1000.0
    );
}
