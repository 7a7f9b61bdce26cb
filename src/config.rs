//! Configuration for an assistant session.
//!
//! Everything a session needs is carried in one explicit [`AssistantConfig`]
//! value, handed to the transport, prompt builder, and rasteriser when they
//! are constructed. There is no process-wide settings object.
//!
//! Values come from, in increasing priority: built-in defaults, a TOML file
//! ([`AssistantConfig::from_file`]), the `GEMINI_API_KEY` environment
//! variable, and finally whatever the caller sets on the builder.
//!
//! ```toml
//! [gemini]
//! api_key = "AIza..."
//! model   = "gemini-2.0-flash-exp"
//!
//! [render]
//! dpi = 200
//!
//! [prompts]
//! page_analysis_file = "prompts/page_analysis.txt"
//! word_lookup_file   = "prompts/word_lookup.txt"
//!
//! [viewer]
//! service_prefix = "org.kde.okular"
//! object_path    = "/okular"
//! ```

use crate::error::AssistantError;
use crate::progress::ProgressCallback;
use crate::prompts::{PromptTemplates, WORD_PLACEHOLDER};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default Gemini REST base URL.
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default model.
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Environment variable that overrides the configured API key.
pub const API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Configuration for a [`crate::assistant::Assistant`] session.
///
/// Built via [`AssistantConfig::builder()`], [`AssistantConfig::from_file`],
/// or [`AssistantConfig::default()`].
///
/// # Example
/// ```rust
/// use pagegloss::AssistantConfig;
///
/// let config = AssistantConfig::builder()
///     .api_key("test-key")
///     .dpi(150)
///     .request_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 150);
/// ```
#[derive(Clone)]
pub struct AssistantConfig {
    /// API key sent as the `key` query parameter. Empty means "not set".
    pub api_key: String,

    /// Model identifier. Default: `gemini-2.0-flash-exp`.
    pub model: String,

    /// REST base URL; `{api_base}/models/{model}:generateContent` is called.
    pub api_base: String,

    /// `None` or `"gemini"` uses the built-in REST transport. Any other name
    /// (`"openai"`, `"anthropic"`, `"ollama"`, …) goes through edgequake-llm.
    pub provider_name: Option<String>,

    /// Sampling temperature. Default: 0.2.
    pub temperature: f32,

    /// Output-token ceiling for page analysis. Default: 8192.
    ///
    /// A dense page easily runs to 60+ records; when the ceiling is hit the
    /// answer stops mid-record and only the complete prefix is kept.
    pub page_max_output_tokens: u32,

    /// Output-token ceiling for word lookup. Default: 4096.
    pub lookup_max_output_tokens: u32,

    /// Per-request timeout in seconds. Default: 60.
    pub request_timeout_secs: u64,

    /// Rendering DPI. Range: 72–400. Default: 200.
    pub dpi: u32,

    /// Cap on either rendered dimension in pixels. Default: 3000.
    pub max_rendered_pixels: u32,

    /// How page images are encoded for the request. Default: JPEG, quality 85.
    pub image_encoding: ImageEncoding,

    /// Password for encrypted PDFs.
    pub password: Option<String>,

    /// Prompt templates in effect (built-in unless overridden).
    pub prompts: PromptTemplates,

    /// D-Bus service name prefix of the viewer. Default: `org.kde.okular`.
    pub viewer_service_prefix: String,

    /// D-Bus object path of the viewer. Default: `/okular`.
    pub viewer_object_path: String,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            provider_name: None,
            temperature: 0.2,
            page_max_output_tokens: 8192,
            lookup_max_output_tokens: 4096,
            request_timeout_secs: 60,
            dpi: 200,
            max_rendered_pixels: 3000,
            image_encoding: ImageEncoding::default(),
            password: None,
            prompts: PromptTemplates::default(),
            viewer_service_prefix: "org.kde.okular".to_string(),
            viewer_object_path: "/okular".to_string(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for AssistantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssistantConfig")
            .field("api_key", &mask_secret(&self.api_key))
            .field("model", &self.model)
            .field("api_base", &self.api_base)
            .field("provider_name", &self.provider_name)
            .field("temperature", &self.temperature)
            .field("page_max_output_tokens", &self.page_max_output_tokens)
            .field("lookup_max_output_tokens", &self.lookup_max_output_tokens)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("image_encoding", &self.image_encoding)
            .field("viewer_service_prefix", &self.viewer_service_prefix)
            .field("viewer_object_path", &self.viewer_object_path)
            .finish()
    }
}

impl fmt::Display for AssistantConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Model:")?;
        writeln!(
            f,
            "  Provider:    {}",
            self.provider_name.as_deref().unwrap_or("gemini")
        )?;
        writeln!(f, "  API Key:     {}", mask_secret(&self.api_key))?;
        writeln!(f, "  Model:       {}", self.model)?;
        writeln!(f, "  Endpoint:    {}", self.api_base)?;
        writeln!(f, "  Timeout:     {}s", self.request_timeout_secs)?;
        writeln!(
            f,
            "  Max tokens:  {} (page) / {} (lookup)",
            self.page_max_output_tokens, self.lookup_max_output_tokens
        )?;
        writeln!(f)?;
        writeln!(f, "Render:")?;
        writeln!(f, "  DPI:         {}", self.dpi)?;
        writeln!(f, "  Max pixels:  {}", self.max_rendered_pixels)?;
        writeln!(f, "  Encoding:    {}", self.image_encoding)?;
        writeln!(f)?;
        writeln!(f, "Viewer:")?;
        writeln!(f, "  Service:     {}*", self.viewer_service_prefix)?;
        write!(f, "  Path:        {}", self.viewer_object_path)
    }
}

/// Show the first 10 and last 4 characters of a secret; short secrets are
/// hidden entirely.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        "(not set)".to_string()
    } else if chars.len() > 14 {
        let head: String = chars[..10].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "***".to_string()
    }
}

impl AssistantConfig {
    /// Create a new builder for `AssistantConfig`.
    pub fn builder() -> AssistantConfigBuilder {
        AssistantConfigBuilder {
            config: Self::default(),
        }
    }

    /// Default configuration file location: `<config_dir>/pagegloss/config.toml`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("pagegloss").join("config.toml"))
    }

    /// Load a TOML configuration file and apply it on top of the defaults,
    /// then apply `GEMINI_API_KEY` from the environment if set.
    ///
    /// Prompt files are resolved relative to the configuration file's
    /// directory. A prompt file that cannot be read is logged and the
    /// built-in template is used instead.
    pub fn from_file(path: impl AsRef<Path>) -> Result<AssistantConfigBuilder, AssistantError> {
        Self::from_file_with_key(path.as_ref(), api_key_from_env())
    }

    fn from_file_with_key(
        path: &Path,
        env_key: Option<String>,
    ) -> Result<AssistantConfigBuilder, AssistantError> {
        let contents = std::fs::read_to_string(path).map_err(|source| AssistantError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile =
            toml::from_str(&contents).map_err(|source| AssistantError::ConfigParse {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Configuration loaded from: {}", path.display());

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let mut builder = Self::builder().apply_file(file, base_dir);
        if let Some(key) = env_key {
            debug!("Using API key from {}", API_KEY_ENV);
            builder = builder.api_key(key);
        }
        Ok(builder)
    }

    /// Problems that will stop requests from working. Empty when the
    /// configuration is usable.
    pub fn check(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if self.uses_gemini_transport() {
            let key = self.api_key.trim();
            if key.is_empty() || key.starts_with("your-") {
                problems.push(format!(
                    "Gemini API key not set.\n\
                     Get a key from https://aistudio.google.com/apikey, then set\n\
                     {API_KEY_ENV} or `api_key` under [gemini] in the config file."
                ));
            }
            if self.model.trim().is_empty() {
                problems.push("Model name is empty".to_string());
            }
        }
        if !self.prompts.word_lookup.contains(WORD_PLACEHOLDER) {
            problems.push(format!(
                "Word lookup prompt has no '{WORD_PLACEHOLDER}' placeholder"
            ));
        }
        problems
    }

    /// True when requests go to the built-in Gemini REST transport.
    pub fn uses_gemini_transport(&self) -> bool {
        self.provider_name
            .as_deref()
            .is_none_or(|p| p.eq_ignore_ascii_case("gemini"))
    }
}

fn api_key_from_env() -> Option<String> {
    std::env::var(API_KEY_ENV).ok().filter(|k| !k.trim().is_empty())
}

/// Builder for [`AssistantConfig`].
#[derive(Debug)]
pub struct AssistantConfigBuilder {
    config: AssistantConfig,
}

impl AssistantConfigBuilder {
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = key.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base(mut self, base: impl Into<String>) -> Self {
        self.config.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn page_max_output_tokens(mut self, n: u32) -> Self {
        self.config.page_max_output_tokens = n;
        self
    }

    pub fn lookup_max_output_tokens(mut self, n: u32) -> Self {
        self.config.lookup_max_output_tokens = n;
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn image_encoding(mut self, encoding: ImageEncoding) -> Self {
        self.config.image_encoding = encoding;
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn page_analysis_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompts.page_analysis = prompt.into();
        self
    }

    pub fn word_lookup_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.prompts.word_lookup = prompt.into();
        self
    }

    pub fn viewer_service_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.viewer_service_prefix = prefix.into();
        self
    }

    pub fn viewer_object_path(mut self, path: impl Into<String>) -> Self {
        self.config.viewer_object_path = path.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    fn apply_file(mut self, file: ConfigFile, base_dir: &Path) -> Self {
        if let Some(g) = file.gemini {
            if let Some(key) = g.api_key {
                self = self.api_key(key);
            }
            if let Some(model) = g.model {
                self = self.model(model);
            }
            if let Some(base) = g.api_base {
                self = self.api_base(base);
            }
            if let Some(provider) = g.provider {
                self = self.provider_name(provider);
            }
            if let Some(t) = g.temperature {
                self = self.temperature(t);
            }
            if let Some(n) = g.page_max_output_tokens {
                self = self.page_max_output_tokens(n);
            }
            if let Some(n) = g.lookup_max_output_tokens {
                self = self.lookup_max_output_tokens(n);
            }
            if let Some(secs) = g.timeout_secs {
                self = self.request_timeout_secs(secs);
            }
        }
        if let Some(r) = file.render {
            if let Some(dpi) = r.dpi {
                self = self.dpi(dpi);
            }
            if let Some(px) = r.max_rendered_pixels {
                self = self.max_rendered_pixels(px);
            }
            if let Some(encoding) = r.encoding {
                self = self.image_encoding(encoding);
            }
        }
        if let Some(p) = file.prompts {
            if let Some(prompt) = p.page_analysis_file.and_then(|f| load_prompt_file(base_dir, &f)) {
                self = self.page_analysis_prompt(prompt);
            }
            if let Some(prompt) = p.word_lookup_file.and_then(|f| load_prompt_file(base_dir, &f)) {
                self = self.word_lookup_prompt(prompt);
            }
        }
        if let Some(v) = file.viewer {
            if let Some(prefix) = v.service_prefix {
                self = self.viewer_service_prefix(prefix);
            }
            if let Some(path) = v.object_path {
                self = self.viewer_object_path(path);
            }
        }
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<AssistantConfig, AssistantError> {
        let c = &self.config;
        if c.dpi < 72 || c.dpi > 400 {
            return Err(AssistantError::InvalidConfig(format!(
                "DPI must be 72–400, got {}",
                c.dpi
            )));
        }
        if c.request_timeout_secs == 0 {
            return Err(AssistantError::InvalidConfig(
                "Request timeout must be ≥ 1 second".into(),
            ));
        }
        if c.page_max_output_tokens == 0 || c.lookup_max_output_tokens == 0 {
            return Err(AssistantError::InvalidConfig(
                "Output token ceilings must be ≥ 1".into(),
            ));
        }
        if let ImageEncoding::Jpeg { quality } = c.image_encoding {
            if !(1..=100).contains(&quality) {
                return Err(AssistantError::InvalidConfig(format!(
                    "JPEG quality must be 1–100, got {quality}"
                )));
            }
        }
        Ok(self.config)
    }
}

/// Read a prompt file relative to `base_dir`. Falls back to the built-in
/// template (returns `None`) when the file is missing or empty.
fn load_prompt_file(base_dir: &Path, file: &Path) -> Option<String> {
    let path = base_dir.join(file);
    match std::fs::read_to_string(&path) {
        Ok(text) if !text.trim().is_empty() => {
            debug!("Loaded prompt from {}", path.display());
            Some(text.trim().to_string())
        }
        Ok(_) => {
            warn!("Prompt file {} is empty; using built-in prompt", path.display());
            None
        }
        Err(e) => {
            warn!(
                "Could not load prompt file {}: {}; using built-in prompt",
                path.display(),
                e
            );
            None
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How page images are encoded before being inlined into a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "lowercase")]
pub enum ImageEncoding {
    /// Lossy, small. Transparency is flattened onto white.
    Jpeg { quality: u8 },
    /// Lossless, large.
    Png,
}

impl Default for ImageEncoding {
    fn default() -> Self {
        ImageEncoding::Jpeg { quality: 85 }
    }
}

impl fmt::Display for ImageEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImageEncoding::Jpeg { quality } => write!(f, "jpeg (quality {quality})"),
            ImageEncoding::Png => write!(f, "png"),
        }
    }
}

// ── File format ──────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    gemini: Option<GeminiSection>,
    render: Option<RenderSection>,
    prompts: Option<PromptsSection>,
    viewer: Option<ViewerSection>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct GeminiSection {
    api_key: Option<String>,
    model: Option<String>,
    api_base: Option<String>,
    provider: Option<String>,
    temperature: Option<f32>,
    page_max_output_tokens: Option<u32>,
    lookup_max_output_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RenderSection {
    dpi: Option<u32>,
    max_rendered_pixels: Option<u32>,
    encoding: Option<ImageEncoding>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PromptsSection {
    page_analysis_file: Option<PathBuf>,
    word_lookup_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct ViewerSection {
    service_prefix: Option<String>,
    object_path: Option<String>,
}
