//! Model transport: the seam between the session and whatever answers the
//! prompt.
//!
//! [`ModelTransport`] takes a fully built [`ModelRequest`] and returns the
//! model's raw text plus token usage. Two implementations exist:
//!
//! * [`GeminiTransport`](super::gemini::GeminiTransport), direct REST calls
//!   to the Gemini `generateContent` endpoint (the default);
//! * [`ProviderTransport`], any `edgequake-llm` provider (OpenAI, Anthropic,
//!   Ollama, …).
//!
//! Failures are terminal. Nothing here retries: the user pressed a button and
//! is waiting, so a failed request is reported and the user presses again.

use crate::config::AssistantConfig;
use crate::error::{AssistantError, TransportError};
use crate::output::ModelResponse;
use crate::prompts::ModelRequest;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider, ProviderFactory};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::gemini::GeminiTransport;

/// Sends one request to a vision model.
///
/// Object-safe so a session can hold `Arc<dyn ModelTransport>` and tests can
/// substitute a scripted implementation.
pub trait ModelTransport: Send + Sync {
    /// Short label for logs and status lines.
    fn name(&self) -> &str;

    /// Send `request` and wait for the complete answer.
    fn send<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> BoxFuture<'a, Result<ModelResponse, TransportError>>;
}

/// Pick the transport named by `config.provider_name`.
///
/// `None` or `"gemini"` selects the REST transport, which needs an API key.
/// Anything else is handed to [`ProviderFactory::create_llm_provider`], which
/// reads the provider's own key variable (`OPENAI_API_KEY`, …).
pub fn transport_from_config(
    config: &AssistantConfig,
) -> Result<Arc<dyn ModelTransport>, AssistantError> {
    if config.uses_gemini_transport() {
        return Ok(Arc::new(GeminiTransport::new(config)?));
    }

    let name = config.provider_name.as_deref().unwrap_or_default();
    let provider = ProviderFactory::create_llm_provider(name, &config.model).map_err(|e| {
        AssistantError::ProviderNotConfigured {
            provider: name.to_string(),
            hint: format!("{e}"),
        }
    })?;
    info!("Using {} provider, model {}", name, config.model);
    Ok(Arc::new(ProviderTransport::new(name, provider, config)))
}

/// Adapts an `edgequake-llm` provider to [`ModelTransport`].
pub struct ProviderTransport {
    name: String,
    provider: Arc<dyn LLMProvider>,
    temperature: f32,
    timeout_secs: u64,
}

impl ProviderTransport {
    pub fn new(
        name: impl Into<String>,
        provider: Arc<dyn LLMProvider>,
        config: &AssistantConfig,
    ) -> Self {
        Self {
            name: name.into(),
            provider,
            temperature: config.temperature,
            timeout_secs: config.request_timeout_secs,
        }
    }

    async fn send_inner(&self, request: &ModelRequest) -> Result<ModelResponse, TransportError> {
        let start = Instant::now();
        let images: Vec<ImageData> = request
            .image
            .iter()
            .map(|img| ImageData::new(img.data.clone(), img.mime_type.clone()))
            .collect();
        let messages = vec![ChatMessage::user_with_images(&request.prompt, images)];
        let options = build_options(self.temperature, request.max_output_tokens);

        let response = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.provider.chat(&messages, Some(&options)),
        )
        .await
        .map_err(|_| TransportError::Timeout {
            secs: self.timeout_secs,
        })?
        .map_err(|e| TransportError::ProviderFailure {
            provider: self.name.clone(),
            detail: e.to_string(),
        })?;

        debug!(
            "{}: {} input tokens, {} output tokens, {:?}",
            self.name,
            response.prompt_tokens,
            response.completion_tokens,
            start.elapsed()
        );

        if response.content.trim().is_empty() {
            return Err(TransportError::EmptyResponse);
        }

        Ok(ModelResponse {
            text: response.content,
            prompt_tokens: u32::try_from(response.prompt_tokens).unwrap_or(u32::MAX),
            completion_tokens: u32::try_from(response.completion_tokens).unwrap_or(u32::MAX),
        })
    }
}

impl ModelTransport for ProviderTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn send<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> BoxFuture<'a, Result<ModelResponse, TransportError>> {
        self.send_inner(request).boxed()
    }
}

fn build_options(temperature: f32, max_tokens: u32) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(temperature),
        max_tokens: Some(max_tokens as usize),
        ..Default::default()
    }
}
