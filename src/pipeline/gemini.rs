//! Direct REST transport for the Gemini `generateContent` endpoint.
//!
//! ## Wire format
//!
//! ```text
//! POST {api_base}/models/{model}:generateContent?key=…
//! { "contents": [{ "role": "user",
//!                  "parts": [{ "text": … }, { "inline_data": { "mime_type", "data" } }] }],
//!   "generationConfig": { "temperature", "maxOutputTokens" } }
//!
//! 200 → { "candidates": [{ "content": { "parts": [{ "text": … }, …] } }],
//!         "usageMetadata": { "promptTokenCount", "candidatesTokenCount" } }
//! ```
//!
//! The key travels in the query string, so every `reqwest::Error` is passed
//! through `without_url()` before it can reach a log line or a status bar.

use crate::config::AssistantConfig;
use crate::error::{excerpt, AssistantError, TransportError};
use crate::output::ModelResponse;
use crate::prompts::ModelRequest;
use futures::future::BoxFuture;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use super::llm::ModelTransport;

/// Calls Gemini over HTTPS with `reqwest`.
pub struct GeminiTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    temperature: f32,
    timeout_secs: u64,
}

impl std::fmt::Debug for GeminiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiTransport")
            .field("endpoint", &self.endpoint)
            .field("temperature", &self.temperature)
            .field("timeout_secs", &self.timeout_secs)
            .finish_non_exhaustive()
    }
}

impl GeminiTransport {
    /// Build a transport from the session configuration.
    ///
    /// Fails with [`AssistantError::ProviderNotConfigured`] when no API key is
    /// set.
    pub fn new(config: &AssistantConfig) -> Result<Self, AssistantError> {
        let api_key = config.api_key.trim();
        if api_key.is_empty() {
            return Err(AssistantError::ProviderNotConfigured {
                provider: "gemini".to_string(),
                hint: format!(
                    "Set {} or `api_key` under [gemini] in the config file.",
                    crate::config::API_KEY_ENV
                ),
            });
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| AssistantError::Internal(format!("HTTP client: {}", e.without_url())))?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/models/{}:generateContent",
                config.api_base.trim_end_matches('/'),
                config.model
            ),
            api_key: api_key.to_string(),
            temperature: config.temperature,
            timeout_secs: config.request_timeout_secs,
        })
    }

    /// Endpoint URL without the key.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn send_inner(&self, request: &ModelRequest) -> Result<ModelResponse, TransportError> {
        let start = Instant::now();
        let body = GenerateRequest::new(request, self.temperature);
        info!(
            "Sending request ({} prompt chars, image: {}, max {} output tokens)",
            request.prompt.chars().count(),
            request.image.is_some(),
            request.max_output_tokens
        );

        let response = self
            .client
            .post(&self.endpoint)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| self.classify(e))?;
        debug!(
            "HTTP {} after {:?}, {} bytes",
            status.as_u16(),
            start.elapsed(),
            text.len()
        );

        if !status.is_success() {
            return Err(TransportError::HttpError {
                status_code: status.as_u16(),
                body_excerpt: excerpt(&text),
            });
        }

        parse_envelope(&text)
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout {
                secs: self.timeout_secs,
            }
        } else {
            TransportError::ConnectionFailure {
                detail: err.without_url().to_string(),
            }
        }
    }
}

impl ModelTransport for GeminiTransport {
    fn name(&self) -> &str {
        "gemini"
    }

    fn send<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> BoxFuture<'a, Result<ModelResponse, TransportError>> {
        self.send_inner(request).boxed()
    }
}

/// Decode a 2xx body into text plus usage.
///
/// Every part's text is concatenated in order. Usage counts default to 0 when
/// the endpoint omits them.
pub fn parse_envelope(body: &str) -> Result<ModelResponse, TransportError> {
    let envelope: GenerateResponse =
        serde_json::from_str(body).map_err(|e| TransportError::MalformedEnvelope {
            detail: e.to_string(),
        })?;

    let candidate = envelope
        .candidates
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| malformed("no candidates"))?;
    let parts = candidate
        .content
        .ok_or_else(|| malformed("candidate has no content"))?
        .parts
        .ok_or_else(|| malformed("content has no parts"))?;

    let text: String = parts.into_iter().filter_map(|p| p.text).collect();
    if text.trim().is_empty() {
        return Err(TransportError::EmptyResponse);
    }

    let usage = envelope.usage_metadata.unwrap_or_default();
    Ok(ModelResponse {
        text,
        prompt_tokens: usage.prompt_token_count.unwrap_or(0),
        completion_tokens: usage.candidates_token_count.unwrap_or(0),
    })
}

fn malformed(detail: &str) -> TransportError {
    TransportError::MalformedEnvelope {
        detail: detail.to_string(),
    }
}

// ── Wire types ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text { text: &'a str },
    Image { inline_data: InlineData<'a> },
}

#[derive(Debug, Serialize)]
struct InlineData<'a> {
    mime_type: &'a str,
    data: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

impl<'a> GenerateRequest<'a> {
    fn new(request: &'a ModelRequest, temperature: f32) -> Self {
        let mut parts = vec![RequestPart::Text {
            text: &request.prompt,
        }];
        if let Some(image) = &request.image {
            parts.push(RequestPart::Image {
                inline_data: InlineData {
                    mime_type: &image.mime_type,
                    data: &image.data,
                },
            });
        }
        Self {
            contents: [Content {
                role: "user",
                parts,
            }],
            generation_config: GenerationConfig {
                temperature,
                max_output_tokens: request.max_output_tokens,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateResponse {
    candidates: Option<Vec<Candidate>>,
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<ResponseContent>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Option<Vec<ResponsePart>>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u32>,
    candidates_token_count: Option<u32>,
}
