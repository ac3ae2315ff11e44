//! Generic OpenAI-compatible streaming provider.
//!
//! Most LLM APIs follow the same `/v1/chat/completions` format, including
//! its server-sent-event streaming mode. This module provides a single
//! implementation that works for all of them.
//!
//! Built-in endpoints:
//! - Groq
//! - OpenAI
//! - Mistral
//! - DeepSeek
//! - Together AI
//! - Any custom OpenAI-compatible endpoint

use super::sse::SseDecoder;
use super::{ChatRequest, ChunkStream, Provider, ProviderError};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

const DONE_MARKER: &str = "[DONE]";

/// A provider that speaks the OpenAI-compatible chat completions API.
pub struct CompatibleProvider {
    name: String,
    base_url: String,
    api_key: String,
    client: Client,
}

#[derive(Debug, Serialize)]
struct CompatibleRequest<'a> {
    model: &'a str,
    messages: Vec<CompatibleMessage<'a>>,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct CompatibleMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamError {
    #[serde(default)]
    message: String,
}

impl CompatibleProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(name: &str, base_url: &str, api_key: &str) -> Self {
        Self {
            name: name.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client: Client::new(),
        }
    }

    /// Look up a built-in endpoint by provider name.
    pub fn known(name: &str, api_key: &str) -> Option<Self> {
        match name {
            "groq" => Some(Self::groq(api_key)),
            "openai" => Some(Self::openai(api_key)),
            "mistral" => Some(Self::mistral(api_key)),
            "deepseek" => Some(Self::deepseek(api_key)),
            "together" => Some(Self::together(api_key)),
            _ => None,
        }
    }

    /// Create Groq provider.
    pub fn groq(api_key: &str) -> Self {
        Self::new("groq", "https://api.groq.com/openai", api_key)
    }

    /// Create OpenAI provider.
    pub fn openai(api_key: &str) -> Self {
        Self::new("openai", "https://api.openai.com", api_key)
    }

    /// Create Mistral provider.
    pub fn mistral(api_key: &str) -> Self {
        Self::new("mistral", "https://api.mistral.ai", api_key)
    }

    /// Create DeepSeek provider.
    pub fn deepseek(api_key: &str) -> Self {
        Self::new("deepseek", "https://api.deepseek.com", api_key)
    }

    /// Create Together AI provider.
    pub fn together(api_key: &str) -> Self {
        Self::new("together", "https://api.together.xyz", api_key)
    }

    /// Create a custom provider with any OpenAI-compatible endpoint.
    pub fn custom(name: &str, base_url: &str, api_key: &str) -> Self {
        Self::new(name, base_url, api_key)
    }

    /// Bound the whole request, stream included.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        match Client::builder().timeout(timeout).build() {
            Ok(client) => self.client = client,
            Err(e) => {
                tracing::warn!(
                    provider = %self.name,
                    timeout_secs = timeout.as_secs(),
                    error = %e,
                    "Failed to build HTTP client with timeout; requests are unbounded"
                );
            }
        }
        self
    }

    fn error(&self, model: &str, message: impl Into<String>) -> ProviderError {
        ProviderError::new(&self.name, model, message)
    }
}

#[async_trait]
impl Provider for CompatibleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, ProviderError> {
        let body = CompatibleRequest {
            model: &request.model,
            messages: request
                .messages
                .iter()
                .map(|m| CompatibleMessage {
                    role: m.role.as_str(),
                    content: &m.content,
                })
                .collect(),
            temperature: request.temperature,
            top_p: request.top_p,
            max_tokens: request.max_tokens,
            stream: true,
        };

        let url = format!("{}/v1/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("Accept", "text/event-stream")
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.error(&request.model, format!("Request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self
                .error(
                    &request.model,
                    format!("API error ({}): {}", status.as_u16(), error_text),
                )
                .with_status(status.as_u16()));
        }

        tracing::debug!(provider = %self.name, model = %request.model, "Upstream stream opened");

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|bytes| bytes.to_vec()))
            .boxed();

        Ok(decode_stream(body, self.name.clone(), request.model))
    }
}

// ============================================================================
// Stream Decoding
// ============================================================================

struct DecodeState {
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String, ProviderError>>,
    finished: bool,
    provider: String,
    model: String,
}

impl DecodeState {
    fn error(&self, message: impl Into<String>) -> ProviderError {
        ProviderError::new(&self.provider, &self.model, message)
    }

    /// Queue the increments carried by a batch of `data:` payloads.
    fn absorb(&mut self, payloads: Vec<String>) {
        for payload in payloads {
            if self.finished {
                return;
            }
            if payload == DONE_MARKER {
                self.finished = true;
                return;
            }

            match parse_chunk(&payload) {
                Ok(Some(text)) => self.pending.push_back(Ok(text)),
                Ok(None) => {}
                Err(message) => {
                    let err = self.error(message);
                    self.pending.push_back(Err(err));
                    self.finished = true;
                }
            }
        }
    }
}

/// Turn an SSE byte stream into a stream of text increments.
fn decode_stream(
    body: BoxStream<'static, Result<Vec<u8>, reqwest::Error>>,
    provider: String,
    model: String,
) -> ChunkStream {
    let state = DecodeState {
        body,
        decoder: SseDecoder::new(),
        pending: VecDeque::new(),
        finished: false,
        provider,
        model,
    };

    stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }

            match state.body.next().await {
                Some(Ok(bytes)) => {
                    let payloads = state.decoder.feed(&bytes);
                    state.absorb(payloads);
                }
                Some(Err(e)) => {
                    let err = state.error(format!("Stream interrupted: {}", e));
                    state.pending.push_back(Err(err));
                    state.finished = true;
                }
                None => {
                    let tail: Vec<String> = state.decoder.finish().into_iter().collect();
                    state.absorb(tail);
                    state.finished = true;
                }
            }
        }
    })
    .boxed()
}

/// Extract the text increment from one payload.
///
/// `Ok(None)` means the chunk carried no text (role header, finish marker).
fn parse_chunk(payload: &str) -> Result<Option<String>, String> {
    let chunk: StreamChunk = serde_json::from_str(payload)
        .map_err(|e| format!("Malformed stream chunk: {}", e))?;

    if let Some(error) = chunk.error {
        return Err(format!("Stream error: {}", error.message));
    }

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|text| !text.is_empty()))
}
