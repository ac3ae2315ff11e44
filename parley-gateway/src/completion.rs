//! Completion gateway - one upstream call per chat turn.
//!
//! The gateway owns the sampling settings and the (optional) provider. It
//! drains the provider's chunk stream into a single reply before returning;
//! callers never see partial output.

use crate::provider::{ChatRequest, Provider};
use crate::session::Message;
use futures_util::StreamExt;
use parley_common::config::CompletionConfig;
use parley_common::util::sanitize_for_log;
use parley_common::{Error, Result};
use std::sync::Arc;
use std::time::Instant;

/// Sampling settings sent with every request.
#[derive(Debug, Clone)]
pub struct CompletionSettings {
    pub model: String,
    pub temperature: f64,
    pub top_p: f64,
    /// Budget used when the analyzer does not supply one
    pub max_tokens: u32,
}

impl From<&CompletionConfig> for CompletionSettings {
    fn from(config: &CompletionConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            top_p: config.top_p,
            max_tokens: config.max_tokens,
        }
    }
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self::from(&CompletionConfig::default())
    }
}

pub struct CompletionGateway {
    provider: Option<Arc<dyn Provider>>,
    settings: CompletionSettings,
}

impl CompletionGateway {
    /// `provider` is `None` when no credential was configured.
    pub fn new(provider: Option<Arc<dyn Provider>>, settings: CompletionSettings) -> Self {
        Self { provider, settings }
    }

    pub fn settings(&self) -> &CompletionSettings {
        &self.settings
    }

    /// Fail fast with a credential error when there is no provider.
    pub fn ensure_ready(&self) -> Result<()> {
        self.provider().map(|_| ())
    }

    fn provider(&self) -> Result<&Arc<dyn Provider>> {
        self.provider.as_ref().ok_or(Error::Credential)
    }

    /// Send the transcript upstream and return the trimmed reply.
    ///
    /// Empty increments are skipped. Any provider failure, before or during
    /// the stream, becomes `Error::Upstream`.
    pub async fn complete(&self, transcript: &[Message], max_tokens: u32) -> Result<String> {
        let provider = self.provider()?;
        let start = Instant::now();

        let request = ChatRequest {
            model: self.settings.model.clone(),
            messages: transcript.to_vec(),
            max_tokens,
            temperature: self.settings.temperature,
            top_p: self.settings.top_p,
        };

        let upstream = |e: crate::provider::ProviderError| {
            tracing::error!(
                provider = %provider.name(),
                status = ?e.status_code,
                error = %sanitize_for_log(&e.to_string()),
                "Completion failed"
            );
            Error::Upstream(e.to_string())
        };

        let mut stream = provider.stream_chat(request).await.map_err(upstream)?;

        let mut reply = String::new();
        let mut chunks = 0usize;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(upstream)?;
            if !chunk.is_empty() {
                reply.push_str(&chunk);
                chunks += 1;
            }
        }

        tracing::info!(
            provider = %provider.name(),
            model = %self.settings.model,
            messages = transcript.len(),
            max_tokens,
            chunks,
            latency_ms = start.elapsed().as_millis() as u64,
            "Completion finished"
        );

        Ok(reply.trim().to_string())
    }
}
