//! Streaming LLM provider abstraction.
//!
//! A provider turns a chat request into a lazy, finite stream of text
//! increments. The stream is consumed once; it cannot be restarted.

mod compatible;
mod sse;

pub use compatible::CompatibleProvider;
pub use sse::SseDecoder;

use crate::session::Message;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use parley_common::config::{CompletionConfig, KNOWN_PROVIDERS};
use serde::Serialize;
use std::sync::Arc;

// ============================================================================
// Provider Trait
// ============================================================================

/// Stream of text increments from an upstream completion.
pub type ChunkStream = BoxStream<'static, Result<String, ProviderError>>;

/// Unified interface for streaming LLM providers.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Get the provider name.
    fn name(&self) -> &str;

    /// Start a streaming chat completion.
    ///
    /// Errors raised before the first increment (transport, auth, quota)
    /// are returned here; errors after that arrive as stream items.
    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, ProviderError>;
}

/// Error from a provider.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub provider: String,
    pub model: String,
    pub message: String,
    pub status_code: Option<u16>,
}

impl ProviderError {
    pub fn new(provider: &str, model: &str, message: impl Into<String>) -> Self {
        Self {
            provider: provider.to_string(),
            model: model.to_string(),
            message: message.into(),
            status_code: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}:{}] {}", self.provider, self.model, self.message)
    }
}

impl std::error::Error for ProviderError {}

// ============================================================================
// Request Types
// ============================================================================

/// Unified chat request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    /// Model to use
    pub model: String,
    /// Full conversation, oldest first
    pub messages: Vec<Message>,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
}

// ============================================================================
// Construction
// ============================================================================

/// Build the configured provider.
///
/// Returns `None` when no API key is available; requests then fail with a
/// credential error instead of the process refusing to start.
pub fn from_config(config: &CompletionConfig, api_key: Option<&str>) -> Option<Arc<dyn Provider>> {
    let key = api_key.map(str::trim).filter(|k| !k.is_empty())?;

    let mut provider = match (config.provider.to_lowercase().as_str(), &config.base_url) {
        (_, Some(base_url)) => CompatibleProvider::custom(&config.provider, base_url, key),
        (name, None) => match CompatibleProvider::known(name, key) {
            Some(provider) => provider,
            None => {
                tracing::warn!(
                    provider = %config.provider,
                    known = ?KNOWN_PROVIDERS,
                    "Unknown provider without base_url"
                );
                return None;
            }
        },
    };

    if let Some(secs) = config.request_timeout_secs {
        provider = provider.with_timeout(std::time::Duration::from_secs(secs));
    }

    Some(Arc::new(provider))
}
