//! Parley Gateway - session-scoped chat relay in front of a hosted LLM.
//!
//! Each chat turn appends the user's prompt to the session transcript,
//! replays the whole transcript to the completion provider, and records
//! the reply:
//! ```text
//! Client → /chat → SessionStore (per-session lock) → [TurnAnalyzer]
//!                                                   → CompletionGateway → Provider (SSE)
//! ```

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod analyzer;
pub mod completion;
pub mod provider;
pub mod routes;
pub mod session;

pub use analyzer::{LexiconScorer, Sentiment, SentimentScorer, TurnAnalyzer, TurnScore};
pub use completion::{CompletionGateway, CompletionSettings};
pub use provider::{ChatRequest, CompatibleProvider, Provider, ProviderError};
pub use routes::AppState;
pub use session::{Message, Role, SessionStore, Transcript};

use axum::Router;
use parley_common::config::Config;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Assemble the shared state from configuration.
pub fn build_state(config: &Config) -> AppState {
    let provider = provider::from_config(&config.completion, config.api_key());
    if provider.is_none() {
        tracing::warn!(
            provider = %config.completion.provider,
            "No usable API key; chat requests will fail until one is configured"
        );
    }

    let gateway = CompletionGateway::new(provider, CompletionSettings::from(&config.completion));
    let analyzer = config.analyzer.enabled.then(TurnAnalyzer::default);

    AppState::new(gateway, analyzer)
}

/// Build the gateway router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::build_all_routes(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

/// Start the gateway server.
pub async fn start_server(config: &Config) -> anyhow::Result<()> {
    let addr = config.listen_address()?;

    let router = build_router(build_state(config));

    tracing::info!(
        model = %config.completion.model,
        analyzer = config.analyzer.enabled,
        "Starting Parley Gateway on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Resolves on Ctrl-C. Never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    wait_for_shutdown(tokio::signal::ctrl_c()).await;
}

async fn wait_for_shutdown<F>(signal: F)
where
    F: std::future::Future<Output = std::io::Result<()>>,
{
    match signal.await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(
                error = %e,
                "Failed to listen for shutdown signal; running until killed"
            );
            std::future::pending::<()>().await;
        }
    }
}
