//! Route definitions for the Parley gateway.
//!
//! Provides the chat, session lifecycle, and health endpoints.

use crate::analyzer::{Sentiment, TurnAnalyzer};
use crate::completion::CompletionGateway;
use crate::session::{Message, SessionStore};
use axum::{
    extract::{rejection::JsonRejection, State},
    http::HeaderMap,
    response::Json,
    routing::{get, post},
    Router,
};
use parley_common::logging::trace_id_from_headers;
use parley_common::util::truncate_with_ellipsis;
use parley_common::{Error, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub gateway: Arc<CompletionGateway>,
    /// Present when turn scoring is enabled
    pub analyzer: Option<Arc<TurnAnalyzer>>,
}

impl AppState {
    pub fn new(gateway: CompletionGateway, analyzer: Option<TurnAnalyzer>) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new()),
            gateway: Arc::new(gateway),
            analyzer: analyzer.map(Arc::new),
        }
    }
}

/// Chat request body.
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub session_id: String,
}

/// Chat response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<SentimentBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_score: Option<f64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SentimentBody {
    pub polarity: f64,
    pub subjectivity: f64,
}

impl From<Sentiment> for SentimentBody {
    fn from(s: Sentiment) -> Self {
        Self {
            polarity: s.polarity,
            subjectivity: s.subjectivity,
        }
    }
}

/// Session lifecycle request body.
#[derive(Debug, Default, Deserialize)]
pub struct SessionRequest {
    #[serde(default)]
    pub session_id: String,
}

/// Start-session response.
#[derive(Debug, Serialize, Deserialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub message: String,
}

/// End-session response.
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
}

/// Build the complete router with all routes.
pub fn build_all_routes(state: AppState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/start_session", post(start_session_handler))
        .route("/end_session", post(end_session_handler))
        .with_state(state)
        .merge(health_routes())
}

/// Build health check routes.
pub fn health_routes() -> Router {
    Router::new().route("/health", get(health_handler))
}

/// Unwrap a JSON body, treating a missing or malformed body as empty fields.
fn body_or_default<T: Default>(payload: std::result::Result<Json<T>, JsonRejection>) -> T {
    match payload {
        Ok(Json(body)) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "Unreadable JSON body");
            T::default()
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat
// ─────────────────────────────────────────────────────────────────────────────

/// Run one chat turn.
async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatResponse>> {
    let request = body_or_default(payload);
    let prompt = request.prompt.trim();
    let session_id = request.session_id.trim();

    if prompt.is_empty() || session_id.is_empty() {
        return Err(Error::missing_chat_fields());
    }

    let trace_id = trace_id_from_headers(&headers);
    tracing::info!(
        trace_id = %trace_id,
        session_id = %session_id,
        prompt = %truncate_with_ellipsis(prompt, 80),
        "Chat turn started"
    );

    let mut turn = state.sessions.begin_turn(session_id).await;
    state.gateway.ensure_ready().inspect_err(|_| {
        tracing::error!(trace_id = %trace_id, "No API key configured");
    })?;

    turn.push(Message::user(prompt));

    let score = state.analyzer.as_ref().map(|a| a.score(prompt));
    let max_tokens = match &state.analyzer {
        Some(analyzer) => analyzer.max_tokens_for(prompt),
        None => state.gateway.settings().max_tokens,
    };

    // On failure the user message stays in the transcript without a reply.
    let reply = state.gateway.complete(turn.messages(), max_tokens).await?;

    turn.push(Message::assistant(reply.clone()));
    let history = turn.messages().len();
    drop(turn);

    tracing::info!(
        trace_id = %trace_id,
        session_id = %session_id,
        history,
        risk_score = ?score.map(|s| s.risk_score),
        "Chat turn completed"
    );

    Ok(Json(ChatResponse {
        response: reply,
        sentiment: score.map(|s| s.sentiment.into()),
        risk_score: score.map(|s| s.risk_score),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Lifecycle
// ─────────────────────────────────────────────────────────────────────────────

/// Create an empty session, minting an id when none is given.
async fn start_session_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SessionRequest>, JsonRejection>,
) -> Json<StartSessionResponse> {
    let request = body_or_default(payload);
    let session_id = match request.session_id.trim() {
        "" => uuid::Uuid::new_v4().to_string(),
        id => id.to_string(),
    };

    let created = state.sessions.start(&session_id);
    tracing::info!(session_id = %session_id, created, "Session started");

    Json(StartSessionResponse {
        session_id,
        message: "Session started.".into(),
    })
}

/// Drop a session's transcript.
async fn end_session_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<SessionRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>> {
    let request = body_or_default(payload);
    let session_id = request.session_id.trim();

    if session_id.is_empty() || !state.sessions.delete(session_id) {
        return Err(Error::UnknownSession);
    }

    tracing::info!(session_id = %session_id, "Session ended");

    Ok(Json(MessageResponse {
        message: "Session ended.".into(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Health
// ─────────────────────────────────────────────────────────────────────────────

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".into(),
        version: env!("CARGO_PKG_VERSION").into(),
        service: "parley-gateway".into(),
    })
}
