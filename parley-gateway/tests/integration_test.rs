//! Integration tests for Parley Gateway.
//!
//! Tests the full HTTP API: chat turns, session lifecycle, scoring, and
//! streaming against a mock upstream.

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use futures_util::{stream, StreamExt};
use parley_common::config::{CompletionConfig, Config};
use parley_gateway::{
    build_router, build_state,
    provider::{ChunkStream, ProviderError},
    AppState, ChatRequest, CompatibleProvider, CompletionGateway, CompletionSettings, Message,
    Provider, Sentiment, SentimentScorer, TurnAnalyzer,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Upstream stand-in: answers with a fixed reply and records every request.
struct StubProvider {
    reply: Option<&'static str>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl StubProvider {
    fn replying(reply: &'static str) -> Arc<Self> {
        Arc::new(Self {
            reply: Some(reply),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn failing() -> Arc<Self> {
        Arc::new(Self {
            reply: None,
            requests: Mutex::new(Vec::new()),
        })
    }

    fn requests(&self) -> Vec<ChatRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for StubProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn stream_chat(&self, request: ChatRequest) -> Result<ChunkStream, ProviderError> {
        let model = request.model.clone();
        self.requests.lock().unwrap().push(request);
        match self.reply {
            // split into increments the way a streaming upstream would
            Some(reply) => {
                let chunks: Vec<Result<String, ProviderError>> = reply
                    .split_inclusive(' ')
                    .map(|c| Ok(c.to_string()))
                    .collect();
                Ok(stream::iter(chunks).boxed())
            }
            None => Err(ProviderError::new("stub", &model, "Request failed: connection refused")),
        }
    }
}

struct FixedScorer(f64);

impl SentimentScorer for FixedScorer {
    fn score(&self, _text: &str) -> Sentiment {
        Sentiment {
            polarity: self.0,
            subjectivity: 0.6,
        }
    }
}

/// Test helper to create state and router around a provider.
fn create_test_app(
    provider: Option<Arc<StubProvider>>,
    analyzer: Option<TurnAnalyzer>,
) -> (AppState, axum::Router) {
    let provider = provider.map(|p| p as Arc<dyn Provider>);
    let gateway = CompletionGateway::new(provider, CompletionSettings::default());
    let state = AppState::new(gateway, analyzer);
    let router = build_router(state.clone());
    (state, router)
}

/// Helper to make a request and get JSON response.
async fn request_json(
    app: &axum::Router,
    method: Method,
    uri: &str,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let request = Request::builder().method(method).uri(uri);

    let request = if let Some(b) = body {
        request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_string(&b).unwrap()))
            .unwrap()
    } else {
        request.body(Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    (status, json)
}

async fn chat(app: &axum::Router, prompt: &str, session_id: &str) -> (StatusCode, Value) {
    request_json(
        app,
        Method::POST,
        "/chat",
        Some(json!({ "prompt": prompt, "session_id": session_id })),
    )
    .await
}

async fn end_session(app: &axum::Router, session_id: &str) -> (StatusCode, Value) {
    request_json(
        app,
        Method::POST,
        "/end_session",
        Some(json!({ "session_id": session_id })),
    )
    .await
}

// ─────────────────────────────────────────────────────────────────────────────
// Health Check Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_health_check() {
    let (_, app) = create_test_app(None, None);

    let (status, body) = request_json(&app, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "parley-gateway");
}

// ─────────────────────────────────────────────────────────────────────────────
// Chat Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_records_both_sides_of_the_turn() {
    let provider = StubProvider::replying("hi there");
    let (state, app) = create_test_app(Some(provider.clone()), None);

    let (status, body) = chat(&app, "hello", "s1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "response": "hi there" }));
    assert_eq!(
        state.sessions.get("s1").await,
        vec![Message::user("hello"), Message::assistant("hi there")]
    );

    let sent = provider.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].messages, vec![Message::user("hello")]);
    assert_eq!(sent[0].max_tokens, 1024);
}

#[tokio::test]
async fn test_chat_replays_full_history() {
    let provider = StubProvider::replying("ok");
    let (state, app) = create_test_app(Some(provider.clone()), None);

    chat(&app, "first", "s1").await;
    let (status, _) = chat(&app, "second", "s1").await;

    assert_eq!(status, StatusCode::OK);
    let sent = provider.requests();
    assert_eq!(
        sent[1].messages,
        vec![
            Message::user("first"),
            Message::assistant("ok"),
            Message::user("second"),
        ]
    );
    assert_eq!(state.sessions.get("s1").await.len(), 4);
}

#[tokio::test]
async fn test_chat_trims_fields() {
    let provider = StubProvider::replying("ok");
    let (state, app) = create_test_app(Some(provider), None);

    let (status, _) = chat(&app, "  hello \n", " s1 ").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(state.sessions.get("s1").await[0], Message::user("hello"));
}

#[tokio::test]
async fn test_chat_requires_prompt_and_session() {
    let provider = StubProvider::replying("unused");
    let (state, app) = create_test_app(Some(provider.clone()), None);

    for body in [
        json!({ "prompt": "   ", "session_id": "s1" }),
        json!({ "prompt": "hello", "session_id": "" }),
        json!({ "prompt": "hello" }),
        json!({}),
    ] {
        let (status, json) = request_json(&app, Method::POST, "/chat", Some(body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"], "Prompt and session ID are required.");
    }

    assert!(provider.requests().is_empty());
    assert!(state.sessions.is_empty());
}

#[tokio::test]
async fn test_chat_malformed_json_is_bad_request() {
    let (_, app) = create_test_app(Some(StubProvider::replying("unused")), None);

    let request = Request::builder()
        .method(Method::POST)
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_chat_upstream_failure_keeps_user_message() {
    let (state, app) = create_test_app(Some(StubProvider::failing()), None);

    let (status, body) = chat(&app, "hello", "s1").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("An error occurred: "));
    assert!(message.contains("connection refused"));
    assert_eq!(state.sessions.get("s1").await, vec![Message::user("hello")]);
}

#[tokio::test]
async fn test_chat_without_credential() {
    let (state, app) = create_test_app(None, None);

    let (status, body) = chat(&app, "hello", "s1").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "API key not found.");
    assert!(state.sessions.contains("s1"));
    assert!(state.sessions.get("s1").await.is_empty());
}

#[tokio::test]
async fn test_sessions_are_isolated() {
    let provider = StubProvider::replying("ok");
    let (state, app) = create_test_app(Some(provider), None);

    chat(&app, "for a", "a").await;
    chat(&app, "for b", "b").await;

    assert_eq!(state.sessions.get("a").await[0], Message::user("for a"));
    assert_eq!(state.sessions.get("b").await[0], Message::user("for b"));
}

#[tokio::test]
async fn test_concurrent_turns_on_one_session_serialize() {
    let provider = StubProvider::replying("ok");
    let (state, app) = create_test_app(Some(provider), None);

    let turns = (0..8).map(|i| {
        let app = app.clone();
        async move { chat(&app, &format!("msg {i}"), "shared").await }
    });
    for (status, _) in futures_util::future::join_all(turns).await {
        assert_eq!(status, StatusCode::OK);
    }

    let transcript = state.sessions.get("shared").await;
    assert_eq!(transcript.len(), 16);
    // every user message is immediately followed by its reply
    for pair in transcript.chunks(2) {
        assert_eq!(pair[0].role, parley_gateway::Role::User);
        assert_eq!(pair[1], Message::assistant("ok"));
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Analyzer Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_chat_with_analyzer_reports_scores() {
    let provider = StubProvider::replying("sorry to hear that");
    let analyzer = TurnAnalyzer::new(Arc::new(FixedScorer(-0.4)));
    let (_, app) = create_test_app(Some(provider.clone()), Some(analyzer));

    let (status, body) = chat(&app, "this is terrible", "s1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "sorry to hear that");
    assert_eq!(body["sentiment"]["polarity"], -0.4);
    assert_eq!(body["sentiment"]["subjectivity"], 0.6);
    assert_eq!(body["risk_score"], 0.7);

    // three words is a short prompt
    assert_eq!(provider.requests()[0].max_tokens, 50);
}

#[tokio::test]
async fn test_analyzer_budget_grows_with_prompt() {
    let provider = StubProvider::replying("ok");
    let analyzer = TurnAnalyzer::new(Arc::new(FixedScorer(0.2)));
    let (_, app) = create_test_app(Some(provider.clone()), Some(analyzer));

    let medium = vec!["word"; 30].join(" ");
    let long = vec!["word"; 60].join(" ");
    let (_, body) = chat(&app, &medium, "s1").await;
    chat(&app, &long, "s1").await;

    assert_eq!(body["risk_score"], 0.3);
    let sent = provider.requests();
    assert_eq!(sent[0].max_tokens, 150);
    assert_eq!(sent[1].max_tokens, 300);
}

#[tokio::test]
async fn test_analyzer_off_omits_scores() {
    let (_, app) = create_test_app(Some(StubProvider::replying("ok")), None);

    let (_, body) = chat(&app, "this is terrible", "s1").await;

    assert!(body.get("sentiment").is_none());
    assert!(body.get("risk_score").is_none());
}

// ─────────────────────────────────────────────────────────────────────────────
// Session Lifecycle Tests
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_end_session_twice() {
    let (_, app) = create_test_app(Some(StubProvider::replying("ok")), None);
    chat(&app, "hello", "s1").await;

    let (status, body) = end_session(&app, "s1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Session ended.");

    let (status, body) = end_session(&app, "s1").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or missing session ID.");
}

#[tokio::test]
async fn test_end_unknown_or_missing_session() {
    let (_, app) = create_test_app(None, None);

    let (status, _) = end_session(&app, "never-seen").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = request_json(&app, Method::POST, "/end_session", Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid or missing session ID.");
}

#[tokio::test]
async fn test_chat_after_end_starts_fresh() {
    let provider = StubProvider::replying("ok");
    let (_, app) = create_test_app(Some(provider.clone()), None);

    chat(&app, "remember me", "s1").await;
    end_session(&app, "s1").await;
    chat(&app, "who am i", "s1").await;

    let sent = provider.requests();
    assert_eq!(sent[1].messages, vec![Message::user("who am i")]);
}

#[tokio::test]
async fn test_start_session_with_and_without_id() {
    let (state, app) = create_test_app(None, None);

    let (status, body) = request_json(
        &app,
        Method::POST,
        "/start_session",
        Some(json!({ "session_id": "mine" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["session_id"], "mine");
    assert_eq!(body["message"], "Session started.");
    assert!(state.sessions.contains("mine"));

    let (status, body) = request_json(&app, Method::POST, "/start_session", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let minted = body["session_id"].as_str().unwrap();
    assert!(uuid::Uuid::parse_str(minted).is_ok());
    assert!(state.sessions.contains(minted));

    // ending a started but unused session succeeds
    let (status, _) = end_session(&app, "mine").await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_start_session_keeps_existing_history() {
    let (state, app) = create_test_app(Some(StubProvider::replying("ok")), None);
    chat(&app, "hello", "s1").await;

    request_json(
        &app,
        Method::POST,
        "/start_session",
        Some(json!({ "session_id": "s1" })),
    )
    .await;

    assert_eq!(state.sessions.get("s1").await.len(), 2);
}

// ─────────────────────────────────────────────────────────────────────────────
// Streaming Upstream Tests
// ─────────────────────────────────────────────────────────────────────────────

fn sse_body(pieces: &[&str]) -> String {
    let mut body = String::new();
    for piece in pieces {
        let chunk = json!({ "choices": [{ "delta": { "content": piece } }] });
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    body
}

#[tokio::test]
async fn test_chat_through_streaming_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_partial_json(json!({
            "model": "llama3-8b-8192",
            "stream": true,
            "messages": [{ "role": "user", "content": "hello" }]
        })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(sse_body(&["hi", " ", "there", "\n"])),
        )
        .expect(1)
        .mount(&server)
        .await;

    let provider: Arc<dyn Provider> =
        Arc::new(CompatibleProvider::custom("mock", &server.uri(), "test-key"));
    let gateway = CompletionGateway::new(Some(provider), CompletionSettings::default());
    let state = AppState::new(gateway, None);
    let app = build_router(state.clone());

    let (status, body) = chat(&app, "hello", "s1").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["response"], "hi there");
    assert_eq!(
        state.sessions.get("s1").await,
        vec![Message::user("hello"), Message::assistant("hi there")]
    );
}

#[tokio::test]
async fn test_chat_upstream_rejects_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
        .mount(&server)
        .await;

    let config = Config {
        completion: CompletionConfig {
            provider: "mock".into(),
            base_url: Some(server.uri()),
            ..Default::default()
        },
        secrets: parley_common::config::SecretsConfig {
            api_key: Some("bad-key".into()),
        },
        ..Default::default()
    };
    let state = build_state(&config);
    let app = build_router(state.clone());

    let (status, body) = chat(&app, "hello", "s1").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = body["error"].as_str().unwrap();
    assert!(message.starts_with("An error occurred: "));
    assert!(message.contains("401"));
    assert_eq!(state.sessions.get("s1").await, vec![Message::user("hello")]);
}

#[tokio::test]
async fn test_build_state_enables_analyzer_from_config() {
    let mut config = Config::default();
    config.analyzer.enabled = true;

    let state = build_state(&config);

    assert!(state.analyzer.is_some());
    assert!(state.gateway.ensure_ready().is_err());
}
