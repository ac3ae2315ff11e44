//! In-memory session transcripts.
//!
//! Each session id maps to its own transcript behind its own async mutex.
//! Chat turns hold that mutex from the moment the user message is appended
//! until the assistant reply lands, so turns on one session are serialized
//! while different sessions proceed independently.
//!
//! The store has no size bound and no expiry: every session lives until it
//! is explicitly ended or the process exits.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Conversation history, oldest message first.
pub type Transcript = Vec<Message>;

type SessionHandle = Arc<Mutex<Transcript>>;

/// Process-lifetime store of session transcripts.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionHandle>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the handle for a session.
    fn handle(&self, id: &str) -> SessionHandle {
        self.sessions
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(Vec::new())))
            .value()
            .clone()
    }

    /// Create an empty transcript for `id` if none exists.
    ///
    /// Returns `true` when a new entry was created.
    pub fn start(&self, id: &str) -> bool {
        let mut created = false;
        self.sessions.entry(id.to_string()).or_insert_with(|| {
            created = true;
            Arc::new(Mutex::new(Vec::new()))
        });
        created
    }

    /// Snapshot of the transcript for `id`. Empty when the session is unknown.
    pub async fn get(&self, id: &str) -> Transcript {
        let handle = match self.sessions.get(id) {
            Some(entry) => entry.value().clone(),
            None => return Vec::new(),
        };
        let transcript = handle.lock().await;
        transcript.clone()
    }

    /// Append a message to the transcript for `id`, creating it if absent.
    pub async fn append(&self, id: &str, message: Message) {
        let handle = self.handle(id);
        handle.lock().await.push(message);
    }

    /// Remove the transcript for `id`. Returns whether it existed.
    ///
    /// A turn already in flight keeps its detached transcript and finishes
    /// normally; its messages are dropped with it.
    pub fn delete(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Take exclusive access to the transcript for `id` for one chat turn.
    ///
    /// Creates the session if absent. Other turns on the same id wait until
    /// the returned guard is dropped.
    pub async fn begin_turn(&self, id: &str) -> Turn {
        let handle = self.handle(id);
        Turn {
            transcript: handle.lock_owned().await,
        }
    }
}

/// Exclusive, in-progress access to one session's transcript.
pub struct Turn {
    transcript: OwnedMutexGuard<Transcript>,
}

impl Turn {
    pub fn push(&mut self, message: Message) {
        self.transcript.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.transcript
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn get_unknown_session_is_empty() {
        let store = SessionStore::new();
        assert!(store.get("nope").await.is_empty());
        assert!(!store.contains("nope"));
    }

    #[tokio::test]
    async fn append_creates_and_orders() {
        let store = SessionStore::new();
        store.append("s1", Message::user("hello")).await;
        store.append("s1", Message::assistant("hi there")).await;

        let transcript = store.get("s1").await;
        assert_eq!(
            transcript,
            vec![Message::user("hello"), Message::assistant("hi there")]
        );
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn delete_reports_existence() {
        let store = SessionStore::new();
        assert!(!store.delete("s1"));

        store.append("s1", Message::user("hello")).await;
        assert!(store.delete("s1"));
        assert!(!store.delete("s1"));
        assert!(store.get("s1").await.is_empty());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let store = SessionStore::new();
        assert!(store.start("s1"));
        assert!(!store.start("s1"));

        store.append("s1", Message::user("hello")).await;
        assert!(!store.start("s1"));
        assert_eq!(store.get("s1").await.len(), 1);
    }

    #[tokio::test]
    async fn turn_sees_and_extends_history() {
        let store = SessionStore::new();
        store.append("s1", Message::user("first")).await;

        {
            let mut turn = store.begin_turn("s1").await;
            turn.push(Message::assistant("reply"));
            assert_eq!(turn.messages().len(), 2);
        }

        assert_eq!(store.get("s1").await.len(), 2);
    }

    #[tokio::test]
    async fn turns_on_one_session_are_serialized() {
        let store = Arc::new(SessionStore::new());
        let mut tasks = Vec::new();

        for i in 0..8 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let mut turn = store.begin_turn("shared").await;
                turn.push(Message::user(format!("q{i}")));
                tokio::task::yield_now().await;
                turn.push(Message::assistant(format!("a{i}")));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let transcript = store.get("shared").await;
        assert_eq!(transcript.len(), 16);
        for pair in transcript.chunks(2) {
            assert_eq!(pair[0].role, Role::User);
            assert_eq!(pair[1].role, Role::Assistant);
            assert_eq!(pair[0].content[1..], pair[1].content[1..]);
        }
    }

    #[tokio::test]
    async fn delete_during_turn_detaches_transcript() {
        let store = SessionStore::new();
        let mut turn = store.begin_turn("s1").await;
        turn.push(Message::user("hello"));

        assert!(store.delete("s1"));
        turn.push(Message::assistant("late reply"));
        drop(turn);

        assert!(store.get("s1").await.is_empty());
    }

    #[test]
    fn message_serializes_lowercase_role() {
        let json = serde_json::to_string(&Message::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }
}
