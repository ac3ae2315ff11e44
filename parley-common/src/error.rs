//! Error types for Parley.
//!
//! Every failure a request can hit maps to one variant here, and every
//! variant maps to exactly one HTTP status. The `Display` text is what the
//! caller sees in the `error` field of the response body.

use thiserror::Error;

/// Result type alias using the Parley error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Message returned when a chat request lacks a prompt or session id.
pub const MISSING_CHAT_FIELDS: &str = "Prompt and session ID are required.";

/// Unified error type for Parley.
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or blank request fields
    #[error("{0}")]
    Validation(String),

    /// End-session on a blank or unknown id
    #[error("Invalid or missing session ID.")]
    UnknownSession,

    /// No API key configured for the completion provider
    #[error("API key not found.")]
    Credential,

    /// Any failure raised by the completion call. Detail is passed through verbatim.
    #[error("An error occurred: {0}")]
    Upstream(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Validation error for a chat request with blank fields.
    pub fn missing_chat_fields() -> Self {
        Self::Validation(MISSING_CHAT_FIELDS.into())
    }

    /// Get HTTP status code for this error.
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_) | Self::UnknownSession => 400,
            _ => 500,
        }
    }
}

#[cfg(feature = "axum")]
mod response {
    use super::Error;
    use axum::http::StatusCode;
    use axum::response::{IntoResponse, Response};
    use axum::Json;

    impl IntoResponse for Error {
        fn into_response(self) -> Response {
            let status = StatusCode::from_u16(self.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            let body = Json(serde_json::json!({ "error": self.to_string() }));
            (status, body).into_response()
        }
    }
}
