//! Error types for Craftmind

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("LLM error: {0}")]
    Llm(String),

    #[error("NPC not found: {0}")]
    NpcNotFound(String),

    #[error("NPC template not found: {0}")]
    TemplateNotFound(String),

    #[error("Quest not found: {0}")]
    QuestNotFound(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for this crate
pub type Result<T> = std::result::Result<T, Error>;

// Map errors to HTTP responses. Bridge-level errors travel as payloads with
// 200 (callers branch on the "error" key); only handler faults become 500s,
// not-found lookups become 404s.
impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match self {
            Error::NpcNotFound(_)
            | Error::TemplateNotFound(_)
            | Error::QuestNotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
