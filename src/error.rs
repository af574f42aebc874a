use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

/// Failures of a single text-completion request.
#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion endpoint unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("completion endpoint returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("completion response contained no text")]
    EmptyResponse,

    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,
}

impl CompletionError {
    /// Transport hiccups and server-side statuses are worth another attempt;
    /// a missing key or an empty candidate list is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            CompletionError::Transport(_) => true,
            CompletionError::Status { status, .. } => *status == 429 || *status >= 500,
            CompletionError::EmptyResponse | CompletionError::MissingApiKey => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("could not parse the model response as JSON: {0}")]
    MalformedStructure(String),

    #[error("invalid project structure: {0}")]
    InvalidStructure(String),

    #[error("generation timed out after {0:?}")]
    TimedOut(std::time::Duration),

    #[error("generation cancelled")]
    Cancelled,

    #[error("client disconnected")]
    Disconnected,
}

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("workspace not found: {0}")]
    NotFound(String),

    #[error("invalid file path: {0}")]
    InvalidPath(String),

    #[error("no HTML entry file found for preview")]
    MissingEntry,

    #[error("expected exactly one HTML entry file, found {0}")]
    AmbiguousEntry(usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl ResponseError for WorkspaceError {
    fn status_code(&self) -> StatusCode {
        match self {
            WorkspaceError::NotFound(_) => StatusCode::NOT_FOUND,
            WorkspaceError::InvalidPath(_)
            | WorkspaceError::MissingEntry
            | WorkspaceError::AmbiguousEntry(_) => StatusCode::BAD_REQUEST,
            WorkspaceError::Io(_) | WorkspaceError::Serialize(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .json(json!({ "success": false, "error": self.to_string() }))
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidNumber { key: &'static str, value: String },

    #[error("{key} must be greater than zero")]
    Zero { key: &'static str },
}
