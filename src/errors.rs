use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Failure talking to the record store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("store returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The per-call timeout elapsed before the store answered
    #[error("deadline exceeded after {seconds}s: {operation}")]
    DeadlineExceeded { operation: String, seconds: u64 },

    #[error("could not decode store response: {0}")]
    Decode(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("record not found: {table}/{id}")]
    NotFound { table: String, id: String },
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Decode(err.to_string())
    }
}

/// A raw row missing a field its typed form requires.
#[derive(Error, Debug, PartialEq)]
pub enum RecordError {
    #[error("record {id}: missing field '{field}'")]
    MissingField { id: String, field: String },
}

/// A chunked write that stopped part-way.
#[derive(Error, Debug)]
#[error("batch {completed}/{total} failed: {source}")]
pub struct BatchError {
    pub completed: usize,
    pub total: usize,
    #[source]
    pub source: StoreError,
}

/// Failure of a maintenance job.
#[derive(Error, Debug)]
pub enum JobError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Batch(#[from] BatchError),

    #[error("no hospital configured in Settings - Hospital")]
    MissingHospital,
}

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    /// Maps a store failure to a response, keeping `message` user-facing.
    pub fn from_store(err: &StoreError, message: impl Into<String>) -> Self {
        let status = match err {
            StoreError::DeadlineExceeded { .. } => StatusCode::GATEWAY_TIMEOUT,
            StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: message.into(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}
