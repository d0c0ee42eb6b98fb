//! Harness-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{path}: line {line}: {message}")]
    InvalidLog {
        path: String,
        line: usize,
        message: String,
    },
}
