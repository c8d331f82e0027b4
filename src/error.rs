//! Error taxonomy for the labeler
//!
//! Configuration errors are fatal at startup. Everything else is
//! recoverable: the next reconciliation pass re-derives state from scratch.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LabelerError {
    /// Missing or malformed configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// The social graph rejected our credentials.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Network failure, timeout or unexpected response from a collaborator.
    #[error("transport error: {0}")]
    Transport(String),

    #[error("label store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for LabelerError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) if status.as_u16() == 401 || status.as_u16() == 403 => {
                LabelerError::Auth(err.to_string())
            }
            _ => LabelerError::Transport(err.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, LabelerError>;
