//! Error types for pistat.
//!
//! The `Display` text of the request-level variants is what viewers see in
//! the `error` field of an acknowledgment, so keep it human readable.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Task '{0}' not recognised.")]
    UnknownTask(String),

    #[error("Machine '{0}' is not registered.")]
    UnknownNode(String),

    #[error("Pi '{0}' is offline.")]
    NodeOffline(String),
}

impl Error {
    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidRequest(message.into())
    }
}
