//! Error types for Guide Core

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("Not authorized: {0}")]
    AuthorizationDenied(String),

    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True when the failure came from the backing store rather than the request
    pub fn is_persistence_failure(&self) -> bool {
        matches!(
            self,
            Error::Database(_) | Error::Io(_) | Error::Serialization(_)
        )
    }

    /// Message safe to hand back to the initiating client.
    ///
    /// Unknown ids are reported the same way as malformed input, and store
    /// failures never leak their internals.
    pub fn client_message(&self) -> String {
        match self {
            Error::NotFound(what) => format!("Invalid request: {} not found", what),
            e if e.is_persistence_failure() => "Operation failed, please retry".to_string(),
            e => e.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
