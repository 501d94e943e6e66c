//! Vertebra error types.
//!
//! Only construction, decoding, configuration and runtime plumbing can fail.
//! Protocol outcomes are not errors: a synapse attempt reports an
//! [`Attempt`](crate::synapse::Attempt) value and a request that ends badly
//! ends in a terminal [`ClientState`](crate::protocol::ClientState).

use thiserror::Error;

/// Vertebra errors.
#[derive(Error, Debug)]
pub enum VertebraError {
    /// An operation was built with an empty operation-type resource.
    #[error("Operation type must not be empty")]
    EmptyOperationType,

    /// An envelope or element could not be decoded.
    #[error("Invalid stanza: {0}")]
    InvalidStanza(String),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// The agent task is gone and can no longer accept commands.
    #[error("Agent stopped")]
    AgentStopped,

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type alias for Vertebra operations
pub type Result<T> = std::result::Result<T, VertebraError>;

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for VertebraError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        VertebraError::AgentStopped
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for VertebraError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        VertebraError::AgentStopped
    }
}
