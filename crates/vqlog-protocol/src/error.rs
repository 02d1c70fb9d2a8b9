//! Error types for the vqlog protocol.

use crate::session::LifecycleState;
use thiserror::Error;

/// Errors surfaced by ports and session operations.
#[derive(Debug, Error)]
pub enum QlogError {
    #[error("setup failed: {0}")]
    SetupFailure(String),
    /// Reported by the media engine; the message is passed through verbatim.
    #[error("{0}")]
    Engine(String),
    #[error("invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
    #[error("log writer error: {0}")]
    Writer(String),
    #[error("export error: {0}")]
    Export(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for QlogError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for QlogError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Convenience result type for port calls.
pub type QlogResult<T> = Result<T, QlogError>;
