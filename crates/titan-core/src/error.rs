//! Error types for session operations.

use thiserror::Error;
use titan_ipc::{ErrorKind, OutputKind};

/// Errors surfaced synchronously by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// A scene or source with this name already exists.
    #[error("Name already in use: {0}")]
    DuplicateName(String),

    /// No scene with this name.
    #[error("Scene not found: {0}")]
    SceneNotFound(String),

    /// No source with this name.
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// The engine rejected the kind/name pair.
    #[error("Failed to create source '{name}' of kind '{kind}'")]
    SourceCreateFailed { kind: String, name: String },

    /// Shared encoders could not be created.
    #[error("Failed to create {0} encoder")]
    EncoderCreateFailed(&'static str),

    /// The engine refused to create the output object.
    #[error("Failed to create {} output", .0.name())]
    OutputCreateFailed(OutputKind),

    /// The engine rejected the output start.
    #[error("Failed to start {} output: {message}", kind.name())]
    OutputStartFailed { kind: OutputKind, message: String },

    /// Wrong arity or argument type at the host boundary.
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    /// Operation requires a running session.
    #[error("Session not running")]
    NotRunning,

    /// The engine failed to start.
    #[error("Engine startup failed: {0}")]
    EngineStartupFailed(String),
}

impl SessionError {
    /// Machine-readable category for host replies.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DuplicateName(_) => ErrorKind::DuplicateName,
            Self::SceneNotFound(_) => ErrorKind::SceneNotFound,
            Self::SourceNotFound(_) => ErrorKind::SourceNotFound,
            Self::SourceCreateFailed { .. } => ErrorKind::SourceCreateFailed,
            Self::EncoderCreateFailed(_) => ErrorKind::EncoderCreateFailed,
            Self::OutputCreateFailed(_) => ErrorKind::OutputCreateFailed,
            Self::OutputStartFailed { .. } => ErrorKind::OutputStartFailed,
            Self::InvalidArguments(_) => ErrorKind::InvalidArguments,
            Self::NotRunning => ErrorKind::NotRunning,
            Self::EngineStartupFailed(_) => ErrorKind::EngineStartupFailed,
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
