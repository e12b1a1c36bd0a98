//! Error types for the engine module.

use thiserror::Error;

/// Errors reported by engine-side helpers outside the boundary trait.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Engine has not been started.
    #[error("Engine not started")]
    NotStarted,

    /// No source with this name.
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// Name already taken in the engine namespace.
    #[error("Name already in use: {0}")]
    NameInUse(String),

    /// Source kind is not registered.
    #[error("Unknown source kind: {0}")]
    UnknownKind(String),

    /// Source cannot hold items.
    #[error("Not a scene or group: {0}")]
    NotAContainer(String),
}
