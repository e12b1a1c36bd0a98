//! Requests sent from the host to the session, and the replies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A host call: operation name plus positional arguments.
///
/// `{"id": 7, "op": "addSource", "args": ["Main", "capture_device", "Cam"]}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRequest {
    /// Correlation id echoed in the reply.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Operation name, e.g. `createScene`.
    pub op: String,

    /// Positional arguments.
    #[serde(default)]
    pub args: Vec<Value>,
}

impl HostRequest {
    /// Create a request without a correlation id.
    pub fn new(op: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            id: None,
            op: op.into(),
            args,
        }
    }
}

/// Machine-readable failure category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    DuplicateName,
    SceneNotFound,
    SourceNotFound,
    SourceCreateFailed,
    EncoderCreateFailed,
    OutputCreateFailed,
    OutputStartFailed,
    InvalidArguments,
    NotRunning,
    EngineStartupFailed,
    Storage,
}

/// Error payload of a failed reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

/// Reply to a [`HostRequest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    /// Whether the operation succeeded.
    pub ok: bool,

    /// Result value on success (`null` for unit results).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,

    /// Failure details.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorInfo>,
}

impl HostReply {
    /// Successful reply carrying `value`.
    pub fn success(id: Option<u64>, value: Value) -> Self {
        Self {
            id,
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    /// Failed reply.
    pub fn failure(id: Option<u64>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            id,
            ok: false,
            value: None,
            error: Some(ErrorInfo {
                kind,
                message: message.into(),
            }),
        }
    }
}
