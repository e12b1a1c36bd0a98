//! Session and output state machine types.

use serde::{Deserialize, Serialize};

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Engine not started, or shut down.
    #[default]
    Stopped,

    /// Engine started and the render callback registered.
    Running,
}

impl SessionState {
    /// Returns true if the session is running.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }

    /// Returns a simple string representation of the state.
    pub fn name(self) -> &'static str {
        match self {
            Self::Stopped => "Stopped",
            Self::Running => "Running",
        }
    }
}

/// The two output kinds managed by a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OutputKind {
    /// Live stream to a server.
    Streaming,

    /// Local file recording.
    Recording,
}

impl OutputKind {
    /// Returns the display name for this output.
    pub fn name(self) -> &'static str {
        match self {
            Self::Streaming => "streaming",
            Self::Recording => "recording",
        }
    }
}

/// Start phases of an output, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputPhase {
    /// Creating the shared video/audio encoders.
    CreateEncoders,

    /// Creating the output object.
    CreateOutput,

    /// Starting the output.
    StartOutput,
}

impl OutputPhase {
    /// Returns the next phase, if any.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::CreateEncoders => Some(Self::CreateOutput),
            Self::CreateOutput => Some(Self::StartOutput),
            Self::StartOutput => None,
        }
    }

    /// Returns the previous phase, if any (for rollback).
    pub fn previous(self) -> Option<Self> {
        match self {
            Self::CreateEncoders => None,
            Self::CreateOutput => Some(Self::CreateEncoders),
            Self::StartOutput => Some(Self::CreateOutput),
        }
    }

    /// Returns the display name for this phase.
    pub fn name(self) -> &'static str {
        match self {
            Self::CreateEncoders => "Creating encoders",
            Self::CreateOutput => "Creating output",
            Self::StartOutput => "Starting output",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_phase_order_round_trips() {
        let mut phase = OutputPhase::CreateEncoders;
        let mut seen = vec![phase];
        while let Some(next) = phase.next() {
            assert_eq!(next.previous(), Some(phase));
            phase = next;
            seen.push(phase);
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(phase, OutputPhase::StartOutput);
    }
}
