//! Switcher core for Titan.
//!
//! Builds program/preview switching, a named scene catalog, per-source audio
//! metering and output lifecycle management on top of the primitives of a
//! [`MediaEngine`](titan_engine::MediaEngine).

mod audio_monitor;
mod compositor;
mod config;
mod error;
mod frames;
mod outputs;
mod registry;
mod serializer;
mod session;

pub mod host;

pub use audio_monitor::{peak_to_db, AudioMonitor, SILENCE_DB};
pub use compositor::Compositor;
pub use config::{OutputConfig, SessionConfig};
pub use error::{SessionError, SessionResult};
pub use frames::{Frame, FrameExchange, FrameSlot};
pub use outputs::OutputManager;
pub use registry::{Registry, SceneNames};
pub use serializer::{restore, snapshot};
pub use session::Session;

use std::sync::Arc;

use titan_engine::MediaEngine;

/// Create a stopped session over `engine`.
pub fn create_session(engine: Arc<dyn MediaEngine>, config: SessionConfig) -> Session {
    Session::new(engine, config)
}
