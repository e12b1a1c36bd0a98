//! Typed host<->session messages for Titan.
//!
//! This crate defines the data shared by every layer: setting values,
//! transforms, the property schema, the persisted scene graph layout, and the
//! request/reply envelopes the host uses to drive a session.

mod commands;
mod settings;
mod snapshot;
mod state;
mod types;

pub use commands::{ErrorInfo, ErrorKind, HostReply, HostRequest};
pub use settings::{
    merge_settings, PropertyInfo, PropertyKind, PropertyOption, SettingValue, Settings,
};
pub use snapshot::{SceneGraphSnapshot, SceneSnapshot, SourceSnapshot};
pub use state::{OutputKind, OutputPhase, SessionState};
pub use types::{
    AudioLevels, FramePayload, OutputStatus, RestoreReport, SkippedSource, SourceSummary, Transform,
};

use crossbeam_channel::{Receiver, Sender};

/// Channel capacity for requests (host → session).
pub const REQUEST_CHANNEL_CAPACITY: usize = 64;

/// Channel capacity for replies (session → host).
pub const REPLY_CHANNEL_CAPACITY: usize = 256;

/// Creates a bounded request channel.
pub fn request_channel() -> (Sender<HostRequest>, Receiver<HostRequest>) {
    crossbeam_channel::bounded(REQUEST_CHANNEL_CAPACITY)
}

/// Creates a bounded reply channel.
pub fn reply_channel() -> (Sender<HostReply>, Receiver<HostReply>) {
    crossbeam_channel::bounded(REPLY_CHANNEL_CAPACITY)
}
