//! Media engine boundary for Titan.
//!
//! The native engine owns the graphics device, compositing, encoding and
//! output muxing. This crate describes the capabilities the session layer
//! consumes as the [`MediaEngine`] trait, and ships [`SimulatedEngine`], a
//! headless software engine implementing it.

mod error;
mod handle;
mod source_ref;
mod walk;

pub mod sim;

pub use error::EngineError;
pub use handle::{
    EncoderId, ItemId, MeterId, OutputId, RenderCallbackId, RenderTargetId, SourceId, TextureId,
};
pub use sim::{ObjectCounts, SimClock, SimConfig, SimulatedEngine};
pub use source_ref::SourceRef;
pub use walk::{ItemWalk, WalkedItem};

use std::sync::Arc;

use bytes::Bytes;
use titan_ipc::{PropertyInfo, Settings, Transform};

/// Result type for engine-side helpers.
pub type EngineResult<T> = Result<T, EngineError>;

/// Source kind identifying scenes.
pub const SCENE_KIND: &str = "scene";

/// Source kind identifying groups (nested item containers).
pub const GROUP_KIND: &str = "group";

/// Output channel carrying the main composited program.
pub const MAIN_CHANNEL: u32 = 0;

/// Bytes per pixel of mapped textures (BGRA).
pub const BYTES_PER_PIXEL: usize = 4;

/// Static description of a source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceInfo {
    pub id: SourceId,
    pub name: String,
    pub kind: String,
    pub has_video: bool,
    pub has_audio: bool,
}

impl SourceInfo {
    /// Returns true if this source is a scene.
    pub fn is_scene(&self) -> bool {
        self.kind == SCENE_KIND
    }

    /// Returns true if this source is a group.
    pub fn is_group(&self) -> bool {
        self.kind == GROUP_KIND
    }
}

/// One placement inside a scene or group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemInfo {
    pub id: ItemId,

    /// Placed source (no reference is held by this value).
    pub source: SourceId,

    /// Name of the placed source.
    pub name: String,

    /// Kind of the placed source.
    pub kind: String,

    /// Whether the placed source is audio-capable.
    pub has_audio: bool,
}

impl ItemInfo {
    /// Returns true if this item is a group holding further items.
    pub fn is_group(&self) -> bool {
        self.kind == GROUP_KIND
    }
}

/// How a transition is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionMode {
    /// Runs on its own for the given duration.
    Auto,

    /// Driven manually by the caller.
    Manual,
}

/// Scale used by a volume meter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MeterScale {
    #[default]
    Cubic,
    Iec,
    Log,
}

/// Per-channel levels delivered to a volume meter listener.
#[derive(Debug, Clone, Copy)]
pub struct MeterLevels<'a> {
    /// RMS magnitude per channel, linear amplitude.
    pub magnitude: &'a [f32],

    /// Sample peak per channel, linear amplitude.
    pub peak: &'a [f32],
}

/// Listener invoked on the engine's audio thread.
pub type VolmeterListener = Arc<dyn Fn(&MeterLevels<'_>) + Send + Sync>;

/// Callback invoked on the engine's render thread with the base canvas size.
pub type RenderCallback = Arc<dyn Fn(u32, u32) + Send + Sync>;

/// CPU view of a mapped texture.
#[derive(Debug, Clone)]
pub struct MappedTexture {
    /// BGRA pixel rows, `row_stride` bytes apart.
    pub pixels: Bytes,

    /// Distance between the starts of two rows, in bytes.
    pub row_stride: usize,

    pub width: u32,
    pub height: u32,
}

/// Capabilities of the native media engine consumed by the session layer.
///
/// Calls returning a [`SourceId`] from `create_*`, [`get_by_name`] or
/// [`transition_get_slot_a`] hand out one engine reference that must be paired
/// with exactly one [`release`]. Wrap them in [`SourceRef`].
///
/// Render callbacks and volume meter listeners are invoked on engine threads.
/// Implementations must not hold internal locks while invoking them, since
/// both are allowed to call back into the engine.
///
/// [`get_by_name`]: MediaEngine::get_by_name
/// [`transition_get_slot_a`]: MediaEngine::transition_get_slot_a
/// [`release`]: MediaEngine::release
pub trait MediaEngine: Send + Sync {
    // Lifecycle

    fn startup(&self, locale: &str) -> bool;
    fn shutdown(&self);

    // Object model

    fn create_source(&self, kind: &str, name: &str, settings: &Settings) -> Option<SourceId>;
    fn create_scene(&self, name: &str) -> Option<SourceId>;
    fn create_transition(&self, kind: &str, name: &str) -> Option<SourceId>;
    fn release(&self, source: SourceId);
    fn get_by_name(&self, name: &str) -> Option<SourceId>;

    /// Visit every public source. The visitor returns false to stop early.
    fn enumerate_sources(&self, visitor: &mut dyn FnMut(&SourceInfo) -> bool);

    fn source_info(&self, source: SourceId) -> Option<SourceInfo>;
    fn source_settings(&self, source: SourceId) -> Settings;
    fn source_update(&self, source: SourceId, settings: &Settings);
    fn source_properties(&self, source: SourceId) -> Vec<PropertyInfo>;
    fn source_set_muted(&self, source: SourceId, muted: bool);
    fn source_muted(&self, source: SourceId) -> bool;

    // Scene composition

    fn scene_add_item(&self, container: SourceId, source: SourceId) -> Option<ItemId>;
    fn scene_remove_item(&self, item: ItemId);

    /// Items of a scene or group in item-list order.
    fn scene_items(&self, container: SourceId) -> Vec<ItemInfo>;

    fn item_transform(&self, item: ItemId) -> Option<Transform>;
    fn set_item_transform(&self, item: ItemId, transform: &Transform);

    /// Find an item by source name, descending into groups.
    fn find_item_recursive(&self, scene: SourceId, name: &str) -> Option<ItemInfo> {
        ItemWalk::new(self, scene)
            .map(|walked| walked.item)
            .find(|item| item.name == name)
    }

    // Transition

    /// Make `source` the current program immediately (slot A).
    fn transition_set(&self, transition: SourceId, source: Option<SourceId>);
    fn transition_set_target(&self, transition: SourceId, source: SourceId);
    /// Drop the pending target, releasing its reference.
    fn transition_clear_target(&self, transition: SourceId);
    fn transition_start(&self, transition: SourceId, mode: TransitionMode, duration_ms: u32)
        -> bool;
    fn transition_get_slot_a(&self, transition: SourceId) -> Option<SourceId>;
    fn set_output_source(&self, channel: u32, source: Option<SourceId>);

    // Metering

    fn meter_create(&self, scale: MeterScale) -> MeterId;
    fn meter_attach(&self, meter: MeterId, source: SourceId) -> bool;
    fn meter_add_listener(&self, meter: MeterId, listener: VolmeterListener);
    fn meter_destroy(&self, meter: MeterId);

    // Rendering

    fn register_render_callback(&self, callback: RenderCallback) -> RenderCallbackId;
    fn unregister_render_callback(&self, id: RenderCallbackId);
    fn main_texture(&self) -> Option<TextureId>;
    fn texture_size(&self, texture: TextureId) -> (u32, u32);
    fn render_target_create(&self) -> RenderTargetId;
    fn render_target_destroy(&self, target: RenderTargetId);
    fn render_target_begin(&self, target: RenderTargetId, width: u32, height: u32) -> bool;
    fn render_source(&self, source: SourceId);
    fn render_target_end(&self, target: RenderTargetId);
    fn render_target_texture(&self, target: RenderTargetId) -> Option<TextureId>;
    fn map_texture(&self, texture: TextureId) -> Option<MappedTexture>;
    fn unmap_texture(&self, texture: TextureId);

    // Outputs and encoders

    fn video_encoder_create(&self, kind: &str, name: &str, settings: &Settings)
        -> Option<EncoderId>;
    fn audio_encoder_create(&self, kind: &str, name: &str, settings: &Settings)
        -> Option<EncoderId>;
    fn encoder_release(&self, encoder: EncoderId);
    fn output_create(&self, kind: &str, name: &str, settings: &Settings) -> Option<OutputId>;
    fn output_set_video_encoder(&self, output: OutputId, encoder: EncoderId);
    fn output_set_audio_encoder(&self, output: OutputId, encoder: EncoderId);
    fn output_start(&self, output: OutputId) -> bool;
    fn output_stop(&self, output: OutputId);
    fn output_active(&self, output: OutputId) -> bool;
    fn output_last_error(&self, output: OutputId) -> Option<String>;
    fn output_release(&self, output: OutputId);
}
