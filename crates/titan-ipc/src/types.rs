//! Common types used across host messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// 2D placement of a scene item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transform {
    /// Position in canvas pixels.
    pub pos_x: f32,
    pub pos_y: f32,

    /// Rotation in degrees.
    pub rot: f32,

    /// Scale factors (1.0 = native size).
    pub scale_x: f32,
    pub scale_y: f32,

    /// Crop in source pixels.
    pub crop_top: i32,
    pub crop_bottom: i32,
    pub crop_left: i32,
    pub crop_right: i32,
}

impl Transform {
    /// Identity placement: origin, no rotation, unit scale, no crop.
    pub const IDENTITY: Self = Self {
        pos_x: 0.0,
        pos_y: 0.0,
        rot: 0.0,
        scale_x: 1.0,
        scale_y: 1.0,
        crop_top: 0,
        crop_bottom: 0,
        crop_left: 0,
        crop_right: 0,
    };

    /// Compare two transforms with a floating-point tolerance.
    pub fn approx_eq(&self, other: &Self, epsilon: f32) -> bool {
        (self.pos_x - other.pos_x).abs() <= epsilon
            && (self.pos_y - other.pos_y).abs() <= epsilon
            && (self.rot - other.rot).abs() <= epsilon
            && (self.scale_x - other.scale_x).abs() <= epsilon
            && (self.scale_y - other.scale_y).abs() <= epsilon
            && self.crop_top == other.crop_top
            && self.crop_bottom == other.crop_bottom
            && self.crop_left == other.crop_left
            && self.crop_right == other.crop_right
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// A source as listed within a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSummary {
    /// Global source name.
    pub name: String,

    /// Whether the source produces audio.
    pub has_audio: bool,
}

/// Latest peak level per audio source, in dBFS.
pub type AudioLevels = BTreeMap<String, f32>;

/// The latest frames as sent to a host.
///
/// Images are tightly packed BGRA (`width * 4` bytes per row), base64-encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FramePayload {
    pub width: u32,
    pub height: u32,

    /// Program image, once one has been rendered.
    pub program: Option<String>,

    /// Preview image while a preview is nominated.
    pub preview: Option<String>,
}

/// Activity of the two outputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputStatus {
    /// Streaming output is active.
    pub streaming: bool,

    /// Recording output is active.
    pub recording: bool,

    /// Shared encoders currently exist.
    pub encoders_allocated: bool,
}

/// A source that `restore` could not recreate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedSource {
    /// Scene the source was meant for.
    pub scene: String,

    /// Source name from the snapshot.
    pub source: String,

    /// Why it was skipped.
    pub reason: String,
}

/// Outcome of a best-effort restore.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestoreReport {
    /// Number of scenes created or reused.
    pub scenes: usize,

    /// Number of sources placed.
    pub sources: usize,

    /// Sources that were skipped.
    pub skipped: Vec<SkippedSource>,
}
