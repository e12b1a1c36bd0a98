//! Session configuration.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use titan_engine::MeterScale;

/// Configuration for a [`Session`](crate::Session).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Locale passed to the engine at startup.
    pub locale: String,

    /// Kind of the shared program/preview transition.
    pub transition_kind: String,

    /// Duration of an automatic transition in milliseconds (default: 300).
    pub transition_duration_ms: u32,

    /// Scale used by per-source volume meters.
    pub meter_scale: MeterScale,

    /// Streaming and recording settings.
    pub output: OutputConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            locale: "en-US".to_string(),
            transition_kind: "cut_transition".to_string(),
            transition_duration_ms: 300,
            meter_scale: MeterScale::default(),
            output: OutputConfig::default(),
        }
    }
}

/// Output and encoder kinds plus encoder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Engine output kind used for streaming.
    pub stream_output_kind: String,

    /// Engine output kind used for recording.
    pub record_output_kind: String,

    /// Shared video encoder kind.
    pub video_encoder_kind: String,

    /// Shared audio encoder kind.
    pub audio_encoder_kind: String,

    /// Video bitrate in kbps (default: 6000).
    pub video_bitrate_kbps: u32,

    /// Audio bitrate in kbps (default: 160).
    pub audio_bitrate_kbps: u32,

    /// Directory recordings are written to.
    pub recording_dir: PathBuf,

    /// Container extension of recordings.
    pub recording_format: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            stream_output_kind: "rtmp_output".to_string(),
            record_output_kind: "ffmpeg_muxer".to_string(),
            video_encoder_kind: "obs_x264".to_string(),
            audio_encoder_kind: "ffmpeg_aac".to_string(),
            video_bitrate_kbps: 6000,
            audio_bitrate_kbps: 160,
            recording_dir: std::env::temp_dir(),
            recording_format: "mkv".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: SessionConfig = serde_json::from_str(
            r#"{"transition_duration_ms": 500, "output": {"recording_format": "mp4"}}"#,
        )
        .unwrap();

        assert_eq!(config.transition_duration_ms, 500);
        assert_eq!(config.locale, "en-US");
        assert_eq!(config.output.recording_format, "mp4");
        assert_eq!(config.output.video_bitrate_kbps, 6000);
        assert_eq!(config.meter_scale, MeterScale::Cubic);
    }
}
