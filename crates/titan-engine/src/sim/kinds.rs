//! Source, transition, encoder and output kinds known to the simulated engine.

use titan_ipc::{PropertyInfo, PropertyKind, PropertyOption, SettingValue};

/// A registered source kind.
pub(crate) struct SourceKind {
    pub id: &'static str,
    pub has_video: bool,
    pub has_audio: bool,
    pub properties: fn() -> Vec<PropertyInfo>,
}

pub(crate) const SOURCE_KINDS: &[SourceKind] = &[
    SourceKind {
        id: "capture_device",
        has_video: true,
        has_audio: false,
        properties: capture_device_properties,
    },
    SourceKind {
        id: "image_source",
        has_video: true,
        has_audio: false,
        properties: image_properties,
    },
    SourceKind {
        id: "color_source",
        has_video: true,
        has_audio: false,
        properties: color_properties,
    },
    SourceKind {
        id: "text_source",
        has_video: true,
        has_audio: false,
        properties: text_properties,
    },
    SourceKind {
        id: "audio_input_capture",
        has_video: false,
        has_audio: true,
        properties: audio_device_properties,
    },
    SourceKind {
        id: "audio_output_capture",
        has_video: false,
        has_audio: true,
        properties: audio_device_properties,
    },
    SourceKind {
        id: "media_source",
        has_video: true,
        has_audio: true,
        properties: media_properties,
    },
];

pub(crate) const TRANSITION_KINDS: &[&str] = &["cut_transition", "fade_transition"];
pub(crate) const VIDEO_ENCODER_KINDS: &[&str] = &["obs_x264", "jim_nvenc"];
pub(crate) const AUDIO_ENCODER_KINDS: &[&str] = &["ffmpeg_aac"];
pub(crate) const STREAM_OUTPUT_KIND: &str = "rtmp_output";
pub(crate) const RECORD_OUTPUT_KIND: &str = "ffmpeg_muxer";

pub(crate) fn source_kind(id: &str) -> Option<&'static SourceKind> {
    SOURCE_KINDS.iter().find(|kind| kind.id == id)
}

fn property(name: &str, description: &str, kind: PropertyKind) -> PropertyInfo {
    PropertyInfo {
        name: name.to_string(),
        description: description.to_string(),
        kind,
        options: Vec::new(),
    }
}

fn list(name: &str, description: &str, options: &[(&str, &str)]) -> PropertyInfo {
    PropertyInfo {
        options: options
            .iter()
            .map(|(label, value)| PropertyOption {
                name: label.to_string(),
                value: SettingValue::String(value.to_string()),
            })
            .collect(),
        ..property(name, description, PropertyKind::List)
    }
}

fn capture_device_properties() -> Vec<PropertyInfo> {
    vec![
        list(
            "device_id",
            "Device",
            &[("Integrated Camera", "cam0"), ("USB Capture", "cam1")],
        ),
        list(
            "resolution",
            "Resolution",
            &[("1280x720", "1280x720"), ("1920x1080", "1920x1080")],
        ),
        property("active", "Active", PropertyKind::Bool),
    ]
}

fn image_properties() -> Vec<PropertyInfo> {
    vec![
        property("file", "Image File", PropertyKind::Path),
        property("unload", "Unload image when not showing", PropertyKind::Bool),
    ]
}

fn color_properties() -> Vec<PropertyInfo> {
    vec![
        property("color", "Color", PropertyKind::Color),
        property("width", "Width", PropertyKind::Int),
        property("height", "Height", PropertyKind::Int),
    ]
}

fn text_properties() -> Vec<PropertyInfo> {
    vec![
        property("text", "Text", PropertyKind::Text),
        property("font", "Font", PropertyKind::Font),
    ]
}

fn audio_device_properties() -> Vec<PropertyInfo> {
    vec![list(
        "device_id",
        "Device",
        &[("Default", "default"), ("Line In", "line0")],
    )]
}

fn media_properties() -> Vec<PropertyInfo> {
    vec![
        property("local_file", "Local File", PropertyKind::Path),
        property("looping", "Loop", PropertyKind::Bool),
        property("restart_on_activate", "Restart playback when source becomes active", PropertyKind::Bool),
    ]
}
