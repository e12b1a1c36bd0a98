//! Source settings values and the self-describing property schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Key/value settings attached to a source.
pub type Settings = BTreeMap<String, SettingValue>;

/// A single setting value.
///
/// Serialized untagged, so a settings map reads as plain JSON:
/// `{"device": "cam0", "width": 1280, "active": true, "font": {"size": 32}}`.
/// Any other JSON shape (floats, arrays, null) does not deserialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SettingValue {
    /// Boolean flag.
    Bool(bool),

    /// Signed integer.
    Int(i64),

    /// UTF-8 string.
    String(String),

    /// Nested settings object.
    Map(Settings),
}

impl SettingValue {
    /// Returns the string value, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the integer value, if this is an integer.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the boolean value, if this is a boolean.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the nested map, if this is a map.
    pub fn as_map(&self) -> Option<&Settings> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Short name of the value's shape, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::String(_) => "string",
            Self::Map(_) => "map",
        }
    }
}

impl From<&str> for SettingValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for SettingValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for SettingValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for SettingValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<Settings> for SettingValue {
    fn from(value: Settings) -> Self {
        Self::Map(value)
    }
}

/// Merge `update` into `target`, key by key. Nested maps are merged recursively;
/// every other value replaces the existing one.
pub fn merge_settings(target: &mut Settings, update: &Settings) {
    for (key, value) in update {
        match (target.get_mut(key), value) {
            (Some(SettingValue::Map(existing)), SettingValue::Map(incoming)) => {
                merge_settings(existing, incoming);
            }
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Kind of an editable source property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Bool,
    Int,
    Float,
    Text,
    Path,
    List,
    Color,
    Button,
    Font,
    Group,
}

/// One selectable option of a list property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyOption {
    /// Display name.
    pub name: String,

    /// Value stored in the settings when selected.
    pub value: SettingValue,
}

/// A property from a source's self-describing schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertyInfo {
    /// Settings key this property edits.
    pub name: String,

    /// Human readable label.
    pub description: String,

    /// Property kind.
    #[serde(rename = "type")]
    pub kind: PropertyKind,

    /// Options for list properties, empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<PropertyOption>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_replaces_scalars_and_merges_maps() {
        let mut target = Settings::new();
        target.insert("device".into(), "cam0".into());
        let mut font = Settings::new();
        font.insert("face".into(), "Sans".into());
        font.insert("size".into(), 24i64.into());
        target.insert("font".into(), font.into());

        let mut update = Settings::new();
        update.insert("device".into(), "cam1".into());
        let mut font_update = Settings::new();
        font_update.insert("size".into(), 32i64.into());
        update.insert("font".into(), font_update.into());

        merge_settings(&mut target, &update);

        assert_eq!(target["device"].as_str(), Some("cam1"));
        let font = target["font"].as_map().unwrap();
        assert_eq!(font["face"].as_str(), Some("Sans"));
        assert_eq!(font["size"].as_int(), Some(32));
    }

    #[test]
    fn test_untagged_json_shapes() {
        let json = r#"{"a": true, "b": 7, "c": "x", "d": {"e": false}}"#;
        let settings: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(settings["a"], SettingValue::Bool(true));
        assert_eq!(settings["b"], SettingValue::Int(7));
        assert_eq!(settings["c"], SettingValue::String("x".into()));
        assert_eq!(settings["d"].as_map().unwrap()["e"], SettingValue::Bool(false));
    }

    #[test]
    fn test_floats_are_not_setting_values() {
        assert!(serde_json::from_str::<SettingValue>("1.5").is_err());
        assert!(serde_json::from_str::<SettingValue>("[1, 2]").is_err());
        assert!(serde_json::from_str::<SettingValue>("null").is_err());
    }
}
