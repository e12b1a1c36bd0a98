//! Persisted scene graph layout.

use serde::{Deserialize, Serialize};

use crate::settings::Settings;
use crate::types::Transform;

/// Full scene graph: every scene and the sources placed in it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneGraphSnapshot {
    pub scenes: Vec<SceneSnapshot>,
}

impl SceneGraphSnapshot {
    /// Returns true if the snapshot holds no scenes.
    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }

    /// Find a scene by name.
    pub fn scene(&self, name: &str) -> Option<&SceneSnapshot> {
        self.scenes.iter().find(|s| s.name == name)
    }
}

/// One scene and its items in item-list order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneSnapshot {
    pub name: String,
    #[serde(default)]
    pub sources: Vec<SourceSnapshot>,
}

/// One placed source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub name: String,
    pub kind: String,
    #[serde(default)]
    pub settings: Settings,
    #[serde(default)]
    pub transform: Transform,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_layout() {
        let json = r#"{
            "scenes": [{
                "name": "Main",
                "sources": [{
                    "name": "Cam",
                    "kind": "capture_device",
                    "settings": {"device": "cam0"},
                    "transform": {
                        "posX": 10.0, "posY": 20.0, "rot": 90.0,
                        "scaleX": 0.5, "scaleY": 0.5,
                        "cropTop": 1, "cropBottom": 2, "cropLeft": 3, "cropRight": 4
                    }
                }]
            }]
        }"#;

        let snapshot: SceneGraphSnapshot = serde_json::from_str(json).unwrap();
        let source = &snapshot.scene("Main").unwrap().sources[0];
        assert_eq!(source.kind, "capture_device");
        assert_eq!(source.transform.pos_y, 20.0);
        assert_eq!(source.transform.crop_right, 4);

        let value = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(value["scenes"][0]["sources"][0]["transform"]["scaleX"], 0.5);
    }

    #[test]
    fn test_missing_transform_defaults_to_identity() {
        let json = r#"{"scenes": [{"name": "A", "sources": [{"name": "x", "kind": "image_source"}]}]}"#;
        let snapshot: SceneGraphSnapshot = serde_json::from_str(json).unwrap();
        assert_eq!(snapshot.scenes[0].sources[0].transform, Transform::IDENTITY);
        assert!(snapshot.scenes[0].sources[0].settings.is_empty());
    }
}
