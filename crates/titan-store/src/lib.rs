//! Persistence of the scene collection between runs.
//!
//! State lives in a single key/value table; the whole scene graph is stored
//! as JSON under [`SCENE_COLLECTION_KEY`].

mod error;

pub use error::{StoreError, StoreResult};

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use tracing::{debug, info};

use titan_ipc::SceneGraphSnapshot;

/// Key holding the serialized scene graph.
pub const SCENE_COLLECTION_KEY: &str = "full_scene_collection";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS app_state (
        key TEXT PRIMARY KEY,
        value TEXT NOT NULL
    );
";

/// SQLite-backed application state.
pub struct SceneStore {
    db: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl SceneStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let db = Connection::open(path)?;
        db.execute_batch(SCHEMA)?;
        info!("State database opened at {}", path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a throwaway in-memory database.
    pub fn open_in_memory() -> StoreResult<Self> {
        let db = Connection::open_in_memory()?;
        db.execute_batch(SCHEMA)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            path: None,
        })
    }

    /// Database file, if not in memory.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Store the scene graph, replacing any previous one.
    pub fn save_state(&self, snapshot: &SceneGraphSnapshot) -> StoreResult<()> {
        let json = serde_json::to_string(snapshot)?;
        self.set(SCENE_COLLECTION_KEY, &json)?;
        debug!(scenes = snapshot.scenes.len(), "Scene collection saved");
        Ok(())
    }

    /// Load the saved scene graph; `None` if nothing was saved yet.
    pub fn load_state(&self) -> StoreResult<Option<SceneGraphSnapshot>> {
        let Some(json) = self.get(SCENE_COLLECTION_KEY)? else {
            debug!("No saved scene collection");
            return Ok(None);
        };
        let snapshot: SceneGraphSnapshot = serde_json::from_str(&json)?;
        debug!(scenes = snapshot.scenes.len(), "Scene collection loaded");
        Ok(Some(snapshot))
    }

    /// Forget the saved scene graph.
    pub fn clear_state(&self) -> StoreResult<()> {
        self.db
            .lock()
            .execute("DELETE FROM app_state WHERE key = ?", [SCENE_COLLECTION_KEY])?;
        Ok(())
    }

    fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.db.lock().execute(
            "INSERT OR REPLACE INTO app_state (key, value) VALUES (?, ?)",
            rusqlite::params![key, value],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let value = self
            .db
            .lock()
            .query_row("SELECT value FROM app_state WHERE key = ?", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use titan_ipc::{SceneSnapshot, SourceSnapshot, Transform};

    fn sample() -> SceneGraphSnapshot {
        SceneGraphSnapshot {
            scenes: vec![SceneSnapshot {
                name: "Main".into(),
                sources: vec![SourceSnapshot {
                    name: "Cam".into(),
                    kind: "capture_device".into(),
                    settings: [("device_id".to_string(), "cam0".into())].into(),
                    transform: Transform {
                        pos_x: 10.0,
                        ..Transform::IDENTITY
                    },
                }],
            }],
        }
    }

    #[test]
    fn test_load_without_saved_state() {
        let store = SceneStore::open_in_memory().unwrap();
        assert!(store.load_state().unwrap().is_none());
    }

    #[test]
    fn test_save_replaces_previous_state() {
        let store = SceneStore::open_in_memory().unwrap();
        store.save_state(&SceneGraphSnapshot::default()).unwrap();
        store.save_state(&sample()).unwrap();

        assert_eq!(store.load_state().unwrap(), Some(sample()));

        store.clear_state().unwrap();
        assert!(store.load_state().unwrap().is_none());
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("titan.db");

        {
            let store = SceneStore::open(&path).unwrap();
            assert_eq!(store.path(), Some(path.as_path()));
            store.save_state(&sample()).unwrap();
        }

        let store = SceneStore::open(&path).unwrap();
        assert_eq!(store.load_state().unwrap(), Some(sample()));
    }

    #[test]
    fn test_corrupt_value_is_a_serialization_error() {
        let store = SceneStore::open_in_memory().unwrap();
        store.set(SCENE_COLLECTION_KEY, "{not json").unwrap();

        assert!(matches!(
            store.load_state(),
            Err(StoreError::Serialization(_))
        ));
    }
}
