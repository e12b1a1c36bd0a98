//! Owned engine source references.

use std::fmt;
use std::sync::Arc;

use titan_ipc::Settings;

use crate::{MediaEngine, SourceId, SourceInfo};

/// One engine reference to a source, released exactly once on drop.
pub struct SourceRef {
    engine: Arc<dyn MediaEngine>,
    id: SourceId,
}

impl SourceRef {
    /// Take ownership of a reference the engine already handed out.
    pub fn from_raw(engine: &Arc<dyn MediaEngine>, id: SourceId) -> Self {
        Self {
            engine: Arc::clone(engine),
            id,
        }
    }

    /// Create a source of `kind`.
    pub fn create_source(
        engine: &Arc<dyn MediaEngine>,
        kind: &str,
        name: &str,
        settings: &Settings,
    ) -> Option<Self> {
        engine
            .create_source(kind, name, settings)
            .map(|id| Self::from_raw(engine, id))
    }

    /// Create an empty scene.
    pub fn create_scene(engine: &Arc<dyn MediaEngine>, name: &str) -> Option<Self> {
        engine.create_scene(name).map(|id| Self::from_raw(engine, id))
    }

    /// Create a private transition source.
    pub fn create_transition(engine: &Arc<dyn MediaEngine>, kind: &str, name: &str) -> Option<Self> {
        engine
            .create_transition(kind, name)
            .map(|id| Self::from_raw(engine, id))
    }

    /// Resolve a public source by name.
    pub fn by_name(engine: &Arc<dyn MediaEngine>, name: &str) -> Option<Self> {
        engine.get_by_name(name).map(|id| Self::from_raw(engine, id))
    }

    /// Current program source of a transition.
    pub fn slot_a(engine: &Arc<dyn MediaEngine>, transition: SourceId) -> Option<Self> {
        engine
            .transition_get_slot_a(transition)
            .map(|id| Self::from_raw(engine, id))
    }

    /// The engine handle. Valid only while `self` is alive.
    pub fn id(&self) -> SourceId {
        self.id
    }

    /// Static description of the source.
    pub fn info(&self) -> Option<SourceInfo> {
        self.engine.source_info(self.id)
    }

    /// Name of the source.
    pub fn name(&self) -> Option<String> {
        self.info().map(|info| info.name)
    }
}

impl fmt::Debug for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SourceRef").field(&self.id).finish()
    }
}

impl Drop for SourceRef {
    fn drop(&mut self) {
        self.engine.release(self.id);
    }
}
