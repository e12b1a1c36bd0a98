//! Named scenes and the sources placed in them.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use titan_engine::{ItemId, ItemWalk, MediaEngine, SourceRef};
use titan_ipc::{PropertyInfo, Settings, SourceSummary, Transform};

use crate::audio_monitor::AudioMonitor;
use crate::compositor::Compositor;
use crate::error::{SessionError, SessionResult};

/// Lazy sequence of scene names.
///
/// The engine registry is enumerated on the first call to `next`, and again
/// after [`SceneNames::restart`].
pub struct SceneNames<'a> {
    engine: &'a dyn MediaEngine,
    names: Option<std::vec::IntoIter<String>>,
}

impl<'a> SceneNames<'a> {
    fn new(engine: &'a dyn MediaEngine) -> Self {
        Self {
            engine,
            names: None,
        }
    }

    /// Start over; the next item comes from a fresh enumeration.
    pub fn restart(&mut self) {
        self.names = None;
    }

    fn enumerate(engine: &dyn MediaEngine) -> Vec<String> {
        let mut names = Vec::new();
        engine.enumerate_sources(&mut |info| {
            if info.is_scene() {
                names.push(info.name.clone());
            }
            true
        });
        names
    }
}

impl Iterator for SceneNames<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let engine = self.engine;
        self.names
            .get_or_insert_with(|| Self::enumerate(engine).into_iter())
            .next()
    }
}

/// Scene and source operations over the engine's global namespace.
///
/// The registry holds one reference per created scene. Sources are owned by
/// the items placing them, so a source disappears together with its last
/// placement.
pub struct Registry {
    engine: Arc<dyn MediaEngine>,
    scenes: Vec<SourceRef>,
}

impl Registry {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self {
            engine,
            scenes: Vec::new(),
        }
    }

    /// Create an empty scene. The first scene becomes program if none is.
    #[instrument(name = "create_scene", skip(self, compositor))]
    pub fn create_scene(&mut self, name: &str, compositor: &Compositor) -> SessionResult<()> {
        if SourceRef::by_name(&self.engine, name).is_some() {
            return Err(SessionError::DuplicateName(name.to_string()));
        }
        let scene = SourceRef::create_scene(&self.engine, name)
            .ok_or_else(|| SessionError::DuplicateName(name.to_string()))?;

        if !compositor.has_program() {
            compositor.set_program(&scene);
            info!(name, "Scene assigned as program");
        }

        debug!(name, "Scene created");
        self.scenes.push(scene);
        Ok(())
    }

    /// Lazily enumerate scene names.
    pub fn list_scenes(&self) -> SceneNames<'_> {
        SceneNames::new(self.engine.as_ref())
    }

    /// Resolve a scene by name.
    pub fn scene(&self, name: &str) -> SessionResult<SourceRef> {
        SourceRef::by_name(&self.engine, name)
            .filter(|source| source.info().is_some_and(|info| info.is_scene()))
            .ok_or_else(|| SessionError::SceneNotFound(name.to_string()))
    }

    /// Place a source in a scene with an identity transform.
    ///
    /// A source that already exists under `name` is placed again if its kind
    /// matches; otherwise a new source is created with `settings`.
    #[instrument(name = "add_source", skip(self, settings, audio))]
    pub fn add_source(
        &mut self,
        scene_name: &str,
        kind: &str,
        name: &str,
        settings: &Settings,
        audio: &AudioMonitor,
    ) -> SessionResult<ItemId> {
        let scene = self.scene(scene_name)?;

        let source = match SourceRef::by_name(&self.engine, name) {
            Some(existing) => {
                let reusable = existing.info().is_some_and(|info| {
                    info.kind == kind && !info.is_scene() && !info.is_group()
                });
                if !reusable || self.engine.find_item_recursive(scene.id(), name).is_some() {
                    return Err(SessionError::DuplicateName(name.to_string()));
                }
                debug!(name, "Reusing existing source");
                existing
            }
            None => SourceRef::create_source(&self.engine, kind, name, settings).ok_or_else(
                || SessionError::SourceCreateFailed {
                    kind: kind.to_string(),
                    name: name.to_string(),
                },
            )?,
        };

        let item = self
            .engine
            .scene_add_item(scene.id(), source.id())
            .ok_or_else(|| SessionError::SourceCreateFailed {
                kind: kind.to_string(),
                name: name.to_string(),
            })?;
        self.engine.set_item_transform(item, &Transform::IDENTITY);
        if !settings.is_empty() && self.engine.source_settings(source.id()) != *settings {
            self.engine.source_update(source.id(), settings);
        }

        if source.info().is_some_and(|info| info.has_audio) {
            audio.bind(&source);
        }

        debug!(scene = scene_name, name, %item, "Source added");
        Ok(item)
    }

    /// Remove a source from a scene, searching nested groups.
    ///
    /// Returns false if the scene has no such source.
    #[instrument(name = "remove_source", skip(self, audio))]
    pub fn remove_source(
        &mut self,
        scene_name: &str,
        name: &str,
        audio: &AudioMonitor,
    ) -> SessionResult<bool> {
        let scene = self.scene(scene_name)?;
        let Some(item) = self.engine.find_item_recursive(scene.id(), name) else {
            debug!(scene = scene_name, name, "Source not in scene, nothing to remove");
            return Ok(false);
        };

        // Removing a group takes every source inside it along.
        let mut metered: Vec<String> = Vec::new();
        if item.has_audio {
            metered.push(item.name.clone());
        }
        if item.is_group() {
            metered.extend(
                ItemWalk::new(self.engine.as_ref(), item.source)
                    .filter(|walked| walked.item.has_audio)
                    .map(|walked| walked.item.name),
            );
        }

        self.engine.scene_remove_item(item.id);

        for source in metered {
            if !self.is_placed(&source) {
                audio.unbind(&source);
            }
        }

        debug!(scene = scene_name, name, "Source removed");
        Ok(true)
    }

    /// Whether any scene still places `name`, directly or inside a group.
    ///
    /// The engine may keep an unplaced source alive (transition slots, a
    /// render in flight), so liveness is not a placement test.
    fn is_placed(&self, name: &str) -> bool {
        self.list_scenes().any(|scene| {
            SourceRef::by_name(&self.engine, &scene)
                .is_some_and(|scene| self.engine.find_item_recursive(scene.id(), name).is_some())
        })
    }

    /// Items of a scene in item-list order.
    pub fn scene_sources(&self, scene_name: &str) -> SessionResult<Vec<SourceSummary>> {
        let scene = self.scene(scene_name)?;
        Ok(self
            .engine
            .scene_items(scene.id())
            .into_iter()
            .map(|item| SourceSummary {
                name: item.name,
                has_audio: item.has_audio,
            })
            .collect())
    }

    /// Mute or unmute a source. Unknown names are ignored.
    pub fn set_muted(&self, name: &str, muted: bool) {
        match SourceRef::by_name(&self.engine, name) {
            Some(source) => {
                self.engine.source_set_muted(source.id(), muted);
                debug!(name, muted, "Mute changed");
            }
            None => debug!(name, "Mute change for unknown source ignored"),
        }
    }

    /// Mute state of a source; false for unknown names.
    pub fn is_muted(&self, name: &str) -> bool {
        SourceRef::by_name(&self.engine, name)
            .is_some_and(|source| self.engine.source_muted(source.id()))
    }

    /// Property schema of a source.
    pub fn properties(&self, name: &str) -> SessionResult<Vec<PropertyInfo>> {
        let source = self.source(name)?;
        Ok(self.engine.source_properties(source.id()))
    }

    /// Merge `update` into a source's settings.
    pub fn update_properties(&self, name: &str, update: &Settings) -> SessionResult<()> {
        let source = self.source(name)?;
        self.engine.source_update(source.id(), update);
        debug!(name, keys = update.len(), "Source settings updated");
        Ok(())
    }

    /// Current settings of a source.
    pub fn settings(&self, name: &str) -> SessionResult<Settings> {
        let source = self.source(name)?;
        Ok(self.engine.source_settings(source.id()))
    }

    fn source(&self, name: &str) -> SessionResult<SourceRef> {
        SourceRef::by_name(&self.engine, name)
            .ok_or_else(|| SessionError::SourceNotFound(name.to_string()))
    }

    /// Release every scene reference held by the registry.
    pub fn clear(&mut self) {
        if !self.scenes.is_empty() {
            info!(count = self.scenes.len(), "Releasing scenes");
        }
        self.scenes.clear();
    }

    pub(crate) fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }
}
