//! Snapshot and best-effort restore of the whole scene graph.

use tracing::{debug, info, instrument, warn};

use titan_ipc::{
    RestoreReport, SceneGraphSnapshot, SceneSnapshot, SkippedSource, SourceSnapshot,
};

use crate::audio_monitor::AudioMonitor;
use crate::compositor::Compositor;
use crate::error::SessionError;
use crate::registry::Registry;

/// Capture every scene with its top-level sources, settings and transforms.
///
/// Groups cannot be recreated through the registry, so group items and the
/// sources inside them are left out and logged.
pub fn snapshot(registry: &Registry) -> SceneGraphSnapshot {
    let engine = registry.engine();
    let mut scenes = Vec::new();

    for name in registry.list_scenes() {
        let Ok(scene) = registry.scene(&name) else {
            continue;
        };
        let sources = engine
            .scene_items(scene.id())
            .into_iter()
            .filter(|item| {
                if item.is_group() {
                    warn!(scene = %name, group = %item.name, "Group not captured in snapshot");
                }
                !item.is_group()
            })
            .map(|item| SourceSnapshot {
                settings: engine.source_settings(item.source),
                transform: engine.item_transform(item.id).unwrap_or_default(),
                name: item.name,
                kind: item.kind,
            })
            .collect();
        scenes.push(SceneSnapshot { name, sources });
    }

    debug!(scenes = scenes.len(), "Scene graph captured");
    SceneGraphSnapshot { scenes }
}

/// Recreate scenes and sources from `snapshot`.
///
/// Existing scenes are reused and sources already placed are updated in
/// place. A source that cannot be recreated is skipped and reported; the
/// first scene of the snapshot becomes program.
#[instrument(name = "restore", skip_all, fields(scenes = snapshot.scenes.len()))]
pub fn restore(
    snapshot: &SceneGraphSnapshot,
    registry: &mut Registry,
    compositor: &Compositor,
    audio: &AudioMonitor,
) -> RestoreReport {
    let mut report = RestoreReport::default();

    for scene in &snapshot.scenes {
        if registry.scene(&scene.name).is_err() {
            if let Err(e) = registry.create_scene(&scene.name, compositor) {
                warn!(scene = %scene.name, "Scene not restored: {}", e);
                report.skipped.extend(scene.sources.iter().map(|source| SkippedSource {
                    scene: scene.name.clone(),
                    source: source.name.clone(),
                    reason: e.to_string(),
                }));
                continue;
            }
        }
        report.scenes += 1;

        for source in &scene.sources {
            match restore_source(registry, audio, &scene.name, source) {
                Ok(()) => report.sources += 1,
                Err(e) => {
                    warn!(scene = %scene.name, source = %source.name, "Source not restored: {}", e);
                    report.skipped.push(SkippedSource {
                        scene: scene.name.clone(),
                        source: source.name.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    if let Some(first) = snapshot.scenes.first() {
        if let Ok(scene) = registry.scene(&first.name) {
            compositor.set_program(&scene);
        }
    }
    compositor.clear_preview();

    info!(
        scenes = report.scenes,
        sources = report.sources,
        skipped = report.skipped.len(),
        "Scene graph restored"
    );
    report
}

fn restore_source(
    registry: &mut Registry,
    audio: &AudioMonitor,
    scene_name: &str,
    source: &SourceSnapshot,
) -> Result<(), SessionError> {
    let engine = registry.engine().clone();
    let scene = registry.scene(scene_name)?;

    let item = match engine.find_item_recursive(scene.id(), &source.name) {
        Some(existing) if existing.kind == source.kind => {
            engine.source_update(existing.source, &source.settings);
            existing.id
        }
        Some(_) => return Err(SessionError::DuplicateName(source.name.clone())),
        None => registry.add_source(scene_name, &source.kind, &source.name, &source.settings, audio)?,
    };

    engine.set_item_transform(item, &source.transform);
    Ok(())
}
