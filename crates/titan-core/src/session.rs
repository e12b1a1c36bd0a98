//! The session: startup/shutdown state machine and host-facing operations.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use titan_engine::{MediaEngine, RenderCallbackId, RenderTargetId};
use titan_ipc::{
    AudioLevels, OutputKind, OutputStatus, PropertyInfo, RestoreReport, SceneGraphSnapshot,
    SessionState, Settings, SourceSummary,
};

use crate::audio_monitor::AudioMonitor;
use crate::compositor::Compositor;
use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::frames::{Frame, FrameExchange};
use crate::outputs::OutputManager;
use crate::registry::{Registry, SceneNames};
use crate::serializer;

/// Everything that exists only between startup and shutdown.
struct Running {
    registry: Registry,
    compositor: Compositor,
    audio: AudioMonitor,
    outputs: OutputManager,
    frames: Arc<FrameExchange>,
    render_callback: RenderCallbackId,
    preview_target: RenderTargetId,
}

/// A switcher session over one media engine.
///
/// Control operations take `&mut self`: the session is driven from a single
/// control thread, while the engine's render and audio threads only reach
/// the frame exchange and the meter table.
pub struct Session {
    engine: Arc<dyn MediaEngine>,
    config: SessionConfig,
    running: Option<Running>,
}

impl Session {
    /// Create a stopped session.
    pub fn new(engine: Arc<dyn MediaEngine>, config: SessionConfig) -> Self {
        Self {
            engine,
            config,
            running: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        if self.running.is_some() {
            SessionState::Running
        } else {
            SessionState::Stopped
        }
    }

    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Start the engine and build the switcher. No-op while running.
    #[instrument(name = "session_startup", skip(self))]
    pub fn startup(&mut self) -> SessionResult<()> {
        if self.running.is_some() {
            debug!("Already running, ignoring startup");
            return Ok(());
        }

        info!(locale = %self.config.locale, "Starting session");
        if !self.engine.startup(&self.config.locale) {
            return Err(SessionError::EngineStartupFailed(format!(
                "engine refused locale {}",
                self.config.locale
            )));
        }

        let frames = Arc::new(FrameExchange::new());
        let compositor =
            match Compositor::new(Arc::clone(&self.engine), &self.config, Arc::clone(&frames)) {
                Ok(compositor) => compositor,
                Err(e) => {
                    self.engine.shutdown();
                    return Err(e);
                }
            };

        let preview_target = self.engine.render_target_create();
        let render_callback = self
            .engine
            .register_render_callback(compositor.render_callback(preview_target));

        self.running = Some(Running {
            registry: Registry::new(Arc::clone(&self.engine)),
            audio: AudioMonitor::new(Arc::clone(&self.engine), self.config.meter_scale),
            outputs: OutputManager::new(Arc::clone(&self.engine), self.config.output.clone()),
            compositor,
            frames,
            render_callback,
            preview_target,
        });

        info!("Session running");
        Ok(())
    }

    /// Tear everything down in reverse order and stop the engine.
    /// No-op while stopped.
    #[instrument(name = "session_shutdown", skip(self))]
    pub fn shutdown(&mut self) {
        let Some(running) = self.running.take() else {
            debug!("Already stopped, ignoring shutdown");
            return;
        };
        info!("Shutting down session");

        let Running {
            mut registry,
            compositor,
            audio,
            mut outputs,
            frames,
            render_callback,
            preview_target,
        } = running;

        outputs.stop_all();
        drop(outputs);
        audio.unbind_all();
        drop(audio);

        self.engine.unregister_render_callback(render_callback);
        self.engine.render_target_destroy(preview_target);
        compositor.shutdown();
        registry.clear();
        frames.reset();

        self.engine.shutdown();
        info!("Session stopped");
    }

    fn running(&self) -> SessionResult<&Running> {
        self.running.as_ref().ok_or(SessionError::NotRunning)
    }

    fn running_mut(&mut self) -> SessionResult<&mut Running> {
        self.running.as_mut().ok_or(SessionError::NotRunning)
    }

    // Registry

    pub fn create_scene(&mut self, name: &str) -> SessionResult<()> {
        let running = self.running_mut()?;
        running.registry.create_scene(name, &running.compositor)
    }

    /// Lazily enumerate scene names.
    pub fn list_scenes(&self) -> SessionResult<SceneNames<'_>> {
        Ok(self.running()?.registry.list_scenes())
    }

    /// Place a new source of `kind` named `name` in a scene.
    pub fn add_source(&mut self, scene: &str, kind: &str, name: &str) -> SessionResult<()> {
        self.add_source_with_settings(scene, kind, name, &Settings::new())
    }

    /// Place a source, creating it with `settings` if it does not exist yet.
    pub fn add_source_with_settings(
        &mut self,
        scene: &str,
        kind: &str,
        name: &str,
        settings: &Settings,
    ) -> SessionResult<()> {
        let running = self.running_mut()?;
        running
            .registry
            .add_source(scene, kind, name, settings, &running.audio)
            .map(|_| ())
    }

    /// Remove a source from a scene. Returns false if it was not there.
    pub fn remove_source(&mut self, scene: &str, name: &str) -> SessionResult<bool> {
        let running = self.running_mut()?;
        running.registry.remove_source(scene, name, &running.audio)
    }

    pub fn scene_sources(&self, scene: &str) -> SessionResult<Vec<SourceSummary>> {
        self.running()?.registry.scene_sources(scene)
    }

    pub fn source_properties(&self, name: &str) -> SessionResult<Vec<PropertyInfo>> {
        self.running()?.registry.properties(name)
    }

    pub fn update_source_properties(&mut self, name: &str, update: &Settings) -> SessionResult<()> {
        self.running_mut()?.registry.update_properties(name, update)
    }

    pub fn source_settings(&self, name: &str) -> SessionResult<Settings> {
        self.running()?.registry.settings(name)
    }

    pub fn set_source_muted(&mut self, name: &str, muted: bool) -> SessionResult<()> {
        self.running_mut()?.registry.set_muted(name, muted);
        Ok(())
    }

    /// Mute state of a source; false for unknown names or when stopped.
    pub fn is_source_muted(&self, name: &str) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.registry.is_muted(name))
    }

    // Metering

    /// Latest level per metered source in dBFS; empty when stopped.
    pub fn audio_levels(&self) -> AudioLevels {
        self.running
            .as_ref()
            .map(|running| running.audio.levels())
            .unwrap_or_default()
    }

    // Compositor

    pub fn set_preview_scene(&mut self, name: &str) -> SessionResult<()> {
        self.running_mut()?.compositor.set_preview(name)
    }

    /// Swap preview into program. Returns false if no preview was set.
    pub fn execute_transition(&mut self) -> SessionResult<bool> {
        Ok(self.running_mut()?.compositor.execute())
    }

    pub fn program_scene_name(&self) -> Option<String> {
        self.running.as_ref()?.compositor.program_name()
    }

    pub fn preview_scene_name(&self) -> Option<String> {
        self.running.as_ref()?.compositor.preview_name()
    }

    // Outputs

    pub fn start_streaming(&mut self, server: &str, key: &str) -> SessionResult<()> {
        self.running_mut()?.outputs.start_streaming(server, key)
    }

    pub fn stop_streaming(&mut self) -> SessionResult<()> {
        self.running_mut()?.outputs.stop(OutputKind::Streaming);
        Ok(())
    }

    pub fn is_streaming(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.outputs.is_active(OutputKind::Streaming))
    }

    pub fn start_recording(&mut self) -> SessionResult<()> {
        self.running_mut()?.outputs.start_recording()
    }

    pub fn stop_recording(&mut self) -> SessionResult<()> {
        self.running_mut()?.outputs.stop(OutputKind::Recording);
        Ok(())
    }

    pub fn is_recording(&self) -> bool {
        self.running
            .as_ref()
            .is_some_and(|running| running.outputs.is_active(OutputKind::Recording))
    }

    pub fn output_status(&self) -> OutputStatus {
        self.running
            .as_ref()
            .map(|running| running.outputs.status())
            .unwrap_or_default()
    }

    // Frames

    /// Latest program/preview frames; empty when stopped.
    pub fn fetch_latest_frame(&self) -> Frame {
        self.running
            .as_ref()
            .map(|running| running.frames.fetch())
            .unwrap_or_default()
    }

    // Serialization

    pub fn snapshot(&self) -> SessionResult<SceneGraphSnapshot> {
        Ok(serializer::snapshot(&self.running()?.registry))
    }

    pub fn restore(&mut self, snapshot: &SceneGraphSnapshot) -> SessionResult<RestoreReport> {
        let running = self.running_mut()?;
        Ok(serializer::restore(
            snapshot,
            &mut running.registry,
            &running.compositor,
            &running.audio,
        ))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}
