//! Program/preview switching over the engine's shared transition.

use std::sync::{Arc, Weak};

use tracing::{debug, info, instrument, trace};

use titan_engine::{
    MediaEngine, RenderCallback, RenderTargetId, SourceRef, TransitionMode, MAIN_CHANNEL,
};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::frames::{FrameExchange, FrameSlot};

/// Name of the private transition feeding the main output channel.
const TRANSITION_NAME: &str = "titan_transition";

/// Two-slot switcher. Slot A of the transition is program; preview is a
/// nominated source rendered off-screen until the next transition.
pub struct Compositor {
    engine: Arc<dyn MediaEngine>,
    transition: SourceRef,
    frames: Arc<FrameExchange>,
    duration_ms: u32,
}

impl Compositor {
    /// Create the transition and route it to the main output channel.
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        config: &SessionConfig,
        frames: Arc<FrameExchange>,
    ) -> SessionResult<Self> {
        let transition =
            SourceRef::create_transition(&engine, &config.transition_kind, TRANSITION_NAME)
                .ok_or_else(|| SessionError::SourceCreateFailed {
                    kind: config.transition_kind.clone(),
                    name: TRANSITION_NAME.to_string(),
                })?;
        engine.set_output_source(MAIN_CHANNEL, Some(transition.id()));
        debug!(kind = %config.transition_kind, "Transition created");

        Ok(Self {
            engine,
            transition,
            frames,
            duration_ms: config.transition_duration_ms,
        })
    }

    /// Returns true once a program source has been assigned.
    pub fn has_program(&self) -> bool {
        SourceRef::slot_a(&self.engine, self.transition.id()).is_some()
    }

    /// Make `source` program immediately, bypassing preview.
    pub fn set_program(&self, source: &SourceRef) {
        self.engine
            .transition_set(self.transition.id(), Some(source.id()));
    }

    /// Name of the current program source.
    pub fn program_name(&self) -> Option<String> {
        SourceRef::slot_a(&self.engine, self.transition.id()).and_then(|program| program.name())
    }

    /// Name of the nominated preview source.
    pub fn preview_name(&self) -> Option<String> {
        self.frames.preview_source()
    }

    /// Stage `name` as the next program and start rendering it as preview.
    ///
    /// Nominating the current program clears the preview instead.
    #[instrument(name = "set_preview", skip(self))]
    pub fn set_preview(&self, name: &str) -> SessionResult<()> {
        let source = SourceRef::by_name(&self.engine, name)
            .ok_or_else(|| SessionError::SourceNotFound(name.to_string()))?;

        if self.program_name().as_deref() == Some(name) {
            debug!("Preview equals program, clearing preview");
            self.clear_preview();
            return Ok(());
        }

        self.engine
            .transition_set_target(self.transition.id(), source.id());
        self.frames.nominate_preview(Some(name.to_string()));
        debug!("Preview nominated");
        Ok(())
    }

    /// Swap preview into program. Returns false if no preview was set.
    #[instrument(name = "execute_transition", skip(self))]
    pub fn execute(&self) -> bool {
        let Some(preview) = self.frames.preview_source() else {
            debug!("No preview set, ignoring transition");
            return false;
        };

        let started =
            self.engine
                .transition_start(self.transition.id(), TransitionMode::Auto, self.duration_ms);
        self.frames.nominate_preview(None);
        if started {
            info!(program = %preview, "Transition executed");
        }
        started
    }

    /// Drop the preview nomination and the staged transition target.
    pub fn clear_preview(&self) {
        self.engine.transition_clear_target(self.transition.id());
        self.frames.nominate_preview(None);
    }

    /// Render callback publishing program and preview frames each tick.
    pub fn render_callback(&self, target: RenderTargetId) -> RenderCallback {
        let engine = Arc::downgrade(&self.engine);
        let frames = Arc::clone(&self.frames);
        Arc::new(move |_width, _height| render_tick(&engine, &frames, target))
    }

    /// Detach the transition from the output channel and clear slot A.
    pub fn shutdown(self) {
        self.clear_preview();
        self.engine.set_output_source(MAIN_CHANNEL, None);
        self.engine.transition_set(self.transition.id(), None);
        debug!("Transition released");
    }
}

fn render_tick(engine: &Weak<dyn MediaEngine>, frames: &FrameExchange, target: RenderTargetId) {
    let Some(engine) = engine.upgrade() else {
        return;
    };

    if let Some(texture) = engine.main_texture() {
        let (width, height) = engine.texture_size(texture);
        if width > 0 && height > 0 {
            if let Some(mapped) = engine.map_texture(texture) {
                frames.publish(
                    FrameSlot::Program,
                    &mapped.pixels,
                    mapped.row_stride,
                    mapped.width,
                    mapped.height,
                );
                engine.unmap_texture(texture);
            }
        }
    }

    let Some(name) = frames.preview_source() else {
        frames.clear_preview();
        return;
    };
    let Some(source) = SourceRef::by_name(&engine, &name) else {
        trace!(%name, "Preview source gone");
        frames.clear_preview();
        return;
    };

    let (width, height) = frames.dimensions();
    if !engine.render_target_begin(target, width, height) {
        return;
    }
    engine.render_source(source.id());
    engine.render_target_end(target);

    let Some(texture) = engine.render_target_texture(target) else {
        return;
    };
    if let Some(mapped) = engine.map_texture(texture) {
        frames.publish_preview(
            &name,
            &mapped.pixels,
            mapped.row_stride,
            mapped.width,
            mapped.height,
        );
        engine.unmap_texture(texture);
    }
}
