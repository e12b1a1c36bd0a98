//! Streaming and recording output lifecycle.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, info, instrument, warn};

use titan_engine::{EncoderId, MediaEngine, OutputId};
use titan_ipc::{OutputKind, OutputPhase, OutputStatus, SettingValue, Settings};

use crate::config::OutputConfig;
use crate::error::{SessionError, SessionResult};

/// Two independent outputs sharing one video and one audio encoder.
///
/// Encoders are created by whichever output starts first and released once
/// neither output is active.
pub struct OutputManager {
    engine: Arc<dyn MediaEngine>,
    config: OutputConfig,
    streaming: Option<OutputId>,
    recording: Option<OutputId>,
    video_encoder: Option<EncoderId>,
    audio_encoder: Option<EncoderId>,
}

impl OutputManager {
    pub fn new(engine: Arc<dyn MediaEngine>, config: OutputConfig) -> Self {
        Self {
            engine,
            config,
            streaming: None,
            recording: None,
            video_encoder: None,
            audio_encoder: None,
        }
    }

    /// Start streaming to `server` with `key`.
    pub fn start_streaming(&mut self, server: &str, key: &str) -> SessionResult<()> {
        let mut settings = Settings::new();
        settings.insert("server".into(), SettingValue::from(server));
        settings.insert("key".into(), SettingValue::from(key));
        self.start(OutputKind::Streaming, &settings)
    }

    /// Start recording into a timestamped file in the recording directory.
    pub fn start_recording(&mut self) -> SessionResult<()> {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let path = self
            .config
            .recording_dir
            .join(format!("titan-{secs}.{}", self.config.recording_format));

        let mut settings = Settings::new();
        settings.insert(
            "path".into(),
            SettingValue::from(path.to_string_lossy().into_owned()),
        );
        self.start(OutputKind::Recording, &settings)
    }

    /// Start an output. Starting an active output is a no-op.
    #[instrument(name = "output_start", skip(self, settings))]
    pub fn start(&mut self, kind: OutputKind, settings: &Settings) -> SessionResult<()> {
        if self.is_active(kind) {
            debug!("Already active, ignoring start");
            return Ok(());
        }
        // An output that ended on its own still holds a handle.
        if let Some(stale) = self.slot(kind).take() {
            self.engine.output_release(stale);
        }

        info!("Starting output");
        let mut phase = OutputPhase::CreateEncoders;
        loop {
            if let Err(e) = self.run_phase(kind, phase, settings) {
                error!(phase = phase.name(), "Output start failed: {}", e);
                self.rollback(kind, phase);
                return Err(e);
            }
            match phase.next() {
                Some(next) => phase = next,
                None => break,
            }
        }

        info!("Output started");
        Ok(())
    }

    fn run_phase(
        &mut self,
        kind: OutputKind,
        phase: OutputPhase,
        settings: &Settings,
    ) -> SessionResult<()> {
        debug!(phase = phase.name(), "Running output phase");

        match phase {
            OutputPhase::CreateEncoders => self.ensure_encoders(),
            OutputPhase::CreateOutput => {
                let (output_kind, name) = match kind {
                    OutputKind::Streaming => (&self.config.stream_output_kind, "titan_stream"),
                    OutputKind::Recording => (&self.config.record_output_kind, "titan_record"),
                };
                let output = self
                    .engine
                    .output_create(output_kind, name, settings)
                    .ok_or(SessionError::OutputCreateFailed(kind))?;

                if let (Some(video), Some(audio)) = (self.video_encoder, self.audio_encoder) {
                    self.engine.output_set_video_encoder(output, video);
                    self.engine.output_set_audio_encoder(output, audio);
                }
                *self.slot(kind) = Some(output);
                Ok(())
            }
            OutputPhase::StartOutput => {
                let output = (*self.slot(kind)).ok_or(SessionError::OutputCreateFailed(kind))?;
                if self.engine.output_start(output) {
                    Ok(())
                } else {
                    Err(SessionError::OutputStartFailed {
                        kind,
                        message: self
                            .engine
                            .output_last_error(output)
                            .unwrap_or_else(|| "rejected by engine".to_string()),
                    })
                }
            }
        }
    }

    fn ensure_encoders(&mut self) -> SessionResult<()> {
        if self.video_encoder.is_none() {
            let mut settings = Settings::new();
            settings.insert(
                "bitrate".into(),
                SettingValue::Int(self.config.video_bitrate_kbps.into()),
            );
            settings.insert("rate_control".into(), SettingValue::from("CBR"));
            self.video_encoder = Some(
                self.engine
                    .video_encoder_create(&self.config.video_encoder_kind, "titan_video", &settings)
                    .ok_or(SessionError::EncoderCreateFailed("video"))?,
            );
            debug!(kind = %self.config.video_encoder_kind, "Video encoder created");
        }

        if self.audio_encoder.is_none() {
            let mut settings = Settings::new();
            settings.insert(
                "bitrate".into(),
                SettingValue::Int(self.config.audio_bitrate_kbps.into()),
            );
            self.audio_encoder = Some(
                self.engine
                    .audio_encoder_create(&self.config.audio_encoder_kind, "titan_audio", &settings)
                    .ok_or(SessionError::EncoderCreateFailed("audio"))?,
            );
            debug!(kind = %self.config.audio_encoder_kind, "Audio encoder created");
        }

        Ok(())
    }

    /// Undo phases from `failed` backwards.
    fn rollback(&mut self, kind: OutputKind, failed: OutputPhase) {
        let mut phase = failed;
        loop {
            debug!(phase = phase.name(), "Rolling back output phase");
            match phase {
                OutputPhase::StartOutput => {}
                OutputPhase::CreateOutput => {
                    if let Some(output) = self.slot(kind).take() {
                        self.engine.output_release(output);
                    }
                }
                OutputPhase::CreateEncoders => self.release_encoders_if_idle(),
            }
            match phase.previous() {
                Some(previous) => phase = previous,
                None => break,
            }
        }
    }

    /// Stop an output. Stopping an idle output is a no-op.
    #[instrument(name = "output_stop", skip(self))]
    pub fn stop(&mut self, kind: OutputKind) {
        let Some(output) = self.slot(kind).take() else {
            debug!("Already idle, ignoring stop");
            return;
        };

        self.engine.output_stop(output);
        self.engine.output_release(output);
        info!("Output stopped");

        self.release_encoders_if_idle();
    }

    /// Stop both outputs.
    pub fn stop_all(&mut self) {
        self.stop(OutputKind::Streaming);
        self.stop(OutputKind::Recording);
    }

    fn release_encoders_if_idle(&mut self) {
        if self.is_active(OutputKind::Streaming) || self.is_active(OutputKind::Recording) {
            debug!("Other output still active, keeping encoders");
            return;
        }
        let released = [self.video_encoder.take(), self.audio_encoder.take()];
        for encoder in released.into_iter().flatten() {
            self.engine.encoder_release(encoder);
        }
        if released.iter().any(Option::is_some) {
            debug!("Shared encoders released");
        }
    }

    /// Whether the engine reports the output as active.
    pub fn is_active(&self, kind: OutputKind) -> bool {
        let handle = match kind {
            OutputKind::Streaming => self.streaming,
            OutputKind::Recording => self.recording,
        };
        handle.is_some_and(|output| self.engine.output_active(output))
    }

    pub fn status(&self) -> OutputStatus {
        OutputStatus {
            streaming: self.is_active(OutputKind::Streaming),
            recording: self.is_active(OutputKind::Recording),
            encoders_allocated: self.video_encoder.is_some() || self.audio_encoder.is_some(),
        }
    }

    fn slot(&mut self, kind: OutputKind) -> &mut Option<OutputId> {
        match kind {
            OutputKind::Streaming => &mut self.streaming,
            OutputKind::Recording => &mut self.recording,
        }
    }
}

impl Drop for OutputManager {
    fn drop(&mut self) {
        if self.streaming.is_some() || self.recording.is_some() {
            warn!("Output manager dropped with outputs alive, stopping");
        }
        self.stop_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use titan_engine::SimulatedEngine;

    fn setup() -> (Arc<SimulatedEngine>, OutputManager) {
        let sim = Arc::new(SimulatedEngine::default());
        assert!(sim.startup("en-US"));
        let engine: Arc<dyn MediaEngine> = sim.clone();
        (sim, OutputManager::new(engine, OutputConfig::default()))
    }

    #[test]
    fn test_start_streaming_is_idempotent() {
        let (sim, mut outputs) = setup();
        outputs.start_streaming("rtmp://live.example.com/app", "key").unwrap();
        outputs.start_streaming("rtmp://live.example.com/app", "key").unwrap();

        assert!(outputs.is_active(OutputKind::Streaming));
        assert_eq!(sim.live_objects().outputs, 1);
        assert_eq!(sim.live_objects().encoders, 2);
    }

    #[test]
    fn test_failed_start_rolls_back() {
        let (sim, mut outputs) = setup();
        let err = outputs.start_streaming("rtmp://live.example.com/app", "").unwrap_err();

        assert!(matches!(
            err,
            SessionError::OutputStartFailed {
                kind: OutputKind::Streaming,
                ..
            }
        ));
        assert!(!outputs.is_active(OutputKind::Streaming));
        assert_eq!(outputs.status(), OutputStatus::default());
        assert_eq!(sim.live_objects().outputs, 0);
        assert_eq!(sim.live_objects().encoders, 0);
    }

    #[test]
    fn test_encoders_shared_until_both_stopped() {
        let (sim, mut outputs) = setup();
        outputs.start_streaming("rtmp://live.example.com/app", "key").unwrap();
        outputs.start_recording().unwrap();
        assert_eq!(sim.live_objects().encoders, 2);

        outputs.stop(OutputKind::Recording);
        assert!(outputs.is_active(OutputKind::Streaming));
        assert!(outputs.status().encoders_allocated);
        assert_eq!(sim.live_objects().encoders, 2);

        outputs.stop(OutputKind::Recording);
        outputs.stop(OutputKind::Streaming);
        assert_eq!(outputs.status(), OutputStatus::default());
        assert_eq!(sim.live_objects().encoders, 0);
        assert_eq!(sim.live_objects().outputs, 0);
    }

    #[test]
    fn test_failed_start_keeps_encoders_of_active_output() {
        let (sim, mut outputs) = setup();
        outputs.start_recording().unwrap();
        assert!(outputs.start_streaming("http://nope", "key").is_err());

        assert!(outputs.is_active(OutputKind::Recording));
        assert!(outputs.status().encoders_allocated);
        assert_eq!(sim.live_objects().encoders, 2);
    }
}
