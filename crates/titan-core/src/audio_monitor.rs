//! Per-source audio peak metering.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use titan_engine::{MediaEngine, MeterId, MeterLevels, MeterScale, SourceRef};
use titan_ipc::AudioLevels;

/// Level reported for silence, in dBFS.
pub const SILENCE_DB: f32 = -96.0;

/// Convert a linear peak amplitude to dBFS, floored at [`SILENCE_DB`].
pub fn peak_to_db(peak: f32) -> f32 {
    if peak.is_nan() || peak <= 0.0 {
        return SILENCE_DB;
    }
    (20.0 * peak.log10()).max(SILENCE_DB)
}

struct Binding {
    meter: MeterId,
}

#[derive(Default)]
struct MeterTable {
    levels: AudioLevels,
    bindings: HashMap<String, Binding>,
}

/// Attaches a volume meter to every audio-capable source in the graph and
/// keeps the latest first-channel peak per source.
///
/// Meter listeners run on the engine's audio thread and only touch the
/// table lock, which is never held together with the frame lock.
pub struct AudioMonitor {
    engine: Arc<dyn MediaEngine>,
    scale: MeterScale,
    table: Arc<Mutex<MeterTable>>,
}

impl AudioMonitor {
    pub fn new(engine: Arc<dyn MediaEngine>, scale: MeterScale) -> Self {
        Self {
            engine,
            scale,
            table: Arc::new(Mutex::new(MeterTable::default())),
        }
    }

    /// Bind a meter to `source`. Returns false if the engine refused the
    /// attachment; the source is then never metered.
    pub fn bind(&self, source: &SourceRef) -> bool {
        let Some(name) = source.name() else {
            return false;
        };
        if self.is_bound(&name) {
            trace!(%name, "Already metered");
            return true;
        }

        let meter = self.engine.meter_create(self.scale);
        if !self.engine.meter_attach(meter, source.id()) {
            warn!(%name, "Volume meter attach failed, source will not be metered");
            self.engine.meter_destroy(meter);
            return false;
        }

        self.table
            .lock()
            .bindings
            .insert(name.clone(), Binding { meter });

        // The token lives exactly as long as the listener, which the engine
        // drops at meter_destroy.
        let token: Arc<str> = Arc::from(name.as_str());
        let table = Arc::clone(&self.table);
        self.engine.meter_add_listener(
            meter,
            Arc::new(move |levels: &MeterLevels<'_>| {
                let Some(&peak) = levels.peak.first() else {
                    return;
                };
                let db = peak_to_db(peak);
                let mut table = table.lock();
                if table.bindings.contains_key(&*token) {
                    table.levels.insert(token.to_string(), db);
                }
            }),
        );

        debug!(%name, %meter, "Volume meter bound");
        true
    }

    /// Tear down the binding for `name` and forget its level.
    pub fn unbind(&self, name: &str) -> bool {
        let Some(binding) = self.table.lock().bindings.remove(name) else {
            return false;
        };
        self.engine.meter_destroy(binding.meter);
        self.table.lock().levels.remove(name);
        debug!(name, "Volume meter unbound");
        true
    }

    /// Tear down every binding.
    pub fn unbind_all(&self) {
        let names: Vec<String> = self.table.lock().bindings.keys().cloned().collect();
        for name in names {
            self.unbind(&name);
        }
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.table.lock().bindings.contains_key(name)
    }

    /// Latest level per metered source, in dBFS.
    pub fn levels(&self) -> AudioLevels {
        self.table.lock().levels.clone()
    }
}

impl Drop for AudioMonitor {
    fn drop(&mut self) {
        self.unbind_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use titan_engine::SimulatedEngine;
    use titan_ipc::Settings;

    fn engine() -> (Arc<SimulatedEngine>, Arc<dyn MediaEngine>) {
        let sim = Arc::new(SimulatedEngine::default());
        assert!(sim.startup("en-US"));
        let engine: Arc<dyn MediaEngine> = sim.clone();
        (sim, engine)
    }

    #[test]
    fn test_peak_to_db() {
        assert_eq!(peak_to_db(1.0), 0.0);
        assert!((peak_to_db(0.5) + 6.0206).abs() < 1e-3);
        assert_eq!(peak_to_db(0.0), SILENCE_DB);
        assert_eq!(peak_to_db(1e-9), SILENCE_DB);
        assert_eq!(peak_to_db(f32::NAN), SILENCE_DB);
    }

    #[test]
    fn test_level_published_after_callback_and_removed_on_unbind() {
        let (sim, engine) = engine();
        let mic =
            SourceRef::create_source(&engine, "audio_input_capture", "Mic", &Settings::new())
                .unwrap();
        let monitor = AudioMonitor::new(Arc::clone(&engine), MeterScale::Cubic);

        assert!(monitor.bind(&mic));
        assert!(monitor.levels().is_empty());

        sim.set_signal_level("Mic", 1.0).unwrap();
        sim.audio_tick();
        assert_eq!(monitor.levels().get("Mic"), Some(&0.0));

        assert!(monitor.unbind("Mic"));
        assert!(!monitor.levels().contains_key("Mic"));
        sim.audio_tick();
        assert!(monitor.levels().is_empty());
        assert!(!monitor.unbind("Mic"));
        assert_eq!(sim.live_objects().meters, 0);
    }

    #[test]
    fn test_bind_fails_for_video_only_source() {
        let (sim, engine) = engine();
        let cam = SourceRef::create_source(&engine, "capture_device", "Cam", &Settings::new())
            .unwrap();
        let monitor = AudioMonitor::new(Arc::clone(&engine), MeterScale::Cubic);

        assert!(!monitor.bind(&cam));
        assert!(!monitor.is_bound("Cam"));
        assert_eq!(sim.live_objects().meters, 0);
    }
}
