//! Background threads driving the simulated engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument};

use super::SimulatedEngine;

/// Interval between audio blocks.
const AUDIO_TICK_INTERVAL: Duration = Duration::from_millis(10);

/// Render and audio threads for a [`SimulatedEngine`]. Stops on drop.
pub struct SimClock {
    should_stop: Arc<AtomicBool>,
    threads: Vec<JoinHandle<()>>,
}

impl SimClock {
    pub(crate) fn start(engine: Arc<SimulatedEngine>) -> Self {
        let fps = engine.config().fps.max(1);
        let frame_interval = Duration::from_secs(1) / fps;
        info!(fps, "Starting simulated engine clock");

        let should_stop = Arc::new(AtomicBool::new(false));

        let render_engine = Arc::clone(&engine);
        let render_stop = Arc::clone(&should_stop);
        let render = thread::spawn(move || {
            tick_loop(frame_interval, &render_stop, || render_engine.render_tick());
        });

        let audio_stop = Arc::clone(&should_stop);
        let audio = thread::spawn(move || {
            tick_loop(AUDIO_TICK_INTERVAL, &audio_stop, || engine.audio_tick());
        });

        Self {
            should_stop,
            threads: vec![render, audio],
        }
    }

    /// Returns true while the threads are running.
    pub fn is_running(&self) -> bool {
        !self.threads.is_empty()
    }

    /// Stop both threads and wait for them to exit.
    #[instrument(name = "sim_clock_stop", skip(self))]
    pub fn stop(&mut self) {
        if self.threads.is_empty() {
            return;
        }
        self.should_stop.store(true, Ordering::SeqCst);
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
        info!("Simulated engine clock stopped");
    }
}

impl Drop for SimClock {
    fn drop(&mut self) {
        self.stop();
    }
}

fn tick_loop(interval: Duration, should_stop: &AtomicBool, mut tick: impl FnMut()) {
    debug!(?interval, "Clock thread started");
    let mut next_tick = Instant::now();

    while !should_stop.load(Ordering::SeqCst) {
        tick();

        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            // Fell behind, don't try to catch up.
            next_tick = now;
        }
    }

    debug!("Clock thread exiting");
}
