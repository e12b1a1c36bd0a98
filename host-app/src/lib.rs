//! Headless Titan host.
//!
//! Runs a session on its own thread over the simulated engine. Requests come
//! in as JSON lines, replies go out the same way. The scene collection is
//! restored from the state database after startup and saved back before the
//! session shuts down.

mod config;

pub use config::{CanvasConfig, HostConfig, CONFIG_ENV};

use std::io::{BufRead, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context};
use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use titan_core::{host, Session, SessionConfig};
use titan_engine::{MediaEngine, SimulatedEngine};
use titan_ipc::{reply_channel, request_channel, ErrorKind, HostReply, HostRequest};
use titan_store::SceneStore;

/// Install the tracing subscriber. `RUST_LOG` overrides the defaults.
pub fn init_logging() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "titan_host=debug,titan_core=debug,titan_engine=info,titan_store=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Client side of a session thread.
pub struct SessionHandle {
    request_tx: Option<Sender<HostRequest>>,
    reply_rx: Receiver<HostReply>,
    thread: Option<JoinHandle<anyhow::Result<()>>>,
}

impl SessionHandle {
    /// Send one request and wait for its reply.
    pub fn call(&self, request: HostRequest) -> anyhow::Result<HostReply> {
        let tx = self
            .request_tx
            .as_ref()
            .ok_or_else(|| anyhow!("session thread already finished"))?;
        tx.send(request)
            .map_err(|_| anyhow!("session thread stopped"))?;
        self.reply_rx
            .recv()
            .map_err(|_| anyhow!("session thread stopped without replying"))
    }

    /// Close the request channel and wait for the session to save and stop.
    pub fn finish(mut self) -> anyhow::Result<()> {
        self.join()
    }

    fn join(&mut self) -> anyhow::Result<()> {
        self.request_tx = None;
        match self.thread.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| anyhow!("session thread panicked"))?,
            None => Ok(()),
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        if let Err(e) = self.join() {
            error!("Session thread failed: {:#}", e);
        }
    }
}

/// Start a session on its own thread.
///
/// The thread starts the session, restores the saved scene collection, and
/// serves requests until the request channel closes. It then saves the
/// scene collection and shuts the session down.
pub fn spawn_session(
    engine: Arc<dyn MediaEngine>,
    config: SessionConfig,
    store: SceneStore,
) -> SessionHandle {
    let (request_tx, request_rx) = request_channel();
    let (reply_tx, reply_rx) = reply_channel();

    let thread = thread::spawn(move || {
        info!("Session thread starting");
        let mut session = Session::new(engine, config);
        session.startup().context("starting session")?;
        restore_saved(&mut session, &store);

        for request in request_rx.iter() {
            let reply = serve(&mut session, &store, &request);
            if reply_tx.send(reply).is_err() {
                warn!("Reply channel closed");
                break;
            }
        }

        if session.is_running() {
            persist(&session, &store).context("saving scene collection")?;
        }
        session.shutdown();
        info!("Session thread stopped");
        Ok(())
    });

    SessionHandle {
        request_tx: Some(request_tx),
        reply_rx,
        thread: Some(thread),
    }
}

fn serve(session: &mut Session, store: &SceneStore, request: &HostRequest) -> HostReply {
    // Save before the graph disappears with the engine.
    if request.op == "shutdown" && session.is_running() {
        if let Err(e) = persist(session, store) {
            session.shutdown();
            return HostReply::failure(request.id, ErrorKind::Storage, format!("{e:#}"));
        }
    }
    let was_running = session.is_running();
    let reply = host::dispatch(session, request);
    if request.op == "startup" && !was_running && session.is_running() {
        restore_saved(session, store);
    }
    reply
}

fn restore_saved(session: &mut Session, store: &SceneStore) {
    match store.load_state() {
        Ok(Some(snapshot)) => match session.restore(&snapshot) {
            Ok(report) => {
                for skipped in &report.skipped {
                    warn!(
                        scene = %skipped.scene,
                        source = %skipped.source,
                        "Skipped on restore: {}",
                        skipped.reason
                    );
                }
                info!(scenes = report.scenes, sources = report.sources, "Saved scenes restored");
            }
            Err(e) => warn!("Restore failed: {}", e),
        },
        Ok(None) => debug!("No saved scenes"),
        Err(e) => warn!("Failed to load saved scenes: {}", e),
    }
}

fn persist(session: &Session, store: &SceneStore) -> anyhow::Result<()> {
    let snapshot = session.snapshot()?;
    store.save_state(&snapshot)?;
    info!(scenes = snapshot.scenes.len(), "Scene collection saved");
    Ok(())
}

/// Serve JSON-line requests from `input` until EOF or a `quit` line.
pub fn serve_lines(
    handle: &SessionHandle,
    input: impl BufRead,
    mut output: impl Write,
) -> anyhow::Result<()> {
    for line in input.lines() {
        let line = line.context("reading request")?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line == "quit" {
            debug!("Quit requested");
            break;
        }

        let reply = match serde_json::from_str::<HostRequest>(line) {
            Ok(request) => handle.call(request)?,
            Err(e) => HostReply::failure(
                None,
                ErrorKind::InvalidArguments,
                format!("malformed request: {e}"),
            ),
        };
        serde_json::to_writer(&mut output, &reply)?;
        writeln!(output)?;
        output.flush()?;
    }
    Ok(())
}

/// Run the host over stdin/stdout until EOF.
pub fn run(config: HostConfig) -> anyhow::Result<()> {
    info!("Titan host starting");

    let store = SceneStore::open(&config.database_path).context("opening state database")?;
    let sim = Arc::new(SimulatedEngine::new(config.canvas.sim_config()));
    let mut clock = sim.start_clock();

    let handle = spawn_session(sim.clone(), config.session, store);
    let served = serve_lines(&handle, std::io::stdin().lock(), std::io::stdout().lock());
    let finished = handle.finish();
    clock.stop();

    served?;
    finished?;
    info!("Titan host stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn spawn(store: SceneStore) -> (Arc<SimulatedEngine>, SessionHandle) {
        let sim = Arc::new(SimulatedEngine::default());
        let handle = spawn_session(sim.clone(), SessionConfig::default(), store);
        (sim, handle)
    }

    fn call(handle: &SessionHandle, op: &str, args: Vec<Value>) -> HostReply {
        handle.call(HostRequest::new(op, args)).unwrap()
    }

    #[test]
    fn test_scene_collection_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("state.db");

        let (sim, handle) = spawn(SceneStore::open(&db).unwrap());
        assert!(call(&handle, "createScene", vec![json!("Main")]).ok);
        assert!(
            call(
                &handle,
                "addSource",
                vec![json!("Main"), json!("audio_input_capture"), json!("Mic")]
            )
            .ok
        );
        handle.finish().unwrap();
        assert!(!sim.is_started());
        assert!(sim.leaked_at_shutdown().is_empty());

        let (_sim, handle) = spawn(SceneStore::open(&db).unwrap());
        let reply = call(&handle, "getSceneSources", vec![json!("Main")]);
        assert_eq!(reply.value, Some(json!([{"name": "Mic", "hasAudio": true}])));
        let reply = call(&handle, "getProgramSceneName", vec![]);
        assert_eq!(reply.value, Some(json!("Main")));
    }

    #[test]
    fn test_shutdown_request_saves_first() {
        let store = SceneStore::open_in_memory().unwrap();
        let (_sim, handle) = spawn(store);
        call(&handle, "createScene", vec![json!("Intro")]);

        assert!(call(&handle, "shutdown", vec![]).ok);
        let reply = call(&handle, "listScenes", vec![]);
        assert_eq!(
            reply.error.map(|e| e.kind),
            Some(ErrorKind::NotRunning)
        );

        assert!(call(&handle, "startup", vec![]).ok);
        let reply = call(&handle, "listScenes", vec![]);
        assert_eq!(reply.value, Some(json!(["Intro"])));
    }

    #[test]
    fn test_serve_lines() {
        let store = SceneStore::open_in_memory().unwrap();
        let (_sim, handle) = spawn(store);

        let input = concat!(
            r#"{"id": 1, "op": "createScene", "args": ["Main"]}"#,
            "\n\n",
            "not json\n",
            r#"{"id": 2, "op": "isStreaming"}"#,
            "\nquit\n",
            r#"{"id": 3, "op": "listScenes"}"#,
            "\n"
        );
        let mut output = Vec::new();
        serve_lines(&handle, input.as_bytes(), &mut output).unwrap();

        let replies: Vec<HostReply> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(replies.len(), 3);
        assert_eq!(replies[0].id, Some(1));
        assert!(replies[0].ok);
        assert_eq!(
            replies[1].error.as_ref().map(|e| e.kind),
            Some(ErrorKind::InvalidArguments)
        );
        assert_eq!(replies[2].value, Some(json!(false)));
    }
}
