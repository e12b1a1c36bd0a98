//! Dispatch of host requests onto a [`Session`].
//!
//! Requests carry an operation name and positional JSON arguments. Arity and
//! argument types are checked here; any mismatch is reported as
//! `InvalidArguments` without touching the session.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use titan_ipc::{HostReply, HostRequest, SceneGraphSnapshot, Settings};

use crate::error::{SessionError, SessionResult};
use crate::session::Session;

/// Every operation understood by [`dispatch`].
pub const OPERATIONS: &[&str] = &[
    "startup",
    "shutdown",
    "createScene",
    "listScenes",
    "addSource",
    "removeSource",
    "getSceneSources",
    "getSourceProperties",
    "updateSourceProperties",
    "setSourceMuted",
    "isSourceMuted",
    "getAudioLevels",
    "setPreviewScene",
    "executeTransition",
    "getProgramSceneName",
    "startStreaming",
    "stopStreaming",
    "isStreaming",
    "startRecording",
    "stopRecording",
    "isRecording",
    "getOutputStatus",
    "fetchLatestFrame",
    "snapshotSceneGraph",
    "restoreSceneGraph",
];

/// Positional arguments of one request.
struct Args<'a> {
    op: &'a str,
    values: &'a [Value],
}

impl<'a> Args<'a> {
    fn expect(&self, count: usize) -> SessionResult<&Self> {
        if self.values.len() != count {
            return Err(SessionError::InvalidArguments(format!(
                "{} expects {} argument(s), got {}",
                self.op,
                count,
                self.values.len()
            )));
        }
        Ok(self)
    }

    fn str(&self, index: usize) -> SessionResult<&'a str> {
        self.values[index].as_str().ok_or_else(|| self.mismatch(index, "a string"))
    }

    fn bool(&self, index: usize) -> SessionResult<bool> {
        self.values[index].as_bool().ok_or_else(|| self.mismatch(index, "a boolean"))
    }

    fn object<T: DeserializeOwned>(&self, index: usize, what: &str) -> SessionResult<T> {
        serde_json::from_value(self.values[index].clone()).map_err(|e| {
            SessionError::InvalidArguments(format!(
                "{} argument {} must be {}: {}",
                self.op,
                index + 1,
                what,
                e
            ))
        })
    }

    fn mismatch(&self, index: usize, what: &str) -> SessionError {
        SessionError::InvalidArguments(format!(
            "{} argument {} must be {}",
            self.op,
            index + 1,
            what
        ))
    }
}

fn json<T: Serialize>(value: T) -> SessionResult<Value> {
    serde_json::to_value(value).map_err(|e| SessionError::InvalidArguments(e.to_string()))
}

/// Run one request against `session` and build its reply.
pub fn dispatch(session: &mut Session, request: &HostRequest) -> HostReply {
    debug!(op = %request.op, args = request.args.len(), "Dispatching host request");

    match handle(session, &request.op, &request.args) {
        Ok(value) => HostReply::success(request.id, value),
        Err(e) => {
            warn!(op = %request.op, "Host request failed: {}", e);
            HostReply::failure(request.id, e.kind(), e.to_string())
        }
    }
}

fn handle(session: &mut Session, op: &str, values: &[Value]) -> SessionResult<Value> {
    let args = Args { op, values };

    match op {
        "startup" => {
            args.expect(0)?;
            session.startup()?;
            Ok(Value::Null)
        }
        "shutdown" => {
            args.expect(0)?;
            session.shutdown();
            Ok(Value::Null)
        }
        "createScene" => {
            let name = args.expect(1)?.str(0)?;
            session.create_scene(name)?;
            Ok(Value::Null)
        }
        "listScenes" => {
            args.expect(0)?;
            json(session.list_scenes()?.collect::<Vec<_>>())
        }
        "addSource" => {
            let args = args.expect(3)?;
            session.add_source(args.str(0)?, args.str(1)?, args.str(2)?)?;
            Ok(Value::Null)
        }
        "removeSource" => {
            let args = args.expect(2)?;
            session.remove_source(args.str(0)?, args.str(1)?)?;
            Ok(Value::Null)
        }
        "getSceneSources" => {
            let name = args.expect(1)?.str(0)?;
            json(session.scene_sources(name)?)
        }
        "getSourceProperties" => {
            let name = args.expect(1)?.str(0)?;
            json(session.source_properties(name)?)
        }
        "updateSourceProperties" => {
            let args = args.expect(2)?;
            let update: Settings = args.object(1, "a map of string, integer or boolean values")?;
            session.update_source_properties(args.str(0)?, &update)?;
            Ok(Value::Null)
        }
        "setSourceMuted" => {
            let args = args.expect(2)?;
            session.set_source_muted(args.str(0)?, args.bool(1)?)?;
            Ok(Value::Null)
        }
        "isSourceMuted" => {
            let name = args.expect(1)?.str(0)?;
            Ok(Value::Bool(session.is_source_muted(name)))
        }
        "getAudioLevels" => {
            args.expect(0)?;
            json(session.audio_levels())
        }
        "setPreviewScene" => {
            let name = args.expect(1)?.str(0)?;
            session.set_preview_scene(name)?;
            Ok(Value::Null)
        }
        "executeTransition" => {
            args.expect(0)?;
            Ok(Value::Bool(session.execute_transition()?))
        }
        "getProgramSceneName" => {
            args.expect(0)?;
            json(session.program_scene_name())
        }
        "startStreaming" => {
            let args = args.expect(2)?;
            session.start_streaming(args.str(0)?, args.str(1)?)?;
            Ok(Value::Null)
        }
        "stopStreaming" => {
            args.expect(0)?;
            session.stop_streaming()?;
            Ok(Value::Null)
        }
        "isStreaming" => {
            args.expect(0)?;
            Ok(Value::Bool(session.is_streaming()))
        }
        "startRecording" => {
            args.expect(0)?;
            session.start_recording()?;
            Ok(Value::Null)
        }
        "stopRecording" => {
            args.expect(0)?;
            session.stop_recording()?;
            Ok(Value::Null)
        }
        "isRecording" => {
            args.expect(0)?;
            Ok(Value::Bool(session.is_recording()))
        }
        "getOutputStatus" => {
            args.expect(0)?;
            json(session.output_status())
        }
        "fetchLatestFrame" => {
            args.expect(0)?;
            json(session.fetch_latest_frame().payload())
        }
        "snapshotSceneGraph" => {
            args.expect(0)?;
            json(session.snapshot()?)
        }
        "restoreSceneGraph" => {
            let snapshot: SceneGraphSnapshot = args.expect(1)?.object(0, "a scene graph")?;
            json(session.restore(&snapshot)?)
        }
        _ => Err(SessionError::InvalidArguments(format!("unknown operation: {op}"))),
    }
}
