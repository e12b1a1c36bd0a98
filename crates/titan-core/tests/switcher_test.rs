//! End-to-end switcher behavior against the simulated engine.

use std::sync::Arc;

use titan_core::{Session, SessionConfig, SessionError};
use titan_engine::sim::color_for;
use titan_engine::{MediaEngine, SimConfig, SimulatedEngine, SourceRef};
use titan_ipc::{SourceSummary, Transform};

fn running_session() -> (Arc<SimulatedEngine>, Session) {
    let sim = Arc::new(SimulatedEngine::new(SimConfig {
        width: 16,
        height: 8,
        ..Default::default()
    }));
    let mut session = Session::new(sim.clone(), SessionConfig::default());
    session.startup().unwrap();
    (sim, session)
}

fn names(session: &Session, scene: &str) -> Vec<String> {
    session
        .scene_sources(scene)
        .unwrap()
        .into_iter()
        .map(|s| s.name)
        .collect()
}

#[test]
fn test_add_and_remove_capture_source() {
    let (_sim, mut session) = running_session();
    session.create_scene("Main").unwrap();
    session.add_source("Main", "capture_device", "Cam").unwrap();

    assert_eq!(
        session.scene_sources("Main").unwrap(),
        vec![SourceSummary {
            name: "Cam".into(),
            has_audio: false
        }]
    );

    assert!(session.remove_source("Main", "Cam").unwrap());
    assert!(session.scene_sources("Main").unwrap().is_empty());
}

#[test]
fn test_removed_source_never_listed_and_second_remove_is_noop() {
    let (_sim, mut session) = running_session();
    session.create_scene("Main").unwrap();
    for name in ["Cam", "Logo", "Title"] {
        let kind = match name {
            "Cam" => "capture_device",
            "Logo" => "image_source",
            _ => "text_source",
        };
        session.add_source("Main", kind, name).unwrap();
    }

    assert!(session.remove_source("Main", "Logo").unwrap());
    assert_eq!(names(&session, "Main"), vec!["Cam", "Title"]);
    assert!(!session.remove_source("Main", "Logo").unwrap());
    assert_eq!(names(&session, "Main"), vec!["Cam", "Title"]);
}

#[test]
fn test_registry_errors() {
    let (_sim, mut session) = running_session();
    session.create_scene("Main").unwrap();

    assert!(matches!(
        session.add_source("Nope", "capture_device", "Cam"),
        Err(SessionError::SceneNotFound(_))
    ));
    assert!(matches!(
        session.add_source("Main", "warp_drive", "Engine"),
        Err(SessionError::SourceCreateFailed { .. })
    ));
    assert!(matches!(
        session.remove_source("Nope", "Cam"),
        Err(SessionError::SceneNotFound(_))
    ));
    assert!(matches!(
        session.scene_sources("Nope"),
        Err(SessionError::SceneNotFound(_))
    ));

    session.add_source("Main", "capture_device", "Cam").unwrap();
    assert!(matches!(
        session.add_source("Main", "capture_device", "Cam"),
        Err(SessionError::DuplicateName(_))
    ));
    assert!(matches!(
        session.create_scene("Cam"),
        Err(SessionError::DuplicateName(_))
    ));
    assert!(matches!(
        session.add_source("Main", "image_source", "Cam"),
        Err(SessionError::DuplicateName(_))
    ));
    assert_eq!(names(&session, "Main"), vec!["Cam"]);
}

#[test]
fn test_audio_level_appears_after_callback_and_disappears_on_removal() {
    let (sim, mut session) = running_session();
    session.create_scene("Main").unwrap();
    session.add_source("Main", "audio_input_capture", "Mic").unwrap();
    assert_eq!(
        session.scene_sources("Main").unwrap()[0],
        SourceSummary {
            name: "Mic".into(),
            has_audio: true
        }
    );
    assert!(session.audio_levels().is_empty());

    sim.audio_tick();
    let level = session.audio_levels()["Mic"];
    assert!((level + 6.0206).abs() < 1e-3);

    session.remove_source("Main", "Mic").unwrap();
    assert!(!session.audio_levels().contains_key("Mic"));
    sim.audio_tick();
    assert!(session.audio_levels().is_empty());
}

#[test]
fn test_muted_source_reports_silence_floor() {
    let (sim, mut session) = running_session();
    session.create_scene("Main").unwrap();
    session.add_source("Main", "media_source", "Clip").unwrap();

    assert!(!session.is_source_muted("Clip"));
    session.set_source_muted("Clip", true).unwrap();
    assert!(session.is_source_muted("Clip"));
    sim.audio_tick();
    assert_eq!(session.audio_levels()["Clip"], titan_core::SILENCE_DB);

    session.set_source_muted("Ghost", true).unwrap();
    assert!(!session.is_source_muted("Ghost"));
}

#[test]
fn test_shared_source_keeps_meter_until_last_placement_removed() {
    let (sim, mut session) = running_session();
    session.create_scene("A").unwrap();
    session.create_scene("B").unwrap();
    session.add_source("A", "audio_input_capture", "Mic").unwrap();
    session.add_source("B", "audio_input_capture", "Mic").unwrap();

    session.remove_source("A", "Mic").unwrap();
    sim.audio_tick();
    assert!(session.audio_levels().contains_key("Mic"));

    session.remove_source("B", "Mic").unwrap();
    assert!(!session.audio_levels().contains_key("Mic"));
}

#[test]
fn test_removed_program_source_loses_meter() {
    let (sim, mut session) = running_session();
    session.create_scene("Main").unwrap();
    session.add_source("Main", "audio_input_capture", "Mic").unwrap();
    session.set_preview_scene("Mic").unwrap();
    assert!(session.execute_transition().unwrap());
    assert_eq!(session.program_scene_name().as_deref(), Some("Mic"));

    assert!(session.remove_source("Main", "Mic").unwrap());
    assert!(session.scene_sources("Main").unwrap().is_empty());
    sim.audio_tick();
    assert!(session.audio_levels().is_empty());
}

#[test]
fn test_abandoned_preview_source_is_destroyed_on_removal() {
    let (sim, mut session) = running_session();
    session.create_scene("Main").unwrap();
    session.add_source("Main", "media_source", "Clip").unwrap();
    session.set_preview_scene("Clip").unwrap();
    session.set_preview_scene("Main").unwrap();
    assert!(session.preview_scene_name().is_none());

    assert!(session.remove_source("Main", "Clip").unwrap());
    sim.audio_tick();
    assert!(session.audio_levels().is_empty());

    let engine: Arc<dyn MediaEngine> = sim.clone();
    assert!(SourceRef::by_name(&engine, "Clip").is_none());
    assert_eq!(sim.live_objects().meters, 0);
}

#[test]
fn test_removing_from_nested_group() {
    let (sim, mut session) = running_session();
    session.create_scene("Main").unwrap();
    sim.add_group("Main", "Overlay").unwrap();

    // Sources inside groups are only reachable through the engine.
    let engine: Arc<dyn MediaEngine> = sim.clone();
    let group = SourceRef::by_name(&engine, "Overlay").unwrap();
    let logo = SourceRef::create_source(
        &engine,
        "image_source",
        "Logo",
        &Default::default(),
    )
    .unwrap();
    engine.scene_add_item(group.id(), logo.id()).unwrap();
    drop(logo);
    drop(group);

    assert_eq!(names(&session, "Main"), vec!["Overlay"]);
    assert!(session.remove_source("Main", "Logo").unwrap());
    assert!(!session.remove_source("Main", "Logo").unwrap());
    assert!(SourceRef::by_name(&engine, "Logo").is_none());
    assert_eq!(names(&session, "Main"), vec!["Overlay"]);
}

#[test]
fn test_preview_applies_only_after_transition() {
    let (_sim, mut session) = running_session();
    session.create_scene("A").unwrap();
    session.create_scene("B").unwrap();
    assert_eq!(session.program_scene_name().as_deref(), Some("A"));

    session.set_preview_scene("B").unwrap();
    assert_eq!(session.program_scene_name().as_deref(), Some("A"));
    assert_eq!(session.preview_scene_name().as_deref(), Some("B"));

    assert!(session.execute_transition().unwrap());
    assert_eq!(session.program_scene_name().as_deref(), Some("B"));
    assert!(session.preview_scene_name().is_none());

    assert!(!session.execute_transition().unwrap());
    assert!(matches!(
        session.set_preview_scene("Nope"),
        Err(SessionError::SourceNotFound(_))
    ));
}

#[test]
fn test_frames_follow_program_and_preview() {
    let (sim, mut session) = running_session();
    assert!(session.fetch_latest_frame().program.is_none());

    session.create_scene("A").unwrap();
    session.create_scene("B").unwrap();
    sim.render_tick();

    let frame = session.fetch_latest_frame();
    assert_eq!((frame.width, frame.height), (16, 8));
    let program = frame.program.unwrap();
    assert_eq!(program.len(), 16 * 8 * 4);
    assert!(program.chunks_exact(4).all(|px| px == color_for("A")));
    assert!(frame.preview.is_none());

    session.set_preview_scene("B").unwrap();
    sim.render_tick();
    let frame = session.fetch_latest_frame();
    let preview = frame.preview.unwrap();
    assert_eq!(preview.len(), program.len());
    assert!(preview.chunks_exact(4).all(|px| px == color_for("B")));
    assert!(frame.program.unwrap().chunks_exact(4).all(|px| px == color_for("A")));

    session.execute_transition().unwrap();
    sim.render_tick();
    let frame = session.fetch_latest_frame();
    assert!(frame.preview.is_none());
    assert!(frame.program.unwrap().chunks_exact(4).all(|px| px == color_for("B")));
}

#[test]
fn test_stream_start_is_idempotent() {
    let (_sim, mut session) = running_session();
    session
        .start_streaming("rtmp://live.example.com/app", "key")
        .unwrap();
    session
        .start_streaming("rtmp://live.example.com/app", "key")
        .unwrap();
    assert!(session.is_streaming());

    session.stop_streaming().unwrap();
    session.stop_streaming().unwrap();
    assert!(!session.is_streaming());
}

#[test]
fn test_stop_recording_keeps_streaming_and_frames() {
    let (sim, mut session) = running_session();
    session.create_scene("Main").unwrap();
    session
        .start_streaming("rtmps://live.example.com/app", "key")
        .unwrap();
    session.start_recording().unwrap();
    assert!(session.is_recording());

    session.stop_recording().unwrap();
    assert!(session.is_streaming());
    assert!(!session.is_recording());
    assert!(session.output_status().encoders_allocated);
    assert_eq!(sim.live_objects().encoders, 2);

    sim.render_tick();
    assert!(session.fetch_latest_frame().program.is_some());
}

#[test]
fn test_rejected_stream_start_leaves_outputs_idle() {
    let (sim, mut session) = running_session();
    let err = session.start_streaming("not a url", "key").unwrap_err();

    assert!(matches!(err, SessionError::OutputStartFailed { .. }));
    assert!(!session.is_streaming());
    assert!(!session.output_status().encoders_allocated);
    assert_eq!(sim.live_objects().outputs, 0);
}

#[test]
fn test_snapshot_restore_round_trip() {
    let (_sim, mut session) = running_session();
    session.create_scene("Intro").unwrap();
    session.create_scene("Main").unwrap();
    session.add_source("Intro", "color_source", "Backdrop").unwrap();
    session.add_source("Main", "capture_device", "Cam").unwrap();
    session.add_source("Main", "audio_input_capture", "Mic").unwrap();

    let mut settings = titan_ipc::Settings::new();
    settings.insert("device_id".into(), "cam1".into());
    settings.insert("fps".into(), 60i64.into());
    session.update_source_properties("Cam", &settings).unwrap();

    let mut before = session.snapshot().unwrap();
    let cam = before.scenes[1]
        .sources
        .iter_mut()
        .find(|s| s.name == "Cam")
        .unwrap();
    cam.transform = Transform {
        pos_x: 12.5,
        pos_y: -3.25,
        rot: 90.0,
        scale_x: 0.5,
        scale_y: 0.5,
        crop_top: 1,
        crop_bottom: 2,
        crop_left: 3,
        crop_right: 4,
    };

    // Restore onto a fresh engine, then compare.
    let (_sim2, mut restored) = running_session();
    let report = restored.restore(&before).unwrap();
    assert!(report.skipped.is_empty());
    assert_eq!(report.scenes, 2);
    assert_eq!(report.sources, 3);

    let after = restored.snapshot().unwrap();
    assert_eq!(
        after.scenes.iter().map(|s| &s.name).collect::<Vec<_>>(),
        before.scenes.iter().map(|s| &s.name).collect::<Vec<_>>()
    );
    for (a, b) in after.scenes.iter().zip(&before.scenes) {
        assert_eq!(a.sources.len(), b.sources.len());
        for (x, y) in a.sources.iter().zip(&b.sources) {
            assert_eq!(x.name, y.name);
            assert_eq!(x.kind, y.kind);
            assert_eq!(x.settings, y.settings);
            assert!(x.transform.approx_eq(&y.transform, 1e-4));
        }
    }
    assert_eq!(restored.program_scene_name().as_deref(), Some("Intro"));
    assert_eq!(
        restored.source_settings("Cam").unwrap().get("device_id").and_then(|v| v.as_str()),
        Some("cam1")
    );
}

#[test]
fn test_shutdown_releases_everything() {
    let (sim, mut session) = running_session();
    session.create_scene("A").unwrap();
    session.create_scene("B").unwrap();
    session.add_source("A", "capture_device", "Cam").unwrap();
    session.add_source("A", "audio_input_capture", "Mic").unwrap();
    session.add_source("B", "audio_input_capture", "Mic").unwrap();
    session.set_preview_scene("B").unwrap();
    session
        .start_streaming("rtmp://live.example.com/app", "key")
        .unwrap();
    session.start_recording().unwrap();
    sim.render_tick();
    sim.audio_tick();

    session.shutdown();

    assert!(!sim.is_started());
    assert!(sim.leaked_at_shutdown().is_empty());
    assert!(session.audio_levels().is_empty());
    assert!(session.fetch_latest_frame().program.is_none());
}

#[test]
fn test_session_restarts_after_shutdown() {
    let (sim, mut session) = running_session();
    session.create_scene("Main").unwrap();
    session.shutdown();

    session.startup().unwrap();
    assert!(session.list_scenes().unwrap().next().is_none());
    session.create_scene("Main").unwrap();
    assert_eq!(session.program_scene_name().as_deref(), Some("Main"));
    drop(session);
    assert!(sim.leaked_at_shutdown().is_empty());
}

#[test]
fn test_scene_names_are_lazy_and_restartable() {
    let (_sim, mut session) = running_session();
    session.create_scene("A").unwrap();

    {
        let mut scenes = session.list_scenes().unwrap();
        assert_eq!(scenes.next().as_deref(), Some("A"));
        assert!(scenes.next().is_none());
        scenes.restart();
        assert_eq!(scenes.collect::<Vec<_>>(), vec!["A"]);
    }

    session.create_scene("B").unwrap();
    assert_eq!(session.list_scenes().unwrap().count(), 2);
}
