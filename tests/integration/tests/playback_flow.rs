//! End-to-end playback tests
//!
//! These tests drive the full context through the control surface:
//! - Auto-advance on end of media
//! - Explicit stop racing a pending auto-advance
//! - Surface commands applied by the dispatcher
//! - State restored across restarts

use anyhow::Result;
use ledpro::display::{DisplaySurface, HeadlessSurface, SurfaceOp};
use ledpro::player::{HeadlessEngine, PlaybackEngine};
use ledpro::{AppContext, ContextBuilder, ControlRequest};
use ledpro_integration_tests::{wait_until, TestFixture};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn build_context(fixture: &TestFixture, engine: Arc<HeadlessEngine>) -> Result<AppContext> {
    let context = ContextBuilder::new()
        .with_config(fixture.config())
        .with_engine(engine)
        .with_telemetry(false)
        .build()?;
    Ok(context)
}

fn current(context: &AppContext) -> Option<usize> {
    context.controller().snapshot().current_idx
}

#[test]
fn test_end_of_media_auto_advance() -> Result<()> {
    let fixture = TestFixture::new(&["a.mp4", "b.mp4", "c.mp4"])?;
    let engine = Arc::new(HeadlessEngine::new());
    let mut context = build_context(&fixture, engine.clone())?;
    context.start()?;
    let control = context.control();

    let response = control.handle(None, ControlRequest::AppendFolder { path: String::new() });
    assert!(response.ok);
    assert_eq!(current(&context), Some(0));

    for expected in [1, 2, 0] {
        engine.finish_media();
        assert!(wait_until(Duration::from_secs(2), || current(&context) == Some(expected)));
        assert!(engine.is_playing());
    }

    assert_eq!(engine.media(), Some(fixture.videos[0].clone()));
    context.shutdown();
    Ok(())
}

#[test]
fn test_stop_beats_pending_auto_advance() -> Result<()> {
    let fixture = TestFixture::new(&["a.mp4", "b.mp4"])?;
    let engine = Arc::new(HeadlessEngine::new());
    let mut config = fixture.config();
    config.playback.advance_debounce_ms = 200;
    let mut context = ContextBuilder::new()
        .with_config(config)
        .with_engine(engine.clone())
        .with_telemetry(false)
        .build()?;
    context.start()?;
    let control = context.control();

    control.handle(None, ControlRequest::AppendFolder { path: String::new() });
    engine.finish_media();
    assert!(control.handle(None, ControlRequest::Stop).ok);

    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(current(&context), None);
    assert!(!engine.is_playing());

    context.shutdown();
    Ok(())
}

#[test]
fn test_surface_follows_controller() -> Result<()> {
    let fixture = TestFixture::new(&["a.mp4"])?;
    let engine = Arc::new(HeadlessEngine::new());
    let mut context = build_context(&fixture, engine.clone())?;
    let mut dispatcher = context.dispatcher(HeadlessSurface::new())?;
    assert_eq!(engine.surface(), Some(dispatcher.surface().video_handle()));

    context.start()?;
    let control = context.control();
    assert!(control.handle(None, ControlRequest::SetIdleImage { name: "standby.png".into() }).ok);
    assert!(control.handle(None, ControlRequest::SetTargetDisplay { index: Some(1) }).ok);
    assert!(control.handle(None, ControlRequest::Append { path: "a.mp4".into() }).ok);

    let report = dispatcher.tick(Instant::now());
    assert_eq!(report.failed, 0);
    assert_eq!(report.dropped, 0);

    let surface = dispatcher.surface();
    assert_eq!(surface.visible_on(), Some(1));
    assert!(!surface.idle_visible());
    let idle_path = fixture.path().join("idle").join("standby.png");
    assert!(surface.history().any(|op| *op
        == SurfaceOp::SetIdleImage { image: Some(idle_path.clone()), width: 1280, height: 720 }));

    assert!(control.handle(None, ControlRequest::Stop).ok);
    dispatcher.tick(Instant::now());
    assert!(dispatcher.surface().idle_visible());

    assert!(control.handle(None, ControlRequest::SetTargetDisplay { index: Some(1) }).ok);
    dispatcher.tick(Instant::now());
    assert_eq!(dispatcher.surface().visible_on(), None);

    context.shutdown();
    Ok(())
}

#[test]
fn test_display_removed_while_targeted() -> Result<()> {
    let fixture = TestFixture::new(&[])?;
    let mut context = build_context(&fixture, Arc::new(HeadlessEngine::new()))?;
    let mut dispatcher = context.dispatcher(HeadlessSurface::new())?;
    let control = context.control();

    assert!(control.handle(None, ControlRequest::SetTargetDisplay { index: Some(4) }).ok);
    assert!(control.handle(None, ControlRequest::RequestScreenTest).ok);

    let report = dispatcher.tick(Instant::now());
    assert_eq!(report.dropped, 1);
    assert_eq!(report.applied, 1);
    assert!(dispatcher.screen_test_active());
    assert_eq!(dispatcher.surface().open_overlays().len(), 1);
    Ok(())
}

#[test]
fn test_state_restored_after_restart() -> Result<()> {
    let fixture = TestFixture::new(&["a.mp4", "b.mp4", "c.mp4"])?;

    {
        let mut context = build_context(&fixture, Arc::new(HeadlessEngine::new()))?;
        context.start()?;
        let control = context.control();
        control.handle(None, ControlRequest::AppendFolder { path: String::new() });
        control.handle(None, ControlRequest::SetTargetDisplay { index: Some(1) });
        control.handle(None, ControlRequest::ToggleLoopMode);
        control.handle(None, ControlRequest::SetVolume { volume: 35 });
        context.shutdown();
    }

    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
        fixture.path().join("state").join("state.json"),
    )?)?;
    assert_eq!(raw["target_monitor"], 1);
    assert_eq!(raw["loop_mode"], "single");
    assert_eq!(raw["playlist"].as_array().map(Vec::len), Some(3));

    std::fs::remove_file(&fixture.videos[1])?;

    let mut context = build_context(&fixture, Arc::new(HeadlessEngine::new()))?;
    let mut dispatcher = context.dispatcher(HeadlessSurface::new())?;
    context.start()?;

    let state = context.controller().snapshot();
    let names: Vec<&str> = state.playlist.iter().map(|item| item.name.as_str()).collect();
    assert_eq!(names, vec!["a.mp4", "c.mp4"]);
    assert_eq!(state.volume, 35);
    assert_eq!(state.current_idx, None);

    dispatcher.tick(Instant::now());
    assert_eq!(dispatcher.surface().history().next(), Some(&SurfaceOp::MoveTo(1)));
    assert!(dispatcher.surface().idle_visible());

    context.shutdown();
    Ok(())
}
