//! Concurrency tests
//!
//! Many producers drive the control surface while the dispatcher owns the
//! display surface on a single thread.

use anyhow::Result;
use crossbeam_channel::bounded;
use ledpro::display::HeadlessSurface;
use ledpro::player::HeadlessEngine;
use ledpro::{ContextBuilder, ControlRequest};
use ledpro_integration_tests::TestFixture;
use std::sync::Arc;
use std::time::Instant;

const PRODUCERS: usize = 8;
const OPS_PER_PRODUCER: usize = 40;

fn request(producer: usize, op: usize) -> ControlRequest {
    match (producer + op) % 8 {
        0 => ControlRequest::Play { index: (op % 3) as i64 },
        1 => ControlRequest::Advance,
        2 => ControlRequest::Previous,
        3 => ControlRequest::SetVolume { volume: (op * 7 % 120) as i64 },
        4 => ControlRequest::ToggleLoopMode,
        5 => ControlRequest::TogglePause,
        6 => ControlRequest::GetStatus,
        _ => ControlRequest::Stop,
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_control_keeps_state_consistent() -> Result<()> {
    let fixture = TestFixture::new(&["a.mp4", "b.mp4", "c.mp4"])?;
    let mut context = ContextBuilder::new()
        .with_config(fixture.config())
        .with_engine(Arc::new(HeadlessEngine::new()))
        .with_telemetry(false)
        .build()?;
    context.start()?;

    let control = Arc::new(context.control());
    assert!(control.handle(None, ControlRequest::AppendFolder { path: String::new() }).ok);

    let mut tasks = Vec::new();
    for producer in 0..PRODUCERS {
        let control = control.clone();
        tasks.push(tokio::task::spawn_blocking(move || {
            for op in 0..OPS_PER_PRODUCER {
                let response = control.handle(None, request(producer, op));
                assert!(response.ok, "{:?}", response.error);
            }
        }));
    }
    for task in tasks {
        task.await?;
    }

    let state = context.controller().snapshot();
    assert_eq!(state.playlist.len(), 3);
    assert!(state.current_idx.map_or(true, |idx| idx < 3));
    assert!(state.volume <= 100);

    // The last write left a complete snapshot on disk
    let raw: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(
        fixture.path().join("state").join("state.json"),
    )?)?;
    assert_eq!(raw["playlist"].as_array().map(Vec::len), Some(3));
    assert_eq!(raw["volume"], u64::from(state.volume));

    let mut dispatcher = context.dispatcher(HeadlessSurface::new())?;
    let mut failed = 0;
    loop {
        let report = dispatcher.tick(Instant::now());
        failed += report.failed;
        if report.applied + report.failed + report.dropped == 0 {
            break;
        }
    }
    assert_eq!(failed, 0);

    context.shutdown();
    Ok(())
}

#[test]
fn test_dispatcher_applies_commands_from_many_threads() -> Result<()> {
    let fixture = TestFixture::new(&["a.mp4", "b.mp4"])?;
    let mut context = ContextBuilder::new()
        .with_config(fixture.config())
        .with_telemetry(false)
        .build()?;
    context.start()?;

    let control = Arc::new(context.control());
    control.handle(None, ControlRequest::AppendFolder { path: String::new() });

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    let producers = std::thread::spawn(move || {
        let workers: Vec<_> = (0..PRODUCERS)
            .map(|producer| {
                let control = control.clone();
                std::thread::spawn(move || {
                    for op in 0..OPS_PER_PRODUCER {
                        let request = match op % 4 {
                            0 => ControlRequest::SetTargetDisplay { index: Some((producer % 2) as i64) },
                            1 => ControlRequest::Play { index: (op % 2) as i64 },
                            2 => ControlRequest::SetIdleImage { name: "standby.png".into() },
                            _ => ControlRequest::Stop,
                        };
                        control.handle(None, request);
                    }
                })
            })
            .collect();
        for worker in workers {
            let _ = worker.join();
        }
        let _ = shutdown_tx.send(());
    });

    let stats = context.run_dispatcher(HeadlessSurface::new(), shutdown_rx)?;
    producers
        .join()
        .map_err(|_| anyhow::anyhow!("producer thread panicked"))?;

    assert_eq!(stats.failed, 0);
    assert!(stats.applied >= (PRODUCERS * OPS_PER_PRODUCER) as u64);
    assert!(stats.ticks > 0);

    context.shutdown();
    Ok(())
}
