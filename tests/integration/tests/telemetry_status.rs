//! Telemetry and status tests
//!
//! The sampler runs against scripted sources and its readings show up in
//! the status report served by the control surface.

use anyhow::Result;
use ledpro::telemetry::{GpuProvider, GpuReading};
use ledpro::utils::config::AccessPolicy;
use ledpro::utils::error::ErrorKind;
use ledpro::{ContextBuilder, ControlRequest};
use ledpro_integration_tests::{wait_until, FakeGpu, FakeSystem, TestFixture};
use std::time::Duration;

#[test]
fn test_status_reports_live_telemetry() -> Result<()> {
    let fixture = TestFixture::new(&["a.mp4"])?;
    let providers: Vec<Box<dyn GpuProvider>> = vec![
        Box::new(FakeGpu(None)),
        Box::new(FakeGpu(Some(GpuReading {
            percent: 17.0,
            name: Some("NVIDIA GeForce RTX 4060".to_string()),
        }))),
    ];
    let mut context = ContextBuilder::new()
        .with_config(fixture.config())
        .with_system_source(Box::new(FakeSystem::new(42.0, 61.5, 2048)))
        .with_gpu_providers(providers)
        .build()?;
    let control = context.control();

    let before = control.status();
    assert_eq!(before.telemetry.cpu_name, "Loading...");
    assert_eq!(before.telemetry.gpu_name, "Detecting...");

    context.start()?;
    assert!(wait_until(Duration::from_secs(2), || {
        control.status().telemetry.net_up.ends_with("KB/s")
    }));

    let telemetry = control.status().telemetry;
    assert_eq!(telemetry.cpu_name, "AMD Ryzen 5 5600G with Radeon");
    assert_eq!(telemetry.cpu_percent, 42.0);
    assert_eq!(telemetry.mem_percent, 61.5);
    assert_eq!(telemetry.gpu_name, "RTX 4060");
    assert_eq!(telemetry.gpu_percent, 17.0);
    assert!(telemetry.net_down.ends_with("KB/s"));

    context.shutdown();
    Ok(())
}

#[test]
fn test_gpu_defaults_when_providers_fail() -> Result<()> {
    let fixture = TestFixture::new(&[])?;
    let mut context = ContextBuilder::new()
        .with_config(fixture.config())
        .with_system_source(Box::new(FakeSystem::new(5.0, 10.0, 0)))
        .with_gpu_providers(vec![Box::new(FakeGpu(None))])
        .build()?;
    let reader = context.telemetry();
    context.start()?;

    assert!(wait_until(Duration::from_secs(2), || {
        reader.current().cpu_name != "Loading..."
    }));
    let report = reader.current().report();
    assert_eq!(report.gpu_name, "Integrated");
    assert_eq!(report.gpu_percent, 0.0);
    assert_eq!(report.net_up, "0 B/s");

    context.shutdown();
    Ok(())
}

#[test]
fn test_get_status_over_control_surface() -> Result<()> {
    let fixture = TestFixture::new(&["clip one.mp4", "clip two.mkv"])?;
    let mut config = fixture.config();
    config.control = AccessPolicy::SharedToken { token: "s3cret".to_string() };
    let mut context = ContextBuilder::new()
        .with_config(config)
        .with_telemetry(false)
        .build()?;
    context.start()?;
    let control = context.control();

    let denied = control.handle(Some("guess"), ControlRequest::GetStatus);
    assert!(!denied.ok);
    assert_eq!(denied.kind, Some(ErrorKind::AccessDenied));

    let token = Some("s3cret");
    assert!(control.handle(token, ControlRequest::AppendFolder { path: String::new() }).ok);
    assert!(control.handle(token, ControlRequest::SetIdleImage { name: "standby.png".into() }).ok);

    let response = control.handle(token, ControlRequest::GetStatus);
    assert!(response.ok);
    let json = serde_json::to_value(&response)?;
    assert_eq!(json["ok"], true);
    assert_eq!(json["current_idx"], 0);
    assert_eq!(json["current_item"]["name"], "clip one.mp4");
    assert_eq!(json["is_playing"], true);
    assert_eq!(json["playlist"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["displays"].as_array().map(Vec::len), Some(2));
    assert_eq!(json["idle_image"], "standby.png");
    assert_eq!(json["idle_images"][0], "standby.png");
    assert_eq!(json["telemetry"]["cpu_name"], "Loading...");

    context.shutdown();
    Ok(())
}
