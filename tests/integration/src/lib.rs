//! Integration test utilities for LEDPro
//!
//! This module provides common utilities for integration testing including:
//! - A temporary media library with videos and idle images
//! - Configuration pointing at that library
//! - Fake telemetry sources

use anyhow::Result;
use ledpro::telemetry::{GpuProvider, GpuReading, SystemCounters, SystemSource};
use ledpro::utils::config::DisplayConfig;
use ledpro::{Config, PlayerError};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Test fixture for integration tests
pub struct TestFixture {
    pub temp_dir: TempDir,
    pub videos: Vec<PathBuf>,
}

impl TestFixture {
    /// Create a library with the given video names and one idle image
    pub fn new(video_names: &[&str]) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let video_dir = temp_dir.path().join("videos");
        let idle_dir = temp_dir.path().join("idle");
        std::fs::create_dir_all(&video_dir)?;
        std::fs::create_dir_all(&idle_dir)?;

        let mut videos = Vec::new();
        for name in video_names {
            let path = video_dir.join(name);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            // Placeholder content; the headless engine never decodes
            std::fs::write(&path, b"not really a video")?;
            videos.push(path);
        }
        std::fs::write(idle_dir.join("standby.png"), b"not really an image")?;

        Ok(Self { temp_dir, videos })
    }

    /// Get the path to the temporary directory
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Configuration rooted in the fixture with two displays and fast timings
    pub fn config(&self) -> Config {
        let mut config = Config::default();
        config.paths.state_file = self.path().join("state").join("state.json");
        config.paths.video_dir = self.path().join("videos");
        config.paths.idle_dir = self.path().join("idle");
        config.dispatcher.tick_ms = 10;
        config.dispatcher.screen_test_step_ms = 50;
        config.playback.advance_debounce_ms = 20;
        config.telemetry.period_ms = 100;
        config.displays = vec![
            DisplayConfig { width: 1920, height: 1080, x: 0, y: 0 },
            DisplayConfig { width: 1280, height: 720, x: 1920, y: 0 },
        ];
        config
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// System source with scripted counters; traffic grows by `step` bytes per sample
pub struct FakeSystem {
    pub cpu_percent: f32,
    pub mem_percent: f32,
    pub step: u64,
    sent: u64,
}

impl FakeSystem {
    pub fn new(cpu_percent: f32, mem_percent: f32, step: u64) -> Self {
        Self {
            cpu_percent,
            mem_percent,
            step,
            sent: 0,
        }
    }
}

impl SystemSource for FakeSystem {
    fn cpu_name(&mut self) -> String {
        "AMD Ryzen 5 5600G with Radeon Graphics".to_string()
    }

    fn sample(&mut self) -> ledpro::Result<SystemCounters> {
        self.sent += self.step;
        let sent = self.sent;
        Ok(SystemCounters {
            cpu_percent: self.cpu_percent,
            mem_percent: self.mem_percent,
            net_sent_total: sent,
            net_recv_total: sent * 4,
        })
    }
}

/// GPU provider returning a fixed reading, or failing when `None`
pub struct FakeGpu(pub Option<GpuReading>);

impl GpuProvider for FakeGpu {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn sample(&mut self) -> ledpro::Result<GpuReading> {
        self.0
            .clone()
            .ok_or_else(|| PlayerError::Telemetry("fake GPU offline".to_string()))
    }
}
