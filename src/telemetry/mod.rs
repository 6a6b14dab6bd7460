//! Hardware telemetry for LEDPro
//!
//! A background sampler publishes an immutable [`TelemetrySnapshot`] every
//! cycle. Readers get the latest snapshot without locking.

pub mod names;
pub mod providers;
pub mod sampler;

pub use names::normalize_name;
pub use providers::{
    providers_from_config, GpuProvider, GpuReading, NvidiaSmiProvider, SysfsGpuProvider,
    SysinfoSource, SystemCounters, SystemSource,
};
pub use sampler::{NetRate, TelemetryReader, TelemetrySampler};

use serde::Serialize;

/// GPU name shown until a provider reports one
pub const DEFAULT_GPU_NAME: &str = "Integrated";

/// Point-in-time hardware status
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetrySnapshot {
    pub cpu_percent: f32,
    pub cpu_name: String,
    pub mem_percent: f32,
    pub gpu_percent: f32,
    pub gpu_name: String,

    /// Upload throughput in bytes per second
    pub net_up_rate: f64,

    /// Download throughput in bytes per second
    pub net_down_rate: f64,
}

impl TelemetrySnapshot {
    /// Placeholder served before the first cycle completes
    pub fn loading() -> Self {
        Self {
            cpu_percent: 0.0,
            cpu_name: "Loading...".to_string(),
            mem_percent: 0.0,
            gpu_percent: 0.0,
            gpu_name: "Detecting...".to_string(),
            net_up_rate: 0.0,
            net_down_rate: 0.0,
        }
    }

    /// Rounded, human-readable form for status responses
    pub fn report(&self) -> TelemetryReport {
        TelemetryReport {
            cpu_percent: round1(self.cpu_percent),
            cpu_name: self.cpu_name.clone(),
            mem_percent: round1(self.mem_percent),
            gpu_percent: round1(self.gpu_percent),
            gpu_name: self.gpu_name.clone(),
            net_up: format_rate(self.net_up_rate),
            net_down: format_rate(self.net_down_rate),
        }
    }
}

/// Telemetry as reported to clients
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryReport {
    pub cpu_percent: f32,
    pub cpu_name: String,
    pub mem_percent: f32,
    pub gpu_percent: f32,
    pub gpu_name: String,
    pub net_up: String,
    pub net_down: String,
}

fn round1(value: f32) -> f32 {
    (value * 10.0).round() / 10.0
}

/// Format a throughput in bytes per second
pub fn format_rate(bytes_per_sec: f64) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = 1024.0 * 1024.0;

    let rate = if bytes_per_sec.is_finite() { bytes_per_sec.max(0.0) } else { 0.0 };
    if rate < KB {
        format!("{} B/s", rate as u64)
    } else if rate < MB {
        format!("{:.1} KB/s", rate / KB)
    } else {
        format!("{:.1} MB/s", rate / MB)
    }
}
