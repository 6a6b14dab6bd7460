//! Telemetry data sources
//!
//! [`SystemSource`] supplies CPU, memory and network counters;
//! [`GpuProvider`]s are tried in priority order each cycle and the first
//! one that answers wins.

use crate::utils::error::{IntoPlayerError, PlayerError, Result};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::process::Command;
use sysinfo::{Networks, System};

/// Raw counters for one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SystemCounters {
    pub cpu_percent: f32,
    pub mem_percent: f32,

    /// Bytes sent on all interfaces since boot
    pub net_sent_total: u64,

    /// Bytes received on all interfaces since boot
    pub net_recv_total: u64,
}

/// CPU, memory and network source
pub trait SystemSource: Send {
    /// Unnormalized CPU model name
    fn cpu_name(&mut self) -> String;

    /// Refresh and read the counters
    fn sample(&mut self) -> Result<SystemCounters>;
}

/// [`SystemSource`] backed by `sysinfo`
pub struct SysinfoSource {
    system: System,
    networks: Networks,
}

impl SysinfoSource {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_cpu();
        system.refresh_memory();
        Self {
            system,
            networks: Networks::new_with_refreshed_list(),
        }
    }
}

impl Default for SysinfoSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemSource for SysinfoSource {
    fn cpu_name(&mut self) -> String {
        self.system
            .cpus()
            .first()
            .map(|cpu| cpu.brand().to_string())
            .unwrap_or_default()
    }

    fn sample(&mut self) -> Result<SystemCounters> {
        self.system.refresh_cpu();
        self.system.refresh_memory();
        self.networks.refresh();

        let total = self.system.total_memory();
        if total == 0 {
            return Err(PlayerError::Telemetry("Memory size unavailable".to_string()));
        }
        let mem_percent = self.system.used_memory() as f32 / total as f32 * 100.0;

        let (sent, recv) = self
            .networks
            .iter()
            .fold((0u64, 0u64), |(sent, recv), (_, data)| {
                (
                    sent.saturating_add(data.total_transmitted()),
                    recv.saturating_add(data.total_received()),
                )
            });

        Ok(SystemCounters {
            cpu_percent: self.system.global_cpu_info().cpu_usage(),
            mem_percent,
            net_sent_total: sent,
            net_recv_total: recv,
        })
    }
}

/// One GPU reading
#[derive(Debug, Clone, PartialEq)]
pub struct GpuReading {
    pub percent: f32,

    /// Unnormalized model name, when the provider knows it
    pub name: Option<String>,
}

/// GPU utilization provider
pub trait GpuProvider: Send {
    /// Provider name as used in configuration
    fn name(&self) -> &'static str;

    fn sample(&mut self) -> Result<GpuReading>;
}

/// Queries `nvidia-smi`
#[derive(Debug, Default)]
pub struct NvidiaSmiProvider;

impl GpuProvider for NvidiaSmiProvider {
    fn name(&self) -> &'static str {
        "nvidia-smi"
    }

    fn sample(&mut self) -> Result<GpuReading> {
        let output = Command::new("nvidia-smi")
            .args([
                "--query-gpu=utilization.gpu,name",
                "--format=csv,noheader,nounits",
            ])
            .output()
            .telemetry_err("Running nvidia-smi")?;

        if !output.status.success() {
            return Err(PlayerError::Telemetry(format!(
                "nvidia-smi exited with {}",
                output.status
            )));
        }
        parse_nvidia_smi(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse the first GPU line of `nvidia-smi` CSV output (`"37, NVIDIA ..."`)
pub fn parse_nvidia_smi(output: &str) -> Result<GpuReading> {
    let line = output
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .ok_or_else(|| PlayerError::Telemetry("nvidia-smi reported no GPU".to_string()))?;

    let (usage, name) = line
        .split_once(',')
        .ok_or_else(|| PlayerError::Telemetry(format!("Unexpected nvidia-smi line: {}", line)))?;

    let percent = usage
        .trim()
        .parse::<f32>()
        .telemetry_err("Parsing nvidia-smi utilization")?;

    let name = name.trim();
    Ok(GpuReading {
        percent: percent.clamp(0.0, 100.0),
        name: (!name.is_empty()).then(|| name.to_string()),
    })
}

/// Reads `gpu_busy_percent` from the Linux DRM sysfs tree (amdgpu, i915 with xe)
#[derive(Debug)]
pub struct SysfsGpuProvider {
    root: PathBuf,
}

impl SysfsGpuProvider {
    pub fn new() -> Self {
        Self::with_root("/sys/class/drm")
    }

    /// Use a different DRM class directory
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn busy_file(&self) -> Option<PathBuf> {
        let mut cards: Vec<PathBuf> = std::fs::read_dir(&self.root)
            .ok()?
            .filter_map(|e| e.ok())
            .filter(|e| {
                let name = e.file_name();
                let name = name.to_string_lossy();
                name.starts_with("card") && !name.contains('-')
            })
            .map(|e| e.path().join("device").join("gpu_busy_percent"))
            .filter(|p| p.is_file())
            .collect();
        cards.sort();
        cards.into_iter().next()
    }
}

impl Default for SysfsGpuProvider {
    fn default() -> Self {
        Self::new()
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

impl GpuProvider for SysfsGpuProvider {
    fn name(&self) -> &'static str {
        "sysfs"
    }

    fn sample(&mut self) -> Result<GpuReading> {
        let busy = self.busy_file().ok_or_else(|| {
            PlayerError::Telemetry("No DRM device reports gpu_busy_percent".to_string())
        })?;

        let percent = std::fs::read_to_string(&busy)
            .telemetry_err("Reading gpu_busy_percent")?
            .trim()
            .parse::<f32>()
            .telemetry_err("Parsing gpu_busy_percent")?;

        let name = busy.parent().and_then(|device| read_trimmed(&device.join("product_name")));

        Ok(GpuReading {
            percent: percent.clamp(0.0, 100.0),
            name,
        })
    }
}

/// Build the provider chain from configured names, skipping unknown ones
pub fn providers_from_config(names: &[String]) -> Vec<Box<dyn GpuProvider>> {
    names
        .iter()
        .filter_map(|name| -> Option<Box<dyn GpuProvider>> {
            match name.as_str() {
                "nvidia-smi" => Some(Box::new(NvidiaSmiProvider)),
                "sysfs" => Some(Box::new(SysfsGpuProvider::new())),
                other => {
                    warn!("Unknown GPU provider '{}' ignored", other);
                    None
                }
            }
        })
        .inspect(|p| debug!("GPU provider enabled: {}", p.name()))
        .collect()
}
