//! Configuration management for LEDPro
//!
//! This module handles loading and managing application configuration
//! from config files and environment variables.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use crate::utils::error::{IntoPlayerError, PlayerError, Result};

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Filesystem locations
    pub paths: PathsConfig,

    /// Display command dispatcher settings
    pub dispatcher: DispatcherConfig,

    /// Playback settings
    pub playback: PlaybackConfig,

    /// Hardware telemetry settings
    pub telemetry: TelemetryConfig,

    /// Control surface access policy
    pub control: AccessPolicy,

    /// General application settings
    pub general: GeneralConfig,

    /// Static display topology, in enumeration order
    pub displays: Vec<DisplayConfig>,
}

/// Filesystem locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Persisted player state snapshot
    pub state_file: PathBuf,

    /// Root of the video library
    pub video_dir: PathBuf,

    /// Directory holding idle images
    pub idle_dir: PathBuf,
}

/// Dispatcher configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Interval between command drains in milliseconds
    pub tick_ms: u64,

    /// How long each screen-test identifier stays up, in milliseconds
    pub screen_test_step_ms: u64,
}

/// Playback configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Delay between an end-of-media notification and the auto-advance
    pub advance_debounce_ms: u64,
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Sampling period in milliseconds
    pub period_ms: u64,

    /// GPU providers in priority order ("nvidia-smi", "sysfs")
    pub gpu_providers: Vec<String>,
}

/// General application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

/// One statically configured display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
}

/// Who may issue control requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "kebab-case")]
pub enum AccessPolicy {
    /// Anyone who can reach the control surface (the device sits on a trusted LAN)
    TrustedNetwork,

    /// Requests must present this token
    SharedToken { token: String },
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            dispatcher: DispatcherConfig::default(),
            playback: PlaybackConfig::default(),
            telemetry: TelemetryConfig::default(),
            control: AccessPolicy::default(),
            general: GeneralConfig::default(),
            displays: vec![DisplayConfig { width: 1920, height: 1080, x: 0, y: 0 }],
        }
    }
}

impl Default for AccessPolicy {
    fn default() -> Self {
        AccessPolicy::TrustedNetwork
    }
}

impl Default for PathsConfig {
    fn default() -> Self {
        let base = dirs::data_dir()
            .map(|p| p.join("ledpro"))
            .unwrap_or_else(|| PathBuf::from("."));
        Self {
            state_file: base.join("state.json"),
            video_dir: base.join("videos"),
            idle_dir: base.join("idle_imgs"),
        }
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            tick_ms: 100,
            screen_test_step_ms: 1500,
        }
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            advance_debounce_ms: 500,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            period_ms: 1500,
            gpu_providers: vec!["nvidia-smi".to_string(), "sysfs".to_string()],
        }
    }
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

impl DispatcherConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn screen_test_step(&self) -> Duration {
        Duration::from_millis(self.screen_test_step_ms)
    }
}

impl PlaybackConfig {
    pub fn advance_debounce(&self) -> Duration {
        Duration::from_millis(self.advance_debounce_ms)
    }
}

impl TelemetryConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

impl Config {
    /// Load configuration from various sources
    ///
    /// Configuration is loaded in the following order (later sources override earlier):
    /// 1. Default values
    /// 2. System config file (/etc/ledpro/config.toml on Linux)
    /// 3. User config file (~/.config/ledpro/config.toml on Linux)
    /// 4. The explicitly requested file, if any
    /// 5. Environment variables (LEDPRO_* prefix)
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(system_path) = Self::system_config_path() {
            if system_path.exists() {
                config.merge_from_file(&system_path)?;
            }
        }

        if let Some(user_path) = Self::user_config_path() {
            if user_path.exists() {
                config.merge_from_file(&user_path)?;
            }
        }

        if let Some(path) = explicit {
            if !path.exists() {
                return Err(PlayerError::Config(format!(
                    "Config file not found: {}",
                    path.display()
                )));
            }
            config.merge_from_file(path)?;
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    /// Layer a TOML file over this configuration
    fn merge_from_file(&mut self, path: &Path) -> Result<()> {
        let contents = std::fs::read_to_string(path).config_err("Failed to read config file")?;
        self.merge_toml(&contents)
    }

    /// Layer TOML text over this configuration. Tables merge key by key;
    /// any other value, arrays included, replaces what was there.
    pub fn merge_toml(&mut self, contents: &str) -> Result<()> {
        let overlay: toml::Table =
            toml::from_str(contents).config_err("Failed to parse config file")?;
        let toml::Value::Table(mut base) =
            toml::Value::try_from(&*self).config_err("Failed to encode configuration")?
        else {
            return Err(PlayerError::Config("Configuration is not a table".to_string()));
        };

        merge_tables(&mut base, overlay);
        *self = toml::Value::Table(base)
            .try_into()
            .config_err("Failed to parse config file")?;
        Ok(())
    }

    /// Parse a configuration from TOML text
    pub fn from_toml(contents: &str) -> Result<Self> {
        toml::from_str(contents).config_err("Failed to parse config file")
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("LEDPRO_STATE_FILE") {
            self.paths.state_file = PathBuf::from(path);
        }

        if let Some(path) = lookup("LEDPRO_VIDEO_DIR") {
            self.paths.video_dir = PathBuf::from(path);
        }

        if let Some(path) = lookup("LEDPRO_IDLE_DIR") {
            self.paths.idle_dir = PathBuf::from(path);
        }

        if let Some(tick) = lookup("LEDPRO_TICK_MS") {
            self.dispatcher.tick_ms = tick
                .parse()
                .map_err(|_| PlayerError::Config("Invalid LEDPRO_TICK_MS".to_string()))?;
        }

        if let Some(period) = lookup("LEDPRO_TELEMETRY_PERIOD_MS") {
            self.telemetry.period_ms = period.parse().map_err(|_| {
                PlayerError::Config("Invalid LEDPRO_TELEMETRY_PERIOD_MS".to_string())
            })?;
        }

        if let Some(token) = lookup("LEDPRO_CONTROL_TOKEN") {
            self.control = AccessPolicy::SharedToken { token };
        }

        if let Some(log_level) = lookup("LEDPRO_LOG_LEVEL") {
            self.general.log_level = log_level;
        }

        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.dispatcher.tick_ms == 0 {
            return Err(PlayerError::Config("Dispatcher tick must be non-zero".to_string()));
        }

        if self.dispatcher.screen_test_step_ms == 0 {
            return Err(PlayerError::Config("Screen test step must be non-zero".to_string()));
        }

        if self.telemetry.period_ms < 100 {
            return Err(PlayerError::Config(
                "Telemetry period must be at least 100 ms".to_string(),
            ));
        }

        for provider in &self.telemetry.gpu_providers {
            if !["nvidia-smi", "sysfs"].contains(&provider.as_str()) {
                return Err(PlayerError::Config(format!("Unknown GPU provider '{}'", provider)));
            }
        }

        if let AccessPolicy::SharedToken { token } = &self.control {
            if token.trim().is_empty() {
                return Err(PlayerError::Config("Shared control token is empty".to_string()));
            }
        }

        if self.displays.iter().any(|d| d.width == 0 || d.height == 0) {
            return Err(PlayerError::Config("Display dimensions must be non-zero".to_string()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.general.log_level.as_str()) {
            return Err(PlayerError::Config(format!(
                "Invalid log level '{}', must be one of: {:?}",
                self.general.log_level,
                valid_log_levels
            )));
        }

        Ok(())
    }

    /// Get system config file path
    fn system_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return Some(PathBuf::from("/etc/ledpro/config.toml"));

        #[cfg(target_os = "windows")]
        return std::env::var("PROGRAMDATA").ok()
            .map(|p| PathBuf::from(p).join("LEDPro").join("config.toml"));

        #[cfg(target_os = "macos")]
        return Some(PathBuf::from("/Library/Application Support/LEDPro/config.toml"));

        #[allow(unreachable_code)]
        None
    }

    /// Get user config file path
    fn user_config_path() -> Option<PathBuf> {
        #[cfg(target_os = "linux")]
        return dirs::config_dir().map(|p| p.join("ledpro").join("config.toml"));

        #[cfg(not(target_os = "linux"))]
        return dirs::config_dir().map(|p| p.join("LEDPro").join("config.toml"));
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        if let toml::Value::Table(incoming) = value {
            if let Some(toml::Value::Table(existing)) = base.get_mut(&key) {
                merge_tables(existing, incoming);
                continue;
            }
            base.insert(key, toml::Value::Table(incoming));
        } else {
            base.insert(key, value);
        }
    }
}
