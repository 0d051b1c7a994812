//! Engine configuration management

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var naming the vendor id of a requested virtual device
pub const VIRT_VENDOR_ENV: &str = "SURFKIT_VIRT_VENDOR";
/// Env var naming the product id of a requested virtual device
pub const VIRT_DEVICE_ENV: &str = "SURFKIT_VIRT_DEVICE";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Default log level, overridable via RUST_LOG / SURFKIT_DEBUG
    #[serde(default = "EngineConfig::default_log_level")]
    pub log_level: String,
    /// Target screen redraw rate per device
    #[serde(default = "EngineConfig::default_screen_fps")]
    pub screen_fps: u32,
    /// Close-time bound for draining in-flight writes, in milliseconds
    #[serde(default = "EngineConfig::default_drain_ms")]
    pub drain_ms: u64,
    /// Register for hot-plug notifications at probe time
    #[serde(default = "EngineConfig::default_hotplug")]
    pub hotplug: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: Self::default_log_level(),
            screen_fps: Self::default_screen_fps(),
            drain_ms: Self::default_drain_ms(),
            hotplug: Self::default_hotplug(),
        }
    }
}

impl EngineConfig {
    fn default_log_level() -> String {
        "info".to_string()
    }

    fn default_screen_fps() -> u32 {
        30
    }

    fn default_drain_ms() -> u64 {
        100
    }

    fn default_hotplug() -> bool {
        true
    }

    /// Load configuration from the specified path
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidate = Self::default_path();
            if !candidate.exists() {
                return Err(anyhow!("No configuration file found, using defaults"));
            }
            candidate
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: EngineConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if not found
    pub fn load_or_default() -> Self {
        match Self::load(None) {
            Ok(config) => config,
            Err(e) => {
                tracing::debug!("Failed to load config: {e}, using defaults");
                Self::default()
            }
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("surfkit").join("engine.toml")
        } else {
            PathBuf::from(".config/surfkit/engine.toml")
        }
    }

    /// Target interval between screen redraws
    pub fn frame_interval(&self) -> Duration {
        Duration::from_micros(1_000_000 / u64::from(self.screen_fps.max(1)))
    }

    /// Close-time write-drain bound
    pub fn drain_bound(&self) -> Duration {
        Duration::from_millis(self.drain_ms)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            ));
        }

        if !(1..=120).contains(&self.screen_fps) {
            return Err(anyhow!(
                "Invalid screen_fps {}, must be in 1..=120",
                self.screen_fps
            ));
        }

        if self.drain_ms > 5_000 {
            return Err(anyhow!(
                "Invalid drain_ms {}, must be at most 5000",
                self.drain_ms
            ));
        }

        Ok(())
    }
}

/// Virtual device requested through the environment, if any
///
/// Both `SURFKIT_VIRT_VENDOR` and `SURFKIT_VIRT_DEVICE` must be set; ids
/// parse as hex with an optional `0x` prefix. Malformed values are
/// reported and ignored.
pub fn virt_device_from_env() -> Option<(u16, u16)> {
    let vendor = std::env::var(VIRT_VENDOR_ENV).ok()?;
    let device = std::env::var(VIRT_DEVICE_ENV).ok()?;

    match (parse_usb_id(&vendor), parse_usb_id(&device)) {
        (Some(v), Some(p)) => Some((v, p)),
        _ => {
            tracing::warn!(
                "ignoring malformed {VIRT_VENDOR_ENV}/{VIRT_DEVICE_ENV}: '{vendor}':'{device}'"
            );
            None
        }
    }
}

/// Parse a USB id: hex, optional `0x` prefix
fn parse_usb_id(s: &str) -> Option<u16> {
    let s = s.trim();
    let hex = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u16::from_str_radix(hex, 16).ok()
}
