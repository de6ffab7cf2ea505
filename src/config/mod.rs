//! Configuration management
//!
//! Handles loading, validation, and merging of configuration from:
//! - TOML files
//! - Environment variables
//! - CLI arguments
//!
//! Every section may be omitted from the file; missing sections take their
//! defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::gpu::GpuVendor;

pub mod types;

pub use types::{
    CompositorConfig, DaemonConfig, GpuConfig, LidConfig, LoggingConfig, NotifyConfig,
    PreferencesConfig, PromptConfig, StoreConfig,
};

/// Longest accepted settle delay, in milliseconds
const MAX_SETTLE_MS: u64 = 10_000;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon configuration
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Lid sensing configuration
    #[serde(default)]
    pub lid: LidConfig,
    /// GPU detection configuration
    #[serde(default)]
    pub gpu: GpuConfig,
    /// Preference store configuration
    #[serde(default)]
    pub preferences: PreferencesConfig,
    /// Compositor scale configuration
    #[serde(default)]
    pub compositor: CompositorConfig,
    /// Persisted layout configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Primary display prompt configuration
    #[serde(default)]
    pub prompt: PromptConfig,
    /// D-Bus notification configuration
    #[serde(default)]
    pub notify: NotifyConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Create default configuration
    pub fn default_config() -> Result<Self> {
        let config = Self::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        match self.gpu.vendor.as_str() {
            "auto" => {}
            vendor => {
                vendor
                    .parse::<GpuVendor>()
                    .map_err(|e| anyhow::anyhow!(e))
                    .context("Invalid gpu.vendor")?;
            }
        }

        match self.logging.level.as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!("Invalid log level: {}", self.logging.level),
        }

        if self.preferences.schema.is_empty() {
            anyhow::bail!("preferences.schema cannot be empty");
        }
        if self.compositor.scale_schema.is_empty() || self.compositor.scale_key.is_empty() {
            anyhow::bail!("compositor.scale_schema and compositor.scale_key are required");
        }
        if self.prompt.enabled && self.prompt.binary.is_empty() {
            anyhow::bail!("prompt.binary is required when the prompt is enabled");
        }

        if self.notify.enabled {
            if !self.notify.bus_name.contains('.') {
                anyhow::bail!("Invalid bus name: {}", self.notify.bus_name);
            }
            if !self.notify.object_path.starts_with('/') {
                anyhow::bail!("Invalid object path: {}", self.notify.object_path);
            }
        }

        for (name, value) in [
            ("daemon.event_settle_ms", self.daemon.event_settle_ms),
            ("lid.settle_ms", self.lid.settle_ms),
            ("compositor.settle_ms", self.compositor.settle_ms),
        ] {
            if value > MAX_SETTLE_MS {
                anyhow::bail!("{} ({}) exceeds {} ms", name, value, MAX_SETTLE_MS);
            }
        }

        Ok(())
    }

    /// Override config with CLI arguments
    pub fn with_overrides(mut self, display: Option<String>, vendor: Option<String>) -> Self {
        if display.is_some() {
            self.daemon.display = display;
        }
        if let Some(vendor) = vendor {
            self.gpu.vendor = vendor;
        }
        self
    }
}
