//! Configuration loading traits and types.
//!
//! TOML-backed configuration for the loader applications. Timeouts are
//! deliberately configuration rather than constants: the reference
//! hardware never documented safe values, so deployments tune them.
//!
//! # TOML Example
//!
//! ```toml
//! [shared]
//! log_level = "info"
//! service_name = "sl-control-01"
//!
//! [timing]
//! poll_interval_ms = 150
//! busy_poll_interval_ms = 50
//! wait_idle_timeout_s = 30.0
//!
//! [soak]
//! preview_enabled = false
//! raster_enabled = true
//!
//! [[soak.raster_points]]
//! x_um = 0
//! y_um = 0
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading operations.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

/// Common configuration fields shared across loader applications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SharedConfig {
    /// Logging verbosity level.
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl Default for SharedConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            service_name: "sl-control".to_string(),
        }
    }
}

impl SharedConfig {
    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Polling cadence and bounded-wait timeouts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Status poller cadence [ms].
    pub poll_interval_ms: u64,
    /// Per-axis busy polling interval inside `wait_idle` [ms].
    pub busy_poll_interval_ms: u64,
    /// Upper bound on any single wait-for-idle [s].
    pub wait_idle_timeout_s: f64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 150,
            busy_poll_interval_ms: 50,
            wait_idle_timeout_s: 30.0,
        }
    }
}

impl TimingConfig {
    /// Status poll cadence as a `Duration`.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Busy-poll interval as a `Duration`.
    pub fn busy_poll_interval(&self) -> Duration {
        Duration::from_millis(self.busy_poll_interval_ms)
    }

    /// Wait-idle timeout as a `Duration`.
    pub fn wait_idle_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.wait_idle_timeout_s)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::ValidationError(
                "poll_interval_ms must be non-zero".to_string(),
            ));
        }
        if !(self.wait_idle_timeout_s > 0.0) {
            return Err(ConfigError::ValidationError(
                "wait_idle_timeout_s must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// One absolute stage raster target, in microns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RasterPoint {
    pub x_um: i64,
    pub y_um: i64,
}

/// Default raster pattern: corners of a 2 mm square.
pub fn default_raster_points() -> Vec<RasterPoint> {
    vec![
        RasterPoint { x_um: 0, y_um: 0 },
        RasterPoint { x_um: 2000, y_um: 0 },
        RasterPoint { x_um: 2000, y_um: 2000 },
        RasterPoint { x_um: 0, y_um: 2000 },
    ]
}

/// Soak session options.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoakConfig {
    /// Pause at the four preview stations during each transfer.
    pub preview_enabled: bool,
    /// Visit the raster targets while a tray is on the stage.
    pub raster_enabled: bool,
    /// Alternate hotel scans instead of cycling trays.
    pub scan_only: bool,
    /// Ordered raster targets (pluggable; defaults to a 2 mm square).
    pub raster_points: Vec<RasterPoint>,
}

impl Default for SoakConfig {
    fn default() -> Self {
        Self {
            preview_enabled: false,
            raster_enabled: false,
            scan_only: false,
            raster_points: default_raster_points(),
        }
    }
}

impl SoakConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.raster_enabled && self.raster_points.is_empty() {
            return Err(ConfigError::ValidationError(
                "raster_enabled requires at least one raster point".to_string(),
            ));
        }
        Ok(())
    }
}

/// Top-level loader application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoaderConfig {
    #[serde(default)]
    pub shared: SharedConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub soak: SoakConfig,
}

impl LoaderConfig {
    /// Validate all sections.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.shared.validate()?;
        self.timing.validate()?;
        self.soak.validate()
    }
}

/// Trait for loading configuration from TOML files.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
/// - Returns `ConfigError::ValidationError` if semantic validation fails
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::FileNotFound
            } else {
                ConfigError::ParseError(e.to_string())
            }
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timing_defaults_are_sane() {
        let timing = TimingConfig::default();
        assert_eq!(timing.poll_interval(), Duration::from_millis(150));
        assert!(timing.validate().is_ok());
    }

    #[test]
    fn default_raster_is_four_points() {
        assert_eq!(default_raster_points().len(), 4);
    }

    #[test]
    fn raster_enabled_requires_points() {
        let soak = SoakConfig {
            raster_enabled: true,
            raster_points: Vec::new(),
            ..Default::default()
        };
        assert!(soak.validate().is_err());
    }

    #[test]
    fn empty_service_name_rejected() {
        let config = SharedConfig {
            log_level: LogLevel::Info,
            service_name: String::new(),
        };
        assert!(config.validate().is_err());
    }
}
