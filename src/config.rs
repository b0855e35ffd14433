//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! ```toml
//! [serial]
//! port = "/dev/ttyUSB0"
//! baud_rate = 115200
//!
//! [channels]
//! map = [
//!     { logical = 1, physical = 3 },
//!     { logical = 2, physical = -1 },  # inverted
//! ]
//!
//! [telemetry]
//! enabled = true
//! timeout_ms = 2000
//!
//! [debug]
//! tags = ["serial"]
//!
//! [logging]
//! dir = "./logs"
//! ```

use serde::de::Error;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::channels::mapper::ChannelMapper;
use crate::error::{Result, ServoBridgeError};
use crate::protocol::wire::CHANNEL_COUNT;
use crate::serial::{DEFAULT_BAUD_RATE, SUPPORTED_BAUD_RATES};
use crate::trace::TraceFilter;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,

    #[serde(default)]
    pub channels: ChannelConfig,

    #[serde(default)]
    pub telemetry: TelemetryConfig,

    #[serde(default)]
    pub debug: DebugConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

/// Channel remap configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChannelConfig {
    /// Optional remap table; absent means identity
    #[serde(default)]
    pub map: Option<Vec<ChannelMapEntry>>,
}

/// One logical -> physical remap entry
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ChannelMapEntry {
    pub logical: u16,

    /// Physical channel; negative inverts the channel
    pub physical: i32,
}

/// Telemetry configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    /// Upper bound on a single telemetry request; absent waits forever
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Trace tag configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct DebugConfig {
    #[serde(default)]
    pub tags: Vec<String>,
}

/// Log file configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for a daily-rolling log file; absent logs to stderr only
    #[serde(default)]
    pub dir: Option<String>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyUSB0".to_string() }
fn default_baud_rate() -> u32 { DEFAULT_BAUD_RATE }

fn default_telemetry_enabled() -> bool { true }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: default_telemetry_enabled(),
            timeout_ms: None,
        }
    }
}

impl ChannelConfig {
    /// Builds the mapper described by this section.
    pub fn mapper(&self) -> ChannelMapper {
        match &self.map {
            None => ChannelMapper::identity(),
            Some(entries) => ChannelMapper::with_map(entries.iter().map(|e| (e.logical, e.physical))),
        }
    }
}

impl DebugConfig {
    /// Builds the trace filter described by this section.
    pub fn filter(&self) -> TraceFilter {
        TraceFilter::with_tags(self.tags.iter().cloned())
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use servo_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.serial.port.is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !SUPPORTED_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                SUPPORTED_BAUD_RATES
            )));
        }

        if let Some(entries) = &self.channels.map {
            let mut seen = HashSet::new();
            for entry in entries {
                let physical = entry.physical.unsigned_abs();
                if physical == 0 || physical > CHANNEL_COUNT as u32 {
                    return Err(invalid(format!(
                        "channel map entry for logical {} targets physical {} (must be 1-{} or -1 to -{})",
                        entry.logical, entry.physical, CHANNEL_COUNT, CHANNEL_COUNT
                    )));
                }

                if !seen.insert(entry.logical) {
                    return Err(invalid(format!(
                        "channel map has more than one entry for logical {}",
                        entry.logical
                    )));
                }
            }
        }

        if let Some(timeout_ms) = self.telemetry.timeout_ms {
            if timeout_ms == 0 || timeout_ms > 600_000 {
                return Err(invalid("telemetry timeout_ms must be between 1 and 600000"));
            }
        }

        if self.debug.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(invalid("debug tags cannot be empty"));
        }

        if matches!(&self.logging.dir, Some(dir) if dir.is_empty()) {
            return Err(invalid("logging dir cannot be empty when set"));
        }

        Ok(())
    }
}

fn invalid(message: impl std::fmt::Display) -> ServoBridgeError {
    ServoBridgeError::Config(toml::de::Error::custom(message))
}
