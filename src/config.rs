//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and every field has a default, so an empty file (or no file
//! at all) yields a usable configuration matching the stock teleop mapping:
//! left stick Y drives forward, left stick X turns, button 4 is the deadman.

use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::error::{Result, TeleopError};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub teleop: TeleopConfig,
    pub publisher: PublisherConfig,
    pub controller: ControllerConfig,
    pub sink: SinkConfig,
    pub logging: LoggingConfig,
}

/// Joystick to velocity mapping
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct TeleopConfig {
    /// Axis index driving the linear velocity
    #[serde(default = "default_axis_linear")]
    pub axis_linear: usize,

    /// Axis index driving the angular velocity
    #[serde(default = "default_axis_angular")]
    pub axis_angular: usize,

    /// Button index of the deadman switch
    #[serde(default = "default_axis_deadman")]
    pub axis_deadman: usize,

    /// Maximum linear speed (full stick deflection)
    #[serde(default = "default_scale_linear")]
    pub scale_linear: f64,

    /// Maximum angular speed (full stick deflection)
    #[serde(default = "default_scale_angular")]
    pub scale_angular: f64,
}

/// Deadman publisher loop configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PublisherConfig {
    #[serde(default = "default_period_ms")]
    pub period_ms: u64,

    #[serde(default = "default_stats_interval_ticks")]
    pub stats_interval_ticks: u64,

    /// Longest a single sink send may take before the tick is dropped
    #[serde(default = "default_send_timeout_ms")]
    pub send_timeout_ms: u64,
}

/// Joystick device configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ControllerConfig {
    #[serde(default)]
    pub device_path: String,

    #[serde(default = "default_invert_axes")]
    pub invert_axes: bool,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Transport used to deliver velocity commands
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    Serial,
    Udp,
}

/// Command sink configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    #[serde(default = "default_sink_kind")]
    pub kind: SinkKind,

    #[serde(default = "default_serial_port")]
    pub serial_port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_udp_target")]
    pub udp_target: String,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily rolling log files; empty logs to stderr only
    #[serde(default)]
    pub directory: String,
}

// Default value functions
fn default_axis_linear() -> usize { 1 }
fn default_axis_angular() -> usize { 0 }
fn default_axis_deadman() -> usize { 4 }
fn default_scale_linear() -> f64 { 0.3 }
fn default_scale_angular() -> f64 { 0.9 }

fn default_period_ms() -> u64 { 100 }
fn default_stats_interval_ticks() -> u64 { 600 }
fn default_send_timeout_ms() -> u64 { 50 }

fn default_invert_axes() -> bool { true }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_sink_kind() -> SinkKind { SinkKind::Serial }
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 115200 }
fn default_udp_target() -> String { "127.0.0.1:9870".to_string() }

/// Baud rates accepted for the serial sink
const VALID_BAUD_RATES: [u32; 8] = [9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

impl Default for TeleopConfig {
    fn default() -> Self {
        Self {
            axis_linear: default_axis_linear(),
            axis_angular: default_axis_angular(),
            axis_deadman: default_axis_deadman(),
            scale_linear: default_scale_linear(),
            scale_angular: default_scale_angular(),
        }
    }
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            stats_interval_ticks: default_stats_interval_ticks(),
            send_timeout_ms: default_send_timeout_ms(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            device_path: String::new(),
            invert_axes: default_invert_axes(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: default_sink_kind(),
            serial_port: default_serial_port(),
            baud_rate: default_baud_rate(),
            udp_target: default_udp_target(),
        }
    }
}

impl TeleopConfig {
    /// Check that the mapping fits a device with the given number of axes and buttons
    ///
    /// Called once after the joystick is opened; a mapping that points past the
    /// device's inputs would otherwise reject every single sample.
    ///
    /// # Errors
    ///
    /// Returns `Config` naming the first index that is out of range.
    ///
    /// # Examples
    ///
    /// ```
    /// use joy_teleop::config::TeleopConfig;
    ///
    /// let teleop = TeleopConfig::default();
    /// assert!(teleop.validate_for_device(2, 5).is_ok());
    /// assert!(teleop.validate_for_device(2, 4).is_err());
    /// ```
    pub fn validate_for_device(&self, num_axes: usize, num_buttons: usize) -> Result<()> {
        for (name, index) in [
            ("axis_linear", self.axis_linear),
            ("axis_angular", self.axis_angular),
        ] {
            if index >= num_axes {
                return Err(TeleopError::Config(format!(
                    "{} = {} is out of range, device has {} axes",
                    name, index, num_axes
                )));
            }
        }

        if self.axis_deadman >= num_buttons {
            return Err(TeleopError::Config(format!(
                "axis_deadman = {} is out of range, device has {} buttons",
                self.axis_deadman, num_buttons
            )));
        }

        Ok(())
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("scale_linear", self.scale_linear),
            ("scale_angular", self.scale_angular),
        ] {
            if !value.is_finite() {
                return Err(TeleopError::Config(format!("{} must be finite", name)));
            }
        }
        Ok(())
    }
}

impl PublisherConfig {
    /// Tick period of the deadman publisher loop
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }
}

impl ControllerConfig {
    /// Explicit device path, or `None` to auto-detect
    pub fn device_path(&self) -> Option<&str> {
        if self.device_path.is_empty() {
            None
        } else {
            Some(&self.device_path)
        }
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}

impl SinkConfig {
    /// Parsed UDP destination address
    pub fn udp_target_addr(&self) -> Result<SocketAddr> {
        self.udp_target.parse().map_err(|e| {
            TeleopError::Config(format!("udp_target '{}' is not a socket address: {}", self.udp_target, e))
        })
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
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
    /// use joy_teleop::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns `Config` if any value is out of its valid range
    pub fn validate(&self) -> Result<()> {
        self.teleop.validate()?;

        if self.publisher.period_ms == 0 || self.publisher.period_ms > 10000 {
            return Err(TeleopError::Config(
                "period_ms must be between 1 and 10000".to_string(),
            ));
        }

        if self.publisher.send_timeout_ms == 0
            || self.publisher.send_timeout_ms > self.publisher.period_ms
        {
            return Err(TeleopError::Config(format!(
                "send_timeout_ms must be between 1 and period_ms ({})",
                self.publisher.period_ms
            )));
        }

        if self.publisher.stats_interval_ticks == 0 {
            return Err(TeleopError::Config(
                "stats_interval_ticks must be greater than 0".to_string(),
            ));
        }

        if self.controller.reconnect_interval_ms == 0 || self.controller.reconnect_interval_ms > 60000 {
            return Err(TeleopError::Config(
                "reconnect_interval_ms must be between 1 and 60000".to_string(),
            ));
        }

        match self.sink.kind {
            SinkKind::Serial => {
                if self.sink.serial_port.is_empty() {
                    return Err(TeleopError::Config(
                        "serial_port cannot be empty when sink kind is 'serial'".to_string(),
                    ));
                }

                if !VALID_BAUD_RATES.contains(&self.sink.baud_rate) {
                    return Err(TeleopError::Config(format!(
                        "baud_rate must be one of: {:?}",
                        VALID_BAUD_RATES
                    )));
                }
            }
            SinkKind::Udp => {
                self.sink.udp_target_addr()?;
            }
        }

        Ok(())
    }
}
