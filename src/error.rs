//! # Error Types
//!
//! Custom error types for Joy Teleop using `thiserror`.

use thiserror::Error;

/// Which part of a joystick sample an index refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleField {
    Axes,
    Buttons,
}

impl std::fmt::Display for SampleField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleField::Axes => f.write_str("axes"),
            SampleField::Buttons => f.write_str("buttons"),
        }
    }
}

/// Main error type for Joy Teleop
#[derive(Debug, Error)]
pub enum TeleopError {
    /// Invalid configuration values, fatal at startup
    #[error("Configuration error: {0}")]
    Config(String),

    /// TOML syntax or type errors
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// A joystick sample too short for the configured indices
    #[error("Malformed joystick sample: index {index} requested but {field} has only {len} entries")]
    MalformedSample {
        field: SampleField,
        index: usize,
        len: usize,
    },

    /// The command sink rejected the outbound command for this tick
    #[error("Command sink unavailable: {0}")]
    SinkUnavailable(String),

    /// Joystick device errors
    #[error("Controller error: {0}")]
    Controller(String),

    /// No usable joystick found while scanning /dev/input
    #[error("No joystick found in /dev/input")]
    ControllerNotFound,

    /// Serial port could not be opened
    #[error("Serial port error: {0}")]
    Serial(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Joy Teleop
pub type Result<T> = std::result::Result<T, TeleopError>;
