//! # Serial Command Sink
//!
//! Sends velocity commands as JSON lines to a motor controller attached over
//! USB serial (8 data bits, no parity, 1 stop bit, no flow control).

use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::info;

use super::JsonLineSink;
use crate::error::{Result, TeleopError};

/// JSON-lines sink over a serial port
pub type SerialCommandSink = JsonLineSink<SerialStream>;

impl JsonLineSink<SerialStream> {
    /// Open a serial port and wrap it as a command sink
    ///
    /// # Arguments
    ///
    /// * `path` - Device path (e.g., "/dev/ttyACM0")
    /// * `baud_rate` - Line speed
    ///
    /// # Errors
    ///
    /// Returns `Serial` if the port cannot be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use joy_teleop::sink::SerialCommandSink;
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let sink = SerialCommandSink::open_serial("/dev/ttyACM0", 115200)?;
    ///     Ok(())
    /// }
    /// ```
    pub fn open_serial(path: &str, baud_rate: u32) -> Result<Self> {
        let port = tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| TeleopError::Serial(format!("Failed to open {}: {}", path, e)))?;

        info!("Opened command serial port {} at {} baud", path, baud_rate);
        Ok(JsonLineSink::new(port))
    }
}
