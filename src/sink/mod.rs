//! # Command Sink Module
//!
//! Where velocity commands go once the deadman publisher decides to emit one.
//!
//! This module handles:
//! - The [`CommandSink`] trait the publisher loop is written against
//! - Newline-delimited JSON over any async writer (serial port in production)
//! - JSON datagrams over UDP
//!
//! Sinks are fire-and-forget: a failed send is reported as
//! `SinkUnavailable` and the command is dropped.

pub mod serial;
pub mod udp;

use async_trait::async_trait;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::debug;

use crate::error::{Result, TeleopError};
use crate::teleop::VelocityCommand;

pub use serial::SerialCommandSink;
pub use udp::UdpCommandSink;

/// Destination for outbound velocity commands
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CommandSink: Send {
    /// Deliver one command
    ///
    /// # Errors
    ///
    /// Returns `SinkUnavailable` if the command could not be handed off.
    async fn send(&mut self, command: &VelocityCommand) -> Result<()>;
}

#[async_trait]
impl<S: CommandSink + ?Sized> CommandSink for Box<S> {
    async fn send(&mut self, command: &VelocityCommand) -> Result<()> {
        (**self).send(command).await
    }
}

/// Writes each command as one JSON object followed by `\n`.
///
/// # Examples
///
/// ```
/// use joy_teleop::sink::{CommandSink, JsonLineSink};
/// use joy_teleop::teleop::VelocityCommand;
///
/// # tokio_test::block_on(async {
/// let mut sink = JsonLineSink::new(Vec::new());
/// sink.send(&VelocityCommand::new(0.5, 0.25)).await?;
/// assert_eq!(sink.into_inner(), b"{\"linear\":0.5,\"angular\":0.25}\n");
/// # Ok::<(), joy_teleop::error::TeleopError>(())
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct JsonLineSink<W> {
    writer: W,
}

impl<W> JsonLineSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// JSON bytes for one command, without a trailing newline
pub(crate) fn encode_command(command: &VelocityCommand) -> Result<Vec<u8>> {
    serde_json::to_vec(command)
        .map_err(|e| TeleopError::SinkUnavailable(format!("Failed to encode command: {}", e)))
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> CommandSink for JsonLineSink<W> {
    async fn send(&mut self, command: &VelocityCommand) -> Result<()> {
        let mut line = encode_command(command)?;
        line.push(b'\n');

        self.writer
            .write_all(&line)
            .await
            .map_err(|e| TeleopError::SinkUnavailable(format!("Failed to write command: {}", e)))?;

        self.writer
            .flush()
            .await
            .map_err(|e| TeleopError::SinkUnavailable(format!("Failed to flush command: {}", e)))?;

        debug!("Sent {:?} ({} bytes)", command, line.len());
        Ok(())
    }
}
