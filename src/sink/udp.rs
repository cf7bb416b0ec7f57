//! # UDP Command Sink
//!
//! One JSON object per datagram, e.g. `{"linear":0.3,"angular":0.45}`.

use async_trait::async_trait;
use std::net::SocketAddr;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use super::{encode_command, CommandSink};
use crate::error::{Result, TeleopError};
use crate::teleop::VelocityCommand;

/// Sends velocity commands to a fixed UDP destination
#[derive(Debug)]
pub struct UdpCommandSink {
    socket: UdpSocket,
    target: SocketAddr,
}

impl UdpCommandSink {
    /// Bind an ephemeral local socket of the same address family as `target`
    ///
    /// # Errors
    ///
    /// Returns `Io` if the local socket cannot be bound
    pub async fn bind(target: SocketAddr) -> Result<Self> {
        let local: SocketAddr = if target.is_ipv4() {
            SocketAddr::from(([0, 0, 0, 0], 0))
        } else {
            SocketAddr::from(([0u16; 8], 0))
        };
        let socket = UdpSocket::bind(local).await?;

        info!("Sending velocity commands to udp://{}", target);
        Ok(Self { socket, target })
    }

    pub fn target(&self) -> SocketAddr {
        self.target
    }
}

#[async_trait]
impl CommandSink for UdpCommandSink {
    async fn send(&mut self, command: &VelocityCommand) -> Result<()> {
        let datagram = encode_command(command)?;

        self.socket
            .send_to(&datagram, self.target)
            .await
            .map_err(|e| {
                TeleopError::SinkUnavailable(format!("Failed to send to {}: {}", self.target, e))
            })?;

        debug!("Sent {:?} to {}", command, self.target);
        Ok(())
    }
}
