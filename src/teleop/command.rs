//! Planar velocity command sent to the robot base.

use serde::{Deserialize, Serialize};

/// Linear (forward) and angular (yaw rate) velocity.
///
/// Serialises as `{"linear":0.3,"angular":0.45}`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct VelocityCommand {
    pub linear: f64,
    pub angular: f64,
}

impl VelocityCommand {
    /// The stop command.
    pub const ZERO: VelocityCommand = VelocityCommand {
        linear: 0.0,
        angular: 0.0,
    };

    #[must_use]
    pub fn new(linear: f64, angular: f64) -> Self {
        Self { linear, angular }
    }

    /// True when both components are exactly zero.
    #[must_use]
    pub fn is_stop(&self) -> bool {
        self.linear == 0.0 && self.angular == 0.0
    }
}
