//! # Teleop Module
//!
//! The deadman-switch core: turning joystick samples into velocity commands
//! and deciding, once per tick, what the robot is allowed to do.
//!
//! This module handles:
//! - Linear scaling of two joystick axes into a [`VelocityCommand`]
//! - Sharing the latest command and deadman state between the input task
//!   and the publisher task
//! - The deadman state machine that emits motion, a single stop, or nothing

pub mod command;
pub mod deadman;
pub mod sample;
pub mod state;
pub mod translator;

pub use command::VelocityCommand;
pub use deadman::{DeadmanPhase, DeadmanPublisher, PublisherStats, TickOutcome};
pub use sample::JoySample;
pub use state::{CommandSnapshot, SharedCommandState};
pub use translator::InputTranslator;
