//! # Controller Module
//!
//! Joystick input handling.
//!
//! This module handles:
//! - Joystick detection and connection via evdev
//! - Accumulating axis and button events into joystick samples
//! - Feeding samples through the input translator
//! - Releasing the deadman and reconnecting when the device disappears

pub mod input;
pub mod joystick;
pub mod mapper;

pub use input::run_input;
pub use joystick::Joystick;
