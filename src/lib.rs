//! # Joy Teleop Library
//!
//! Drive a mobile robot from a joystick, guarded by a deadman switch.
//!
//! Joystick samples are scaled into a linear/angular velocity command. A
//! fixed-rate publisher sends that command only while the deadman button is
//! held, and a single stop command each time it is released.

pub mod config;
pub mod controller;
pub mod error;
pub mod sink;
pub mod teleop;
