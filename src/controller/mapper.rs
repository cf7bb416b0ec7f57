//! # Joystick Event Mapper
//!
//! Accumulates raw evdev events into a [`JoySample`] and hands out one
//! sample per `SYN_REPORT`.
//!
//! ## Ordering
//!
//! Indices follow the Linux joystick (joydev) convention so a configured
//! `axis_linear = 1` means the same control it does for any other Linux
//! joystick tool:
//!
//! - Axes: every supported `EV_ABS` code, ascending.
//! - Buttons: `EV_KEY` codes from `BTN_JOYSTICK` upward first, then
//!   `BTN_MISC..BTN_JOYSTICK`. Keyboard keys below `BTN_MISC` are ignored.
//!
//! ## Normalisation
//!
//! Each axis is scaled from its `absinfo` range onto `[-1.0, 1.0]`. With
//! inversion enabled (the default) the sign is flipped, so pushing a stick
//! up or left reads positive.
//!
//! ## Dropped events
//!
//! After `SYN_DROPPED` every event up to the next `SYN_REPORT` is discarded
//! and [`JoyMapper::take_resync`] reports that the caller must re-read the
//! device state.

use evdev::{InputEvent, InputEventKind, Synchronization};
use std::collections::HashMap;

use crate::teleop::JoySample;

/// First joystick button code (`BTN_MISC`).
pub const BTN_MISC: u16 = 0x100;
/// Start of the dedicated joystick/gamepad button range (`BTN_JOYSTICK`).
pub const BTN_JOYSTICK: u16 = 0x120;

/// Value range reported by the kernel for one absolute axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub code: u16,
    pub minimum: i32,
    pub maximum: i32,
}

impl AxisRange {
    /// Map a raw value onto `[-1.0, 1.0]`.
    ///
    /// # Examples
    ///
    /// ```
    /// use joy_teleop::controller::mapper::AxisRange;
    ///
    /// let stick = AxisRange { code: 0, minimum: 0, maximum: 255 };
    /// assert_eq!(stick.normalize(0, false), -1.0);
    /// assert_eq!(stick.normalize(255, false), 1.0);
    /// assert_eq!(stick.normalize(255, true), -1.0);
    /// ```
    #[must_use]
    pub fn normalize(&self, value: i32, invert: bool) -> f32 {
        let span = i64::from(self.maximum) - i64::from(self.minimum);
        if span <= 0 {
            return 0.0;
        }

        let offset = i64::from(value) - i64::from(self.minimum);
        let normalized = ((2.0 * offset as f64 / span as f64) - 1.0).clamp(-1.0, 1.0) as f32;

        if invert {
            -normalized
        } else {
            normalized
        }
    }
}

/// Builds [`JoySample`]s from evdev events.
///
/// # Examples
///
/// ```
/// use evdev::{AbsoluteAxisType, EventType, InputEvent, Key, Synchronization};
/// use joy_teleop::controller::mapper::{AxisRange, JoyMapper};
///
/// let axes = vec![AxisRange { code: AbsoluteAxisType::ABS_X.0, minimum: 0, maximum: 255 }];
/// let mut mapper = JoyMapper::new(axes, vec![Key::BTN_SOUTH.code()], false);
///
/// assert!(mapper
///     .process_event(&InputEvent::new(EventType::KEY, Key::BTN_SOUTH.code(), 1))
///     .is_none());
/// let sample = mapper
///     .process_event(&InputEvent::new(EventType::SYNCHRONIZATION, Synchronization::SYN_REPORT.0, 0))
///     .unwrap();
/// assert_eq!(sample.buttons, vec![true]);
/// ```
#[derive(Debug)]
pub struct JoyMapper {
    axes: Vec<AxisRange>,
    axis_index: HashMap<u16, usize>,
    button_codes: Vec<u16>,
    button_index: HashMap<u16, usize>,
    invert: bool,
    sample: JoySample,
    dirty: bool,
    dropped: bool,
    needs_resync: bool,
}

impl JoyMapper {
    /// Create a mapper for the given axes and button codes
    ///
    /// Ordering is applied here, so callers may pass codes in any order.
    /// Button codes below `BTN_MISC` are dropped. All axes start at `0.0`
    /// and all buttons released.
    #[must_use]
    pub fn new(mut axes: Vec<AxisRange>, mut button_codes: Vec<u16>, invert: bool) -> Self {
        axes.sort_by_key(|axis| axis.code);
        axes.dedup_by_key(|axis| axis.code);

        button_codes.retain(|&code| code >= BTN_MISC);
        button_codes.sort_by_key(|&code| (code < BTN_JOYSTICK, code));
        button_codes.dedup();

        let axis_index = axes.iter().enumerate().map(|(i, a)| (a.code, i)).collect();
        let button_index = button_codes.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        let sample = JoySample::new(vec![0.0; axes.len()], vec![false; button_codes.len()]);

        Self {
            axes,
            axis_index,
            button_codes,
            button_index,
            invert,
            sample,
            dirty: false,
            dropped: false,
            needs_resync: false,
        }
    }

    pub fn num_axes(&self) -> usize {
        self.axes.len()
    }

    pub fn num_buttons(&self) -> usize {
        self.button_codes.len()
    }

    /// Axis codes in sample order
    pub fn axis_codes(&self) -> impl Iterator<Item = u16> + '_ {
        self.axes.iter().map(|axis| axis.code)
    }

    /// Button codes in sample order
    pub fn button_codes(&self) -> &[u16] {
        &self.button_codes
    }

    /// The sample as of the last processed event
    pub fn sample(&self) -> &JoySample {
        &self.sample
    }

    /// Set an axis from a raw value; unknown codes are ignored
    pub fn set_axis(&mut self, code: u16, value: i32) {
        if let Some(&index) = self.axis_index.get(&code) {
            self.sample.axes[index] = self.axes[index].normalize(value, self.invert);
            self.dirty = true;
        }
    }

    /// Set a button; unknown codes are ignored
    pub fn set_button(&mut self, code: u16, pressed: bool) {
        if let Some(&index) = self.button_index.get(&code) {
            self.sample.buttons[index] = pressed;
            self.dirty = true;
        }
    }

    /// Process one event, returning a sample on `SYN_REPORT` if anything changed
    pub fn process_event(&mut self, event: &InputEvent) -> Option<JoySample> {
        match event.kind() {
            InputEventKind::Synchronization(Synchronization::SYN_DROPPED) => {
                self.dropped = true;
                None
            }
            InputEventKind::Synchronization(Synchronization::SYN_REPORT) => {
                if self.dropped {
                    self.dropped = false;
                    self.needs_resync = true;
                    return None;
                }
                if self.dirty {
                    self.dirty = false;
                    Some(self.sample.clone())
                } else {
                    None
                }
            }
            _ if self.dropped => None,
            InputEventKind::AbsAxis(axis) => {
                self.set_axis(axis.0, event.value());
                None
            }
            InputEventKind::Key(key) => {
                // value 2 is autorepeat, still held
                self.set_button(key.code(), event.value() != 0);
                None
            }
            _ => None,
        }
    }

    /// True once after a `SYN_DROPPED` burst has ended
    pub fn take_resync(&mut self) -> bool {
        std::mem::take(&mut self.needs_resync)
    }
}
