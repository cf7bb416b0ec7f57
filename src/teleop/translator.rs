//! # Input Translator
//!
//! Turns a [`JoySample`] into a [`CommandSnapshot`] with a pure linear scale:
//!
//! | Output | Formula |
//! |--------|---------|
//! | linear | `scale_linear * axes[axis_linear]` |
//! | angular | `scale_angular * axes[axis_angular]` |
//! | deadman | `buttons[axis_deadman]` |
//!
//! No deadzone, expo or smoothing is applied.

use std::sync::atomic::{AtomicU64, Ordering};

use super::command::VelocityCommand;
use super::sample::JoySample;
use super::state::{CommandSnapshot, SharedCommandState};
use crate::config::TeleopConfig;
use crate::error::{Result, SampleField, TeleopError};

/// Maps joystick samples into the shared command state.
///
/// # Examples
///
/// ```
/// use joy_teleop::config::TeleopConfig;
/// use joy_teleop::teleop::{InputTranslator, JoySample, SharedCommandState};
///
/// let translator = InputTranslator::new(TeleopConfig::default());
/// let state = SharedCommandState::new();
///
/// let sample = JoySample::from_raw_buttons(vec![0.5, 1.0], &[0, 0, 0, 0, 1]);
/// translator.apply(&sample, &state)?;
///
/// let snapshot = state.snapshot();
/// assert!(snapshot.deadman_pressed);
/// assert!((snapshot.command.linear - 0.3).abs() < 1e-9);
/// assert!((snapshot.command.angular - 0.45).abs() < 1e-9);
/// # Ok::<(), joy_teleop::error::TeleopError>(())
/// ```
#[derive(Debug)]
pub struct InputTranslator {
    mapping: TeleopConfig,
    rejected: AtomicU64,
}

impl InputTranslator {
    #[must_use]
    pub fn new(mapping: TeleopConfig) -> Self {
        Self {
            mapping,
            rejected: AtomicU64::new(0),
        }
    }

    pub fn mapping(&self) -> &TeleopConfig {
        &self.mapping
    }

    /// Compute the command and deadman state for one sample.
    ///
    /// # Errors
    ///
    /// Returns `MalformedSample` if `axes` or `buttons` is too short for the
    /// configured indices.
    pub fn translate(&self, sample: &JoySample) -> Result<CommandSnapshot> {
        let linear = axis(sample, self.mapping.axis_linear)?;
        let angular = axis(sample, self.mapping.axis_angular)?;
        let deadman_pressed = sample
            .buttons
            .get(self.mapping.axis_deadman)
            .copied()
            .ok_or(TeleopError::MalformedSample {
                field: SampleField::Buttons,
                index: self.mapping.axis_deadman,
                len: sample.buttons.len(),
            })?;

        Ok(CommandSnapshot {
            command: VelocityCommand::new(
                self.mapping.scale_linear * f64::from(linear),
                self.mapping.scale_angular * f64::from(angular),
            ),
            deadman_pressed,
        })
    }

    /// Translate `sample` and store the result in `state`.
    ///
    /// A malformed sample leaves `state` untouched and bumps
    /// [`rejected_samples`](Self::rejected_samples).
    ///
    /// # Errors
    ///
    /// Returns `MalformedSample` as [`translate`](Self::translate) does.
    pub fn apply(&self, sample: &JoySample, state: &SharedCommandState) -> Result<()> {
        match self.translate(sample) {
            Ok(snapshot) => {
                state.store(snapshot);
                Ok(())
            }
            Err(e) => {
                self.rejected.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Number of samples rejected as malformed so far.
    pub fn rejected_samples(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }
}

fn axis(sample: &JoySample, index: usize) -> Result<f32> {
    sample
        .axes
        .get(index)
        .copied()
        .ok_or(TeleopError::MalformedSample {
            field: SampleField::Axes,
            index,
            len: sample.axes.len(),
        })
}
