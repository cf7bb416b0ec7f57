//! One joystick reading: every axis and every button at a single instant.

/// Snapshot of a joystick as delivered by the input source.
///
/// Axes are normalised to `[-1.0, 1.0]`; buttons are pressed/released.
/// Ordering is fixed for a given device, so configured indices address
/// the same physical control on every sample.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JoySample {
    pub axes: Vec<f32>,
    pub buttons: Vec<bool>,
}

impl JoySample {
    #[must_use]
    pub fn new(axes: Vec<f32>, buttons: Vec<bool>) -> Self {
        Self { axes, buttons }
    }

    /// Build a sample from integer button states, `0` meaning released.
    ///
    /// # Examples
    ///
    /// ```
    /// use joy_teleop::teleop::JoySample;
    ///
    /// let sample = JoySample::from_raw_buttons(vec![0.5, 1.0], &[0, 0, 0, 0, 1]);
    /// assert!(sample.buttons[4]);
    /// assert!(!sample.buttons[0]);
    /// ```
    #[must_use]
    pub fn from_raw_buttons(axes: Vec<f32>, buttons: &[i32]) -> Self {
        Self {
            axes,
            buttons: buttons.iter().map(|&b| b != 0).collect(),
        }
    }
}
