//! # Joystick Device Module
//!
//! Opens a joystick or gamepad through the Linux evdev interface and turns
//! its event stream into [`JoySample`]s.
//!
//! ## Detection
//!
//! A device counts as a joystick when it reports `ABS_X` and at least one
//! button in the joystick/gamepad range (`BTN_JOYSTICK..=BTN_THUMBR`). This
//! excludes keyboards, mice and the motion-sensor and touchpad nodes that
//! gamepads such as the DualSense expose alongside the main device.

use evdev::{AbsoluteAxisType, Device, EventStream, Key};
use std::path::Path;
use tracing::{debug, info};

use super::mapper::{AxisRange, JoyMapper, BTN_JOYSTICK};
use crate::error::{Result, TeleopError};
use crate::teleop::JoySample;

/// Last code of the joystick/gamepad button range (`BTN_THUMBR`).
const BTN_GAMEPAD_LAST: u16 = 0x13e;

/// An open joystick producing [`JoySample`]s
pub struct Joystick {
    stream: EventStream,
    mapper: JoyMapper,
    device_path: String,
    name: String,
}

impl std::fmt::Debug for Joystick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joystick")
            .field("device_path", &self.device_path)
            .field("name", &self.name)
            .field("axes", &self.mapper.num_axes())
            .field("buttons", &self.mapper.num_buttons())
            .finish_non_exhaustive()
    }
}

impl Joystick {
    /// Open `device_path`, or the first joystick found when `None`
    ///
    /// # Errors
    ///
    /// See [`open_path`](Self::open_path) and [`detect`](Self::detect).
    pub fn open(device_path: Option<&str>, invert_axes: bool) -> Result<Self> {
        match device_path {
            Some(path) => Self::open_path(path, invert_axes),
            None => Self::detect(invert_axes),
        }
    }

    /// Open a specific `/dev/input/eventX` node
    ///
    /// # Errors
    ///
    /// Returns `Controller` if the node cannot be opened or is not a joystick.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use joy_teleop::controller::Joystick;
    ///
    /// let joystick = Joystick::open_path("/dev/input/event5", true)?;
    /// println!("{} axes, {} buttons", joystick.num_axes(), joystick.num_buttons());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open_path(path: &str, invert_axes: bool) -> Result<Self> {
        let device = Device::open(path)
            .map_err(|e| TeleopError::Controller(format!("Failed to open {}: {}", path, e)))?;

        if !is_joystick(&device) {
            return Err(TeleopError::Controller(format!(
                "{} does not look like a joystick",
                path
            )));
        }

        Self::from_device(device, path.to_string(), invert_axes)
    }

    /// Scan `/dev/input/event*` in path order and open the first joystick
    ///
    /// # Errors
    ///
    /// - `Controller`: `/dev/input` missing or unreadable
    /// - `ControllerNotFound`: no joystick among the readable devices
    pub fn detect(invert_axes: bool) -> Result<Self> {
        let input_dir = Path::new("/dev/input");

        if !input_dir.exists() {
            return Err(TeleopError::Controller(
                "/dev/input directory not found".to_string(),
            ));
        }

        let mut entries: Vec<_> = std::fs::read_dir(input_dir)
            .map_err(|e| TeleopError::Controller(format!("Failed to read /dev/input: {}", e)))?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TeleopError::Controller(format!("Failed to read directory entry: {}", e)))?;

        // Deterministic pick when several joysticks are connected
        entries.sort_by_key(|entry| entry.path());

        for entry in entries {
            let path = entry.path();

            let is_event_node = path
                .file_name()
                .map(|name| name.to_string_lossy().starts_with("event"))
                .unwrap_or(false);
            if !is_event_node {
                continue;
            }

            match Device::open(&path) {
                Ok(device) => {
                    debug!(
                        "Found input device: {} ({})",
                        path.display(),
                        device.name().unwrap_or("unnamed")
                    );

                    if is_joystick(&device) {
                        return Self::from_device(device, path.to_string_lossy().to_string(), invert_axes);
                    }
                }
                Err(e) => {
                    // Permission denied or other errors - skip device
                    debug!("Could not open {}: {}", path.display(), e);
                }
            }
        }

        Err(TeleopError::ControllerNotFound)
    }

    fn from_device(device: Device, device_path: String, invert_axes: bool) -> Result<Self> {
        let name = device.name().unwrap_or("unnamed joystick").to_string();

        let abs_state = device
            .get_abs_state()
            .map_err(|e| TeleopError::Controller(format!("Failed to read axis ranges: {}", e)))?;

        let axes: Vec<AxisRange> = device
            .supported_absolute_axes()
            .map(|set| {
                set.iter()
                    .filter_map(|axis| {
                        abs_state.get(usize::from(axis.0)).map(|info| AxisRange {
                            code: axis.0,
                            minimum: info.minimum,
                            maximum: info.maximum,
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let buttons: Vec<u16> = device
            .supported_keys()
            .map(|set| set.iter().map(|key| key.code()).collect())
            .unwrap_or_default();

        let mut mapper = JoyMapper::new(axes, buttons, invert_axes);
        for code in mapper.axis_codes().collect::<Vec<_>>() {
            if let Some(info) = abs_state.get(usize::from(code)) {
                mapper.set_axis(code, info.value);
            }
        }

        let stream = device
            .into_event_stream()
            .map_err(|e| TeleopError::Controller(format!("Failed to start event stream: {}", e)))?;

        info!(
            "Opened joystick '{}' at {} ({} axes, {} buttons)",
            name,
            device_path,
            mapper.num_axes(),
            mapper.num_buttons()
        );

        Ok(Self {
            stream,
            mapper,
            device_path,
            name,
        })
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    pub fn num_axes(&self) -> usize {
        self.mapper.num_axes()
    }

    pub fn num_buttons(&self) -> usize {
        self.mapper.num_buttons()
    }

    /// Wait for the next complete sample
    ///
    /// # Errors
    ///
    /// Returns `Controller` when the device stops delivering events, most
    /// often because it was unplugged or went out of Bluetooth range.
    pub async fn next_sample(&mut self) -> Result<JoySample> {
        loop {
            let event = self
                .stream
                .next_event()
                .await
                .map_err(|e| TeleopError::Controller(format!("Failed to fetch events: {}", e)))?;

            if let Some(sample) = self.mapper.process_event(&event) {
                return Ok(sample);
            }

            if self.mapper.take_resync() {
                self.resync()?;
                return Ok(self.mapper.sample().clone());
            }
        }
    }

    /// Re-read every axis and button after the kernel dropped events
    fn resync(&mut self) -> Result<()> {
        debug!("Event buffer overrun on {}, re-reading device state", self.device_path);

        let device = self.stream.device();
        let abs_state = device
            .get_abs_state()
            .map_err(|e| TeleopError::Controller(format!("Failed to read axis state: {}", e)))?;
        let key_state = device
            .get_key_state()
            .map_err(|e| TeleopError::Controller(format!("Failed to read button state: {}", e)))?;

        for code in self.mapper.axis_codes().collect::<Vec<_>>() {
            if let Some(info) = abs_state.get(usize::from(code)) {
                self.mapper.set_axis(code, info.value);
            }
        }
        for code in self.mapper.button_codes().to_vec() {
            self.mapper.set_button(code, key_state.contains(Key::new(code)));
        }

        Ok(())
    }
}

/// True for devices with a main stick and joystick/gamepad buttons
fn is_joystick(device: &Device) -> bool {
    let has_stick = device
        .supported_absolute_axes()
        .map_or(false, |axes| axes.contains(AbsoluteAxisType::ABS_X));

    let has_buttons = device.supported_keys().map_or(false, |keys| {
        keys.iter()
            .any(|key| (BTN_JOYSTICK..=BTN_GAMEPAD_LAST).contains(&key.code()))
    });

    has_stick && has_buttons
}
