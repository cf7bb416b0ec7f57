//! Input task: joystick samples in, shared command state out.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::joystick::Joystick;
use crate::config::ControllerConfig;
use crate::error::{Result, TeleopError};
use crate::teleop::{InputTranslator, JoySample, SharedCommandState};

/// Rejected samples between two warnings
const MALFORMED_WARN_EVERY: u64 = 100;

/// Anything that yields joystick samples until it fails
#[async_trait]
pub trait SampleSource: Send {
    async fn next_sample(&mut self) -> Result<JoySample>;
}

#[async_trait]
impl SampleSource for Joystick {
    async fn next_sample(&mut self) -> Result<JoySample> {
        Joystick::next_sample(self).await
    }
}

/// Apply every sample from `source` until it fails
///
/// Malformed samples are logged and skipped. When the source fails the
/// deadman is released before the error is returned.
pub async fn forward_samples<S: SampleSource + ?Sized>(
    source: &mut S,
    translator: &InputTranslator,
    state: &SharedCommandState,
) -> TeleopError {
    loop {
        match source.next_sample().await {
            Ok(sample) => {
                if let Err(e) = translator.apply(&sample, state) {
                    let rejected = translator.rejected_samples();
                    if rejected == 1 || rejected % MALFORMED_WARN_EVERY == 0 {
                        warn!("Ignoring joystick sample ({} rejected so far): {}", rejected, e);
                    } else {
                        debug!("Ignoring joystick sample: {}", e);
                    }
                }
            }
            Err(e) => {
                state.release();
                return e;
            }
        }
    }
}

/// Translate samples from `joystick` into `state` forever
///
/// When the device stops delivering events the deadman is released at once
/// (so the publisher sends a stop) and the same device path is reopened
/// every `reconnect_interval_ms` until it is back.
pub async fn run_input(
    mut joystick: Joystick,
    config: ControllerConfig,
    translator: Arc<InputTranslator>,
    state: SharedCommandState,
) {
    loop {
        let e = forward_samples(&mut joystick, &translator, &state).await;
        warn!("Joystick lost, deadman released: {}", e);

        let path = joystick.device_path().to_string();
        joystick = reconnect(&path, &config, &translator).await;
    }
}

async fn reconnect(path: &str, config: &ControllerConfig, translator: &InputTranslator) -> Joystick {
    let mut attempts: u64 = 0;

    loop {
        tokio::time::sleep(config.reconnect_interval()).await;
        attempts += 1;

        match open_validated(path, config, translator) {
            Ok(joystick) => {
                info!("Joystick reconnected after {} attempt(s)", attempts);
                return joystick;
            }
            Err(e) => debug!("Reconnect attempt {} failed: {}", attempts, e),
        }
    }
}

/// Open the joystick and check that the configured indices exist on it
///
/// # Errors
///
/// Returns `Controller`/`ControllerNotFound` if no device can be opened and
/// `Config` if the mapping does not fit the device.
pub fn open_validated(
    path: &str,
    config: &ControllerConfig,
    translator: &InputTranslator,
) -> Result<Joystick> {
    let joystick = Joystick::open_path(path, config.invert_axes)?;
    check_mapping(&joystick, translator)?;
    Ok(joystick)
}

/// Reject a device whose axes or buttons do not cover the configured indices
///
/// # Errors
///
/// Returns `Config` naming the offending index.
pub fn check_mapping(joystick: &Joystick, translator: &InputTranslator) -> Result<()> {
    translator
        .mapping()
        .validate_for_device(joystick.num_axes(), joystick.num_buttons())
        .map_err(|e| match e {
            TeleopError::Config(msg) => {
                TeleopError::Config(format!("{} ({})", msg, joystick.device_path()))
            }
            other => other,
        })
}
