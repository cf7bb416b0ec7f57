//! Latest command and deadman state, shared between the input task and the
//! publisher task.

use std::sync::{Arc, Mutex, PoisonError};

use super::command::VelocityCommand;

/// What the operator most recently asked for.
///
/// Written and read as a unit so a velocity is never paired with the
/// deadman state of a different sample.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct CommandSnapshot {
    pub command: VelocityCommand,
    pub deadman_pressed: bool,
}

impl CommandSnapshot {
    /// Deadman released, zero command. Also the state before any input arrives.
    pub const RELEASED: CommandSnapshot = CommandSnapshot {
        command: VelocityCommand::ZERO,
        deadman_pressed: false,
    };
}

/// Cloneable handle to the shared [`CommandSnapshot`].
///
/// Critical sections are a single copy in or out; the lock is never held
/// across an `.await`.
///
/// # Examples
///
/// ```
/// use joy_teleop::teleop::{CommandSnapshot, SharedCommandState, VelocityCommand};
///
/// let state = SharedCommandState::new();
/// let writer = state.clone();
/// writer.store(CommandSnapshot {
///     command: VelocityCommand::new(0.3, 0.45),
///     deadman_pressed: true,
/// });
/// assert!(state.snapshot().deadman_pressed);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedCommandState {
    inner: Arc<Mutex<CommandSnapshot>>,
}

impl SharedCommandState {
    /// Starts released with a zero command.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole snapshot.
    pub fn store(&self, snapshot: CommandSnapshot) {
        // The guarded value is plain Copy data, always complete after a store.
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        *guard = snapshot;
    }

    /// Copy of the most recently stored snapshot.
    #[must_use]
    pub fn snapshot(&self) -> CommandSnapshot {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Force the released state, e.g. when the input device goes away.
    pub fn release(&self) {
        self.store(CommandSnapshot::RELEASED);
    }
}
