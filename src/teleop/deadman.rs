//! # Deadman Publisher
//!
//! Fixed-rate loop that decides what the robot may do on each tick.
//!
//! ## Phases
//!
//! | Phase | Meaning | Tick with deadman pressed | Tick with deadman released |
//! |-------|---------|---------------------------|----------------------------|
//! | `Active` | operator holds the deadman | send last command | send stop, then `Idle` |
//! | `JustReleased` | released, stop not yet delivered | send last command, `Active` | send stop, then `Idle` |
//! | `Idle` | released, stop delivered | send last command, `Active` | nothing |
//!
//! The loop starts in `JustReleased`, so the first tick before any input
//! sends exactly one stop. A stop only moves the phase to `Idle` once the
//! sink accepted it; a failed stop is retried on the next tick.
//!
//! Every send is bounded by a timeout no longer than the tick period. A
//! sink that stops draining (a USB serial peer that quit reading, say)
//! turns into failed ticks instead of a frozen loop.
//!
//! Input toggles between two ticks are not seen: only the snapshot at tick
//! time matters.

use std::future::Future;
use std::time::Duration;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::command::VelocityCommand;
use super::state::SharedCommandState;
use crate::error::{Result, TeleopError};
use crate::sink::CommandSink;

/// Position of the publisher in the release cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeadmanPhase {
    /// Deadman held; motion commands flow every tick.
    Active,
    /// Deadman released and the stop has not reached the sink yet.
    JustReleased,
    /// Deadman released and the stop was delivered; ticks are silent.
    Idle,
}

/// What a single tick did
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// The last operator command was sent.
    Motion(VelocityCommand),
    /// A zero command was sent.
    Stop,
    /// Nothing was sent; the stop for this release already went out.
    Suppressed,
}

/// Counters kept by [`DeadmanPublisher`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublisherStats {
    pub ticks: u64,
    pub motion_commands: u64,
    pub stop_commands: u64,
    pub suppressed_ticks: u64,
    pub sink_failures: u64,
}

/// Emits motion or stop commands to a [`CommandSink`] on every tick.
///
/// # Examples
///
/// ```
/// use joy_teleop::sink::JsonLineSink;
/// use joy_teleop::teleop::{DeadmanPublisher, SharedCommandState, TickOutcome};
///
/// # tokio_test::block_on(async {
/// let state = SharedCommandState::new();
/// let mut publisher = DeadmanPublisher::new(state, JsonLineSink::new(Vec::new()));
///
/// // Nothing pressed yet: one stop, then silence
/// assert_eq!(publisher.tick().await?, TickOutcome::Stop);
/// assert_eq!(publisher.tick().await?, TickOutcome::Suppressed);
/// # Ok::<(), joy_teleop::error::TeleopError>(())
/// # }).unwrap();
/// ```
pub struct DeadmanPublisher<S> {
    state: SharedCommandState,
    sink: S,
    phase: DeadmanPhase,
    stats: PublisherStats,
    stats_interval_ticks: u64,
    send_timeout: Duration,
    sink_failing: bool,
}

impl<S: CommandSink> DeadmanPublisher<S> {
    /// Default number of ticks between statistics log lines
    pub const DEFAULT_STATS_INTERVAL_TICKS: u64 = 600;

    /// Default limit for one sink send
    pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(50);

    pub fn new(state: SharedCommandState, sink: S) -> Self {
        Self {
            state,
            sink,
            phase: DeadmanPhase::JustReleased,
            stats: PublisherStats::default(),
            stats_interval_ticks: Self::DEFAULT_STATS_INTERVAL_TICKS,
            send_timeout: Self::DEFAULT_SEND_TIMEOUT,
            sink_failing: false,
        }
    }

    /// Log statistics every `ticks` ticks instead of the default
    #[must_use]
    pub fn with_stats_interval(mut self, ticks: u64) -> Self {
        self.stats_interval_ticks = ticks.max(1);
        self
    }

    /// Give up on a sink send after `limit`
    ///
    /// [`run`](Self::run) further caps this at the tick period.
    #[must_use]
    pub fn with_send_timeout(mut self, limit: Duration) -> Self {
        self.send_timeout = limit;
        self
    }

    pub fn phase(&self) -> DeadmanPhase {
        self.phase
    }

    pub fn stats(&self) -> PublisherStats {
        self.stats
    }

    /// Run one publishing step
    ///
    /// # Errors
    ///
    /// Returns `SinkUnavailable` if the sink rejected the command or did not
    /// take it within the send timeout. The tick is lost; the phase is left
    /// so the next tick retries.
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        self.stats.ticks += 1;
        let snapshot = self.state.snapshot();

        if snapshot.deadman_pressed {
            self.phase = DeadmanPhase::Active;
            self.deliver(&snapshot.command).await?;
            self.stats.motion_commands += 1;
            return Ok(TickOutcome::Motion(snapshot.command));
        }

        match self.phase {
            DeadmanPhase::Active | DeadmanPhase::JustReleased => {
                self.phase = DeadmanPhase::JustReleased;
                self.deliver(&VelocityCommand::ZERO).await?;
                self.phase = DeadmanPhase::Idle;
                self.stats.stop_commands += 1;
                debug!("Deadman released, stop command sent");
                Ok(TickOutcome::Stop)
            }
            DeadmanPhase::Idle => {
                self.stats.suppressed_ticks += 1;
                Ok(TickOutcome::Suppressed)
            }
        }
    }

    async fn deliver(&mut self, command: &VelocityCommand) -> Result<()> {
        // A timed-out write may leave a partial line behind; the receiver
        // discards it at the next newline.
        let sent = match timeout(self.send_timeout, self.sink.send(command)).await {
            Ok(result) => result,
            Err(_) => Err(TeleopError::SinkUnavailable(format!(
                "Send did not complete within {:?}",
                self.send_timeout
            ))),
        };

        match sent {
            Ok(()) => {
                if self.sink_failing {
                    info!("Command sink recovered");
                    self.sink_failing = false;
                }
                Ok(())
            }
            Err(e) => {
                self.stats.sink_failures += 1;
                Err(e)
            }
        }
    }

    /// Tick every `period` until `shutdown` resolves
    ///
    /// Failed ticks are logged and skipped; the loop never stops on a sink
    /// error. Missed ticks are skipped rather than bursted. On shutdown a
    /// final stop is sent unless the robot is already stopped.
    pub async fn run<F>(&mut self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        self.send_timeout = self.send_timeout.min(period);

        info!("Deadman publisher running every {:?}", period);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        if self.sink_failing {
                            debug!("Tick dropped: {}", e);
                        } else {
                            warn!("Tick dropped: {}", e);
                            self.sink_failing = true;
                        }
                    }

                    if self.stats.ticks % self.stats_interval_ticks == 0 {
                        self.log_stats();
                    }
                }

                _ = &mut shutdown => {
                    break;
                }
            }
        }

        if self.phase != DeadmanPhase::Idle {
            match self.deliver(&VelocityCommand::ZERO).await {
                Ok(()) => {
                    self.stats.stop_commands += 1;
                    self.phase = DeadmanPhase::Idle;
                    info!("Sent final stop command");
                }
                Err(e) => warn!("Failed to send final stop command: {}", e),
            }
        }

        self.log_stats();
    }

    fn log_stats(&self) {
        info!(
            "Ticks: {} (motion: {}, stop: {}, suppressed: {}, sink failures: {})",
            self.stats.ticks,
            self.stats.motion_commands,
            self.stats.stop_commands,
            self.stats.suppressed_ticks,
            self.stats.sink_failures
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TeleopConfig;
    use crate::error::TeleopError;
    use crate::sink::mocks::RecordingSink;
    use crate::sink::{JsonLineSink, MockCommandSink};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use crate::teleop::state::CommandSnapshot;
    use crate::teleop::{InputTranslator, JoySample};

    fn pressed(linear: f64, angular: f64) -> CommandSnapshot {
        CommandSnapshot {
            command: VelocityCommand::new(linear, angular),
            deadman_pressed: true,
        }
    }

    fn released(linear: f64, angular: f64) -> CommandSnapshot {
        CommandSnapshot {
            command: VelocityCommand::new(linear, angular),
            deadman_pressed: false,
        }
    }

    fn publisher() -> (SharedCommandState, RecordingSink, DeadmanPublisher<RecordingSink>) {
        let state = SharedCommandState::new();
        let sink = RecordingSink::new();
        let publisher = DeadmanPublisher::new(state.clone(), sink.clone());
        (state, sink, publisher)
    }

    #[tokio::test]
    async fn test_first_tick_without_input_sends_one_stop() {
        let (_state, sink, mut publisher) = publisher();
        assert_eq!(publisher.phase(), DeadmanPhase::JustReleased);

        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Stop);
        for _ in 0..10 {
            assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Suppressed);
        }

        assert_eq!(sink.sent(), vec![VelocityCommand::ZERO]);
        assert_eq!(publisher.phase(), DeadmanPhase::Idle);
    }

    #[tokio::test]
    async fn test_scenarios_a_and_b() {
        let (state, sink, mut publisher) = publisher();
        let translator = InputTranslator::new(TeleopConfig {
            axis_linear: 1,
            axis_angular: 0,
            axis_deadman: 4,
            scale_linear: 0.3,
            scale_angular: 0.9,
        });

        translator
            .apply(&JoySample::from_raw_buttons(vec![0.5, 1.0], &[0, 0, 0, 0, 1]), &state)
            .unwrap();
        let outcome = publisher.tick().await.unwrap();
        match outcome {
            TickOutcome::Motion(cmd) => {
                assert!((cmd.linear - 0.3).abs() < 1e-9);
                assert!((cmd.angular - 0.45).abs() < 1e-9);
            }
            other => panic!("Expected motion, got: {:?}", other),
        }

        translator
            .apply(&JoySample::from_raw_buttons(vec![0.5, 1.0], &[0, 0, 0, 0, 0]), &state)
            .unwrap();
        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Stop);
        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Suppressed);
        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Suppressed);

        let sent = sink.sent();
        assert_eq!(sent.len(), 2);
        assert!(!sent[0].is_stop());
        assert!(sent[1].is_stop());
    }

    #[tokio::test]
    async fn test_held_deadman_repeats_last_command_every_tick() {
        let (state, sink, mut publisher) = publisher();
        state.store(pressed(0.2, -0.1));

        for _ in 0..5 {
            assert_eq!(
                publisher.tick().await.unwrap(),
                TickOutcome::Motion(VelocityCommand::new(0.2, -0.1))
            );
        }
        assert_eq!(sink.sent().len(), 5);
        assert_eq!(publisher.phase(), DeadmanPhase::Active);
    }

    #[tokio::test]
    async fn test_exactly_one_stop_per_release() {
        let (state, sink, mut publisher) = publisher();

        for cycle in 0..3 {
            state.store(pressed(0.5, 0.0));
            publisher.tick().await.unwrap();
            publisher.tick().await.unwrap();

            state.store(released(0.5, 0.0));
            for _ in 0..20 {
                publisher.tick().await.unwrap();
            }

            let stops = sink.sent().iter().filter(|c| c.is_stop()).count();
            // Initial state was never ticked released, so each cycle adds one stop
            assert_eq!(stops, cycle + 1);
        }
    }

    #[tokio::test]
    async fn test_resume_rearms_suppression() {
        let (state, sink, mut publisher) = publisher();

        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Stop);
        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Suppressed);

        state.store(pressed(0.4, 0.2));
        assert_eq!(
            publisher.tick().await.unwrap(),
            TickOutcome::Motion(VelocityCommand::new(0.4, 0.2))
        );
        assert_eq!(publisher.phase(), DeadmanPhase::Active);

        state.store(released(0.4, 0.2));
        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Stop);
        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Suppressed);

        let sent = sink.sent();
        assert_eq!(
            sent,
            vec![
                VelocityCommand::ZERO,
                VelocityCommand::new(0.4, 0.2),
                VelocityCommand::ZERO
            ]
        );
    }

    #[tokio::test]
    async fn test_released_velocity_is_never_sent() {
        let (state, sink, mut publisher) = publisher();
        state.store(released(1.0, 1.0));

        for _ in 0..5 {
            publisher.tick().await.unwrap();
        }
        assert_eq!(sink.sent(), vec![VelocityCommand::ZERO]);
    }

    #[tokio::test]
    async fn test_toggle_between_ticks_is_not_seen() {
        let (state, sink, mut publisher) = publisher();
        publisher.tick().await.unwrap();

        state.store(pressed(0.3, 0.0));
        state.store(released(0.3, 0.0));
        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Suppressed);
        assert_eq!(sink.sent(), vec![VelocityCommand::ZERO]);
    }

    #[tokio::test]
    async fn test_failed_stop_is_retried_next_tick() {
        let (state, sink, mut publisher) = publisher();
        state.store(pressed(0.3, 0.0));
        publisher.tick().await.unwrap();

        state.store(released(0.3, 0.0));
        sink.set_failing(true);
        let err = publisher.tick().await.unwrap_err();
        assert!(matches!(err, TeleopError::SinkUnavailable(_)));
        assert_eq!(publisher.phase(), DeadmanPhase::JustReleased);

        sink.set_failing(false);
        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Stop);
        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Suppressed);

        assert_eq!(
            sink.sent(),
            vec![VelocityCommand::new(0.3, 0.0), VelocityCommand::ZERO]
        );
        assert_eq!(publisher.stats().sink_failures, 1);
    }

    #[tokio::test]
    async fn test_failed_motion_still_counts_as_active() {
        let (state, sink, mut publisher) = publisher();
        publisher.tick().await.unwrap();

        state.store(pressed(0.3, 0.0));
        sink.set_failing(true);
        assert!(publisher.tick().await.is_err());
        assert_eq!(publisher.phase(), DeadmanPhase::Active);

        sink.set_failing(false);
        state.store(released(0.3, 0.0));
        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Stop);
    }

    #[tokio::test]
    async fn test_stats_counters() {
        let (state, _sink, mut publisher) = publisher();
        publisher.tick().await.unwrap();
        publisher.tick().await.unwrap();
        state.store(pressed(0.1, 0.1));
        publisher.tick().await.unwrap();
        publisher.tick().await.unwrap();
        publisher.tick().await.unwrap();

        assert_eq!(
            publisher.stats(),
            PublisherStats {
                ticks: 5,
                motion_commands: 3,
                stop_commands: 1,
                suppressed_ticks: 1,
                sink_failures: 0,
            }
        );
    }

    #[tokio::test]
    async fn test_mock_sink_sees_stop_then_motion() {
        let mut mock = MockCommandSink::new();
        let mut seq = mockall::Sequence::new();
        mock.expect_send()
            .withf(|cmd| cmd.is_stop())
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));
        mock.expect_send()
            .withf(|cmd| *cmd == VelocityCommand::new(0.7, -0.7))
            .times(2)
            .in_sequence(&mut seq)
            .returning(|_| Ok(()));

        let state = SharedCommandState::new();
        let mut publisher = DeadmanPublisher::new(state.clone(), mock);
        publisher.tick().await.unwrap();
        publisher.tick().await.unwrap();
        state.store(pressed(0.7, -0.7));
        publisher.tick().await.unwrap();
        publisher.tick().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_at_period_and_stays_quiet_when_released() {
        let (_state, sink, mut publisher) = publisher();

        publisher
            .run(
                Duration::from_millis(100),
                tokio::time::sleep(Duration::from_millis(350)),
            )
            .await;

        assert_eq!(publisher.stats().ticks, 4);
        assert_eq!(sink.sent(), vec![VelocityCommand::ZERO]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_sends_final_stop_when_active() {
        let (state, sink, mut publisher) = publisher();
        state.store(pressed(0.25, 0.5));

        publisher
            .run(
                Duration::from_millis(100),
                tokio::time::sleep(Duration::from_millis(250)),
            )
            .await;

        let sent = sink.sent();
        assert_eq!(publisher.stats().ticks, 3);
        assert_eq!(sent.len(), 4);
        assert!(sent[..3].iter().all(|c| *c == VelocityCommand::new(0.25, 0.5)));
        assert!(sent[3].is_stop());
        assert_eq!(publisher.phase(), DeadmanPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_survives_sink_outage() {
        let (state, sink, mut publisher) = publisher();
        state.store(pressed(0.1, 0.0));
        sink.set_failing(true);

        let recovering = sink.clone();
        let shutdown = async move {
            tokio::time::sleep(Duration::from_millis(250)).await;
            recovering.set_failing(false);
            tokio::time::sleep(Duration::from_millis(200)).await;
        };

        publisher.run(Duration::from_millis(100), shutdown).await;

        // Ticks at 0, 100, 200 fail; 300, 400 succeed; then the final stop
        assert_eq!(publisher.stats().ticks, 5);
        assert_eq!(publisher.stats().sink_failures, 3);
        let sent = sink.sent();
        assert_eq!(sent.len(), 3);
        assert!(sent[2].is_stop());
    }

    /// Sink whose sends hang while `stalled` is set
    #[derive(Clone, Default)]
    struct StallingSink {
        stalled: Arc<AtomicBool>,
        sent: Arc<Mutex<Vec<VelocityCommand>>>,
    }

    #[async_trait::async_trait]
    impl CommandSink for StallingSink {
        async fn send(&mut self, command: &VelocityCommand) -> Result<()> {
            if self.stalled.load(Ordering::SeqCst) {
                std::future::pending::<()>().await;
            }
            self.sent.lock().unwrap().push(*command);
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_timeout_turns_stall_into_failed_tick() {
        let sink = StallingSink::default();
        sink.stalled.store(true, Ordering::SeqCst);
        let mut publisher = DeadmanPublisher::new(SharedCommandState::new(), sink.clone())
            .with_send_timeout(Duration::from_millis(30));

        let err = publisher.tick().await.unwrap_err();
        assert!(matches!(err, TeleopError::SinkUnavailable(_)));
        assert_eq!(publisher.phase(), DeadmanPhase::JustReleased);
        assert_eq!(publisher.stats().sink_failures, 1);

        sink.stalled.store(false, Ordering::SeqCst);
        assert_eq!(publisher.tick().await.unwrap(), TickOutcome::Stop);
        assert_eq!(*sink.sent.lock().unwrap(), vec![VelocityCommand::ZERO]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_keeps_ticking_and_stops_through_undrained_writer() {
        // Reader half is kept alive but never read, so writes block once
        // the 8 byte buffer is full
        let (writer, _reader) = tokio::io::duplex(8);
        let state = SharedCommandState::new();
        let mut publisher = DeadmanPublisher::new(state.clone(), JsonLineSink::new(writer));
        state.store(pressed(0.5, 0.0));

        let releasing = state.clone();
        let shutdown = async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            releasing.release();
            tokio::time::sleep(Duration::from_millis(325)).await;
        };

        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            publisher.run(Duration::from_millis(100), shutdown),
        )
        .await;
        assert!(finished.is_ok(), "run ignored shutdown while the sink was stalled");

        // Ticks at 0 and 100 try motion, 200, 300, 400 try the stop, then
        // the final stop on shutdown; every send times out
        let stats = publisher.stats();
        assert_eq!(stats.ticks, 5);
        assert_eq!(stats.sink_failures, 6);
        assert_eq!(stats.stop_commands, 0);
        assert_eq!(publisher.phase(), DeadmanPhase::JustReleased);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_delivers_stop_once_stall_clears() {
        let sink = StallingSink::default();
        sink.stalled.store(true, Ordering::SeqCst);
        let state = SharedCommandState::new();
        let mut publisher = DeadmanPublisher::new(state.clone(), sink.clone());
        state.store(pressed(0.5, 0.0));

        let releasing = state.clone();
        let stalled = sink.stalled.clone();
        let shutdown = async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            releasing.release();
            tokio::time::sleep(Duration::from_millis(100)).await;
            stalled.store(false, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(225)).await;
        };

        publisher.run(Duration::from_millis(100), shutdown).await;

        // 0 and 100 motion time out, 200 stop times out, 300 stop lands,
        // 400 is suppressed and no final stop is needed
        assert_eq!(*sink.sent.lock().unwrap(), vec![VelocityCommand::ZERO]);
        assert_eq!(publisher.stats().sink_failures, 3);
        assert_eq!(publisher.stats().suppressed_ticks, 1);
        assert_eq!(publisher.phase(), DeadmanPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_final_stop_is_counted() {
        let (state, sink, mut publisher) = publisher();
        state.store(pressed(0.2, 0.0));

        let failing = sink.clone();
        let shutdown = async move {
            tokio::time::sleep(Duration::from_millis(150)).await;
            failing.set_failing(true);
        };

        publisher.run(Duration::from_millis(100), shutdown).await;

        assert_eq!(publisher.stats().sink_failures, 1);
        assert_eq!(publisher.stats().stop_commands, 0);
        assert_eq!(publisher.phase(), DeadmanPhase::Active);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_no_cross_field_mixing_under_concurrent_writes() {
        let (state, sink, mut publisher) = publisher();
        let go = pressed(5.0, 0.0);
        let halt = released(0.0, 5.0);

        let writer_state = state.clone();
        let writer = std::thread::spawn(move || {
            for i in 0..20_000 {
                writer_state.store(if i % 2 == 0 { go } else { halt });
            }
        });

        while !writer.is_finished() {
            let _ = publisher.tick().await;
            tokio::task::yield_now().await;
        }
        writer.join().unwrap();

        for cmd in sink.sent() {
            assert!(
                cmd == VelocityCommand::new(5.0, 0.0) || cmd.is_stop(),
                "velocity {:?} paired with the wrong deadman state",
                cmd
            );
        }
    }
}
