//! # Joy Teleop
//!
//! Drive a mobile robot from a joystick with a deadman-switch interlock.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (first argument, else `config/default.toml`, else defaults)
//!    - Set up logging with tracing subscriber
//!    - Open the joystick and check the axis/button mapping against it
//!    - Open the command sink (serial or UDP)
//!
//! 2. **Main Loop**
//!    - Input task: joystick samples -> shared command state
//!    - Publisher: every tick, send the command while the deadman is held,
//!      one stop when it is released, nothing while it stays released
//!    - Handle Ctrl+C for graceful shutdown
//!
//! 3. **Graceful Shutdown**
//!    - Send a final stop if the robot may still be moving
//!    - Log totals and exit
//!
//! # Examples
//!
//! ```bash
//! cargo run --release -- config/default.toml
//! ```
//!
//! Expected output:
//! ```text
//! INFO joy_teleop: Joy Teleop v0.1.0 starting...
//! INFO joy_teleop::controller::joystick: Opened joystick 'Wireless Controller' at /dev/input/event5 (8 axes, 13 buttons)
//! INFO joy_teleop::sink::serial: Opened command serial port /dev/ttyACM0 at 115200 baud
//! INFO joy_teleop::teleop::deadman: Deadman publisher running every 100ms
//! ```

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use joy_teleop::config::{Config, SinkKind};
use joy_teleop::controller::{self, Joystick};
use joy_teleop::sink::{CommandSink, SerialCommandSink, UdpCommandSink};
use joy_teleop::teleop::{DeadmanPublisher, InputTranslator, SharedCommandState};

/// Configuration file used when no path is given on the command line
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// File name prefix for rolling log files
const LOG_FILE_PREFIX: &str = "joy-teleop.log";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = config_path(std::env::args().nth(1), Path::new(DEFAULT_CONFIG_PATH).exists());
    let config = match &config_path {
        Some(path) => Config::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    let _log_guard = init_logging(&config);

    info!("Joy Teleop v{} starting...", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration loaded from {}", path.display()),
        None => info!("No configuration file, using built-in defaults"),
    }

    let translator = Arc::new(InputTranslator::new(config.teleop));
    let state = SharedCommandState::new();

    let joystick = Joystick::open(config.controller.device_path(), config.controller.invert_axes)
        .context("Failed to open joystick")?;
    controller::input::check_mapping(&joystick, &translator)?;

    let sink = open_sink(&config).await?;

    let input_task = tokio::spawn(controller::run_input(
        joystick,
        config.controller.clone(),
        Arc::clone(&translator),
        state.clone(),
    ));

    info!(
        "Hold button {} to drive (linear axis {} x {}, angular axis {} x {})",
        config.teleop.axis_deadman,
        config.teleop.axis_linear,
        config.teleop.scale_linear,
        config.teleop.axis_angular,
        config.teleop.scale_angular
    );
    info!("Press Ctrl+C to exit");

    let mut publisher = DeadmanPublisher::new(state, sink)
        .with_stats_interval(config.publisher.stats_interval_ticks)
        .with_send_timeout(config.publisher.send_timeout());
    publisher.run(config.publisher.period(), shutdown_signal()).await;

    input_task.abort();
    info!(
        "Shut down ({} joystick samples rejected)",
        translator.rejected_samples()
    );

    Ok(())
}

/// Pick the configuration file: explicit argument first, then the default path if present
fn config_path(arg: Option<String>, default_exists: bool) -> Option<PathBuf> {
    match arg {
        Some(path) => Some(PathBuf::from(path)),
        None if default_exists => Some(PathBuf::from(DEFAULT_CONFIG_PATH)),
        None => None,
    }
}

/// `RUST_LOG` directives when set and valid, `info` otherwise
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Install the tracing subscriber; the guard must live until exit when logging to file
fn init_logging(config: &Config) -> Option<WorkerGuard> {
    let filter = log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref());

    if config.logging.directory.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.logging.directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Some(guard)
}

async fn open_sink(config: &Config) -> Result<Box<dyn CommandSink>> {
    let sink: Box<dyn CommandSink> = match config.sink.kind {
        SinkKind::Serial => Box::new(
            SerialCommandSink::open_serial(&config.sink.serial_port, config.sink.baud_rate)
                .context("Failed to open serial command sink")?,
        ),
        SinkKind::Udp => Box::new(
            UdpCommandSink::bind(config.sink.udp_target_addr()?)
                .await
                .context("Failed to open UDP command sink")?,
        ),
    };
    Ok(sink)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down..."),
        Err(e) => {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
