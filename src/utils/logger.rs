//! Logging configuration for the simulator
//!
//! A population of thousands of device actors produces per-request chatter
//! that would drown the operator at the default level; device and pool
//! internals are filtered to warnings unless the run is explicitly verbose.
//! Their lifecycle still reaches the log through the simulator event
//! stream, which `main` reports at the top level.

use std::path::Path;

use tracing::{info, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::{Error, Result};

/// Modules whose per-request logging is capped at warn when
/// `quiet_device_logs` is on.
const CHATTY_MODULES: [&str; 2] = ["device", "pool"];

/// Install the global subscriber.
///
/// The returned guard owns the non-blocking file writer; it must stay
/// alive for the life of the process or buffered lines are lost on exit.
pub fn setup_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry().with(build_filter(config)?);

    let mut file_guard = None;
    let file_layer = match &config.file {
        Some(file_path) => {
            let directory = Path::new(file_path)
                .parent()
                .ok_or_else(|| Error::invalid_config("logging.file", "path has no directory"))?;

            let file_appender = rolling::RollingFileAppender::builder()
                .rotation(rolling::Rotation::DAILY)
                .filename_prefix("snmp-swarm")
                .filename_suffix("log")
                .build(directory)
                .map_err(|e| Error::internal(format!("Failed to create file appender: {e}")))?;

            let (file_writer, guard) = non_blocking(file_appender);
            file_guard = Some(guard);
            Some(match config.format {
                LogFormat::Json => fmt::layer().json().with_writer(file_writer).boxed(),
                LogFormat::Compact => fmt::layer().compact().with_writer(file_writer).boxed(),
                LogFormat::Full => fmt::layer().with_writer(file_writer).boxed(),
            })
        }
        None => None,
    };

    let console_layer = match config.format {
        LogFormat::Json => fmt::layer().json().boxed(),
        LogFormat::Compact => fmt::layer().compact().boxed(),
        LogFormat::Full => fmt::layer().boxed(),
    };

    registry.with(file_layer).with(console_layer).init();

    info!(
        level = %config.level,
        to_file = config.file.is_some(),
        quiet_devices = config.quiet_device_logs,
        "logging initialized"
    );
    Ok(file_guard)
}

/// Build the filter for the configured level, honoring `RUST_LOG`
/// overrides on top.
fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let level = parse_log_level(&config.level)?;
    let mut filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    // Debug and trace runs want the raw device chatter; quieter levels
    // get lifecycle events via the simulator event stream instead.
    if config.quiet_device_logs && level <= Level::INFO {
        for module in CHATTY_MODULES {
            let directive: Directive = format!("snmp_swarm::{module}=warn")
                .parse()
                .map_err(|e| Error::internal(format!("bad log directive: {e}")))?;
            filter = filter.add_directive(directive);
        }
    }
    Ok(filter)
}

fn parse_log_level(level: &str) -> Result<Level> {
    level.parse().map_err(|_| {
        Error::invalid_config("logging.level", format!("unknown level {level:?}"))
    })
}
