//! Log output for applications embedding rooms
//!
//! Rooms only emit `tracing` events; installing a subscriber is left to the
//! application. `init_logging` is the stock setup: room and channel crates
//! at the configured level, everything else at `warn`, written as JSON or
//! pretty text to stdout or an append-only file. `RUST_LOG` overrides the
//! filter when set.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, writer::BoxMakeWriter},
    layer::{Layered, SubscriberExt},
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::LoggingConfig;

type FilteredRegistry = Layered<EnvFilter, Registry>;

/// Install the global subscriber described by `config`
///
/// Fails if the level is not recognised, the log file cannot be opened or
/// a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let level = parse_log_level(&config.level)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(room_directives(level)));
    let writer = log_writer(config.file_path.as_deref())?;
    let ansi = config.file_path.is_none();

    tracing_subscriber::registry()
        .with(filter)
        .with(format_layer(&config.format, writer, ansi))
        .try_init()?;
    Ok(())
}

/// Filter directives enabling `level` for the roomlink crates only
#[must_use]
pub fn room_directives(level: Level) -> String {
    let level = level.as_str().to_lowercase();
    format!("warn,roomlink_room={level},roomlink_channel={level}")
}

fn log_writer(file_path: Option<&str>) -> anyhow::Result<BoxMakeWriter> {
    let Some(file_path) = file_path else {
        return Ok(BoxMakeWriter::new(std::io::stdout));
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(Path::new(file_path))?;
    Ok(BoxMakeWriter::new(Arc::new(file)))
}

fn format_layer(
    format: &str,
    writer: BoxMakeWriter,
    ansi: bool,
) -> Box<dyn Layer<FilteredRegistry> + Send + Sync> {
    let layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(ansi)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_line_number(true);

    if format == "json" {
        layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_file(true)
            .boxed()
    } else {
        layer.pretty().with_file(false).boxed()
    }
}

fn parse_log_level(level: &str) -> anyhow::Result<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => Err(anyhow::anyhow!("Invalid log level: {level}")),
    }
}
