//! Logging setup
//!
//! One subscriber per process: a console layer (text or JSON) plus an
//! optional plain-text file sink, both behind an `EnvFilter` built from
//! `RUST_LOG` or the configured level.

use std::fs::OpenOptions;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{Error, Result};

/// Install the global subscriber
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console = match config.format {
        LogFormat::Text => fmt::layer().with_target(false).boxed(),
        LogFormat::Json => fmt::layer().json().with_current_span(false).boxed(),
    };

    let file = match &config.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(Mutex::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .try_init()
        .map_err(|_| Error::LoggingInitialized)
}

/// Marker line at the start of a scenario
pub fn log_scenario_start(name: &str, test_id: &str, tags: &[String]) {
    info!("START TEST: {}", name);
    info!(test_id = %test_id, tags = ?tags, "Starting scenario");
}

/// Marker line at the end of a scenario
pub fn log_scenario_end(name: &str, status: &str, duration: Duration) {
    info!(
        "END TEST: {} - Status: {} - Duration: {}ms",
        name,
        status,
        duration.as_millis()
    );
}
