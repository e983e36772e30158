//! Process-wide tracing setup
//!
//! File output goes through a non-blocking rolling appender. Text mode also
//! mirrors to stdout; JSON mode writes the file only so log shippers get one
//! record per line.

use anyhow::{Context, bail};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::AppConfig;

fn parse_rotation(rotation: &str) -> anyhow::Result<Rotation> {
    Ok(match rotation.trim().to_ascii_lowercase().as_str() {
        "never" => Rotation::NEVER,
        "hourly" => Rotation::HOURLY,
        "daily" => Rotation::DAILY,
        other => bail!("unknown log rotation '{}' (never | hourly | daily)", other),
    })
}

/// Default filter when `RUST_LOG` is unset. sqlx logs every statement at info.
fn default_directives(level: &str) -> String {
    format!("{level},sqlx=warn")
}

/// Install the global subscriber. Keep the returned guard alive for the
/// lifetime of the process or buffered file output is lost.
pub fn init_logging(config: &AppConfig) -> anyhow::Result<WorkerGuard> {
    let appender = RollingFileAppender::builder()
        .rotation(parse_rotation(&config.rotation)?)
        .filename_prefix(&config.log_file)
        .build(&config.log_dir)
        .with_context(|| format!("Failed to open log directory {}", config.log_dir))?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));
    let registry = tracing_subscriber::registry().with(filter);

    if config.use_json {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_writer(writer)
                    .with_ansi(false),
            )
            .try_init()
            .context("Global subscriber already installed")?;
    } else {
        registry
            .with(fmt::layer().with_target(false).with_writer(writer).with_ansi(false))
            .with(fmt::layer().with_target(false))
            .try_init()
            .context("Global subscriber already installed")?;
    }

    Ok(guard)
}
