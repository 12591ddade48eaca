use std::fs::{self, OpenOptions};
use std::io::{self, IsTerminal};
use std::sync::Mutex;

use anyhow::{Context, Result};
use rdpl_core::ServiceConfig;
use tracing::warn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

pub(crate) fn default_log_filter(config: &ServiceConfig) -> &'static str {
    if config.is_development() {
        "debug"
    } else {
        "info"
    }
}

/// Installs the global subscriber: the log file always, stderr in development only.
///
/// `RUST_LOG` overrides the environment's default level. A log file that cannot be
/// opened is reported and skipped rather than failing the command.
pub(crate) fn init_logging(config: &ServiceConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_log_filter(config)));

    let (file_layer, file_error) = match open_log_file(config) {
        Ok(file) => (
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(false)
                    .with_writer(Mutex::new(file)),
            ),
            None,
        ),
        Err(err) => (None, Some(err)),
    };
    let stderr_layer = (config.is_development() || file_layer.is_none()).then(|| {
        fmt::layer()
            .with_writer(io::stderr)
            .with_ansi(io::stderr().is_terminal())
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .try_init()
        .context("failed to initialise logging")?;

    if let Some(err) = file_error {
        warn!(
            path = %config.log_path.display(),
            error = %format!("{err:#}"),
            "log file unavailable, logging to stderr only"
        );
    }
    Ok(())
}

fn open_log_file(config: &ServiceConfig) -> Result<fs::File> {
    if let Some(parent) = config
        .log_path
        .parent()
        .filter(|parent| !parent.as_os_str().is_empty())
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&config.log_path)
        .with_context(|| format!("failed to open log file {}", config.log_path.display()))
}
