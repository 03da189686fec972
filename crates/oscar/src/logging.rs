use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{get_log_dir, LoggingConfig};

const DEFAULT_FILTER: &str = "oscar=info,oscar_core=info";
const VERBOSE_FILTER: &str = "oscar=debug,oscar_core=debug";

/// Initialize logging for the oscar server
///
/// Logs always go to stderr. Unless disabled in the config, they are also
/// written to a daily-rotated `oscar.log` in the configured directory or,
/// by default:
/// - XDG_DATA_HOME/oscar/logs/ on Unix (typically ~/.local/share/oscar/logs/)
/// - ~/Library/Application Support/oscar/logs/ on macOS
/// - {FOLDERID_LocalAppData}/oscar/logs/ on Windows
///
/// RUST_LOG overrides the level, e.g. `RUST_LOG=oscar_core=debug oscar serve`.
/// `verbose` raises the default to debug when RUST_LOG is unset.
pub fn init(config: &LoggingConfig, verbose: bool) -> Result<()> {
    let default_filter = if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let log_dir = if config.file {
        Some(resolve_log_dir(config)?)
    } else {
        None
    };

    let file_layer = match &log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let file_appender = tracing_appender::rolling::daily(dir, "oscar.log");
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(file_appender)
                    .with_ansi(false) // No ANSI colors in log files
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true)
                .with_target(false)
                .compact(),
        )
        .try_init()
        .context("Failed to initialize tracing subscriber")?;

    match &log_dir {
        Some(dir) => tracing::info!("Logging initialized to {}", dir.display()),
        None => tracing::info!("Logging initialized (stderr only)"),
    }

    Ok(())
}

fn resolve_log_dir(config: &LoggingConfig) -> Result<PathBuf> {
    match &config.directory {
        Some(dir) => Ok(dir.clone()),
        None => get_log_dir(),
    }
}
