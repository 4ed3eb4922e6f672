use anyhow::{Context, Result};
use camino::Utf8PathBuf;
use std::fs;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

/// Options for [`setup_logging_with_console`].
#[derive(Debug, Clone)]
pub struct LoggingOptions {
    /// Directory for log files (e.g., "logs")
    pub log_dir: String,
    /// Prefix for log files (e.g., "autoaccept")
    pub log_prefix: String,
    /// `EnvFilter` directive, e.g. "info" or "debug"
    pub level: String,
    /// Also log to the console with ANSI colors
    pub console_output: bool,
    /// Write the file log as JSON lines
    pub json: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            log_dir: "logs".to_string(),
            log_prefix: "autoaccept".to_string(),
            level: "info".to_string(),
            console_output: false,
            json: false,
        }
    }
}

fn ensure_log_dir(log_dir: &str) -> Result<()> {
    let log_path = Utf8PathBuf::from(log_dir);
    if !log_path.exists() {
        fs::create_dir_all(&log_path)
            .with_context(|| format!("Failed to create log directory: {}", log_dir))?;
    }
    Ok(())
}

/// Build the level filter; `RUST_LOG` wins over the configured level.
fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Setup logging with rotating file appender.
///
/// Logs are written to the specified directory with daily rotation.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging(
    log_dir: &str,
    log_prefix: &str,
    debug_mode: bool,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    setup_logging_with_console(&LoggingOptions {
        log_dir: log_dir.to_string(),
        log_prefix: log_prefix.to_string(),
        level: if debug_mode { "debug" } else { "info" }.to_string(),
        ..LoggingOptions::default()
    })
}

/// Setup logging with optional console output and JSON file format.
///
/// # Returns
/// A guard that must be held for the duration of the program to keep logging active
pub fn setup_logging_with_console(
    options: &LoggingOptions,
) -> Result<tracing_appender::non_blocking::WorkerGuard> {
    ensure_log_dir(&options.log_dir)?;

    // Create daily rotating file appender
    let file_appender = rolling::daily(&options.log_dir, &options.log_prefix);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = if options.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    let console_layer = options.console_output.then(|| {
        tracing_subscriber::fmt::layer()
            .with_ansi(true)
            .with_target(false)
    });

    tracing_subscriber::registry()
        .with(build_filter(&options.level))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .context("Failed to install the global tracing subscriber")?;

    tracing::info!(
        "Logging initialized: dir={}, prefix={}, level={}, console={}, json={}",
        options.log_dir,
        options.log_prefix,
        options.level,
        options.console_output,
        options.json
    );

    Ok(guard)
}
