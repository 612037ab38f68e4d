//! Logging for the cleanser service and CLI
//!
//! Built on `tracing`. Every event goes to stderr and to a daily-rotated
//! `cleanser.log`. Job lifecycle events (target `cleanser::jobs`: submit,
//! claim, completion, failure, purge) also land in `jobs.log`, which reads as
//! a per-job audit trail without pipeline stage chatter. Warnings and errors
//! are copied to `error.log`.
//!
//! ## Usage
//!
//! ```no_run
//! use cleanser::logging;
//!
//! // Initialize once at startup
//! logging::init(None).expect("Failed to initialize logging");
//!
//! tracing::info!("Service started");
//! ```

use anyhow::{Context as _, Result};
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Targets, fmt, layer::SubscriberExt as _,
    util::SubscriberInitExt as _,
};

const DEFAULT_FILTER: &str = "info";
const RETAINED_FILES: usize = 10;
const JOBS_TARGET: &str = "cleanser::jobs";

/// Gets the log directory path based on platform conventions
///
/// Returns:
/// - Windows: `%APPDATA%/cleanser/logs`
/// - macOS: `~/Library/Application Support/cleanser/logs`
/// - Linux: `~/.local/share/cleanser/logs`
pub fn get_log_dir() -> Result<PathBuf> {
    let base_dir = dirs::data_dir().context("Failed to determine data directory")?;
    Ok(base_dir.join("cleanser").join("logs"))
}

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    }
    Ok(())
}

fn daily_appender(dir: &Path, prefix: &str) -> Result<RollingFileAppender> {
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .max_log_files(RETAINED_FILES)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("Failed to create {prefix}.log appender"))
}

/// Events written to `jobs.log`: the job service and its workers, info and up.
pub fn jobs_filter() -> Targets {
    Targets::new().with_target(JOBS_TARGET, Level::INFO)
}

/// Initializes console and file logging
///
/// Creates three daily-rotated files in `log_dir` (or [`get_log_dir`]):
/// - `cleanser.log`: everything passing the env filter
/// - `jobs.log`: job lifecycle events only
/// - `error.log`: warnings and errors only
///
/// The filter defaults to `info` and can be overridden with `RUST_LOG`.
///
/// # Errors
///
/// Returns error if the log directory cannot be created, an appender fails,
/// or a global subscriber is already installed
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => get_log_dir()?,
    };
    ensure_dir(&log_dir)?;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))
        .context("Failed to create env filter")?;

    // Command output owns stdout
    let console_layer = fmt::layer()
        .with_target(true)
        .with_line_number(true)
        .with_writer(std::io::stderr);

    let all_logs_layer = fmt::layer()
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(daily_appender(&log_dir, "cleanser")?);

    let jobs_layer = fmt::layer()
        .with_target(false)
        .with_ansi(false)
        .with_writer(daily_appender(&log_dir, "jobs")?)
        .with_filter(jobs_filter());

    let error_logs_layer = fmt::layer()
        .with_thread_ids(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false)
        .with_writer(daily_appender(&log_dir, "error")?)
        .with_filter(Targets::new().with_default(Level::WARN));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(all_logs_layer)
        .with(jobs_layer)
        .with(error_logs_layer)
        .try_init()
        .context("Failed to install global subscriber")?;

    tracing::info!("Logging initialized, log directory: {}", log_dir.display());

    Ok(())
}

/// Console-only logging captured by the test harness. Safe to call repeatedly.
pub fn init_test() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
    // A subscriber may already be installed by another test
    let _installed = fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init()
        .is_ok();
}
