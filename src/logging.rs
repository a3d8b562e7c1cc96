//! Tracing setup for docstore.
//!
//! The configured level is the default filter. A non-empty `RUST_LOG`
//! replaces it entirely, so `RUST_LOG=docstore=trace` works as expected.

use std::env;
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::Result;

const FALLBACK_DIRECTIVE: &str = "info";

/// Build the filter from the configured level and an optional `RUST_LOG`.
///
/// Unparseable values fall through to the next source: env, then config,
/// then `info`.
fn build_filter(configured: &str, rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .map(str::trim)
        .filter(|directives| !directives.is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_new(configured.trim().to_lowercase()).ok())
        .unwrap_or_else(|| EnvFilter::new(FALLBACK_DIRECTIVE))
}

fn filter_from_env(configured: &str) -> EnvFilter {
    let rust_log = env::var(EnvFilter::DEFAULT_ENV).ok();
    build_filter(configured, rust_log.as_deref())
}

/// Install the global subscriber, writing to stdout and appending to the
/// configured log file.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let path = Path::new(&config.file);
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let log_file = OpenOptions::new().create(true).append(true).open(path)?;

    tracing_subscriber::registry()
        .with(filter_from_env(&config.level))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout.and(Arc::new(log_file)))
                .with_ansi(false)
                .with_thread_ids(true),
        )
        .init();

    Ok(())
}

/// Install a stdout-only subscriber. Used when the log file cannot be opened.
pub fn init_console_only(level: &str) {
    tracing_subscriber::registry()
        .with(filter_from_env(level))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stdout))
        .init();
}
