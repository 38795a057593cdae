//! Tracing/logging initialization.
//!
//! Every line goes to stdout (human-readable or JSON) and, unless disabled,
//! is appended without ANSI colours to a durable log file.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::{Error, Result};

/// Default log file, relative to the working directory.
pub const DEFAULT_LOG_FILE: &str = "torshift.log";

/// Build the default `RUST_LOG`-style filter for the given level.
///
/// Covers the `torshift` binary target as well as both library crates.
pub fn default_filter(level: &str) -> String {
    format!("torshift={level},torshift_daemon={level},torshift_core={level}")
}

/// Initialise the global tracing subscriber.
///
/// * `default_filter` -- default `RUST_LOG` value when the env-var is not set
///   (e.g. `"torshift_daemon=info"`).
/// * `log_json` -- when `true`, emit structured JSON lines on stdout instead
///   of the human-readable format.
/// * `log_file` -- append a plain-text copy of every line to this file.
pub fn init_tracing(default_filter: &str, log_json: bool, log_file: Option<&Path>) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into()),
    );

    let file_layer = match log_file {
        Some(path) => Some(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(open_log_file(path)?)),
        ),
        None => None,
    };

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer);
    let result = if log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}

/// Open the log file for appending, creating parent directories as needed.
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}
