//! Diagnostic logging
//!
//! Everything goes to stderr so that stdout stays machine-readable for
//! `--json`. An optional file sink mirrors the stream without colours.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Filter used when no level is given and `RUST_LOG` is unset or malformed.
pub const DEFAULT_FILTER: &str = "info,srvwarden=debug";

/// Level the CLI applies when neither `--log-level` nor `RUST_LOG` is given.
pub const CLI_DEFAULT_LEVEL: &str = "warn";

/// Level the CLI hands to [`init_logger`]: an explicit flag wins, a set
/// `RUST_LOG` is left to [`build_filter`], otherwise [`CLI_DEFAULT_LEVEL`].
pub fn effective_level(explicit: Option<&str>, rust_log_set: bool) -> Option<&str> {
    match explicit {
        Some(level) => Some(level),
        None if rust_log_set => None,
        None => Some(CLI_DEFAULT_LEVEL),
    }
}

/// [`effective_level`] against the current process environment.
pub fn cli_level(explicit: Option<&str>) -> Option<&str> {
    effective_level(explicit, std::env::var_os(EnvFilter::DEFAULT_ENV).is_some())
}

/// Build the filter: explicit level first, then `RUST_LOG`, then the default.
pub fn build_filter(log_level: Option<&str>) -> Result<EnvFilter> {
    let filter = match log_level {
        Some(level) => EnvFilter::try_new(level)?,
        None => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    };
    Ok(filter)
}

/// Install the global subscriber.
///
/// # Examples
/// ```no_run
/// use srvwarden::utils::logger::init_logger;
///
/// init_logger(Some("debug"), None).unwrap();
/// ```
pub fn init_logger(log_level: Option<&str>, log_file: Option<PathBuf>) -> Result<()> {
    let env_filter = build_filter(log_level)?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .with_ansi(true)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(std::sync::Arc::new(file))
            .with_target(true)
            .with_ansi(false)
            .with_level(true);

        registry.with(file_layer).try_init()?;
    } else {
        registry.try_init()?;
    }

    tracing::debug!("logger initialized");
    Ok(())
}
