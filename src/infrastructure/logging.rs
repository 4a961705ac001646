//! Logging system configuration and initialization
//!
//! This module provides the diagnostic logging setup with:
//! - File logging with rotation of the previous run's file
//! - Configuration file based log level control
//! - Structured JSON logging (optional)
//! - Console and file output support
//! - Local-time timestamps
//!
//! The per-run status log of pass progress is a separate plain-text sink,
//! see [`StatusLog`](crate::infrastructure::sinks::StatusLog).

#![allow(clippy::uninlined_format_args)]

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use anyhow::{Result, anyhow};
use chrono::Local;
use lazy_static::lazy_static;
use tracing::{Subscriber, info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    EnvFilter, Registry,
    fmt::{self, time::FormatTime},
    Layer,
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
};

pub use crate::infrastructure::config::LoggingConfig;

/// Name of the active diagnostic log file
pub const LOG_FILE_NAME: &str = "profile-census.log";

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Local-time formatter shared by every layer
struct LocalTimeFormatter;

impl FormatTime for LocalTimeFormatter {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%d %H:%M:%S%.3f"))
    }
}

/// Human-readable stdout layer, or nothing when console output is off
fn console_layer<S>(enabled: bool) -> Option<impl Layer<S>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    enabled.then(|| {
        fmt::Layer::new()
            .with_writer(std::io::stdout)
            .with_timer(LocalTimeFormatter)
            .with_target(false)
    })
}

/// Get the log directory relative to the executable location
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

fn resolve_log_directory(config: &LoggingConfig) -> PathBuf {
    config.directory.clone().unwrap_or_else(get_log_directory)
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Rotate existing log file by renaming it with its timestamp
fn rotate_existing_log_file(log_dir: &Path, log_file_name: &str) -> Result<Option<PathBuf>> {
    let log_file_path = log_dir.join(log_file_name);
    if !log_file_path.exists() {
        return Ok(None);
    }

    let metadata = std::fs::metadata(&log_file_path).map_err(|e| anyhow!("Failed to get log file metadata: {}", e))?;
    let file_time = metadata
        .modified()
        .or_else(|_| metadata.created())
        .unwrap_or_else(|_| std::time::SystemTime::now());
    let datetime: chrono::DateTime<Local> = file_time.into();

    let file_stem = log_file_name.trim_end_matches(".log");
    let timestamped_name = format!("{}.{}.log", file_stem, datetime.format("%Y%m%dT%H%M%S"));
    let timestamped_path = log_dir.join(&timestamped_name);

    std::fs::rename(&log_file_path, &timestamped_path).map_err(|e| {
        anyhow!(
            "Failed to rotate log file {} to {}: {}",
            log_file_path.display(),
            timestamped_path.display(),
            e
        )
    })?;

    Ok(Some(timestamped_path))
}

/// Builds the level filter: `RUST_LOG` wins, else the configured level with
/// per-module overrides
pub fn build_env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut filter = EnvFilter::try_new(&config.level).map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;

    // Dependency chatter is capped unless TRACE is requested
    if !config.level.to_lowercase().contains("trace") {
        let mut modules: Vec<_> = config.module_filters.iter().collect();
        modules.sort();
        for (module, level) in modules {
            let directive = format!("{}={}", module, level)
                .parse()
                .map_err(|e| anyhow!("Invalid module filter '{}={}': {}", module, level, e))?;
            filter = filter.add_directive(directive);
        }
    }

    let own = format!("profile_census_lib={}", config.level)
        .parse()
        .map_err(|e| anyhow!("Invalid log level '{}': {}", config.level, e))?;
    Ok(filter.add_directive(own))
}

/// Initialize logging with custom configuration
///
/// # Environment Variable Override
/// ```bash
/// # Show request-level HTTP logs
/// RUST_LOG="debug,reqwest=debug,hyper=debug" profile-census
/// ```
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let log_dir = resolve_log_directory(config);
    let env_filter = build_env_filter(config)?;
    let registry = Registry::default().with(env_filter);

    let mut rotated = None;
    let file_writer = if config.file_output {
        std::fs::create_dir_all(&log_dir).map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;
        rotated = rotate_existing_log_file(&log_dir, LOG_FILE_NAME)?;

        let file_appender = rolling::never(&log_dir, LOG_FILE_NAME);
        let (file_writer, file_guard) = non_blocking(file_appender);

        // Store the guard globally to prevent it from being dropped
        LOG_GUARDS
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(file_guard);
        Some(file_writer)
    } else {
        None
    };

    match (file_writer, config.json_format) {
        (Some(file_writer), true) => {
            let file_layer = fmt::Layer::new()
                .json()
                .with_writer(file_writer)
                .with_timer(LocalTimeFormatter)
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .with_ansi(false);
            registry
                .with(file_layer)
                .with(console_layer(config.console_output))
                .try_init()
                .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;
        }
        (Some(file_writer), false) => {
            // File layer with minimal formatting (time + level + message only)
            let file_layer = fmt::Layer::new()
                .with_writer(file_writer)
                .with_timer(LocalTimeFormatter)
                .with_target(false)
                .with_thread_ids(false)
                .with_file(false)
                .with_line_number(false)
                .with_ansi(false);
            registry
                .with(file_layer)
                .with(console_layer(config.console_output))
                .try_init()
                .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;
        }
        (None, _) => {
            if !config.console_output {
                return Err(anyhow!("No logging output configured"));
            }
            registry
                .with(console_layer(config.console_output))
                .try_init()
                .map_err(|e| anyhow!("Failed to install subscriber: {}", e))?;
        }
    }

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
        if let Some(rotated) = rotated {
            info!("Rotated previous log file to: {:?}", rotated);
        }
        if config.auto_cleanup_logs {
            let removed = cleanup_old_logs(&log_dir, config.max_files)?;
            if removed > 0 {
                info!("🧹 Removed {} old log files (keeping {})", removed, config.max_files);
            }
        }
    }

    Ok(())
}

/// Log system information for diagnostics
pub fn log_system_info() {
    info!("=== Profile Census System Information ===");
    info!("Application version: {}", env!("CARGO_PKG_VERSION"));
    info!("Operating system: {}", std::env::consts::OS);
    info!("Architecture: {}", std::env::consts::ARCH);

    if let Ok(current_dir) = std::env::current_dir() {
        info!("Working directory: {:?}", current_dir);
    }
    info!("==========================================");
}

/// Keeps the newest `max_files` `.log` files; returns how many were removed
fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path.extension().is_some_and(|ext| ext == "log");
        if path.is_file() && is_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    let mut removed = 0;
    for (path, _) in log_files.iter().skip(max_files as usize) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove old log file {:?}: {}", path, e);
        } else {
            removed += 1;
        }
    }
    Ok(removed)
}
