//! Telemetry Module - Structured Logging with Tracing
//!
//! - Structured logging with tracing
//! - JSON vs pretty format support
//! - File logging with rotation
//! - RUST_LOG env var support
//! - Sampling and truncation helpers

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Deserialize;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    #[serde(rename = "level", alias = "log_level")]
    pub log_level: String,
    /// Log format: "json" or "pretty"
    #[serde(rename = "format", alias = "log_format")]
    pub log_format: String,
    /// Optional log file path (None = console only)
    #[serde(rename = "file", alias = "log_file")]
    pub log_file: Option<String>,
    /// Rotation interval: "daily", "hourly", "never"
    pub rotation: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            log_format: std::env::var("WHALEBLOX_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string()),
            log_file: std::env::var("WHALEBLOX_LOG_FILE").ok(),
            rotation: "daily".to_string(),
        }
    }
}

/// Initialize tracing subscriber
///
/// - Reads RUST_LOG env var (falls back to `log_level`)
/// - JSON or pretty output
/// - Optional file output with rotation
///
/// The returned guard must be held for the life of the process when logging
/// to a file, otherwise buffered lines are lost on exit.
pub fn init_tracing(
    config: TelemetryConfig,
) -> Result<Option<WorkerGuard>, Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let Some(log_file_path) = config.log_file else {
        if config.log_format == "json" {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_current_span(true).with_span_list(true))
                .try_init()?;
        } else {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().with_target(false).with_thread_ids(false))
                .try_init()?;
        }
        return Ok(None);
    };

    let path = std::path::Path::new(&log_file_path);
    let directory = path
        .parent()
        .ok_or("Invalid log file path: no parent directory")?;
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .ok_or("Invalid log file path: no filename")?;
    let filename_prefix = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(file_name);

    let file_appender = match config.rotation.as_str() {
        "hourly" => rolling::hourly(directory, filename_prefix),
        "never" => rolling::never(directory, file_name),
        _ => rolling::daily(directory, filename_prefix),
    };
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    if config.log_format == "json" {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_writer(non_blocking),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_file(true)
                    .with_line_number(true)
                    .with_ansi(false)
                    .with_writer(non_blocking),
            )
            .try_init()?;
    }

    Ok(Some(guard))
}

/// Truncate hex string for logging
///
/// Example: "0a1b2c3d4e5f67890a1b2c3d4e5f6789" → "0a1b2c3d4e5f6789..."
pub fn truncate_hex(hex: &str, len: usize) -> String {
    match hex.get(..len) {
        Some(prefix) if hex.len() > len => format!("{}...", prefix),
        _ => hex.to_string(),
    }
}

/// Returns true every `interval` calls
pub fn should_log_progress(counter: &AtomicU64, interval: u64) -> bool {
    let count = counter.fetch_add(1, Ordering::Relaxed);
    count % interval == 0
}

/// Sampled progress counter, shareable across loader tasks
pub struct ProgressCounter {
    counter: AtomicU64,
    interval: u64,
}

impl ProgressCounter {
    pub fn new(interval: u64) -> Self {
        Self {
            counter: AtomicU64::new(0),
            interval: interval.max(1),
        }
    }

    pub fn should_log(&self) -> bool {
        should_log_progress(&self.counter, self.interval)
    }

    pub fn get(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}
