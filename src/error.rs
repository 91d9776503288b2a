//! Error taxonomy for the pipeline.
//!
//! The core transforms never fail. Errors come from the boundary (loading,
//! configuration, writing) and from the opt-in strict completeness check.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EtlError {
    /// No qualifying record sources were found
    #[error("Missing input data: {0}")]
    MissingInputData(String),

    /// Strict completeness mode saw signs of a partial transaction history
    #[error(
        "Incomplete transaction history: {dangling_spends} spent references have no output row, lowest output block {lowest_block:?}"
    )]
    IncompleteHistory {
        dangling_spends: usize,
        lowest_block: Option<i64>,
    },

    /// A record failed schema binding or boundary validation
    #[error("Invalid record at {}:{line}: {reason}", path.display())]
    InvalidRecord {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Loader shut down: {0}")]
    Shutdown(#[from] tokio::sync::AcquireError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

pub type Result<T> = std::result::Result<T, EtlError>;
