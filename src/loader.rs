//! Export Loader - bitcoin-etl newline-delimited JSON
//!
//! **Layout:**
//! ```text
//! export_dir/
//! └── <batch>/
//!     ├── transactions/date=YYYY-MM-DD/transactions_*.json
//!     └── blocks/date=YYYY-MM-DD/blocks_*.json
//! ```
//!
//! **Architecture:**
//! - Discovery walks the batch folders synchronously (hidden entries skipped)
//! - Files are parsed on the blocking pool, gated by a semaphore
//! - Results are merged in sorted file order, so loads are deterministic
//!
//! Each line binds to a typed record once, here. Lines that fail binding or
//! `validate` are fatal in strict mode and skipped (with a warning) otherwise.

use std::fs;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::config::LoaderConfig;
use crate::constants::{is_hidden_entry, BLOCKS_DIR, PROGRESS_LOG_INTERVAL, TRANSACTIONS_DIR};
use crate::error::{EtlError, Result};
use crate::metrics;
use crate::telemetry::ProgressCounter;
use crate::types::{Block, Transaction};

/// A record type read from an export folder
pub trait ExportRecord: DeserializeOwned + Send + 'static {
    /// Sub-folder inside each batch, also used as the metrics label
    const DATASET: &'static str;

    fn validate(&self) -> std::result::Result<(), String>;
}

impl ExportRecord for Transaction {
    const DATASET: &'static str = TRANSACTIONS_DIR;

    fn validate(&self) -> std::result::Result<(), String> {
        Transaction::validate(self)
    }
}

impl ExportRecord for Block {
    const DATASET: &'static str = BLOCKS_DIR;

    fn validate(&self) -> std::result::Result<(), String> {
        Block::validate(self)
    }
}

fn visible_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        if is_hidden_entry(&name.to_string_lossy()) {
            continue;
        }
        entries.push(entry.path());
    }
    entries.sort();
    Ok(entries)
}

/// Batch folders directly under `base`
pub fn discover_batches(base: &Path) -> Result<Vec<PathBuf>> {
    if !base.is_dir() {
        return Err(EtlError::MissingInputData(format!(
            "export directory {} does not exist",
            base.display()
        )));
    }

    let batches: Vec<PathBuf> = visible_entries(base)?
        .into_iter()
        .filter(|p| p.is_dir())
        .collect();

    if batches.is_empty() {
        return Err(EtlError::MissingInputData(format!(
            "no batch folders found in {}",
            base.display()
        )));
    }
    Ok(batches)
}

/// `<batch>/<dataset>` folders that exist
pub fn dataset_dirs(batches: &[PathBuf], dataset: &str) -> Vec<PathBuf> {
    batches
        .iter()
        .map(|batch| batch.join(dataset))
        .filter(|dir| dir.is_dir())
        .collect()
}

/// All `*.json` files below `dir`, sorted
pub fn collect_json_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        for path in visible_entries(&current)? {
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().map_or(false, |ext| ext == "json") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

/// Parse one newline-delimited JSON file.
///
/// Returns the bound records and the number of skipped lines.
pub fn parse_file<T: ExportRecord>(
    path: &Path,
    strict: bool,
    progress: &ProgressCounter,
) -> Result<(Vec<T>, usize)> {
    let reader = BufReader::new(File::open(path)?);
    let mut records = Vec::new();
    let mut rejected = 0;

    for (line_index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let bound = serde_json::from_str::<T>(&line)
            .map_err(|e| e.to_string())
            .and_then(|record| record.validate().map(|_| record));

        match bound {
            Ok(record) => {
                records.push(record);
                if progress.should_log() {
                    info!(dataset = T::DATASET, records = progress.get(), "Loading progress");
                }
            }
            Err(reason) if strict => {
                return Err(EtlError::InvalidRecord {
                    path: path.to_path_buf(),
                    line: line_index + 1,
                    reason,
                });
            }
            Err(reason) => {
                warn!(
                    dataset = T::DATASET,
                    file = %path.display(),
                    line = line_index + 1,
                    reason = %reason,
                    "Skipping malformed record"
                );
                rejected += 1;
            }
        }
    }

    Ok((records, rejected))
}

/// Parse many files concurrently, merging results in input order
pub async fn load_files<T: ExportRecord>(files: Vec<PathBuf>, config: LoaderConfig) -> Result<Vec<T>> {
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));
    let progress = Arc::new(ProgressCounter::new(PROGRESS_LOG_INTERVAL));
    let total_files = files.len();

    let tasks: Vec<_> = files
        .into_iter()
        .map(|path| {
            let sem = semaphore.clone();
            let progress = progress.clone();
            let strict = config.strict;

            async move {
                let _permit = sem.acquire().await?;
                debug!(dataset = T::DATASET, file = %path.display(), "Reading export file");
                let parsed = tokio::task::spawn_blocking(move || parse_file::<T>(&path, strict, &progress)).await??;
                Ok::<_, EtlError>(parsed)
            }
        })
        .collect();

    let mut records = Vec::new();
    let mut rejected_total = 0;
    for result in futures::future::join_all(tasks).await {
        let (file_records, rejected) = result?;
        records.extend(file_records);
        rejected_total += rejected;
    }

    metrics::increment_records_loaded(T::DATASET, records.len() as u64);
    metrics::increment_records_rejected(T::DATASET, rejected_total as u64);
    info!(
        dataset = T::DATASET,
        files = total_files,
        records = records.len(),
        rejected = rejected_total,
        "Dataset loaded"
    );

    Ok(records)
}

async fn load_dataset<T: ExportRecord>(base: &Path, config: LoaderConfig) -> Result<Vec<T>> {
    let batches = discover_batches(base)?;
    let dirs = dataset_dirs(&batches, T::DATASET);
    if dirs.is_empty() {
        return Err(EtlError::MissingInputData(format!(
            "no {}/ folders found under {}",
            T::DATASET,
            base.display()
        )));
    }

    let mut files = Vec::new();
    for dir in &dirs {
        files.extend(collect_json_files(dir)?);
    }
    debug!(dataset = T::DATASET, batches = batches.len(), files = files.len(), "Discovered export files");

    load_files::<T>(files, config).await
}

/// Load every transaction record of an export
pub async fn load_transactions(base: &Path, config: LoaderConfig) -> Result<Vec<Transaction>> {
    load_dataset::<Transaction>(base, config).await
}

/// Load every block record of an export
pub async fn load_blocks(base: &Path, config: LoaderConfig) -> Result<Vec<Block>> {
    load_dataset::<Block>(base, config).await
}
