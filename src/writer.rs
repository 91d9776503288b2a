//! Output files for the derived datasets.
//!
//! Row datasets are newline-delimited JSON, one object per line, matching the
//! layout of the exports they are derived from.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use crate::constants::{CLUSTERING_INPUTS_FILE, METRICS_FILE, SUMMARY_FILE, UTXO_SET_FILE};
use crate::error::Result;
use crate::summary::DataSummary;
use crate::types::{ClusteringInput, FlatOutput};

/// A UTXO row as written to disk
#[derive(Debug, Serialize)]
pub struct UtxoRow<'a> {
    pub transaction_hash: &'a str,
    pub block_number: Option<i64>,
    pub block_timestamp: Option<i64>,
    pub output_index: Option<i32>,
    pub value: Option<i64>,
    pub addresses: Option<&'a [String]>,
    #[serde(rename = "type")]
    pub output_type: Option<&'a str>,
}

impl<'a> From<&'a FlatOutput> for UtxoRow<'a> {
    fn from(row: &'a FlatOutput) -> Self {
        Self {
            transaction_hash: &row.transaction_hash,
            block_number: row.block_number,
            block_timestamp: row.block_timestamp,
            output_index: row.output.as_ref().map(|o| o.index),
            value: row.value(),
            addresses: row.addresses(),
            output_type: row.output.as_ref().and_then(|o| o.output_type.as_deref()),
        }
    }
}

fn create_in(dir: &Path, name: &str) -> Result<(PathBuf, BufWriter<File>)> {
    fs::create_dir_all(dir)?;
    let path = dir.join(name);
    let file = File::create(&path)?;
    Ok((path, BufWriter::new(file)))
}

fn write_lines<T, I>(dir: &Path, name: &str, rows: I) -> Result<PathBuf>
where
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    let (path, mut out) = create_in(dir, name)?;
    let mut count = 0usize;
    for row in rows {
        serde_json::to_writer(&mut out, &row)?;
        out.write_all(b"\n")?;
        count += 1;
    }
    out.flush()?;

    info!(file = %path.display(), rows = count, "Wrote dataset");
    Ok(path)
}

pub fn write_utxo_set(dir: &Path, utxos: &[FlatOutput]) -> Result<PathBuf> {
    write_lines(dir, UTXO_SET_FILE, utxos.iter().map(UtxoRow::from))
}

pub fn write_clustering_inputs(dir: &Path, rows: &[ClusteringInput]) -> Result<PathBuf> {
    write_lines(dir, CLUSTERING_INPUTS_FILE, rows)
}

/// Pretty-printed JSON document
pub fn write_summary(dir: &Path, summary: &DataSummary) -> Result<PathBuf> {
    let (path, mut out) = create_in(dir, SUMMARY_FILE)?;
    serde_json::to_writer_pretty(&mut out, summary)?;
    out.write_all(b"\n")?;
    out.flush()?;
    Ok(path)
}

/// Prometheus text exposition of the process registry
pub fn write_metrics(dir: &Path, exposition: &str) -> Result<PathBuf> {
    let (path, mut out) = create_in(dir, METRICS_FILE)?;
    out.write_all(exposition.as_bytes())?;
    out.flush()?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explode::explode_outputs;
    use crate::explode::test_support::*;
    use tempfile::TempDir;

    fn read_json_lines(path: &Path) -> Vec<serde_json::Value> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn test_write_utxo_set() {
        let dir = TempDir::new().unwrap();
        let txs = vec![
            tx("t1", 5, vec![coinbase_input()], vec![output(0, 50, &["A"]), output(1, 7, &[])]),
            tx("t2", 6, vec![spend(0, "t1", 0, &[])], vec![]),
        ];
        let rows = explode_outputs(&txs);

        let path = write_utxo_set(&dir.path().join("nested/out"), &rows).unwrap();
        let lines = read_json_lines(&path);
        assert_eq!(lines.len(), 3);

        assert_eq!(lines[0]["transaction_hash"], "t1");
        assert_eq!(lines[0]["block_number"], 5);
        assert_eq!(lines[0]["output_index"], 0);
        assert_eq!(lines[0]["value"], 50);
        assert_eq!(lines[0]["addresses"][0], "A");

        // Placeholder row for the output-less transaction
        assert_eq!(lines[2]["transaction_hash"], "t2");
        assert!(lines[2]["output_index"].is_null());
        assert!(lines[2]["addresses"].is_null());
    }

    #[test]
    fn test_write_clustering_inputs() {
        let dir = TempDir::new().unwrap();
        let rows = vec![
            ClusteringInput { transaction_hash: "t4".into(), address: "X".into() },
            ClusteringInput { transaction_hash: "t4".into(), address: "Y".into() },
        ];

        let path = write_clustering_inputs(dir.path(), &rows).unwrap();
        let back: Vec<ClusteringInput> = fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(back, rows);
    }

    #[test]
    fn test_empty_dataset_creates_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = write_clustering_inputs(dir.path(), &[]).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "");
    }

    #[test]
    fn test_write_summary() {
        let dir = TempDir::new().unwrap();
        let summary = DataSummary {
            total_transactions: 4,
            total_blocks: 2,
            multi_input_transactions: 1,
            multi_input_ratio: 0.25,
            min_block: Some(1),
            max_block: Some(2),
        };

        let path = write_summary(dir.path(), &summary).unwrap();
        let value: serde_json::Value = serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["total_transactions"], 4);
        assert_eq!(value["multi_input_ratio"], 0.25);
    }
}
