//! Batch orchestration: load the export once, derive the requested datasets,
//! write them next to each other.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::cluster::{ClusterInputEnricher, EnrichmentStats};
use crate::config::EtlConfig;
use crate::error::{EtlError, Result};
use crate::explode::{explode_inputs, explode_outputs};
use crate::loader;
use crate::metrics::{self, Timer};
use crate::summary::{summarize, DataSummary};
use crate::types::{Block, FlatOutput, Transaction};
use crate::utxo::UtxoSetBuilder;
use crate::writer;

/// Which derivations a command performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Run,
    Utxo,
    Cluster,
    Summary,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Run => "run",
            Stage::Utxo => "utxo",
            Stage::Cluster => "cluster",
            Stage::Summary => "summary",
        }
    }

    fn utxo(&self) -> bool {
        matches!(self, Stage::Run | Stage::Utxo)
    }

    fn cluster(&self) -> bool {
        matches!(self, Stage::Run | Stage::Cluster)
    }

    fn summary(&self) -> bool {
        matches!(self, Stage::Run | Stage::Summary)
    }
}

/// What one command produced
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub transactions: usize,
    pub blocks: usize,
    pub utxos: Option<usize>,
    pub clustering_rows: Option<usize>,
    pub enrichment: Option<EnrichmentStats>,
    pub summary: Option<DataSummary>,
    pub files: Vec<PathBuf>,
}

pub struct Pipeline {
    config: EtlConfig,
}

impl Pipeline {
    pub fn new(config: EtlConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    pub async fn execute(&self, stage: Stage) -> Result<PipelineReport> {
        let export_dir = self.config.paths.export_path();
        let output_dir = self.config.paths.output_path();
        info!(
            command = stage.name(),
            export_dir = %export_dir.display(),
            output_dir = %output_dir.display(),
            "Starting"
        );

        let timer = Timer::new();
        let transactions = loader::load_transactions(&export_dir, self.config.loader).await?;
        timer.observe_stage("load_transactions");

        let blocks = if stage.summary() {
            let timer = Timer::new();
            let blocks = self.load_blocks_or_empty(&export_dir).await?;
            timer.observe_stage("load_blocks");
            blocks
        } else {
            Vec::new()
        };

        let config = self.config.clone();
        let derive_dir = output_dir.clone();
        let mut report = tokio::task::spawn_blocking(move || {
            derive(stage, &config, &transactions, &blocks, &derive_dir)
        })
        .await??;

        let exposition = metrics::gather_metrics()?;
        report.files.push(writer::write_metrics(&output_dir, &exposition)?);

        info!(
            command = stage.name(),
            transactions = report.transactions,
            utxos = ?report.utxos,
            clustering_rows = ?report.clustering_rows,
            files = report.files.len(),
            "Finished"
        );
        Ok(report)
    }

    async fn load_blocks_or_empty(&self, export_dir: &Path) -> Result<Vec<Block>> {
        match loader::load_blocks(export_dir, self.config.loader).await {
            Ok(blocks) => Ok(blocks),
            Err(EtlError::MissingInputData(reason)) => {
                warn!(reason = %reason, "No block records; summary block range will be empty");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}

/// Run the CPU-bound derivations of `stage` over loaded records and write
/// each dataset into `output_dir`.
pub fn derive(
    stage: Stage,
    config: &EtlConfig,
    transactions: &[Transaction],
    blocks: &[Block],
    output_dir: &Path,
) -> Result<PipelineReport> {
    let mut report = PipelineReport {
        transactions: transactions.len(),
        blocks: blocks.len(),
        ..Default::default()
    };

    let outputs: Vec<FlatOutput> = if stage.utxo() || stage.cluster() {
        let timer = Timer::new();
        let outputs = explode_outputs(transactions);
        timer.observe_stage("explode_outputs");
        outputs
    } else {
        Vec::new()
    };

    if stage.utxo() {
        let timer = Timer::new();
        let inputs = explode_inputs(transactions);
        let utxos = UtxoSetBuilder::new(config.utxo).build(&outputs, &inputs)?;
        timer.observe_stage("utxo_set");

        report.files.push(writer::write_utxo_set(output_dir, &utxos)?);
        report.utxos = Some(utxos.len());
    }

    if stage.cluster() {
        let timer = Timer::new();
        let (rows, stats) = ClusterInputEnricher::new(config.cluster).enrich_with_stats(transactions, &outputs);
        timer.observe_stage("clustering_inputs");

        report.files.push(writer::write_clustering_inputs(output_dir, &rows)?);
        report.clustering_rows = Some(rows.len());
        report.enrichment = Some(stats);
    }

    if stage.summary() {
        let summary = summarize(transactions, blocks);
        info!(
            transactions = summary.total_transactions,
            blocks = summary.total_blocks,
            multi_input = summary.multi_input_transactions,
            ratio = summary.multi_input_ratio,
            min_block = ?summary.min_block,
            max_block = ?summary.max_block,
            "Dataset summary"
        );

        report.files.push(writer::write_summary(output_dir, &summary)?);
        report.summary = Some(summary);
    }

    Ok(report)
}
