//! # UTXO Set Derivation
//!
//! The UTXO set is the set difference between every flat output and every
//! output referenced as spent by a non-coinbase input, matched on the
//! composite key `(transaction_hash, output_index)`.
//!
//! Two passes, as with any spent-set build:
//! - Pass 1: collect the distinct spent references of all non-coinbase inputs
//! - Pass 2: keep the outputs whose key is not in that set (anti-join)
//!
//! ## Caller contract
//!
//! The input collection must cover spends from the ENTIRE history up to the
//! current height. Given a partial time window, outputs spent outside the
//! window look unspent and the result is silently too large. The data alone
//! cannot prove completeness; `CompletenessMode::Warn`/`Strict` only run a
//! heuristic (`CompletenessReport`) over it.
//!
//! Placeholder output rows (transactions with no outputs) carry no key, can
//! never match a spend, and therefore pass through the anti-join.

use std::collections::HashSet;

use rayon::prelude::*;
use tracing::{info, warn};

use crate::config::{CompletenessMode, UtxoConfig};
use crate::error::{EtlError, Result};
use crate::metrics;
use crate::types::{FlatInput, FlatOutput, OutPointRef};

/// Distinct `(spent_transaction_hash, spent_output_index)` pairs of all
/// non-coinbase inputs.
///
/// Inputs missing either half of the reference are ignored: they cannot
/// match any output key.
pub fn spent_references(inputs: &[FlatInput]) -> HashSet<OutPointRef<'_>> {
    inputs
        .par_iter()
        .filter(|row| !row.is_coinbase)
        .filter_map(FlatInput::spent_outpoint)
        .collect()
}

/// Outputs whose key is not in `spent`
pub fn anti_join(outputs: &[FlatOutput], spent: &HashSet<OutPointRef<'_>>) -> Vec<FlatOutput> {
    outputs
        .par_iter()
        .filter(|row| match row.key() {
            Some(key) => !spent.contains(&key),
            None => true,
        })
        .cloned()
        .collect()
}

/// UTXO set of the supplied collections (see module docs for the
/// completeness precondition).
pub fn compute_utxo_set(outputs: &[FlatOutput], inputs: &[FlatInput]) -> Vec<FlatOutput> {
    let spent = spent_references(inputs);
    anti_join(outputs, &spent)
}

/// Heuristic signals of a partial history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletenessReport {
    /// Distinct spent references with no output row in the supplied data
    pub dangling_spends: usize,
    /// Lowest block number among the outputs
    pub lowest_block: Option<i64>,
    /// Highest block number among the outputs
    pub highest_block: Option<i64>,
}

impl CompletenessReport {
    pub fn compute(outputs: &[FlatOutput], spent: &HashSet<OutPointRef<'_>>) -> Self {
        let output_keys: HashSet<OutPointRef<'_>> =
            outputs.par_iter().filter_map(FlatOutput::key).collect();

        let dangling_spends = spent
            .iter()
            .filter(|key| !output_keys.contains(*key))
            .count();

        let blocks = outputs.iter().filter_map(|row| row.block_number);
        let lowest_block = blocks.clone().min();
        let highest_block = blocks.max();

        Self {
            dangling_spends,
            lowest_block,
            highest_block,
        }
    }

    /// History looks partial when a spend points outside the data or the
    /// data does not start at the genesis block.
    pub fn looks_partial(&self) -> bool {
        self.dangling_spends > 0 || self.lowest_block.map_or(false, |block| block > 0)
    }
}

/// UTXO builder with an optional completeness check
#[derive(Debug, Clone, Copy, Default)]
pub struct UtxoSetBuilder {
    mode: CompletenessMode,
}

impl UtxoSetBuilder {
    pub fn new(config: UtxoConfig) -> Self {
        Self {
            mode: config.completeness,
        }
    }

    pub fn mode(&self) -> CompletenessMode {
        self.mode
    }

    /// Compute the UTXO set.
    ///
    /// Fails only in `Strict` mode when the completeness heuristic fires;
    /// the rows themselves are identical in every mode.
    pub fn build(&self, outputs: &[FlatOutput], inputs: &[FlatInput]) -> Result<Vec<FlatOutput>> {
        let spent = spent_references(inputs);
        metrics::set_spent_references(spent.len());

        if self.mode != CompletenessMode::Off {
            let report = CompletenessReport::compute(outputs, &spent);
            metrics::set_dangling_spends(report.dangling_spends);

            if report.looks_partial() {
                match self.mode {
                    CompletenessMode::Strict => {
                        return Err(EtlError::IncompleteHistory {
                            dangling_spends: report.dangling_spends,
                            lowest_block: report.lowest_block,
                        });
                    }
                    _ => warn!(
                        dangling_spends = report.dangling_spends,
                        lowest_block = ?report.lowest_block,
                        highest_block = ?report.highest_block,
                        "Transaction history looks partial; UTXO set is over-approximated"
                    ),
                }
            }
        }

        let utxos = anti_join(outputs, &spent);
        metrics::set_utxo_set_size(utxos.len());
        info!(
            outputs = outputs.len(),
            spent_references = spent.len(),
            utxos = utxos.len(),
            "UTXO set computed"
        );

        Ok(utxos)
    }
}
