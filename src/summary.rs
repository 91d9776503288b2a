//! Aggregate counts for operational visibility

use serde::Serialize;

use crate::constants::DEFAULT_MIN_INPUTS;
use crate::types::{Block, Transaction};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataSummary {
    pub total_transactions: usize,
    pub total_blocks: usize,
    pub multi_input_transactions: usize,
    pub multi_input_ratio: f64,
    pub min_block: Option<i64>,
    pub max_block: Option<i64>,
}

/// Summarize loaded records.
///
/// A multi-input transaction is a non-coinbase one with at least two inputs.
pub fn summarize(transactions: &[Transaction], blocks: &[Block]) -> DataSummary {
    let total_transactions = transactions.len();
    let multi_input_transactions = transactions
        .iter()
        .filter(|tx| tx.input_count >= DEFAULT_MIN_INPUTS && !tx.is_coinbase)
        .count();

    let multi_input_ratio = if total_transactions > 0 {
        multi_input_transactions as f64 / total_transactions as f64
    } else {
        0.0
    };

    let numbers = blocks.iter().filter_map(|b| b.number);

    DataSummary {
        total_transactions,
        total_blocks: blocks.len(),
        multi_input_transactions,
        multi_input_ratio,
        min_block: numbers.clone().min(),
        max_block: numbers.max(),
    }
}
