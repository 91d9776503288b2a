//! Flattening of nested transaction records.
//!
//! Each element of a transaction's `inputs`/`outputs` array becomes one flat
//! row carrying the parent's hash, block number and timestamp (plus the
//! coinbase flag for inputs). An empty array still yields exactly one row
//! whose element is `None`, so transactions never disappear from downstream
//! counts.
//!
//! Rows come back grouped by source transaction in collection order; nothing
//! downstream depends on that order.

use rayon::prelude::*;

use crate::metrics;
use crate::types::{FlatInput, FlatOutput, Transaction, TxInput, TxOutput};

fn flat_outputs_of(tx: &Transaction) -> Vec<FlatOutput> {
    let row = |output: Option<TxOutput>| FlatOutput {
        transaction_hash: tx.hash.clone(),
        block_number: tx.block_number,
        block_timestamp: tx.block_timestamp,
        output,
    };

    if tx.outputs.is_empty() {
        return vec![row(None)];
    }
    tx.outputs.iter().cloned().map(|o| row(Some(o))).collect()
}

fn flat_inputs_of(tx: &Transaction) -> Vec<FlatInput> {
    let row = |input: Option<TxInput>| FlatInput {
        transaction_hash: tx.hash.clone(),
        block_number: tx.block_number,
        block_timestamp: tx.block_timestamp,
        is_coinbase: tx.is_coinbase,
        input,
    };

    if tx.inputs.is_empty() {
        return vec![row(None)];
    }
    tx.inputs.iter().cloned().map(|i| row(Some(i))).collect()
}

/// One flat row per output, one placeholder row per output-less transaction
pub fn explode_outputs(transactions: &[Transaction]) -> Vec<FlatOutput> {
    let rows: Vec<FlatOutput> = transactions
        .par_iter()
        .flat_map_iter(flat_outputs_of)
        .collect();

    let placeholders = rows.iter().filter(|r| r.output.is_none()).count();
    metrics::increment_rows_exploded("outputs", "element", (rows.len() - placeholders) as u64);
    metrics::increment_rows_exploded("outputs", "placeholder", placeholders as u64);
    tracing::debug!(transactions = transactions.len(), rows = rows.len(), placeholders, "Exploded outputs");

    rows
}

/// One flat row per input, one placeholder row per input-less transaction
pub fn explode_inputs(transactions: &[Transaction]) -> Vec<FlatInput> {
    let rows: Vec<FlatInput> = transactions
        .par_iter()
        .flat_map_iter(flat_inputs_of)
        .collect();

    let placeholders = rows.iter().filter(|r| r.input.is_none()).count();
    metrics::increment_rows_exploded("inputs", "element", (rows.len() - placeholders) as u64);
    metrics::increment_rows_exploded("inputs", "placeholder", placeholders as u64);
    tracing::debug!(transactions = transactions.len(), rows = rows.len(), placeholders, "Exploded inputs");

    rows
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_outputs_carry_parent_context() {
        let txs = vec![tx("tx1", 10, vec![coinbase_input()], vec![output(0, 100, &["A"]), output(1, 50, &["B"])])];
        let rows = explode_outputs(&txs);

        assert_eq!(rows.len(), 2);
        for row in &rows {
            assert_eq!(row.transaction_hash, "tx1");
            assert_eq!(row.block_number, Some(10));
            assert_eq!(row.block_timestamp, txs[0].block_timestamp);
        }
        let indexes: Vec<i32> = rows.iter().filter_map(|r| r.key()).map(|k| k.output_index).collect();
        assert_eq!(indexes, vec![0, 1]);
        assert_eq!(rows[1].value(), Some(50));
    }

    #[test]
    fn test_empty_outputs_yield_one_placeholder() {
        let txs = vec![
            tx("tx1", 1, vec![spend(0, "tx0", 0, &[])], vec![]),
            tx("tx2", 1, vec![spend(0, "tx0", 1, &[])], vec![output(0, 5, &["C"])]),
        ];
        let rows = explode_outputs(&txs);

        assert_eq!(rows.len(), 2);
        let placeholder = rows.iter().find(|r| r.transaction_hash == "tx1").unwrap();
        assert!(placeholder.output.is_none());
        assert!(placeholder.key().is_none());
        assert!(placeholder.addresses().is_none());
    }

    #[test]
    fn test_inputs_carry_coinbase_flag() {
        let txs = vec![
            tx("cb", 1, vec![coinbase_input()], vec![output(0, 50, &["M"])]),
            tx("tx3", 2, vec![spend(0, "cb", 0, &["M"]), spend(1, "tx0", 3, &[])], vec![output(0, 40, &["N"])]),
        ];
        let rows = explode_inputs(&txs);

        assert_eq!(rows.len(), 3);
        assert!(rows[0].is_coinbase);
        assert!(rows[0].spent_outpoint().is_none());
        assert!(!rows[1].is_coinbase);
        assert_eq!(rows[2].spent_outpoint().unwrap().transaction_hash, "tx0");
        assert_eq!(rows[2].spent_outpoint().unwrap().output_index, 3);
    }

    #[test]
    fn test_empty_inputs_yield_one_placeholder() {
        let mut no_inputs = tx("odd", 3, vec![], vec![output(0, 1, &[])]);
        no_inputs.is_coinbase = false;
        let rows = explode_inputs(&[no_inputs]);

        assert_eq!(rows.len(), 1);
        assert!(rows[0].input.is_none());
        assert!(rows[0].spent_outpoint().is_none());
    }

    #[test]
    fn test_empty_collection() {
        assert!(explode_outputs(&[]).is_empty());
        assert!(explode_inputs(&[]).is_empty());
    }
}
