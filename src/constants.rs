//! Pipeline Constants
//!
//! Defaults and file names shared across the pipeline.
//! All band and naming logic should use these constants instead of magic numbers.

/// Lowest input count that carries co-spend information.
/// Single-input transactions link nothing and are excluded.
pub const DEFAULT_MIN_INPUTS: i32 = 2;

/// Highest input count admitted into clustering.
/// Above this, transactions are most likely exchange consolidations.
pub const DEFAULT_MAX_INPUTS: i32 = 50;

/// Files read concurrently by the loader
pub const DEFAULT_MAX_CONCURRENT_FILES: usize = 4;

/// Emit a progress log every N records while loading
pub const PROGRESS_LOG_INTERVAL: u64 = 100_000;

/// Hash prefix length used in log fields
pub const LOG_HASH_LEN: usize = 16;

/// Sub-folder names inside each export batch
pub const TRANSACTIONS_DIR: &str = "transactions";
pub const BLOCKS_DIR: &str = "blocks";

/// Output dataset file names
pub const UTXO_SET_FILE: &str = "utxo_set.jsonl";
pub const CLUSTERING_INPUTS_FILE: &str = "clustering_inputs.jsonl";
pub const SUMMARY_FILE: &str = "summary.json";
pub const METRICS_FILE: &str = "metrics.prom";

/// Check if an input count falls inside an inclusive clustering band
#[inline]
pub fn in_input_band(input_count: i32, min_inputs: i32, max_inputs: i32) -> bool {
    input_count >= min_inputs && input_count <= max_inputs
}

/// Check if a directory entry name should be skipped during discovery
#[inline]
pub fn is_hidden_entry(name: &str) -> bool {
    name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_band() {
        assert_eq!(DEFAULT_MIN_INPUTS, 2);
        assert_eq!(DEFAULT_MAX_INPUTS, 50);
    }

    #[test]
    fn test_in_input_band() {
        assert!(!in_input_band(1, DEFAULT_MIN_INPUTS, DEFAULT_MAX_INPUTS));
        assert!(in_input_band(2, DEFAULT_MIN_INPUTS, DEFAULT_MAX_INPUTS));
        assert!(in_input_band(50, DEFAULT_MIN_INPUTS, DEFAULT_MAX_INPUTS));
        assert!(!in_input_band(51, DEFAULT_MIN_INPUTS, DEFAULT_MAX_INPUTS));
    }

    #[test]
    fn test_hidden_entries() {
        assert!(is_hidden_entry(".DS_Store"));
        assert!(is_hidden_entry(".spark-staging"));
        assert!(!is_hidden_entry("batch_000"));
    }
}
