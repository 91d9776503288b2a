//! Clustering input enrichment.
//!
//! Multi-input transactions inside the configured input-count band have the
//! funding address of every input resolved, producing `(transaction_hash,
//! address)` rows for co-spend clustering.
//!
//! **Algorithm:**
//! 1. Keep non-coinbase transactions with `min_inputs <= input_count <= max_inputs`
//! 2. Expand their inputs (an empty input array yields nothing here)
//! 3. Left-join each input to the flat outputs on the spent outpoint
//! 4. Resolve the address: first address of the joined source output, else
//!    first address embedded on the input, else unresolved
//! 5. Emit resolved rows; drop unresolved ones silently
//!
//! Only the first address of a multi-address list is used. Duplicate
//! addresses within one transaction are kept.

use std::collections::HashMap;

use rayon::prelude::*;
use tracing::info;

use crate::config::ClusterConfig;
use crate::constants::in_input_band;
use crate::metrics;
use crate::types::{ClusteringInput, FlatOutput, OutPointRef, Transaction};

/// Where a resolved address came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressSource {
    /// The output being spent, found by the join
    SourceOutput,
    /// The address list embedded on the input record itself
    Embedded,
}

impl AddressSource {
    pub fn label(&self) -> &'static str {
        match self {
            AddressSource::SourceOutput => "source_output",
            AddressSource::Embedded => "embedded",
        }
    }
}

/// Outcome of resolving one input's address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution<'a> {
    Resolved {
        address: &'a str,
        source: AddressSource,
    },
    Unresolved,
}

/// First element of a nullable address list
pub fn first_address(addresses: Option<&[String]>) -> Option<&str> {
    addresses.and_then(|list| list.first()).map(String::as_str)
}

/// Two-step lookup: joined source output first, embedded list second
pub fn resolve_address<'a>(
    source_addresses: Option<&'a [String]>,
    embedded_addresses: Option<&'a [String]>,
) -> Resolution<'a> {
    if let Some(address) = first_address(source_addresses) {
        return Resolution::Resolved {
            address,
            source: AddressSource::SourceOutput,
        };
    }
    if let Some(address) = first_address(embedded_addresses) {
        return Resolution::Resolved {
            address,
            source: AddressSource::Embedded,
        };
    }
    Resolution::Unresolved
}

/// One input of a qualifying transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpandedInput<'a> {
    pub transaction_hash: &'a str,
    pub spent: Option<OutPointRef<'a>>,
    pub raw_addresses: Option<&'a [String]>,
}

/// Flat outputs keyed by outpoint, right side of the left join.
///
/// Keys are unique in well-formed data; should a key repeat, every match is
/// kept so the join behaves like a relational one.
pub struct OutputLookup<'a> {
    by_key: HashMap<OutPointRef<'a>, Vec<Option<&'a [String]>>>,
}

impl<'a> OutputLookup<'a> {
    pub fn build(outputs: &'a [FlatOutput]) -> Self {
        let mut by_key: HashMap<OutPointRef<'a>, Vec<Option<&'a [String]>>> =
            HashMap::with_capacity(outputs.len());
        for row in outputs {
            if let Some(key) = row.key() {
                by_key.entry(key).or_default().push(row.addresses());
            }
        }
        Self { by_key }
    }

    /// Address lists of every output matching `key`; empty when unmatched
    pub fn matches(&self, key: Option<OutPointRef<'a>>) -> &[Option<&'a [String]>] {
        key.and_then(|k| self.by_key.get(&k))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Counters collected during one enrichment run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrichmentStats {
    pub qualifying_transactions: usize,
    pub expanded_inputs: usize,
    pub from_source_output: usize,
    pub from_embedded: usize,
    pub unresolved: usize,
}

impl EnrichmentStats {
    fn merge(&mut self, other: &EnrichmentStats) {
        self.qualifying_transactions += other.qualifying_transactions;
        self.expanded_inputs += other.expanded_inputs;
        self.from_source_output += other.from_source_output;
        self.from_embedded += other.from_embedded;
        self.unresolved += other.unresolved;
    }

    pub fn emitted(&self) -> usize {
        self.from_source_output + self.from_embedded
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ClusterInputEnricher {
    min_inputs: i32,
    max_inputs: i32,
}

impl ClusterInputEnricher {
    pub fn new(config: ClusterConfig) -> Self {
        Self {
            min_inputs: config.min_inputs,
            max_inputs: config.max_inputs,
        }
    }

    /// Band and coinbase filter
    pub fn qualifies(&self, tx: &Transaction) -> bool {
        !tx.is_coinbase && in_input_band(tx.input_count, self.min_inputs, self.max_inputs)
    }

    pub fn expand<'a>(tx: &'a Transaction) -> impl Iterator<Item = ExpandedInput<'a>> + 'a {
        tx.inputs.iter().map(move |input| ExpandedInput {
            transaction_hash: &tx.hash,
            spent: input.spent_outpoint(),
            raw_addresses: input.addresses.as_deref(),
        })
    }

    fn enrich_transaction(
        &self,
        tx: &Transaction,
        lookup: &OutputLookup<'_>,
    ) -> (Vec<ClusteringInput>, EnrichmentStats) {
        let mut rows = Vec::with_capacity(tx.inputs.len());
        let mut stats = EnrichmentStats {
            qualifying_transactions: 1,
            ..Default::default()
        };

        for input in Self::expand(tx) {
            stats.expanded_inputs += 1;

            let matches = lookup.matches(input.spent);
            let joined: Vec<Option<&[String]>> = if matches.is_empty() {
                vec![None]
            } else {
                matches.to_vec()
            };

            for source_addresses in joined {
                match resolve_address(source_addresses, input.raw_addresses) {
                    Resolution::Resolved { address, source } => {
                        match source {
                            AddressSource::SourceOutput => stats.from_source_output += 1,
                            AddressSource::Embedded => stats.from_embedded += 1,
                        }
                        rows.push(ClusteringInput {
                            transaction_hash: input.transaction_hash.to_string(),
                            address: address.to_string(),
                        });
                    }
                    Resolution::Unresolved => stats.unresolved += 1,
                }
            }
        }

        (rows, stats)
    }

    /// Clustering rows plus per-source counters
    pub fn enrich_with_stats(
        &self,
        transactions: &[Transaction],
        outputs: &[FlatOutput],
    ) -> (Vec<ClusteringInput>, EnrichmentStats) {
        let lookup = OutputLookup::build(outputs);

        let per_tx: Vec<(Vec<ClusteringInput>, EnrichmentStats)> = transactions
            .par_iter()
            .filter(|tx| self.qualifies(tx))
            .map(|tx| self.enrich_transaction(tx, &lookup))
            .collect();

        let mut rows = Vec::new();
        let mut stats = EnrichmentStats::default();
        for (tx_rows, tx_stats) in per_tx {
            rows.extend(tx_rows);
            stats.merge(&tx_stats);
        }

        metrics::increment_cluster_rows(AddressSource::SourceOutput.label(), stats.from_source_output as u64);
        metrics::increment_cluster_rows(AddressSource::Embedded.label(), stats.from_embedded as u64);
        metrics::increment_cluster_unresolved(stats.unresolved as u64);
        info!(
            min_inputs = self.min_inputs,
            max_inputs = self.max_inputs,
            qualifying = stats.qualifying_transactions,
            inputs = stats.expanded_inputs,
            from_source_output = stats.from_source_output,
            from_embedded = stats.from_embedded,
            unresolved = stats.unresolved,
            "Clustering inputs enriched"
        );

        (rows, stats)
    }

    pub fn enrich(&self, transactions: &[Transaction], outputs: &[FlatOutput]) -> Vec<ClusteringInput> {
        self.enrich_with_stats(transactions, outputs).0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::explode::explode_outputs;
    use crate::explode::test_support::*;
    use crate::types::TxInput;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    fn source_transactions() -> Vec<Transaction> {
        vec![
            tx("tx1", 1, vec![coinbase_input()], vec![output(0, 100, &["W"]), output(1, 50, &["X"])]),
            tx("tx2", 1, vec![spend(0, "tx0", 0, &[])], vec![output(0, 30, &["Y"])]),
        ]
    }

    fn enricher() -> ClusterInputEnricher {
        ClusterInputEnricher::new(ClusterConfig::default())
    }

    #[test]
    fn test_end_to_end_scenario() {
        let mut txs = source_transactions();
        txs.push(tx("tx4", 2, vec![spend(0, "tx1", 1, &[]), spend(1, "tx2", 0, &[])], vec![output(0, 70, &["Z"])]));
        let outputs = explode_outputs(&txs);

        let mut rows = enricher().enrich(&txs, &outputs);
        rows.sort();
        assert_eq!(
            rows,
            vec![
                ClusteringInput { transaction_hash: "tx4".into(), address: "X".into() },
                ClusteringInput { transaction_hash: "tx4".into(), address: "Y".into() },
            ]
        );
    }

    #[test]
    fn test_band_filter() {
        let outputs = explode_outputs(&source_transactions());

        let one = tx("one", 3, vec![spend(0, "tx1", 0, &[])], vec![]);
        assert!(enricher().enrich(&[one], &outputs).is_empty());

        let many_inputs: Vec<TxInput> = (0..51).map(|i| spend(i, "tx1", 0, &["A"])).collect();
        let wide = tx("wide", 3, many_inputs, vec![]);
        assert_eq!(wide.input_count, 51);
        assert!(enricher().enrich(&[wide], &outputs).is_empty());

        let two = tx("two", 3, vec![spend(0, "tx1", 0, &[]), spend(1, "tx2", 0, &[])], vec![]);
        assert_eq!(enricher().enrich(&[two], &outputs).len(), 2);

        let edge_inputs: Vec<TxInput> = (0..50).map(|i| spend(i, "tx1", 0, &[])).collect();
        let edge = tx("edge", 3, edge_inputs, vec![]);
        assert_eq!(enricher().enrich(&[edge], &outputs).len(), 50);
    }

    #[test]
    fn test_custom_band() {
        let outputs = explode_outputs(&source_transactions());
        let narrow = ClusterInputEnricher::new(ClusterConfig { min_inputs: 3, max_inputs: 3 });

        let two = tx("two", 3, vec![spend(0, "tx1", 0, &[]), spend(1, "tx2", 0, &[])], vec![]);
        assert!(narrow.enrich(&[two], &outputs).is_empty());
    }

    #[test]
    fn test_coinbase_transactions_excluded() {
        let outputs = explode_outputs(&source_transactions());
        let mut cb = tx("cb", 3, vec![spend(0, "tx1", 0, &["A"]), spend(1, "tx2", 0, &["B"])], vec![]);
        cb.is_coinbase = true;
        assert!(enricher().enrich(&[cb], &outputs).is_empty());
    }

    #[test]
    fn test_address_priority() {
        let a = strings(&["A"]);
        let b = strings(&["B"]);
        let empty: Vec<String> = Vec::new();

        assert_eq!(
            resolve_address(Some(&a[..]), Some(&b[..])),
            Resolution::Resolved { address: "A", source: AddressSource::SourceOutput }
        );
        assert_eq!(
            resolve_address(None, Some(&b[..])),
            Resolution::Resolved { address: "B", source: AddressSource::Embedded }
        );
        assert_eq!(
            resolve_address(Some(&empty[..]), Some(&b[..])),
            Resolution::Resolved { address: "B", source: AddressSource::Embedded }
        );
        assert_eq!(resolve_address(None, None), Resolution::Unresolved);
        assert_eq!(resolve_address(Some(&empty[..]), Some(&empty[..])), Resolution::Unresolved);
    }

    #[test]
    fn test_only_first_address_is_used() {
        let multisig = strings(&["M1", "M2", "M3"]);
        assert_eq!(
            resolve_address(Some(&multisig[..]), None),
            Resolution::Resolved { address: "M1", source: AddressSource::SourceOutput }
        );
    }

    #[test]
    fn test_join_fallback_and_drop() {
        let outputs = explode_outputs(&source_transactions());
        let txn = tx(
            "tx5",
            4,
            vec![
                // matched: source wins over embedded
                spend(0, "tx1", 0, &["B"]),
                // unmatched: embedded fallback
                spend(1, "missing", 7, &["E"]),
                // unmatched, nothing embedded: dropped
                spend(2, "missing", 8, &[]),
            ],
            vec![],
        );

        let (rows, stats) = enricher().enrich_with_stats(&[txn], &outputs);
        let addresses: Vec<&str> = rows.iter().map(|r| r.address.as_str()).collect();
        assert_eq!(addresses, vec!["W", "E"]);
        assert_eq!(
            stats,
            EnrichmentStats {
                qualifying_transactions: 1,
                expanded_inputs: 3,
                from_source_output: 1,
                from_embedded: 1,
                unresolved: 1,
            }
        );
        assert_eq!(stats.emitted(), 2);
    }

    #[test]
    fn test_matched_output_without_addresses_falls_back() {
        let txs = vec![tx("nulldata", 1, vec![spend(0, "tx0", 0, &[])], vec![output(0, 0, &[])])];
        let outputs = explode_outputs(&txs);
        let spender = tx("tx6", 2, vec![spend(0, "nulldata", 0, &["R"]), spend(1, "nulldata", 0, &[])], vec![]);

        let rows = enricher().enrich(&[spender], &outputs);
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].address, "R");
    }

    #[test]
    fn test_duplicates_within_transaction_are_kept() {
        let outputs = explode_outputs(&source_transactions());
        let txn = tx("tx7", 2, vec![spend(0, "tx1", 0, &[]), spend(1, "tx1", 0, &[])], vec![]);
        let rows = enricher().enrich(&[txn], &outputs);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.address == "W"));
    }

    #[test]
    fn test_duplicate_output_keys_join_like_a_relation() {
        let mut txs = source_transactions();
        // Malformed export: same key twice with different addresses
        txs.push(tx("tx1", 1, vec![coinbase_input()], vec![output(0, 100, &["V"])]));
        let outputs = explode_outputs(&txs);

        let lookup = OutputLookup::build(&outputs);
        let key = OutPointRef { transaction_hash: "tx1", output_index: 0 };
        assert_eq!(lookup.matches(Some(key)).len(), 2);
        assert!(lookup.matches(None).is_empty());

        let txn = tx("tx8", 2, vec![spend(0, "tx1", 0, &[]), spend(1, "tx2", 0, &[])], vec![]);
        assert_eq!(enricher().enrich(&[txn], &outputs).len(), 3);
    }

    #[test]
    fn test_placeholder_outputs_are_not_joinable() {
        let txs = vec![tx("empty", 1, vec![spend(0, "tx0", 0, &[])], vec![])];
        let outputs = explode_outputs(&txs);
        let lookup = OutputLookup::build(&outputs);
        assert!(lookup.is_empty());
    }

    #[test]
    fn test_deterministic_output() {
        let mut txs = source_transactions();
        for n in 0..20 {
            txs.push(tx(&format!("s{}", n), 5, vec![spend(0, "tx1", 0, &[]), spend(1, "tx2", 0, &[])], vec![]));
        }
        let outputs = explode_outputs(&txs);
        assert_eq!(enricher().enrich(&txs, &outputs), enricher().enrich(&txs, &outputs));
    }
}
