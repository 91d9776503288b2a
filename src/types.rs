//! Record schemas for bitcoin-etl exports.
//!
//! Nested records (`Transaction` with embedded `TxInput`/`TxOutput` arrays,
//! `Block`) are what the export files contain. Flat records (`FlatInput`,
//! `FlatOutput`) are produced by the exploder and carry their parent
//! transaction hash as a plain relational back-reference.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

// Exports write `null` for arrays, counts and flags they did not fill in
// (`"inputs": null` on coinbase rows, for one). Bind that as the default.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    let value: Option<T> = Option::deserialize(deserializer)?;
    Ok(value.unwrap_or_default())
}

/// Composite key of an output: `(transaction_hash, output_index)`.
///
/// Unique across the whole output collection. Both the UTXO anti-join and the
/// enrichment join match on this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    pub transaction_hash: String,
    pub output_index: i32,
}

impl OutPoint {
    pub fn new(transaction_hash: impl Into<String>, output_index: i32) -> Self {
        Self {
            transaction_hash: transaction_hash.into(),
            output_index,
        }
    }

    /// Borrowed form used as a hash key during joins
    pub fn as_ref_key(&self) -> OutPointRef<'_> {
        OutPointRef {
            transaction_hash: &self.transaction_hash,
            output_index: self.output_index,
        }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.transaction_hash, self.output_index)
    }
}

/// Borrowed composite key. Joins build their lookup tables from these so
/// hashes are never cloned per row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutPointRef<'a> {
    pub transaction_hash: &'a str,
    pub output_index: i32,
}

impl OutPointRef<'_> {
    pub fn to_owned_key(&self) -> OutPoint {
        OutPoint::new(self.transaction_hash, self.output_index)
    }
}

/// Output as embedded in a transaction record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOutput {
    pub index: i32,
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(default)]
    pub addresses: Option<Vec<String>>,
    #[serde(rename = "type", default)]
    pub output_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_asm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_signatures: Option<i32>,
}

/// Input as embedded in a transaction record.
///
/// `spent_transaction_hash`/`spent_output_index` are `None` for coinbase inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxInput {
    pub index: i32,
    #[serde(default)]
    pub spent_transaction_hash: Option<String>,
    #[serde(default)]
    pub spent_output_index: Option<i32>,
    #[serde(default)]
    pub addresses: Option<Vec<String>>,
    /// `None` when the export did not enrich inputs with their spent value
    #[serde(default)]
    pub value: Option<i64>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub input_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_asm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script_hex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_signatures: Option<i32>,
}

impl TxInput {
    /// The output this input spends, if both halves of the reference are present
    pub fn spent_outpoint(&self) -> Option<OutPointRef<'_>> {
        match (&self.spent_transaction_hash, self.spent_output_index) {
            (Some(hash), Some(index)) => Some(OutPointRef {
                transaction_hash: hash.as_str(),
                output_index: index,
            }),
            _ => None,
        }
    }
}

/// Transaction record with nested inputs and outputs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: String,
    #[serde(default)]
    pub block_number: Option<i64>,
    #[serde(default)]
    pub block_timestamp: Option<i64>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub is_coinbase: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub input_count: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub output_count: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub inputs: Vec<TxInput>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub outputs: Vec<TxOutput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub virtual_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lock_time: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_value: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<i64>,
}

impl Transaction {
    /// Boundary check applied once when a record is ingested.
    ///
    /// Only structural problems are rejected. Odd values (negative amounts,
    /// counts that disagree with the arrays) pass through untouched.
    pub fn validate(&self) -> Result<(), String> {
        if self.hash.trim().is_empty() {
            return Err("transaction hash is empty".to_string());
        }
        Ok(())
    }
}

/// Block record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub hash: String,
    #[serde(default)]
    pub number: Option<i64>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    #[serde(default)]
    pub transaction_count: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stripped_size: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bits: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coinbase_param: Option<String>,
}

impl Block {
    pub fn validate(&self) -> Result<(), String> {
        if self.hash.trim().is_empty() {
            return Err("block hash is empty".to_string());
        }
        Ok(())
    }
}

/// One exploded output row.
///
/// `output` is `None` for the single placeholder row emitted for a
/// transaction whose output array was empty.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatOutput {
    pub transaction_hash: String,
    pub block_number: Option<i64>,
    pub block_timestamp: Option<i64>,
    pub output: Option<TxOutput>,
}

impl FlatOutput {
    pub fn key(&self) -> Option<OutPointRef<'_>> {
        self.output.as_ref().map(|output| OutPointRef {
            transaction_hash: &self.transaction_hash,
            output_index: output.index,
        })
    }

    pub fn addresses(&self) -> Option<&[String]> {
        self.output
            .as_ref()
            .and_then(|output| output.addresses.as_deref())
    }

    pub fn value(&self) -> Option<i64> {
        self.output.as_ref().and_then(|output| output.value)
    }
}

/// One exploded input row.
///
/// `input` is `None` for the placeholder row of a transaction with no inputs.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatInput {
    pub transaction_hash: String,
    pub block_number: Option<i64>,
    pub block_timestamp: Option<i64>,
    pub is_coinbase: bool,
    pub input: Option<TxInput>,
}

impl FlatInput {
    pub fn spent_outpoint(&self) -> Option<OutPointRef<'_>> {
        self.input.as_ref().and_then(TxInput::spent_outpoint)
    }
}

/// `(transaction_hash, address)` pair fed to entity clustering
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClusteringInput {
    pub transaction_hash: String,
    pub address: String,
}
