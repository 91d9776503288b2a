//! Bitcoin UTXO set and entity-clustering inputs from bitcoin-etl exports.

pub mod cluster;
pub mod config;
pub mod constants;
pub mod error;
pub mod explode;
pub mod loader;
pub mod metrics;
pub mod pipeline;
pub mod summary;
pub mod telemetry;
pub mod types;
pub mod utxo;
pub mod writer;


pub use cluster::{ClusterInputEnricher, EnrichmentStats};
pub use error::{EtlError, Result};
pub use pipeline::{Pipeline, PipelineReport, Stage};
pub use types::{Block, ClusteringInput, FlatInput, FlatOutput, Transaction, TxInput, TxOutput};
pub use utxo::UtxoSetBuilder;
