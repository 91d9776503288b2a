//! Pipeline configuration.
//!
//! A single `EtlConfig` value is built once at startup and handed to every
//! component at construction. Nothing here is global.

use std::path::{Path, PathBuf};

use config::{Config, Environment, File as ConfigFile};
use serde::Deserialize;

use crate::constants::{DEFAULT_MAX_CONCURRENT_FILES, DEFAULT_MAX_INPUTS, DEFAULT_MIN_INPUTS};
use crate::error::{EtlError, Result};
use crate::telemetry::TelemetryConfig;

pub const ENV_PREFIX: &str = "WHALEBLOX";
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EtlConfig {
    pub paths: PathsConfig,
    pub cluster: ClusterConfig,
    pub utxo: UtxoConfig,
    pub loader: LoaderConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root of the bitcoin-etl export (contains one folder per batch)
    pub export_dir: String,
    /// Where derived datasets are written
    pub output_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            export_dir: "./blockchain_exports".to_string(),
            output_dir: "./output".to_string(),
        }
    }
}

impl PathsConfig {
    pub fn export_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.export_dir).to_string())
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.output_dir).to_string())
    }
}

/// Inclusive input-count band for clustering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub min_inputs: i32,
    pub max_inputs: i32,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            min_inputs: DEFAULT_MIN_INPUTS,
            max_inputs: DEFAULT_MAX_INPUTS,
        }
    }
}

/// How the UTXO builder treats signs of a partial history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletenessMode {
    #[default]
    Off,
    Warn,
    Strict,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct UtxoConfig {
    pub completeness: CompletenessMode,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Fail on the first malformed line instead of skipping it
    pub strict: bool,
    pub max_concurrent: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            strict: false,
            max_concurrent: DEFAULT_MAX_CONCURRENT_FILES,
        }
    }
}

impl EtlConfig {
    /// Load from an optional TOML file and `WHALEBLOX__SECTION__KEY` env vars.
    ///
    /// A missing file is fine; every key has a default.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = path
            .map(|p| p.to_string_lossy().to_string())
            .unwrap_or_else(|| DEFAULT_CONFIG_FILE.to_string());

        let settings = Config::builder()
            .add_source(ConfigFile::with_name(&file).required(path.is_some()))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: EtlConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cluster.min_inputs > self.cluster.max_inputs {
            return Err(EtlError::InvalidConfig(format!(
                "cluster.min_inputs ({}) exceeds cluster.max_inputs ({})",
                self.cluster.min_inputs, self.cluster.max_inputs
            )));
        }
        if self.loader.max_concurrent == 0 {
            return Err(EtlError::InvalidConfig(
                "loader.max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
