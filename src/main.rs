use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

use whaleblox::config::EtlConfig;
use whaleblox::metrics::init_metrics;
use whaleblox::pipeline::{Pipeline, Stage};
use whaleblox::telemetry::init_tracing;

#[derive(Parser, Debug)]
#[command(name = "whaleblox")]
#[command(about = "Derive the UTXO set and entity-clustering inputs from a bitcoin-etl export", long_about = None)]
struct Args {
    /// Config file (defaults to ./config.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root of the export (one folder per batch)
    #[arg(long, global = true)]
    export_dir: Option<String>,

    /// Where derived datasets are written
    #[arg(long, global = true)]
    output_dir: Option<String>,

    /// Smallest input count of a clustering transaction (inclusive)
    #[arg(long, global = true)]
    min_inputs: Option<i32>,

    /// Largest input count of a clustering transaction (inclusive)
    #[arg(long, global = true)]
    max_inputs: Option<i32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// UTXO set, clustering inputs and summary
    Run,
    /// UTXO set only
    Utxo,
    /// Clustering inputs only
    Cluster,
    /// Dataset summary only
    Summary,
}

impl From<Command> for Stage {
    fn from(command: Command) -> Self {
        match command {
            Command::Run => Stage::Run,
            Command::Utxo => Stage::Utxo,
            Command::Cluster => Stage::Cluster,
            Command::Summary => Stage::Summary,
        }
    }
}

impl Args {
    fn apply(&self, config: &mut EtlConfig) {
        if let Some(ref dir) = self.export_dir {
            config.paths.export_dir = dir.clone();
        }
        if let Some(ref dir) = self.output_dir {
            config.paths.output_dir = dir.clone();
        }
        if let Some(min) = self.min_inputs {
            config.cluster.min_inputs = min;
        }
        if let Some(max) = self.max_inputs {
            config.cluster.max_inputs = max;
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = EtlConfig::load(args.config.as_deref())?;
    args.apply(&mut config);
    config.validate()?;

    // Held until exit so the file appender flushes
    let _log_guard = init_tracing(config.telemetry.clone())?;
    init_metrics()?;

    let pipeline = Pipeline::new(config);
    let report = match pipeline.execute(args.command.into()).await {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "Pipeline failed");
            return Err(e.into());
        }
    };

    for file in &report.files {
        println!("{}", file.display());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "whaleblox",
            "cluster",
            "--export-dir",
            "/data/exports",
            "--min-inputs",
            "3",
        ]);
        let mut config = EtlConfig::default();
        args.apply(&mut config);

        assert!(matches!(args.command, Command::Cluster));
        assert_eq!(config.paths.export_dir, "/data/exports");
        assert_eq!(config.paths.output_dir, "./output");
        assert_eq!(config.cluster.min_inputs, 3);
        assert_eq!(config.cluster.max_inputs, 50);
    }

    #[test]
    fn test_command_maps_to_stage() {
        assert_eq!(Stage::from(Command::Run), Stage::Run);
        assert_eq!(Stage::from(Command::Summary), Stage::Summary);
    }
}
