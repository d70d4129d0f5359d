//! surged — the Surge daemon.
//!
//! Assembles the control loop from its parts:
//! - State store (redb): metric history, forecast cache, policy registry
//! - Metrics source (telemetry file, recorded into history)
//! - Fleet controller
//! - Forecast engine
//! - Scaling engine + evaluation loop
//! - Retention loop
//!
//! # Usage
//!
//! ```text
//! surged run --config /etc/surge/surge.toml
//! surged forecast --metric system_cpu_usage --horizon 30
//! surged init-config > surge.toml
//! ```

mod daemon;

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use surge_core::SurgeConfig;
use surge_forecast::ForecastEngine;
use surge_state::StateStore;

const DEFAULT_LOG_FILTER: &str = "info,surged=debug,surge=debug";

#[derive(Parser)]
#[command(name = "surged", about = "Surge fleet auto-scaling daemon")]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Run the evaluation loop until interrupted.
    Run {
        /// Path to surge.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state (overrides the config).
        #[arg(long)]
        data_dir: Option<PathBuf>,

        /// Policy evaluation interval in seconds (overrides the config).
        #[arg(long)]
        evaluation_interval: Option<u64>,
    },

    /// Print the built-in policy set.
    Policies,

    /// Forecast one metric from recorded history.
    Forecast {
        /// Metric name, e.g. system_cpu_usage.
        #[arg(long)]
        metric: String,

        /// Minutes ahead to forecast.
        #[arg(long, default_value = "60")]
        horizon: u32,

        /// Path to surge.toml.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state (overrides the config).
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },

    /// Print a default surge.toml.
    InitConfig,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match cli.command {
        Command::Run {
            config,
            data_dir,
            evaluation_interval,
        } => {
            let mut config = load_config(config.as_deref(), data_dir)?;
            if let Some(secs) = evaluation_interval {
                config.engine.evaluation_interval = format!("{secs}s");
            }
            config.validate()?;
            daemon::run(config).await
        }
        Command::Policies => {
            let policies = surge_policy::default_policies();
            println!("{}", serde_json::to_string_pretty(&policies)?);
            Ok(())
        }
        Command::Forecast {
            metric,
            horizon,
            config,
            data_dir,
        } => {
            let config = load_config(config.as_deref(), data_dir)?;
            let state = open_state(&config.store.data_dir)?;
            let engine = ForecastEngine::from_config(state, &config)?;
            let forecast = engine.generate_forecast(&metric, horizon).await;
            println!("{}", serde_json::to_string_pretty(&forecast)?);
            Ok(())
        }
        Command::InitConfig => {
            print!("{}", SurgeConfig::scaffold().to_toml_string()?);
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

fn load_config(path: Option<&Path>, data_dir: Option<PathBuf>) -> anyhow::Result<SurgeConfig> {
    let mut config = match path {
        Some(path) => SurgeConfig::from_file(path)?,
        None => SurgeConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.store.data_dir = dir;
    }
    Ok(config)
}

pub(crate) fn open_state(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("create data directory {}", data_dir.display()))?;
    let db_path = data_dir.join("surge.redb");
    let state = StateStore::open(&db_path)?;
    tracing::info!(path = ?db_path, "state store opened");
    Ok(state)
}
