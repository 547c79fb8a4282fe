//! CLI entry point for trip-time predictions.
//!
//! Loads the station registry and fold ensemble named by a config file, then answers
//! one query per invocation.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use triptime_inference::{Config, TripTimeService};

#[derive(Parser)]
#[command(name = "triptime")]
#[command(about = "Predict bike-share trip times between stations", long_about = None)]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true, default_value = "triptime.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict the trip time from one station to another
    Predict {
        /// Start station id
        start: String,

        /// End station id
        end: String,
    },
    /// List valid station ids
    Stations {
        /// Print coordinates as well as names
        #[arg(long, default_value_t = false)]
        full: bool,
    },
    /// Load the registry and every fold, then report what was loaded
    Check,
}

fn main() -> Result<()> {
    let stderr_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .init();

    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;
    let service = TripTimeService::from_config(&config)?;

    match cli.command {
        Commands::Predict { start, end } => match service.estimate(&start, &end) {
            Ok(estimate) => println!("{}", serde_json::to_string_pretty(&estimate)?),
            Err(failure) => {
                println!("{}", json!({ "error": "Invalid station id" }));
                bail!(failure);
            }
        },
        Commands::Stations { full } => {
            let payload = if full {
                serde_json::to_string_pretty(&service.stations())?
            } else {
                serde_json::to_string_pretty(&service.station_names())?
            };
            println!("{payload}");
        }
        Commands::Check => {
            let schema = service.predictor().schema();
            info!(
                stations = service.registry().len(),
                folds = service.predictor().n_folds(),
                features = schema.len(),
                schema_version = schema.version,
                "configuration ok"
            );
        }
    }

    Ok(())
}
