//! fxpredict - next-value forecaster for currency pairs
//!
//! Trains a fresh sequence model on the stored history of each symbol,
//! forecasts the next close and prints the signal as JSON.
//!
//! # Usage
//! ```sh
//! cargo run -- sqlite://data/fx.db EUR/USD
//! cargo run -- sqlite://data/fx.db EUR/USD GBP/USD --profile percent
//! cargo run -- sqlite://data/fx.db EUR/USD --latest
//! ```
//!
//! Logs go to stderr. On success stdout carries the line `=== RESULT ===`
//! followed by the JSON payload.

use anyhow::{Context, Result};
use clap::Parser;
use fxpredict::application::PredictionPipeline;
use fxpredict::config::{Config, Profile};
use fxpredict::infrastructure::{Database, SqliteSeriesStore};
use serde_json::json;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{Level, error, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Forecast the next close of currency pairs", long_about = None)]
struct Args {
    /// SQLite URL, e.g. sqlite://data/fx.db
    database_url: String,

    /// Currency pairs to forecast, e.g. EUR/USD
    #[arg(required = true)]
    symbols: Vec<String>,

    /// Default set: `fraction` or `percent` (overrides PREDICTION_PROFILE)
    #[arg(long)]
    profile: Option<Profile>,

    /// TOML file with field overrides
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the most recent stored prediction instead of running a new one
    #[arg(long)]
    latest: bool,
}

fn init_tracing() {
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(stderr_layer)
        .init();
}

fn load_config(args: &Args) -> Result<Config> {
    let mut config = match args.profile {
        Some(profile) => Config::from_env_with_profile(profile)?,
        None => Config::from_env()?,
    };
    if let Some(path) = &args.config {
        config = config.apply_file(path)?;
    }
    config.validate()?;
    Ok(config)
}

fn print_result(payload: &serde_json::Value) -> Result<()> {
    println!("=== RESULT ===");
    println!(
        "{}",
        serde_json::to_string_pretty(payload).context("Failed to serialize result")?
    );
    Ok(())
}

async fn run(args: Args) -> Result<bool> {
    let config = load_config(&args)?;
    info!(
        "fxpredict {} (profile {}, model {})",
        env!("CARGO_PKG_VERSION"),
        config.profile,
        config.pipeline.model_version
    );

    let db = Database::open_existing(&args.database_url)
        .await
        .context("Series store unavailable")?;
    let store = Arc::new(SqliteSeriesStore::new(db.pool.clone()));
    let pipeline = PredictionPipeline::new(store, config)?;

    if args.latest {
        let mut entries = Vec::with_capacity(args.symbols.len());
        for symbol in &args.symbols {
            let latest = pipeline.latest(symbol).await?;
            entries.push(json!({ "currency_pair": symbol, "latest": latest }));
        }
        let payload = match entries.len() {
            1 => entries.remove(0),
            _ => serde_json::Value::Array(entries),
        };
        print_result(&payload)?;
        return Ok(true);
    }

    if let [symbol] = args.symbols.as_slice() {
        let outcome = pipeline.run(symbol).await?;
        print_result(&serde_json::to_value(&outcome)?)?;
        return Ok(true);
    }

    let mut all_ok = true;
    let mut entries = Vec::with_capacity(args.symbols.len());
    for (symbol, result) in pipeline.predict_many(&args.symbols).await {
        match result {
            Ok(outcome) => entries.push(json!({
                "currency_pair": symbol,
                "success": true,
                "result": outcome,
            })),
            Err(e) => {
                all_ok = false;
                entries.push(json!({
                    "currency_pair": symbol,
                    "success": false,
                    "error": e.to_string(),
                    "kind": e.kind(),
                }));
            }
        }
    }
    print_result(&serde_json::Value::Array(entries))?;
    Ok(all_ok)
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
