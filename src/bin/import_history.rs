//! Load daily closes from CSV into the `historical_data` table
//!
//! # Usage
//! ```sh
//! cargo run --bin import_history -- sqlite://data/fx.db EUR/USD data/eurusd.csv
//! ```
//!
//! The CSV needs a `date,close` header; dates are RFC 3339 or `YYYY-MM-DD`.
//! Existing rows for the same timestamp are overwritten.

use anyhow::{Context, Result};
use clap::Parser;
use fxpredict::domain::series;
use fxpredict::infrastructure::csv_loader;
use fxpredict::infrastructure::{Database, SqliteSeriesStore};
use std::path::PathBuf;
use tracing::{Level, info};
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Import closing prices for a currency pair", long_about = None)]
struct Args {
    /// SQLite URL, e.g. sqlite://data/fx.db
    database_url: String,

    /// Currency pair the rows belong to, e.g. EUR/USD
    symbol: String,

    /// CSV file with `date,close` rows
    csv: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let args = Args::parse();

    let observations = csv_loader::load_history_file(&args.csv)?;
    series::validate(&observations)
        .with_context(|| format!("{} is not a usable price series", args.csv.display()))?;
    info!(
        "Read {} rows for {} from {}",
        observations.len(),
        args.symbol,
        args.csv.display()
    );

    let db = Database::new(&args.database_url).await?;
    let store = SqliteSeriesStore::new(db.pool.clone());
    let written = store.insert_observations(&args.symbol, &observations).await?;

    println!("Imported {} rows for {}", written, args.symbol);
    Ok(())
}
