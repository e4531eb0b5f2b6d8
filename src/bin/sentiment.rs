//! Sentiment of a piece of forex news text
//!
//! # Usage
//! ```sh
//! cargo run --bin sentiment -- "EUR/USD expected to rise"
//! SENTIMENT_BACKEND=basic cargo run --bin sentiment -- "Yen slumps"
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use fxpredict::config::{Config, SentimentBackend};
use fxpredict::infrastructure::sentiment::analyzer;
use tracing::Level;
use tracing_subscriber::prelude::*;

#[derive(Parser, Debug)]
#[command(author, version, about = "Classify the sentiment of financial text", long_about = None)]
struct Args {
    /// Text to analyze (several arguments are analyzed as a batch)
    #[arg(required = true)]
    texts: Vec<String>,

    /// `vader` or `basic` (overrides SENTIMENT_BACKEND)
    #[arg(long)]
    backend: Option<SentimentBackend>,
}

fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env().add_directive(Level::WARN.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let args = Args::parse();
    let backend = match args.backend {
        Some(b) => b,
        None => Config::from_env()?.sentiment_backend,
    };

    let analyzer = analyzer::shared(backend);
    let payload = match args.texts.as_slice() {
        [text] => serde_json::to_value(analyzer.analyze(text))?,
        texts => serde_json::to_value(analyzer.batch_analyze(texts))?,
    };

    println!("=== RESULT ===");
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("Failed to serialize result")?
    );

    analyzer::teardown();
    Ok(())
}
