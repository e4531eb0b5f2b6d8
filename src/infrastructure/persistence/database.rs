use anyhow::{Context, Result};

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use tokio::fs;
use tracing::info;

/// Pooled SQLite handle with the prediction schema applied
#[derive(Clone)]
pub struct Database {
    pub pool: SqlitePool,
}

impl Database {
    /// Connect, creating the database file and its directory when missing
    pub async fn new(db_url: &str) -> Result<Self> {
        // Ensure the directory exists if it's a file path
        if let Some(path_part) = db_url.strip_prefix("sqlite://") {
            let path = Path::new(path_part);
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
                && !parent.exists()
            {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create database directory")?;
            }
        }

        Self::connect(db_url, true).await
    }

    /// Connect to a database that must already exist.
    ///
    /// A missing file is an error rather than a fresh empty store.
    pub async fn open_existing(db_url: &str) -> Result<Self> {
        Self::connect(db_url, false).await
    }

    async fn connect(db_url: &str, create: bool) -> Result<Self> {
        let in_memory = db_url.contains(":memory:");
        let mut options = SqliteConnectOptions::from_str(db_url)
            .context(format!("Invalid database URL: {}", db_url))?
            .create_if_missing(create || in_memory);
        if !in_memory {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Every connection to ":memory:" is its own database; keep exactly one alive
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .connect_with(options)
            .await
            .context(format!("Failed to connect to SQLite database: {}", db_url))?;

        info!("Connected to database: {}", db_url);

        let db = Self { pool };
        db.init().await?;

        Ok(db)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS historical_data (
                currency_pair TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                close TEXT NOT NULL,
                PRIMARY KEY (currency_pair, timestamp)
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create historical_data table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS predictions (
                id TEXT PRIMARY KEY,
                currency_pair TEXT NOT NULL,
                current_price TEXT NOT NULL,
                predicted_value TEXT NOT NULL,
                change_pct REAL NOT NULL,
                direction TEXT NOT NULL,
                recommendation TEXT NOT NULL,
                confidence REAL NOT NULL,
                confidence_scale TEXT NOT NULL,
                model_version TEXT NOT NULL,
                lookback INTEGER NOT NULL,
                training_samples INTEGER NOT NULL,
                final_loss REAL,
                final_val_loss REAL,
                mae REAL,
                created_at INTEGER NOT NULL
            );
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create predictions table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_predictions_pair_created
            ON predictions (currency_pair, created_at);
            "#,
        )
        .execute(&mut *conn)
        .await
        .context("Failed to create predictions index")?;

        info!("Database schema initialized.");
        Ok(())
    }
}
