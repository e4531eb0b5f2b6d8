use crate::domain::prediction::{Confidence, PredictionResult, StoredPrediction};
use crate::domain::repositories::SeriesStore;
use crate::domain::series::{FetchRange, Observation};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

pub struct SqliteSeriesStore {
    pool: SqlitePool,
}

impl SqliteSeriesStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Upsert closing prices; returns the number of rows written
    pub async fn insert_observations(&self, symbol: &str, series: &[Observation]) -> Result<u64> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to start transaction")?;
        let mut written = 0;

        for obs in series {
            let result = sqlx::query(
                r#"
                INSERT INTO historical_data (currency_pair, timestamp, close)
                VALUES (?, ?, ?)
                ON CONFLICT(currency_pair, timestamp) DO UPDATE SET close = excluded.close
                "#,
            )
            .bind(symbol)
            .bind(obs.timestamp.timestamp())
            .bind(price_to_text(obs.price)?)
            .execute(&mut *tx)
            .await
            .context("Failed to save observation")?;
            written += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit observations")?;
        info!("Stored {} observations for {}", written, symbol);
        Ok(written)
    }
}

fn price_to_text(price: f64) -> Result<String> {
    Decimal::from_f64(price)
        .map(|d| d.normalize().to_string())
        .with_context(|| format!("Price {} cannot be stored as a decimal", price))
}

fn price_from_text(raw: &str) -> Result<f64> {
    Decimal::from_str(raw)
        .ok()
        .and_then(|d| d.to_f64())
        .with_context(|| format!("Stored price '{}' is not a valid decimal", raw))
}

fn timestamp_from_secs(secs: i64) -> Result<DateTime<Utc>> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .with_context(|| format!("Invalid stored timestamp {}", secs))
}

#[async_trait]
impl SeriesStore for SqliteSeriesStore {
    async fn fetch(&self, symbol: &str, range: FetchRange) -> Result<Vec<Observation>> {
        let start = range.start.map_or(i64::MIN, |t| t.timestamp());
        let end = range.end.map_or(i64::MAX, |t| t.timestamp());

        let rows = sqlx::query(
            "SELECT timestamp, close FROM historical_data WHERE currency_pair = ? AND timestamp >= ? AND timestamp <= ? ORDER BY timestamp ASC",
        )
        .bind(symbol)
        .bind(start)
        .bind(end)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch historical data")?;

        let mut series = Vec::with_capacity(rows.len());
        for row in rows {
            let close: String = row.try_get("close")?;
            series.push(Observation {
                timestamp: timestamp_from_secs(row.try_get("timestamp")?)?,
                price: price_from_text(&close)?,
            });
        }
        debug!("Loaded {} rows of {} from SQLite", series.len(), symbol);
        Ok(series)
    }

    async fn persist(&self, prediction: &PredictionResult) -> Result<String> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO predictions (
                id, currency_pair, current_price, predicted_value, change_pct,
                direction, recommendation, confidence, confidence_scale,
                model_version, lookback, training_samples,
                final_loss, final_val_loss, mae, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&prediction.symbol)
        .bind(price_to_text(prediction.current_price)?)
        .bind(price_to_text(prediction.predicted_price)?)
        .bind(prediction.change_pct)
        .bind(prediction.direction.to_string())
        .bind(prediction.recommendation.to_string())
        .bind(prediction.confidence.value)
        .bind(prediction.confidence.scale.to_string())
        .bind(&prediction.model_version)
        .bind(prediction.lookback as i64)
        .bind(prediction.training_sample_count as i64)
        .bind(prediction.training.final_loss)
        .bind(prediction.training.final_val_loss)
        .bind(prediction.evaluation.mae)
        .bind(prediction.created_at.timestamp_millis())
        .execute(&self.pool)
        .await
        .context("Failed to save prediction")?;

        info!("Persisted prediction {} for {}", id, prediction.symbol);
        Ok(id)
    }

    async fn latest(&self, symbol: &str) -> Result<Option<StoredPrediction>> {
        let row = sqlx::query(
            "SELECT * FROM predictions WHERE currency_pair = ? ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load latest prediction")?;

        let Some(row) = row else {
            return Ok(None);
        };

        let created_ms: i64 = row.try_get("created_at")?;
        let created_at = DateTime::<Utc>::from_timestamp_millis(created_ms)
            .with_context(|| format!("Invalid stored created_at {}", created_ms))?;
        let direction: String = row.try_get("direction")?;
        let recommendation: String = row.try_get("recommendation")?;
        let scale: String = row.try_get("confidence_scale")?;
        let current_price: String = row.try_get("current_price")?;
        let predicted_value: String = row.try_get("predicted_value")?;

        Ok(Some(StoredPrediction {
            id: row.try_get("id")?,
            symbol: row.try_get("currency_pair")?,
            current_price: price_from_text(&current_price)?,
            predicted_price: price_from_text(&predicted_value)?,
            direction: direction.parse()?,
            recommendation: recommendation.parse()?,
            confidence: Confidence {
                value: row.try_get("confidence")?,
                scale: scale.parse()?,
            },
            model_version: row.try_get("model_version")?,
            training_samples: row.try_get::<i64, _>("training_samples")? as usize,
            created_at,
            is_recent: StoredPrediction::is_recent_at(created_at, Utc::now()),
        }))
    }
}
