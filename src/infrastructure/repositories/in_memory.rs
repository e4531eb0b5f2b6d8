//! In-Memory Series Store
//!
//! Thread-safe, in-memory implementation of
//! [`SeriesStore`](crate::domain::repositories::SeriesStore).
//!
//! - **Thread-safe**: Uses `Arc<RwLock>` for concurrent access
//! - **Testing**: Ideal for unit tests and offline runs
//!
//! Data is lost when the process exits. Use
//! [`SqliteSeriesStore`](crate::infrastructure::persistence::SqliteSeriesStore)
//! for anything that must survive a restart.

use crate::domain::prediction::{PredictionResult, StoredPrediction};
use crate::domain::repositories::SeriesStore;
use crate::domain::series::{FetchRange, Observation};
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A prediction as recorded by [`InMemorySeriesStore::persist`]
#[derive(Debug, Clone)]
pub struct PersistedPrediction {
    pub id: String,
    pub result: PredictionResult,
}

pub struct InMemorySeriesStore {
    series: Arc<RwLock<HashMap<String, Vec<Observation>>>>,
    predictions: Arc<RwLock<Vec<PersistedPrediction>>>,
}

impl InMemorySeriesStore {
    pub fn new() -> Self {
        Self {
            series: Arc::new(RwLock::new(HashMap::new())),
            predictions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Store preloaded with one symbol's history
    pub fn with_series(symbol: &str, series: Vec<Observation>) -> Self {
        let mut map = HashMap::new();
        map.insert(symbol.to_string(), series);
        Self {
            series: Arc::new(RwLock::new(map)),
            predictions: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Replace the history of `symbol`
    pub async fn insert_series(&self, symbol: &str, series: Vec<Observation>) {
        self.series.write().await.insert(symbol.to_string(), series);
    }

    /// Everything persisted so far, oldest first
    pub async fn persisted(&self) -> Vec<PersistedPrediction> {
        self.predictions.read().await.clone()
    }
}

impl Default for InMemorySeriesStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SeriesStore for InMemorySeriesStore {
    async fn fetch(&self, symbol: &str, range: FetchRange) -> Result<Vec<Observation>> {
        let series = self.series.read().await;
        Ok(series
            .get(symbol)
            .map(|s| {
                s.iter()
                    .filter(|o| range.contains(o.timestamp))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn persist(&self, prediction: &PredictionResult) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.predictions.write().await.push(PersistedPrediction {
            id: id.clone(),
            result: prediction.clone(),
        });
        Ok(id)
    }

    async fn latest(&self, symbol: &str) -> Result<Option<StoredPrediction>> {
        let predictions = self.predictions.read().await;
        Ok(predictions
            .iter()
            .rev()
            .find(|p| p.result.symbol == symbol)
            .map(|p| StoredPrediction {
                id: p.id.clone(),
                symbol: p.result.symbol.clone(),
                current_price: p.result.current_price,
                predicted_price: p.result.predicted_price,
                direction: p.result.direction,
                recommendation: p.result.recommendation,
                confidence: p.result.confidence,
                model_version: p.result.model_version.clone(),
                training_samples: p.result.training_sample_count,
                created_at: p.result.created_at,
                is_recent: StoredPrediction::is_recent_at(p.result.created_at, Utc::now()),
            }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn observations(n: usize) -> Vec<Observation> {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| Observation::new(start + Duration::days(i as i64), 1.1 + i as f64 * 0.001))
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_filters_by_range() {
        let store = InMemorySeriesStore::with_series("EUR/USD", observations(10));

        let all = store.fetch("EUR/USD", FetchRange::all()).await.unwrap();
        assert_eq!(all.len(), 10);

        let start = Utc.with_ymd_and_hms(2024, 3, 6, 0, 0, 0).unwrap();
        let tail = store
            .fetch(
                "EUR/USD",
                FetchRange {
                    start: Some(start),
                    end: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0].timestamp, start);
    }

    #[test]
    fn test_insert_series_replaces_history() {
        let store = InMemorySeriesStore::with_series("AUD/USD", observations(10));
        let fetched = tokio_test::block_on(async {
            store.insert_series("AUD/USD", observations(3)).await;
            store.fetch("AUD/USD", FetchRange::all()).await
        })
        .unwrap();
        assert_eq!(fetched.len(), 3);
    }

    #[tokio::test]
    async fn test_unknown_symbol_is_empty() {
        let store = InMemorySeriesStore::new();
        assert!(store.fetch("USD/JPY", FetchRange::all()).await.unwrap().is_empty());
        assert!(store.latest("USD/JPY").await.unwrap().is_none());
    }
}
