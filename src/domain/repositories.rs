//! Repository Pattern Abstractions
//!
//! The prediction pipeline talks to its data store only through
//! [`SeriesStore`], keeping the numeric core independent of SQL.
//!
//! # Contract
//!
//! - `fetch` returns observations sorted ascending by timestamp. The pipeline
//!   validates the order but never re-sorts.
//! - An empty `fetch` result means "no data", not "store unreachable".
//!   Connectivity problems must surface as `Err`.
//! - `persist` is append-only and returns the generated identifier.
//!
//! # Example
//!
//! ```rust,no_run
//! use fxpredict::domain::repositories::SeriesStore;
//! use fxpredict::domain::series::FetchRange;
//! use fxpredict::infrastructure::repositories::InMemorySeriesStore;
//!
//! # async {
//! let store = InMemorySeriesStore::new();
//! let series = store.fetch("EUR/USD", FetchRange::all()).await?;
//! # anyhow::Ok(())
//! # };
//! ```

use crate::domain::prediction::{PredictionResult, StoredPrediction};
use crate::domain::series::{FetchRange, Observation};
use anyhow::Result;
use async_trait::async_trait;

#[async_trait]
pub trait SeriesStore: Send + Sync {
    /// Ordered closing prices for `symbol` within `range`
    async fn fetch(&self, symbol: &str, range: FetchRange) -> Result<Vec<Observation>>;

    /// Append a prediction, returning its generated id
    async fn persist(&self, prediction: &PredictionResult) -> Result<String>;

    /// Most recent stored prediction for `symbol`
    async fn latest(&self, symbol: &str) -> Result<Option<StoredPrediction>>;
}
