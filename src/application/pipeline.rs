use crate::application::ml::SequenceModel;
use crate::application::signals::SignalDeriver;
use crate::config::Config;
use crate::domain::errors::PredictionError;
use crate::domain::ml::normalizer::NormalizedSeries;
use crate::domain::ml::windows::WindowSet;
use crate::domain::prediction::{
    PlaceholderPrediction, PredictionOutcome, PredictionResult, StoredPrediction,
};
use crate::domain::repositories::SeriesStore;
use crate::domain::series::{self, FetchRange, Observation};
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Result of one pipeline run: the outcome plus the stored row id when the
/// outcome was persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineRun {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction_id: Option<String>,
    #[serde(flatten)]
    pub outcome: PredictionOutcome,
}

/// Fetch → normalize → window → train → predict → signal → persist
pub struct PredictionPipeline {
    store: Arc<dyn SeriesStore>,
    config: Config,
}

impl PredictionPipeline {
    pub fn new(store: Arc<dyn SeriesStore>, config: Config) -> Result<Self, PredictionError> {
        config.validate()?;
        Ok(Self { store, config })
    }

    fn fetch_range(&self) -> FetchRange {
        match self.config.pipeline.history_days {
            Some(days) => FetchRange::last_days(Utc::now(), days),
            None => FetchRange::all(),
        }
    }

    /// Train on `series` and forecast the step after its last observation.
    ///
    /// CPU bound; async callers should go through [`PredictionPipeline::run`],
    /// which moves this onto the blocking pool.
    pub fn forecast(
        symbol: &str,
        series: &[Observation],
        config: &Config,
    ) -> Result<PredictionResult, PredictionError> {
        series::validate(series)?;

        let required = config.pipeline.min_observations;
        if series.len() < required {
            return Err(PredictionError::InsufficientData {
                symbol: symbol.to_string(),
                observations: series.len(),
                required,
            });
        }

        let prices = series::closes(series);
        let current_price = match prices.last() {
            Some(p) => *p,
            None => {
                return Err(PredictionError::Internal {
                    reason: "validated series is empty".to_string(),
                });
            }
        };

        let lookback = config.pipeline.lookback_for(prices.len());
        let normalized = NormalizedSeries::fit(&prices)?;
        let windows = WindowSet::build(&normalized, lookback)?;
        let state = windows.state();

        let mut model = SequenceModel::new(config.model.clone(), lookback);
        let training = model.train(windows.windows(), config.pipeline.train_fraction)?;

        let predicted_price = state.invert(model.predict(windows.latest_input()));
        let evaluation = model.evaluate(&windows.windows()[training.train_samples..], state);
        let signal = SignalDeriver::new(config.pipeline.confidence_policy).derive(
            predicted_price,
            current_price,
            &evaluation,
        );

        info!(
            "{}: current={:.5} predicted={:.5} change={:+.3}% -> {} ({} {:.2})",
            symbol,
            current_price,
            predicted_price,
            signal.change_pct,
            signal.recommendation,
            signal.confidence.scale,
            signal.confidence.value
        );

        Ok(PredictionResult {
            symbol: symbol.to_string(),
            current_price,
            predicted_price,
            change_pct: signal.change_pct,
            direction: signal.direction,
            recommendation: signal.recommendation,
            confidence: signal.confidence,
            model_version: config.pipeline.model_version.clone(),
            lookback,
            training_sample_count: training.train_samples,
            training,
            evaluation,
            created_at: Utc::now(),
        })
    }

    pub async fn run(&self, symbol: &str) -> Result<PipelineRun, PredictionError> {
        info!("Starting prediction run for {}", symbol);

        let series = self
            .store
            .fetch(symbol, self.fetch_range())
            .await
            .map_err(PredictionError::store)?;
        info!("Fetched {} observations for {}", series.len(), symbol);

        let last_price = series.last().map(|o| o.price);
        let config = self.config.clone();
        let owned_symbol = symbol.to_string();
        let forecast = tokio::task::spawn_blocking(move || {
            Self::forecast(&owned_symbol, &series, &config)
        })
        .await
        .map_err(|e| PredictionError::Internal {
            reason: format!("prediction task failed: {}", e),
        })?;

        match forecast {
            Ok(result) => {
                let id = self
                    .store
                    .persist(&result)
                    .await
                    .map_err(PredictionError::store)?;
                info!("Persisted prediction {} for {}", id, symbol);
                Ok(PipelineRun {
                    prediction_id: Some(id),
                    outcome: PredictionOutcome::Forecast(result),
                })
            }
            Err(PredictionError::InsufficientData {
                observations,
                required,
                ..
            }) => {
                warn!(
                    "Insufficient data for {}: {} observations, {} required. Returning placeholder",
                    symbol, observations, required
                );
                Ok(PipelineRun {
                    prediction_id: None,
                    outcome: PredictionOutcome::Placeholder(PlaceholderPrediction::new(
                        symbol,
                        observations,
                        required,
                        last_price,
                        self.config.pipeline.confidence_policy.scale(),
                    )),
                })
            }
            Err(e) => {
                error!("Prediction for {} failed: {}", symbol, e);
                Err(e)
            }
        }
    }

    /// Independent runs for several symbols, at most
    /// `max_concurrent_runs` at a time. Results keep the input order.
    pub async fn predict_many(
        &self,
        symbols: &[String],
    ) -> Vec<(String, Result<PipelineRun, PredictionError>)> {
        let limit = self.config.pipeline.max_concurrent_runs.max(1);
        stream::iter(symbols.iter().cloned())
            .map(|symbol| async move {
                let result = self.run(&symbol).await;
                (symbol, result)
            })
            .buffered(limit)
            .collect()
            .await
    }

    pub async fn latest(&self, symbol: &str) -> Result<Option<StoredPrediction>, PredictionError> {
        self.store
            .latest(symbol)
            .await
            .map_err(PredictionError::store)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::domain::errors::ErrorKind;
    use chrono::{Duration, TimeZone};

    fn series_of(prices: &[f64]) -> Vec<Observation> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        prices
            .iter()
            .enumerate()
            .map(|(i, p)| Observation::new(start + Duration::days(i as i64), *p))
            .collect()
    }

    fn fast_config(profile: Profile) -> Config {
        let mut config = Config::for_profile(profile);
        config.model.hidden_units = 8;
        config.model.max_epochs = 5;
        config
    }

    #[test]
    fn test_forecast_short_series_is_insufficient_data() {
        let series = series_of(&[1.1; 29]);
        let err = PredictionPipeline::forecast("EUR/USD", &series, &fast_config(Profile::Fraction))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientData);
    }

    #[test]
    fn test_forecast_constant_series_is_degenerate() {
        let series = series_of(&[1.2345; 40]);
        let err = PredictionPipeline::forecast("EUR/USD", &series, &fast_config(Profile::Fraction))
            .unwrap_err();
        assert_eq!(err, PredictionError::DegenerateSeries { value: 1.2345 });
    }

    #[test]
    fn test_forecast_rejects_unordered_series() {
        let mut series = series_of(&(0..40).map(|i| 1.0 + i as f64 * 0.001).collect::<Vec<_>>());
        series.swap(3, 4);
        let err = PredictionPipeline::forecast("EUR/USD", &series, &fast_config(Profile::Fraction))
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidSeries);
    }

    #[test]
    fn test_forecast_uses_profile_lookback_and_scale() {
        let prices: Vec<f64> = (0..48).map(|i| 1.2 + 0.01 * (i as f64 * 0.4).sin()).collect();
        let series = series_of(&prices);

        let percent = PredictionPipeline::forecast("GBP/USD", &series, &fast_config(Profile::Percent))
            .unwrap();
        assert_eq!(percent.lookback, 10);
        assert_eq!(percent.confidence.scale.to_string(), "percent");
        assert!(percent.confidence.value <= 85.0);
        assert_eq!(percent.model_version, "2.0.0");

        let fraction =
            PredictionPipeline::forecast("GBP/USD", &series, &fast_config(Profile::Fraction))
                .unwrap();
        assert_eq!(fraction.lookback, 7);
        assert!((0.5..=0.95).contains(&fraction.confidence.value));
        assert_eq!(fraction.training_sample_count, fraction.training.train_samples);
        assert_eq!(fraction.current_price, *prices.last().unwrap());
    }
}
