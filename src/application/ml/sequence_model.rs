use super::network::{Dropout, LstmNetwork, NetworkShape};
use super::optimizer::{Adam, clip_global_norm};
use crate::config::ModelConfig;
use crate::domain::errors::PredictionError;
use crate::domain::ml::normalizer::NormalizationState;
use crate::domain::ml::windows::Window;
use crate::domain::prediction::{EpochLoss, EvaluationMetrics, TrainingReport};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use statrs::statistics::{Data, Distribution};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Next-value regressor over normalized windows.
///
/// A model is built, trained and used for a single pipeline run. Nothing is
/// persisted between runs.
#[derive(Debug, Clone)]
pub struct SequenceModel {
    config: ModelConfig,
    lookback: usize,
    network: LstmNetwork,
    rng: StdRng,
}

struct BestEpoch {
    epoch: usize,
    val_loss: f64,
    network: LstmNetwork,
}

impl SequenceModel {
    pub fn new(config: ModelConfig, lookback: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let network = LstmNetwork::new(
            NetworkShape {
                hidden_units: config.hidden_units,
                layers: config.layers.max(1),
                dense_units: config.dense_units,
                residual: config.residual,
            },
            &mut rng,
        );

        Self {
            config,
            lookback,
            network,
            rng,
        }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn parameter_count(&self) -> usize {
        self.network.parameter_count()
    }

    /// Index of the first validation window for a chronological split.
    ///
    /// Both sides keep at least one window.
    pub fn split_point(windows: usize, train_fraction: f64) -> Result<usize, PredictionError> {
        if windows < 2 {
            return Err(PredictionError::TooFewWindows {
                windows,
                required: 2,
            });
        }
        let raw = (windows as f64 * train_fraction).floor() as usize;
        Ok(raw.clamp(1, windows - 1))
    }

    pub fn train(
        &mut self,
        windows: &[Window],
        train_fraction: f64,
    ) -> Result<TrainingReport, PredictionError> {
        let split = Self::split_point(windows.len(), train_fraction)?;
        let (train, validation) = windows.split_at(split);

        info!(
            "Training sequence model: {} train / {} validation windows, lookback {}, {} parameters",
            train.len(),
            validation.len(),
            self.lookback,
            self.network.parameter_count()
        );

        let started = Instant::now();
        let batch_size = self.config.batch_size.max(1);
        let mut optimizer = Adam::new(&self.network, self.config.learning_rate);
        let mut order: Vec<usize> = (0..train.len()).collect();
        let mut best: Option<BestEpoch> = None;
        let mut stale_epochs = 0;
        let mut stopped_early = false;
        let mut epochs_run = 0;
        let mut history = Vec::with_capacity(self.config.max_epochs);

        for epoch in 1..=self.config.max_epochs {
            order.shuffle(&mut self.rng);

            let mut epoch_loss = 0.0;
            for batch in order.chunks(batch_size) {
                epoch_loss += self.train_batch(train, batch, &mut optimizer);
            }
            let train_loss = epoch_loss / train.len() as f64;
            let val_loss = self.mse(validation);
            epochs_run = epoch;

            if !train_loss.is_finite() || !val_loss.is_finite() {
                return Err(PredictionError::TrainingDiverged { epoch });
            }

            debug!(
                "Epoch {}/{}: train_loss={:.6} val_loss={:.6}",
                epoch, self.config.max_epochs, train_loss, val_loss
            );
            history.push(EpochLoss {
                epoch,
                train_loss,
                val_loss,
            });

            let improved = match &best {
                Some(b) => val_loss < b.val_loss - self.config.min_delta,
                None => true,
            };
            if improved {
                best = Some(BestEpoch {
                    epoch,
                    val_loss,
                    network: self.network.clone(),
                });
                stale_epochs = 0;
            } else {
                stale_epochs += 1;
            }

            let elapsed = started.elapsed();
            if elapsed >= self.config.max_training_duration {
                return Err(PredictionError::TrainingTimeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                    epochs_completed: epoch,
                    best_val_loss: best.as_ref().map(|b| b.val_loss),
                });
            }

            if stale_epochs >= self.config.patience && self.config.patience > 0 {
                warn!(
                    "Early stopping at epoch {}: no validation improvement for {} epochs",
                    epoch, stale_epochs
                );
                stopped_early = true;
                break;
            }
        }

        let (best_epoch, final_val_loss) = match best {
            Some(b) => {
                self.network = b.network;
                (b.epoch, b.val_loss)
            }
            None => (0, self.mse(validation)),
        };
        let final_loss = self.mse(train);

        info!(
            "Training finished after {} epochs in {:.2}s (best epoch {}, val_loss={:.6})",
            epochs_run,
            started.elapsed().as_secs_f64(),
            best_epoch,
            final_val_loss
        );

        Ok(TrainingReport {
            train_samples: train.len(),
            validation_samples: validation.len(),
            epochs_run,
            best_epoch,
            stopped_early,
            final_loss,
            final_val_loss,
            history,
        })
    }

    /// One optimizer step over `batch` (indices into `train`); returns the
    /// summed squared error of the batch.
    fn train_batch(&mut self, train: &[Window], batch: &[usize], optimizer: &mut Adam) -> f64 {
        let mut grads = self.network.zeros_like();
        let mut loss = 0.0;
        let scale = 2.0 / batch.len() as f64;

        for &idx in batch {
            let window = &train[idx];
            let trace = self.network.forward_trace(
                &window.input,
                Some(Dropout {
                    rate: self.config.dropout,
                    rng: &mut self.rng,
                }),
            );
            let err = trace.output - window.target;
            loss += err * err;
            self.network.backward(&trace, scale * err, &mut grads);
        }

        clip_global_norm(&mut grads, self.config.clip_norm);
        optimizer.update(&mut self.network, &grads);
        loss
    }

    /// Deterministic forecast for one normalized input window
    pub fn predict(&self, input: &[f64]) -> f64 {
        self.network.predict(input)
    }

    /// Mean squared error in the normalized domain
    pub fn mse(&self, windows: &[Window]) -> f64 {
        if windows.is_empty() {
            return 0.0;
        }
        let total: f64 = windows
            .iter()
            .map(|w| {
                let err = self.predict(&w.input) - w.target;
                err * err
            })
            .sum();
        total / windows.len() as f64
    }

    /// Error metrics in the price domain
    pub fn evaluate(&self, windows: &[Window], state: NormalizationState) -> EvaluationMetrics {
        if windows.is_empty() {
            return EvaluationMetrics {
                mae: 0.0,
                mse: 0.0,
                mean_actual: 0.0,
                samples: 0,
            };
        }

        let pairs: Vec<(f64, f64)> = windows
            .iter()
            .map(|w| (state.invert(self.predict(&w.input)), state.invert(w.target)))
            .collect();

        let abs_errors = Data::new(pairs.iter().map(|(p, a)| (p - a).abs()).collect::<Vec<_>>());
        let sq_errors = Data::new(pairs.iter().map(|(p, a)| (p - a).powi(2)).collect::<Vec<_>>());
        let actuals = Data::new(pairs.iter().map(|(_, a)| *a).collect::<Vec<_>>());

        EvaluationMetrics {
            mae: abs_errors.mean().unwrap_or(0.0),
            mse: sq_errors.mean().unwrap_or(0.0),
            mean_actual: actuals.mean().unwrap_or(0.0),
            samples: pairs.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Profile;
    use crate::domain::ml::normalizer::NormalizedSeries;
    use crate::domain::ml::windows::WindowSet;
    use std::time::Duration;

    fn small_config() -> ModelConfig {
        ModelConfig {
            hidden_units: 8,
            max_epochs: 30,
            batch_size: 8,
            learning_rate: 0.01,
            ..ModelConfig::for_profile(Profile::Fraction)
        }
    }

    fn sine_windows(n: usize, lookback: usize) -> WindowSet {
        let prices: Vec<f64> = (0..n)
            .map(|i| 1.1 + 0.02 * (i as f64 * 0.3).sin())
            .collect();
        let series = NormalizedSeries::fit(&prices).unwrap();
        WindowSet::build(&series, lookback).unwrap()
    }

    #[test]
    fn test_split_point_is_clamped() {
        assert_eq!(SequenceModel::split_point(10, 0.8).unwrap(), 8);
        assert_eq!(SequenceModel::split_point(2, 0.8).unwrap(), 1);
        assert_eq!(SequenceModel::split_point(5, 1.0).unwrap(), 4);
        assert_eq!(SequenceModel::split_point(5, 0.0).unwrap(), 1);
        assert!(matches!(
            SequenceModel::split_point(1, 0.8),
            Err(PredictionError::TooFewWindows { windows: 1, .. })
        ));
    }

    #[test]
    fn test_training_reduces_loss() {
        let set = sine_windows(60, 6);
        let mut model = SequenceModel::new(small_config(), 6);
        let before = model.mse(set.windows());

        let report = model.train(set.windows(), 0.8).unwrap();

        assert_eq!(report.train_samples + report.validation_samples, set.len());
        assert!(report.epochs_run >= 1);
        assert!(report.final_loss.is_finite());
        assert!(model.mse(set.windows()) < before);
    }

    #[test]
    fn test_restores_best_validation_parameters() {
        let set = sine_windows(50, 5);
        let mut model = SequenceModel::new(small_config(), 5);
        let report = model.train(set.windows(), 0.8).unwrap();

        let split = report.train_samples;
        let val_loss = model.mse(&set.windows()[split..]);
        assert!((val_loss - report.final_val_loss).abs() < 1e-12);

        let best = report
            .history
            .iter()
            .map(|e| e.val_loss)
            .fold(f64::INFINITY, f64::min);
        assert!((best - report.final_val_loss).abs() < 1e-12);
        assert_eq!(report.history[report.best_epoch - 1].val_loss, best);
    }

    #[test]
    fn test_stops_after_patience_stale_epochs() {
        let set = sine_windows(50, 5);
        // Normalized MSE never drops by 10, so only the first epoch improves
        let config = ModelConfig {
            max_epochs: 200,
            patience: 3,
            min_delta: 10.0,
            ..small_config()
        };
        let mut model = SequenceModel::new(config, 5);
        let report = model.train(set.windows(), 0.8).unwrap();

        assert!(report.stopped_early);
        assert_eq!(report.best_epoch, 1);
        assert_eq!(report.epochs_run, report.best_epoch + 3);
        assert_eq!(report.history.len(), 4);
    }

    #[test]
    fn test_stopping_rule_holds_on_real_training() {
        let set = sine_windows(60, 6);
        let config = ModelConfig {
            max_epochs: 400,
            patience: 3,
            ..small_config()
        };
        let mut model = SequenceModel::new(config, 6);
        let report = model.train(set.windows(), 0.8).unwrap();

        if report.epochs_run < 400 {
            assert!(report.stopped_early);
            assert_eq!(report.epochs_run, report.best_epoch + 3);
        } else {
            assert!(!report.stopped_early);
        }
    }

    #[test]
    fn test_exploding_updates_are_reported_as_divergence() {
        let set = sine_windows(40, 5);
        let config = ModelConfig {
            learning_rate: 1e200,
            clip_norm: 1e300,
            dropout: 0.0,
            ..small_config()
        };
        let mut model = SequenceModel::new(config, 5);

        assert!(matches!(
            model.train(set.windows(), 0.8),
            Err(PredictionError::TrainingDiverged { .. })
        ));
    }

    #[test]
    fn test_zero_duration_times_out_with_diagnostics() {
        let set = sine_windows(40, 5);
        let config = ModelConfig {
            max_training_duration: Duration::ZERO,
            ..small_config()
        };
        let mut model = SequenceModel::new(config, 5);

        match model.train(set.windows(), 0.8) {
            Err(PredictionError::TrainingTimeout {
                epochs_completed,
                best_val_loss,
                ..
            }) => {
                assert_eq!(epochs_completed, 1);
                assert!(best_val_loss.is_some());
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[test]
    fn test_same_seed_is_reproducible() {
        let set = sine_windows(40, 5);
        let mut a = SequenceModel::new(small_config(), 5);
        let mut b = SequenceModel::new(small_config(), 5);
        a.train(set.windows(), 0.8).unwrap();
        b.train(set.windows(), 0.8).unwrap();
        assert_eq!(a.predict(set.latest_input()), b.predict(set.latest_input()));
    }

    #[test]
    fn test_evaluate_reports_price_domain_errors() {
        let set = sine_windows(40, 5);
        let model = SequenceModel::new(small_config(), 5);
        let metrics = model.evaluate(set.windows(), set.state());

        assert_eq!(metrics.samples, set.len());
        assert!(metrics.mean_actual > 1.07 && metrics.mean_actual < 1.13);
        assert!(metrics.mae >= 0.0);
        assert!(metrics.mse <= metrics.mae.max(1.0));
    }
}
