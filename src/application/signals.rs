use crate::domain::prediction::{
    Confidence, ConfidencePolicy, Direction, EvaluationMetrics, Recommendation, Signal,
};

/// Moves strictly beyond this percentage become directional calls
pub const DIRECTION_THRESHOLD_PCT: f64 = 0.5;

const ERROR_CONFIDENCE_DAMPING: f64 = 0.85;

/// Turns a (predicted, current) price pair into a trading signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignalDeriver {
    policy: ConfidencePolicy,
}

impl SignalDeriver {
    pub fn new(policy: ConfidencePolicy) -> Self {
        Self { policy }
    }

    pub fn percent_change(predicted: f64, current: f64) -> f64 {
        (predicted - current) / current * 100.0
    }

    pub fn classify(change_pct: f64) -> (Direction, Recommendation) {
        if change_pct > DIRECTION_THRESHOLD_PCT {
            (Direction::Up, Recommendation::Buy)
        } else if change_pct < -DIRECTION_THRESHOLD_PCT {
            (Direction::Down, Recommendation::Sell)
        } else {
            (Direction::Neutral, Recommendation::Hold)
        }
    }

    /// `[0.5, 0.95]`: smaller predicted moves are trusted more
    pub fn magnitude_confidence(change_pct: f64) -> Confidence {
        Confidence::fraction((1.0 - change_pct.abs() / 10.0).clamp(0.5, 0.95))
    }

    /// `[0, 85]`: damped held-out accuracy
    pub fn error_confidence(metrics: &EvaluationMetrics) -> Confidence {
        if metrics.samples == 0 || metrics.mean_actual <= 0.0 || !metrics.mae.is_finite() {
            return Confidence::percent(0.0);
        }
        let accuracy = (100.0 - metrics.mae / metrics.mean_actual * 100.0).clamp(0.0, 100.0);
        Confidence::percent(accuracy * ERROR_CONFIDENCE_DAMPING)
    }

    pub fn derive(&self, predicted: f64, current: f64, metrics: &EvaluationMetrics) -> Signal {
        let change_pct = Self::percent_change(predicted, current);
        let (direction, recommendation) = Self::classify(change_pct);
        let confidence = match self.policy {
            ConfidencePolicy::Magnitude => Self::magnitude_confidence(change_pct),
            ConfidencePolicy::ErrorBased => Self::error_confidence(metrics),
        };

        Signal {
            change_pct,
            direction,
            recommendation,
            confidence,
        }
    }
}
