//! Min-max scaling between the raw price domain and `[0, 1]`.
//!
//! A [`NormalizationState`] is fitted once per pipeline run and is immutable
//! afterwards. Every [`NormalizedSeries`] carries the state that produced it,
//! so windows built from it can only be inverted with that same fit.

use crate::domain::errors::PredictionError;
use serde::Serialize;

/// Fitted `(min, max)` bounds of a training series
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizationState {
    domain_min: f64,
    domain_max: f64,
}

impl NormalizationState {
    /// Scan the series once for its bounds.
    pub fn fit(series: &[f64]) -> Result<Self, PredictionError> {
        if series.is_empty() {
            return Err(PredictionError::InvalidSeries {
                reason: "cannot fit a normalizer on an empty series".to_string(),
            });
        }

        let mut domain_min = f64::INFINITY;
        let mut domain_max = f64::NEG_INFINITY;
        for &value in series {
            if !value.is_finite() {
                return Err(PredictionError::InvalidSeries {
                    reason: format!("non-finite value {} in series", value),
                });
            }
            domain_min = domain_min.min(value);
            domain_max = domain_max.max(value);
        }

        if domain_max <= domain_min {
            return Err(PredictionError::DegenerateSeries { value: domain_min });
        }

        Ok(Self {
            domain_min,
            domain_max,
        })
    }

    pub fn domain_min(&self) -> f64 {
        self.domain_min
    }

    pub fn domain_max(&self) -> f64 {
        self.domain_max
    }

    fn span(&self) -> f64 {
        self.domain_max - self.domain_min
    }

    /// `(x - min) / (max - min)`; values outside the fitted domain extrapolate.
    pub fn transform(&self, value: f64) -> f64 {
        (value - self.domain_min) / self.span()
    }

    pub fn invert(&self, value: f64) -> f64 {
        value * self.span() + self.domain_min
    }

    /// Transform a whole series, binding the result to this state.
    pub fn normalize(&self, series: &[f64]) -> NormalizedSeries {
        NormalizedSeries {
            state: *self,
            values: series.iter().map(|&v| self.transform(v)).collect(),
        }
    }
}

/// A series in normalized space, tied to the state it was produced with
#[derive(Debug, Clone)]
pub struct NormalizedSeries {
    state: NormalizationState,
    values: Vec<f64>,
}

impl NormalizedSeries {
    /// Fit a fresh state on `series` and normalize it in one step.
    pub fn fit(series: &[f64]) -> Result<Self, PredictionError> {
        let state = NormalizationState::fit(series)?;
        Ok(state.normalize(series))
    }

    pub fn state(&self) -> NormalizationState {
        self.state
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
