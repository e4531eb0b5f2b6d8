use super::normalizer::{NormalizationState, NormalizedSeries};
use crate::domain::errors::PredictionError;

/// `lookback` consecutive normalized prices and the value that follows them
#[derive(Debug, Clone, PartialEq)]
pub struct Window {
    pub offset: usize,
    pub input: Vec<f64>,
    pub target: f64,
}

/// Every one-step-ahead window of a normalized series, in offset order
#[derive(Debug, Clone)]
pub struct WindowSet {
    state: NormalizationState,
    lookback: usize,
    windows: Vec<Window>,
    latest_input: Vec<f64>,
}

impl WindowSet {
    /// Slide a `lookback`-wide window over the series.
    ///
    /// A series of length N yields exactly `N - lookback` windows; window `i`
    /// reads `series[i..i + lookback]` and targets `series[i + lookback]`.
    pub fn build(series: &NormalizedSeries, lookback: usize) -> Result<Self, PredictionError> {
        let values = series.values();
        if lookback == 0 || values.len() <= lookback {
            return Err(PredictionError::InsufficientHistory {
                len: values.len(),
                lookback,
            });
        }

        let windows = values
            .windows(lookback + 1)
            .enumerate()
            .map(|(offset, slice)| Window {
                offset,
                input: slice[..lookback].to_vec(),
                target: slice[lookback],
            })
            .collect();

        Ok(Self {
            state: series.state(),
            lookback,
            windows,
            latest_input: values[values.len() - lookback..].to_vec(),
        })
    }

    pub fn state(&self) -> NormalizationState {
        self.state
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// The last `lookback` values: input for forecasting past the series end
    pub fn latest_input(&self) -> &[f64] {
        &self.latest_input
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(n: usize) -> NormalizedSeries {
        let raw: Vec<f64> = (0..n).map(|i| 1.0 + i as f64 * 0.001).collect();
        NormalizedSeries::fit(&raw).unwrap()
    }

    #[test]
    fn test_window_count_and_targets() {
        let normalized = series(40);
        for lookback in [1, 7, 10, 39] {
            let set = WindowSet::build(&normalized, lookback).unwrap();
            assert_eq!(set.len(), 40 - lookback);
            for (i, window) in set.windows().iter().enumerate() {
                assert_eq!(window.offset, i);
                assert_eq!(window.input.len(), lookback);
                assert_eq!(window.input[0], normalized.values()[i]);
                assert_eq!(window.target, normalized.values()[i + lookback]);
            }
        }
    }

    #[test]
    fn test_latest_input_is_series_tail() {
        let normalized = series(12);
        let set = WindowSet::build(&normalized, 4).unwrap();
        assert_eq!(set.latest_input(), &normalized.values()[8..]);
        assert_eq!(set.lookback(), 4);
        assert_eq!(set.state(), normalized.state());
    }

    #[test]
    fn test_lookback_must_be_smaller_than_series() {
        let normalized = series(10);
        assert_eq!(
            WindowSet::build(&normalized, 10).unwrap_err(),
            PredictionError::InsufficientHistory { len: 10, lookback: 10 }
        );
        assert!(WindowSet::build(&normalized, 0).is_err());
    }
}
