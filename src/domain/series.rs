use crate::domain::errors::PredictionError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One closing price of a currency pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

impl Observation {
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Optional time bounds for a series fetch (both ends inclusive)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl FetchRange {
    pub fn all() -> Self {
        Self::default()
    }

    /// The trailing `days` ending at `now`
    pub fn last_days(now: DateTime<Utc>, days: i64) -> Self {
        Self {
            start: Some(now - Duration::days(days)),
            end: Some(now),
        }
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| ts >= s) && self.end.is_none_or(|e| ts <= e)
    }
}

/// Closing prices in series order
pub fn closes(series: &[Observation]) -> Vec<f64> {
    series.iter().map(|o| o.price).collect()
}

/// Checks the ordering and price invariants the pipeline relies on.
///
/// The series is not re-sorted; stores must return rows ascending by timestamp.
pub fn validate(series: &[Observation]) -> Result<(), PredictionError> {
    for (idx, obs) in series.iter().enumerate() {
        if !obs.price.is_finite() || obs.price <= 0.0 {
            return Err(PredictionError::InvalidSeries {
                reason: format!("price at index {} is not a positive number: {}", idx, obs.price),
            });
        }
    }

    if let Some(pos) = series
        .windows(2)
        .position(|pair| pair[1].timestamp <= pair[0].timestamp)
    {
        return Err(PredictionError::InvalidSeries {
            reason: format!(
                "timestamps must be strictly ascending (index {} at {} follows {})",
                pos + 1,
                series[pos + 1].timestamp,
                series[pos].timestamp
            ),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    #[test]
    fn test_validate_accepts_ascending_series() {
        let series: Vec<_> = (0..5).map(|i| Observation::new(day(i), 1.1 + i as f64 * 0.01)).collect();
        assert!(validate(&series).is_ok());
        assert_eq!(closes(&series).len(), 5);
    }

    #[test]
    fn test_validate_rejects_duplicate_timestamp() {
        let series = vec![
            Observation::new(day(0), 1.1),
            Observation::new(day(1), 1.2),
            Observation::new(day(1), 1.3),
        ];
        let err = validate(&series).unwrap_err();
        assert!(matches!(err, PredictionError::InvalidSeries { .. }));
        assert!(err.to_string().contains("index 2"));
    }

    #[test]
    fn test_validate_rejects_non_positive_price() {
        let series = vec![Observation::new(day(0), 1.1), Observation::new(day(1), 0.0)];
        assert!(validate(&series).is_err());

        let series = vec![Observation::new(day(0), f64::NAN)];
        assert!(validate(&series).is_err());
    }

    #[test]
    fn test_fetch_range_contains() {
        let range = FetchRange::last_days(day(10), 3);
        assert!(range.contains(day(8)));
        assert!(range.contains(day(7)));
        assert!(!range.contains(day(6)));
        assert!(!range.contains(day(11)));
        assert!(FetchRange::all().contains(day(-1000)));
    }
}
