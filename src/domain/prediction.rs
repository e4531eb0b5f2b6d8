use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

impl FromStr for Direction {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "UP" => Ok(Self::Up),
            "DOWN" => Ok(Self::Down),
            "NEUTRAL" => Ok(Self::Neutral),
            _ => anyhow::bail!("Invalid direction: {}", s),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Recommendation {
    Buy,
    Sell,
    Hold,
}

impl fmt::Display for Recommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

impl FromStr for Recommendation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(Self::Buy),
            "SELL" => Ok(Self::Sell),
            "HOLD" => Ok(Self::Hold),
            _ => anyhow::bail!("Invalid recommendation: {}", s),
        }
    }
}

/// Unit a confidence value is expressed in.
///
/// `Fraction` is `[0, 1]`, `Percent` is `[0, 100]`. Consumers must branch on
/// the tag instead of guessing from the magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceScale {
    Fraction,
    Percent,
}

impl fmt::Display for ConfidenceScale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fraction => write!(f, "fraction"),
            Self::Percent => write!(f, "percent"),
        }
    }
}

impl FromStr for ConfidenceScale {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fraction" => Ok(Self::Fraction),
            "percent" => Ok(Self::Percent),
            _ => anyhow::bail!("Invalid confidence scale: {}", s),
        }
    }
}

/// How confidence is scored; one policy per deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidencePolicy {
    /// Smaller predicted moves score higher, `[0.5, 0.95]` on the fraction scale
    Magnitude,
    /// Damped held-out accuracy, `[0, 85]` on the percent scale
    ErrorBased,
}

impl ConfidencePolicy {
    pub fn scale(&self) -> ConfidenceScale {
        match self {
            Self::Magnitude => ConfidenceScale::Fraction,
            Self::ErrorBased => ConfidenceScale::Percent,
        }
    }
}

impl FromStr for ConfidencePolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "magnitude" => Ok(Self::Magnitude),
            "error_based" | "error" => Ok(Self::ErrorBased),
            _ => anyhow::bail!(
                "Invalid confidence policy: {}. Must be 'magnitude' or 'error_based'",
                s
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    #[serde(rename = "confidence")]
    pub value: f64,
    #[serde(rename = "confidence_scale")]
    pub scale: ConfidenceScale,
}

impl Confidence {
    pub fn fraction(value: f64) -> Self {
        Self {
            value,
            scale: ConfidenceScale::Fraction,
        }
    }

    pub fn percent(value: f64) -> Self {
        Self {
            value,
            scale: ConfidenceScale::Percent,
        }
    }

    pub fn zero(scale: ConfidenceScale) -> Self {
        Self { value: 0.0, scale }
    }
}

/// Direction, recommendation and confidence derived from a forecast
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    pub change_pct: f64,
    pub direction: Direction,
    pub recommendation: Recommendation,
    pub confidence: Confidence,
}

/// Held-out error of the trained model, in price units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub mae: f64,
    pub mse: f64,
    pub mean_actual: f64,
    pub samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochLoss {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
}

/// Outcome of one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub train_samples: usize,
    pub validation_samples: usize,
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub stopped_early: bool,
    /// MSE on the training split with the restored parameters
    pub final_loss: f64,
    /// Best validation MSE observed (the restored parameters)
    pub final_val_loss: f64,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub history: Vec<EpochLoss>,
}

/// A completed forecast for one symbol
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    #[serde(rename = "currency_pair")]
    pub symbol: String,
    pub current_price: f64,
    #[serde(rename = "predicted_value")]
    pub predicted_price: f64,
    pub change_pct: f64,
    pub direction: Direction,
    pub recommendation: Recommendation,
    #[serde(flatten)]
    pub confidence: Confidence,
    pub model_version: String,
    pub lookback: usize,
    #[serde(rename = "training_samples")]
    pub training_sample_count: usize,
    pub training: TrainingReport,
    pub evaluation: EvaluationMetrics,
    pub created_at: DateTime<Utc>,
}

/// Degraded answer when the series is too short to train on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceholderPrediction {
    #[serde(rename = "currency_pair")]
    pub symbol: String,
    pub observations: usize,
    pub required: usize,
    pub current_price: Option<f64>,
    pub direction: Direction,
    pub recommendation: Recommendation,
    #[serde(flatten)]
    pub confidence: Confidence,
    pub reason: String,
}

impl PlaceholderPrediction {
    pub fn new(
        symbol: &str,
        observations: usize,
        required: usize,
        current_price: Option<f64>,
        scale: ConfidenceScale,
    ) -> Self {
        Self {
            symbol: symbol.to_string(),
            observations,
            required,
            current_price,
            direction: Direction::Neutral,
            recommendation: Recommendation::Hold,
            confidence: Confidence::zero(scale),
            reason: format!(
                "insufficient data: {} observations, {} required",
                observations, required
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictionOutcome {
    Forecast(PredictionResult),
    Placeholder(PlaceholderPrediction),
}

impl PredictionOutcome {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder(_))
    }

    pub fn as_forecast(&self) -> Option<&PredictionResult> {
        match self {
            Self::Forecast(r) => Some(r),
            Self::Placeholder(_) => None,
        }
    }
}

/// A persisted prediction row as read back from a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredPrediction {
    pub id: String,
    #[serde(rename = "currency_pair")]
    pub symbol: String,
    pub current_price: f64,
    #[serde(rename = "predicted_value")]
    pub predicted_price: f64,
    pub direction: Direction,
    pub recommendation: Recommendation,
    #[serde(flatten)]
    pub confidence: Confidence,
    pub model_version: String,
    pub training_samples: usize,
    pub created_at: DateTime<Utc>,
    pub is_recent: bool,
}

impl StoredPrediction {
    /// Predictions younger than this are flagged `is_recent`
    pub const RECENT_HOURS: i64 = 24;

    pub fn is_recent_at(created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now - created_at < chrono::Duration::hours(Self::RECENT_HOURS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_serializes_with_status_tag() {
        let outcome = PredictionOutcome::Placeholder(PlaceholderPrediction::new(
            "GBP/USD",
            12,
            30,
            Some(1.27),
            ConfidenceScale::Percent,
        ));

        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "placeholder");
        assert_eq!(json["currency_pair"], "GBP/USD");
        assert_eq!(json["direction"], "NEUTRAL");
        assert_eq!(json["recommendation"], "HOLD");
        assert_eq!(json["confidence"], 0.0);
        assert_eq!(json["confidence_scale"], "percent");
        assert!(outcome.is_placeholder());
        assert!(outcome.as_forecast().is_none());
    }

    #[test]
    fn test_enum_string_round_trips() {
        assert_eq!("up".parse::<Direction>().unwrap(), Direction::Up);
        assert_eq!(Direction::Neutral.to_string(), "NEUTRAL");
        assert_eq!("SELL".parse::<Recommendation>().unwrap(), Recommendation::Sell);
        assert_eq!("percent".parse::<ConfidenceScale>().unwrap(), ConfidenceScale::Percent);
        assert!("sideways".parse::<Direction>().is_err());
    }

    #[test]
    fn test_is_recent_window() {
        let now = Utc::now();
        assert!(StoredPrediction::is_recent_at(now - chrono::Duration::hours(23), now));
        assert!(!StoredPrediction::is_recent_at(now - chrono::Duration::hours(25), now));
    }
}
