use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Positive => write!(f, "POSITIVE"),
            Self::Negative => write!(f, "NEGATIVE"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    pub sentiment: SentimentLabel,
    /// Signed polarity in `[-1, 1]`
    pub score: f64,
    /// `[0, 1]`
    pub confidence: f64,
    /// Which classifier produced the answer ("vader", "basic", "none")
    #[serde(rename = "model")]
    pub model_tag: String,
}

impl SentimentAnalysis {
    pub fn empty() -> Self {
        Self {
            sentiment: SentimentLabel::Neutral,
            score: 0.0,
            confidence: 0.0,
            model_tag: "none".to_string(),
        }
    }
}

/// A text → sentiment classifier
pub trait SentimentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> anyhow::Result<SentimentAnalysis>;

    fn name(&self) -> &str;
}
