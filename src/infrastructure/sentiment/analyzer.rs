//! Local sentiment analysis for forex news text.
//!
//! The primary classifier is VADER (Valence Aware Dictionary and sEntiment
//! Reasoner) boosted with currency-market keywords. When it is disabled or
//! fails, a fixed keyword-count heuristic answers instead.
//!
//! # Example
//! ```rust,no_run
//! use fxpredict::config::SentimentBackend;
//! use fxpredict::infrastructure::sentiment::analyzer;
//!
//! let analyzer = analyzer::shared(SentimentBackend::Vader);
//! let result = analyzer.analyze("EUR/USD rallies after hawkish ECB comments");
//! println!("{} {}", result.sentiment, result.score);
//! analyzer::teardown();
//! ```

use crate::config::SentimentBackend;
use crate::domain::sentiment::{SentimentAnalysis, SentimentClassifier, SentimentLabel};
use std::sync::{Arc, RwLock};
use tracing::{info, warn};
use vader_sentiment::SentimentIntensityAnalyzer;

/// Longer inputs are truncated to this many characters
pub const MAX_TEXT_CHARS: usize = 512;

/// |compound| below this is NEUTRAL
const NEUTRAL_BAND: f64 = 0.05;

/// Currency-market phrases VADER's general lexicon misses
const BULLISH_KEYWORDS: &[(&str, f64)] = &[
    ("rally", 0.4),
    ("rallies", 0.4),
    ("surge", 0.4),
    ("surges", 0.4),
    ("soar", 0.5),
    ("soars", 0.5),
    ("strengthen", 0.3),
    ("strengthens", 0.3),
    ("hawkish", 0.3),
    ("rate hike", 0.3),
    ("breakout", 0.3),
    ("bullish", 0.5),
    ("rebound", 0.3),
    ("rebounds", 0.3),
    ("upbeat", 0.3),
    ("beats expectations", 0.4),
    ("record high", 0.4),
    ("safe-haven demand", 0.2),
];

const BEARISH_KEYWORDS: &[(&str, f64)] = &[
    ("plunge", -0.5),
    ("plunges", -0.5),
    ("slump", -0.4),
    ("slumps", -0.4),
    ("tumble", -0.4),
    ("tumbles", -0.4),
    ("weaken", -0.3),
    ("weakens", -0.3),
    ("dovish", -0.3),
    ("rate cut", -0.3),
    ("bearish", -0.5),
    ("recession", -0.5),
    ("default", -0.5),
    ("sell-off", -0.4),
    ("selloff", -0.4),
    ("intervention", -0.2),
    ("misses expectations", -0.4),
    ("crisis", -0.5),
];

const BASIC_POSITIVE: &[&str] = &[
    "rise", "gain", "profit", "growth", "up", "increase", "bull", "surge",
];

const BASIC_NEGATIVE: &[&str] = &[
    "fall", "loss", "decline", "down", "decrease", "bear", "drop", "crash",
];

fn round3(v: f64) -> f64 {
    (v * 1000.0).round() / 1000.0
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEXT_CHARS).collect()
}

/// VADER with financial keyword boosting
pub struct VaderClassifier {
    analyzer: SentimentIntensityAnalyzer<'static>,
}

impl VaderClassifier {
    pub fn new() -> Self {
        Self {
            analyzer: SentimentIntensityAnalyzer::new(),
        }
    }

    fn financial_boost(text: &str) -> f64 {
        let text_lower = text.to_lowercase();
        BULLISH_KEYWORDS
            .iter()
            .chain(BEARISH_KEYWORDS)
            .filter(|(keyword, _)| text_lower.contains(keyword))
            .map(|(_, score)| score)
            .sum()
    }
}

impl Default for VaderClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SentimentClassifier for VaderClassifier {
    fn classify(&self, text: &str) -> anyhow::Result<SentimentAnalysis> {
        let scores = self.analyzer.polarity_scores(text);
        let component = |key: &str| scores.get(key).copied().unwrap_or(0.0);

        let compound = component("compound");
        if !compound.is_finite() {
            anyhow::bail!("VADER returned a non-finite compound score");
        }
        let score = (compound + Self::financial_boost(text) * 0.5).clamp(-1.0, 1.0);

        let (sentiment, confidence) = if score >= NEUTRAL_BAND {
            (SentimentLabel::Positive, component("pos").max(score))
        } else if score <= -NEUTRAL_BAND {
            (SentimentLabel::Negative, component("neg").max(-score))
        } else {
            (SentimentLabel::Neutral, component("neu"))
        };

        Ok(SentimentAnalysis {
            sentiment,
            score: round3(score),
            confidence: round3(confidence.clamp(0.0, 1.0)),
            model_tag: self.name().to_string(),
        })
    }

    fn name(&self) -> &str {
        "vader"
    }
}

/// Keyword-count heuristic: more positive than negative words is POSITIVE
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl SentimentClassifier for KeywordClassifier {
    fn classify(&self, text: &str) -> anyhow::Result<SentimentAnalysis> {
        let text_lower = text.to_lowercase();
        let count = |words: &[&str]| words.iter().filter(|w| text_lower.contains(*w)).count();
        let positive = count(BASIC_POSITIVE);
        let negative = count(BASIC_NEGATIVE);

        let (sentiment, score) = match positive.cmp(&negative) {
            std::cmp::Ordering::Greater => (SentimentLabel::Positive, 0.6),
            std::cmp::Ordering::Less => (SentimentLabel::Negative, -0.6),
            std::cmp::Ordering::Equal => (SentimentLabel::Neutral, 0.0),
        };

        Ok(SentimentAnalysis {
            sentiment,
            score,
            confidence: 0.5,
            model_tag: self.name().to_string(),
        })
    }

    fn name(&self) -> &str {
        "basic"
    }
}

/// Primary classifier with the keyword fallback behind it
pub struct FinancialSentimentAnalyzer {
    backend: SentimentBackend,
    primary: Option<Box<dyn SentimentClassifier>>,
    fallback: KeywordClassifier,
}

impl FinancialSentimentAnalyzer {
    pub fn new(backend: SentimentBackend) -> Self {
        let primary: Option<Box<dyn SentimentClassifier>> = match backend {
            SentimentBackend::Vader => Some(Box::new(VaderClassifier::new())),
            SentimentBackend::Basic => None,
        };
        info!(
            "Sentiment analyzer ready ({})",
            primary.as_ref().map_or("basic", |p| p.name())
        );

        Self {
            backend,
            primary,
            fallback: KeywordClassifier,
        }
    }

    /// Use a custom primary classifier
    pub fn with_primary(primary: Box<dyn SentimentClassifier>) -> Self {
        Self {
            backend: SentimentBackend::Vader,
            primary: Some(primary),
            fallback: KeywordClassifier,
        }
    }

    pub fn backend(&self) -> SentimentBackend {
        self.backend
    }

    pub fn analyze(&self, text: &str) -> SentimentAnalysis {
        if text.trim().is_empty() {
            return SentimentAnalysis::empty();
        }
        let text = truncate(text);

        if let Some(primary) = &self.primary {
            match primary.classify(&text) {
                Ok(result) => return result,
                Err(e) => warn!(
                    "{} classifier failed, using keyword fallback: {:#}",
                    primary.name(),
                    e
                ),
            }
        }

        match self.fallback.classify(&text) {
            Ok(result) => result,
            Err(_) => SentimentAnalysis::empty(),
        }
    }

    pub fn batch_analyze<S: AsRef<str>>(&self, texts: &[S]) -> Vec<SentimentAnalysis> {
        texts.iter().map(|t| self.analyze(t.as_ref())).collect()
    }
}

static SHARED: RwLock<Option<Arc<FinancialSentimentAnalyzer>>> = RwLock::new(None);

/// Process-wide analyzer, built on first use.
///
/// Asking for a different backend than the live one rebuilds it.
pub fn shared(backend: SentimentBackend) -> Arc<FinancialSentimentAnalyzer> {
    {
        let guard = SHARED.read().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = guard.as_ref()
            && existing.backend() == backend
        {
            return Arc::clone(existing);
        }
    }

    let mut guard = SHARED.write().unwrap_or_else(|e| e.into_inner());
    match guard.as_ref() {
        Some(existing) if existing.backend() == backend => Arc::clone(existing),
        _ => {
            let analyzer = Arc::new(FinancialSentimentAnalyzer::new(backend));
            *guard = Some(Arc::clone(&analyzer));
            analyzer
        }
    }
}

/// Drop the process-wide analyzer. Outstanding handles stay valid.
pub fn teardown() {
    let mut guard = SHARED.write().unwrap_or_else(|e| e.into_inner());
    if guard.take().is_some() {
        info!("Sentiment analyzer released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Failing;

    impl SentimentClassifier for Failing {
        fn classify(&self, _text: &str) -> anyhow::Result<SentimentAnalysis> {
            anyhow::bail!("model not loaded")
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    #[test]
    fn test_bullish_headlines() {
        let analyzer = FinancialSentimentAnalyzer::new(SentimentBackend::Vader);

        let headlines = [
            "Euro rallies to record high as ECB turns hawkish",
            "Sterling surges after strong jobs data beats expectations",
            "Dollar rebounds, traders increasingly bullish",
        ];

        for headline in headlines {
            let result = analyzer.analyze(headline);
            assert_eq!(
                result.sentiment,
                SentimentLabel::Positive,
                "Expected positive for '{}', got {:?}",
                headline,
                result
            );
            assert_eq!(result.model_tag, "vader");
            assert!(result.score > 0.0 && result.score <= 1.0);
            assert!((0.0..=1.0).contains(&result.confidence));
        }
    }

    #[test]
    fn test_bearish_headlines() {
        let analyzer = FinancialSentimentAnalyzer::new(SentimentBackend::Vader);

        let headlines = [
            "Yen plunges amid fears of recession",
            "Lira tumbles in currency crisis",
            "Aussie slumps as central bank signals rate cut",
        ];

        for headline in headlines {
            let result = analyzer.analyze(headline);
            assert_eq!(
                result.sentiment,
                SentimentLabel::Negative,
                "Expected negative for '{}', got {:?}",
                headline,
                result
            );
            assert!(result.score < 0.0 && result.score >= -1.0);
        }
    }

    #[test]
    fn test_empty_text() {
        let analyzer = FinancialSentimentAnalyzer::new(SentimentBackend::Vader);
        assert_eq!(analyzer.analyze(""), SentimentAnalysis::empty());
        assert_eq!(analyzer.analyze("   ").model_tag, "none");
    }

    #[test]
    fn test_keyword_fallback() {
        let analyzer = FinancialSentimentAnalyzer::new(SentimentBackend::Basic);

        let up = analyzer.analyze("EUR/USD expected to rise on growth data");
        assert_eq!(up.sentiment, SentimentLabel::Positive);
        assert_eq!(up.score, 0.6);
        assert_eq!(up.confidence, 0.5);
        assert_eq!(up.model_tag, "basic");

        let down = analyzer.analyze("Pound to fall after decline in output");
        assert_eq!(down.sentiment, SentimentLabel::Negative);
        assert_eq!(down.score, -0.6);

        let flat = analyzer.analyze("Markets await the central bank statement");
        assert_eq!(flat.sentiment, SentimentLabel::Neutral);
        assert_eq!(flat.score, 0.0);
    }

    #[test]
    fn test_failing_primary_falls_back() {
        let analyzer = FinancialSentimentAnalyzer::with_primary(Box::new(Failing));
        let result = analyzer.analyze("Dollar gains on profit taking");
        assert_eq!(result.model_tag, "basic");
        assert_eq!(result.sentiment, SentimentLabel::Positive);
    }

    #[test]
    fn test_batch_analyze_keeps_order() {
        let analyzer = FinancialSentimentAnalyzer::new(SentimentBackend::Basic);
        let results = analyzer.batch_analyze(&["prices rise", "", "prices drop"]);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].sentiment, SentimentLabel::Positive);
        assert_eq!(results[1].model_tag, "none");
        assert_eq!(results[2].sentiment, SentimentLabel::Negative);
    }

    #[test]
    fn test_truncates_long_text() {
        let long = "a".repeat(MAX_TEXT_CHARS * 2);
        assert_eq!(truncate(&long).chars().count(), MAX_TEXT_CHARS);
    }

    #[test]
    fn test_shared_instance_lifecycle() {
        let a = shared(SentimentBackend::Basic);
        let b = shared(SentimentBackend::Basic);
        assert!(Arc::ptr_eq(&a, &b));

        teardown();
        let c = shared(SentimentBackend::Basic);
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.analyze("gain").model_tag, "basic");
        teardown();
    }
}
