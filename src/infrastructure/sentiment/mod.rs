pub mod analyzer;

pub use analyzer::{FinancialSentimentAnalyzer, KeywordClassifier, VaderClassifier};
