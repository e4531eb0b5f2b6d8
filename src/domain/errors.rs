use serde::Serialize;
use std::borrow::Borrow;
use std::fmt;
use thiserror::Error;

/// Errors raised by the prediction pipeline and its components
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PredictionError {
    #[error("Insufficient data for {symbol}: need at least {required} observations, got {observations}")]
    InsufficientData {
        symbol: String,
        observations: usize,
        required: usize,
    },

    #[error("Degenerate series: every price equals {value}, cannot normalize")]
    DegenerateSeries { value: f64 },

    #[error("Insufficient history: lookback {lookback} needs more than {len} normalized points")]
    InsufficientHistory { len: usize, lookback: usize },

    #[error("Too few windows to split for training: {windows} < {required}")]
    TooFewWindows { windows: usize, required: usize },

    #[error(
        "Training timed out after {elapsed_ms}ms ({epochs_completed} epochs, best validation loss {})",
        format_loss(.best_val_loss)
    )]
    TrainingTimeout {
        elapsed_ms: u64,
        epochs_completed: usize,
        best_val_loss: Option<f64>,
    },

    #[error("Training diverged at epoch {epoch}: loss is not finite")]
    TrainingDiverged { epoch: usize },

    #[error("Invalid series: {reason}")]
    InvalidSeries { reason: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Series store unavailable: {reason}")]
    StoreUnavailable { reason: String },

    #[error("Internal error: {reason}")]
    Internal { reason: String },
}

fn format_loss(loss: impl Borrow<Option<f64>>) -> String {
    match loss.borrow() {
        Some(l) => format!("{:.6}", l),
        None => "n/a".to_string(),
    }
}

/// Stable tag for programmatic branching on [`PredictionError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InsufficientData,
    DegenerateSeries,
    InsufficientHistory,
    TooFewWindows,
    TrainingTimeout,
    TrainingDiverged,
    InvalidSeries,
    InvalidConfig,
    StoreUnavailable,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData => "insufficient_data",
            Self::DegenerateSeries => "degenerate_series",
            Self::InsufficientHistory => "insufficient_history",
            Self::TooFewWindows => "too_few_windows",
            Self::TrainingTimeout => "training_timeout",
            Self::TrainingDiverged => "training_diverged",
            Self::InvalidSeries => "invalid_series",
            Self::InvalidConfig => "invalid_config",
            Self::StoreUnavailable => "store_unavailable",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PredictionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InsufficientData { .. } => ErrorKind::InsufficientData,
            Self::DegenerateSeries { .. } => ErrorKind::DegenerateSeries,
            Self::InsufficientHistory { .. } => ErrorKind::InsufficientHistory,
            Self::TooFewWindows { .. } => ErrorKind::TooFewWindows,
            Self::TrainingTimeout { .. } => ErrorKind::TrainingTimeout,
            Self::TrainingDiverged { .. } => ErrorKind::TrainingDiverged,
            Self::InvalidSeries { .. } => ErrorKind::InvalidSeries,
            Self::InvalidConfig { .. } => ErrorKind::InvalidConfig,
            Self::StoreUnavailable { .. } => ErrorKind::StoreUnavailable,
            Self::Internal { .. } => ErrorKind::Internal,
        }
    }

    /// Whether the pipeline degrades to a placeholder instead of failing
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::InsufficientData { .. })
    }

    pub fn store(err: anyhow::Error) -> Self {
        Self::StoreUnavailable {
            reason: format!("{:#}", err),
        }
    }
}
