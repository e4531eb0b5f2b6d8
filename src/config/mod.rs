//! Configuration module for fxpredict.
//!
//! Configuration is loaded from environment variables (a `.env` file is
//! honoured by the binaries through `dotenvy`), organized by concern:
//! pipeline and model. A TOML file can override individual fields on top.
//!
//! `PREDICTION_PROFILE` selects the defaults:
//! - `fraction`: lookback ≤ 7, single dense head, magnitude confidence on the
//!   `[0, 1]` scale, trailing 90 days of history.
//! - `percent`: lookback ≤ 10, two dense layers, error-based confidence on
//!   the `[0, 100]` scale, full history.

mod model_config;
mod pipeline_config;

pub use model_config::ModelConfig;
pub use pipeline_config::PipelineConfig;

use crate::domain::errors::PredictionError;
use crate::domain::prediction::ConfidencePolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Default sets inherited from the two historical pipelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Fraction,
    Percent,
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Profile::Fraction => write!(f, "fraction"),
            Profile::Percent => write!(f, "percent"),
        }
    }
}

impl FromStr for Profile {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fraction" => Ok(Profile::Fraction),
            "percent" => Ok(Profile::Percent),
            _ => anyhow::bail!(
                "Invalid PREDICTION_PROFILE: {}. Must be 'fraction' or 'percent'",
                s
            ),
        }
    }
}

/// Which sentiment classifier answers first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentBackend {
    Vader,
    Basic,
}

impl FromStr for SentimentBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "vader" => Ok(SentimentBackend::Vader),
            "basic" => Ok(SentimentBackend::Basic),
            _ => anyhow::bail!(
                "Invalid SENTIMENT_BACKEND: {}. Must be 'vader' or 'basic'",
                s
            ),
        }
    }
}

pub(crate) fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("Failed to parse {}={}: {}", key, raw, e)),
        None => Ok(default),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Config {
    pub profile: Profile,
    pub pipeline: PipelineConfig,
    pub model: ModelConfig,
    pub sentiment_backend: SentimentBackend,
}

impl Default for Config {
    fn default() -> Self {
        Self::for_profile(Profile::Fraction)
    }
}

impl Config {
    pub fn for_profile(profile: Profile) -> Self {
        Self {
            profile,
            pipeline: PipelineConfig::for_profile(profile),
            model: ModelConfig::for_profile(profile),
            sentiment_backend: SentimentBackend::Vader,
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(&|key: &str| env::var(key).ok())
    }

    /// Environment settings on top of an explicitly chosen profile
    pub fn from_env_with_profile(profile: Profile) -> Result<Self> {
        let name = profile.to_string();
        Self::from_lookup(&|key: &str| {
            if key == "PREDICTION_PROFILE" {
                Some(name.clone())
            } else {
                env::var(key).ok()
            }
        })
    }

    /// Build from any key lookup (the process environment in production)
    pub fn from_lookup<F>(lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let profile = match lookup("PREDICTION_PROFILE") {
            Some(raw) => Profile::from_str(&raw)?,
            None => Profile::Fraction,
        };

        let sentiment_backend = match lookup("SENTIMENT_BACKEND") {
            Some(raw) => SentimentBackend::from_str(&raw)?,
            None => SentimentBackend::Vader,
        };

        Ok(Self {
            profile,
            pipeline: PipelineConfig::from_lookup(profile, lookup)?,
            model: ModelConfig::from_lookup(profile, lookup)?,
            sentiment_backend,
        })
    }

    pub fn apply_file(self, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read config file: {}", path.display()))?;
        let overrides: ConfigOverrides = toml::from_str(&content)
            .context(format!("Failed to parse config TOML: {}", path.display()))?;
        Ok(self.apply(overrides))
    }

    pub fn apply(mut self, o: ConfigOverrides) -> Self {
        let p = &mut self.pipeline;
        if let Some(v) = o.max_lookback {
            p.max_lookback = v;
        }
        if let Some(v) = o.min_observations {
            p.min_observations = v;
        }
        if let Some(v) = o.train_fraction {
            p.train_fraction = v;
        }
        if let Some(v) = o.history_days {
            p.history_days = (v != 0).then_some(v);
        }
        if let Some(v) = o.confidence_policy {
            p.confidence_policy = v;
        }
        if let Some(v) = o.model_version {
            p.model_version = v;
        }
        if let Some(v) = o.max_concurrent_runs {
            p.max_concurrent_runs = v;
        }

        let m = &mut self.model;
        if let Some(v) = o.hidden_units {
            m.hidden_units = v;
        }
        if let Some(v) = o.layers {
            m.layers = v;
        }
        if let Some(v) = o.dropout {
            m.dropout = v;
        }
        if let Some(v) = o.dense_units {
            m.dense_units = (v > 0).then_some(v);
        }
        if let Some(v) = o.learning_rate {
            m.learning_rate = v;
        }
        if let Some(v) = o.batch_size {
            m.batch_size = v;
        }
        if let Some(v) = o.max_epochs {
            m.max_epochs = v;
        }
        if let Some(v) = o.patience {
            m.patience = v;
        }
        if let Some(v) = o.seed {
            m.seed = v;
        }
        if let Some(v) = o.timeout_secs {
            m.max_training_duration = Duration::from_secs(v);
        }
        if let Some(v) = o.sentiment_backend {
            self.sentiment_backend = v;
        }
        self
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<(), PredictionError> {
        let invalid = |reason: &str| {
            Err(PredictionError::InvalidConfig {
                reason: reason.to_string(),
            })
        };

        let p = &self.pipeline;
        let m = &self.model;

        if p.max_lookback == 0 {
            return invalid("max_lookback must be at least 1");
        }
        if p.min_observations < 4 {
            return invalid("min_observations must be at least 4 so that N / 4 >= 1");
        }
        if !(p.train_fraction > 0.0 && p.train_fraction < 1.0) {
            return invalid("train_fraction must be in (0, 1)");
        }
        if p.history_days.is_some_and(|days| days <= 0) {
            return invalid("history_days must be positive");
        }
        if p.max_concurrent_runs == 0 {
            return invalid("max_concurrent_runs must be at least 1");
        }
        if m.hidden_units == 0 || m.layers == 0 {
            return invalid("hidden_units and layers must be at least 1");
        }
        if !(0.0..1.0).contains(&m.dropout) {
            return invalid("dropout must be in [0, 1)");
        }
        if !(m.learning_rate > 0.0 && m.learning_rate.is_finite()) {
            return invalid("learning_rate must be positive");
        }
        if m.batch_size == 0 || m.max_epochs == 0 {
            return invalid("batch_size and max_epochs must be at least 1");
        }
        if !(m.min_delta >= 0.0 && m.min_delta.is_finite()) {
            return invalid("min_delta must be non-negative");
        }
        if m.clip_norm.is_nan() || m.clip_norm <= 0.0 {
            return invalid("clip_norm must be positive");
        }
        if m.max_training_duration.is_zero() {
            return invalid("training timeout must be positive");
        }
        Ok(())
    }
}

/// Field-level overrides read from a TOML file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    pub max_lookback: Option<usize>,
    pub min_observations: Option<usize>,
    pub train_fraction: Option<f64>,
    /// `0` fetches the full history
    pub history_days: Option<i64>,
    pub confidence_policy: Option<ConfidencePolicy>,
    pub model_version: Option<String>,
    pub max_concurrent_runs: Option<usize>,
    pub hidden_units: Option<usize>,
    pub layers: Option<usize>,
    pub dropout: Option<f64>,
    /// `0` removes the hidden dense layer
    pub dense_units: Option<usize>,
    pub learning_rate: Option<f64>,
    pub batch_size: Option<usize>,
    pub max_epochs: Option<usize>,
    pub patience: Option<usize>,
    pub seed: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub sentiment_backend: Option<SentimentBackend>,
}
