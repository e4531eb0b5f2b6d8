//! Pipeline-level settings: history sizing, split and signal policy.

use super::{Profile, parse_var};
use crate::domain::prediction::ConfidencePolicy;
use anyhow::Result;
use serde::Serialize;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineConfig {
    /// Upper bound for the adaptive lookback `min(max_lookback, N / 4)`
    pub max_lookback: usize,
    /// Below this many observations the run degrades to a placeholder
    pub min_observations: usize,
    pub train_fraction: f64,
    /// Fetch only the trailing N days; `None` fetches everything
    pub history_days: Option<i64>,
    pub confidence_policy: ConfidencePolicy,
    pub model_version: String,
    pub max_concurrent_runs: usize,
}

impl PipelineConfig {
    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Fraction => Self {
                max_lookback: 7,
                min_observations: 30,
                train_fraction: 0.8,
                history_days: Some(90),
                confidence_policy: ConfidencePolicy::Magnitude,
                model_version: "1.0.0".to_string(),
                max_concurrent_runs: 4,
            },
            Profile::Percent => Self {
                max_lookback: 10,
                min_observations: 30,
                train_fraction: 0.8,
                history_days: None,
                confidence_policy: ConfidencePolicy::ErrorBased,
                model_version: "2.0.0".to_string(),
                max_concurrent_runs: 4,
            },
        }
    }

    pub fn from_lookup<F>(profile: Profile, lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::for_profile(profile);

        let history_days = match lookup("PREDICTION_HISTORY_DAYS") {
            Some(v) if v.trim() == "0" || v.trim().eq_ignore_ascii_case("all") => None,
            Some(v) => Some(v.trim().parse::<i64>().map_err(|e| {
                anyhow::anyhow!("Failed to parse PREDICTION_HISTORY_DAYS={}: {}", v, e)
            })?),
            None => defaults.history_days,
        };

        let confidence_policy = match lookup("PREDICTION_CONFIDENCE_POLICY") {
            Some(v) => ConfidencePolicy::from_str(&v)?,
            None => defaults.confidence_policy,
        };

        Ok(Self {
            max_lookback: parse_var(lookup, "PREDICTION_MAX_LOOKBACK", defaults.max_lookback)?,
            min_observations: parse_var(
                lookup,
                "PREDICTION_MIN_OBSERVATIONS",
                defaults.min_observations,
            )?,
            train_fraction: parse_var(lookup, "PREDICTION_TRAIN_FRACTION", defaults.train_fraction)?,
            history_days,
            confidence_policy,
            model_version: lookup("PREDICTION_MODEL_VERSION").unwrap_or(defaults.model_version),
            max_concurrent_runs: parse_var(
                lookup,
                "PREDICTION_MAX_CONCURRENT_RUNS",
                defaults.max_concurrent_runs,
            )?,
        })
    }

    /// `min(max_lookback, observations / 4)`
    pub fn lookback_for(&self, observations: usize) -> usize {
        self.max_lookback.min(observations / 4)
    }
}
