//! Sequence model hyperparameters.
//!
//! Parsed from `PREDICTION_*` environment variables on top of the profile
//! defaults.

use super::{Profile, parse_var};
use anyhow::Result;
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    /// Units per recurrent layer
    pub hidden_units: usize,
    /// Stacked recurrent layers
    pub layers: usize,
    /// Dropout after each recurrent layer, training only
    pub dropout: f64,
    /// Optional hidden dense layer before the scalar output
    pub dense_units: Option<usize>,
    pub learning_rate: f64,
    pub batch_size: usize,
    pub max_epochs: usize,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    pub min_delta: f64,
    /// Global gradient norm cap
    pub clip_norm: f64,
    pub seed: u64,
    pub max_training_duration: Duration,
    /// Add the last input value to the network output
    pub residual: bool,
}

impl ModelConfig {
    pub fn for_profile(profile: Profile) -> Self {
        match profile {
            Profile::Fraction => Self {
                hidden_units: 50,
                layers: 2,
                dropout: 0.2,
                dense_units: None,
                learning_rate: 0.001,
                batch_size: 32,
                max_epochs: 50,
                patience: 10,
                min_delta: 0.0,
                clip_norm: 1.0,
                seed: 42,
                max_training_duration: Duration::from_secs(300),
                residual: true,
            },
            Profile::Percent => Self {
                hidden_units: 50,
                layers: 2,
                dropout: 0.2,
                dense_units: Some(25),
                learning_rate: 0.001,
                batch_size: 16,
                max_epochs: 20,
                patience: 10,
                min_delta: 0.0,
                clip_norm: 1.0,
                seed: 42,
                max_training_duration: Duration::from_secs(300),
                residual: true,
            },
        }
    }

    pub fn from_lookup<F>(profile: Profile, lookup: &F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::for_profile(profile);

        let timeout_secs: u64 = parse_var(
            lookup,
            "PREDICTION_TIMEOUT_SECS",
            defaults.max_training_duration.as_secs(),
        )?;

        Ok(Self {
            hidden_units: parse_var(lookup, "PREDICTION_HIDDEN_UNITS", defaults.hidden_units)?,
            layers: parse_var(lookup, "PREDICTION_LAYERS", defaults.layers)?,
            dropout: parse_var(lookup, "PREDICTION_DROPOUT", defaults.dropout)?,
            dense_units: match lookup("PREDICTION_DENSE_UNITS") {
                Some(v) if v.trim() == "0" || v.trim().is_empty() => None,
                Some(v) => Some(v.trim().parse().map_err(|e| {
                    anyhow::anyhow!("Failed to parse PREDICTION_DENSE_UNITS={}: {}", v, e)
                })?),
                None => defaults.dense_units,
            },
            learning_rate: parse_var(lookup, "PREDICTION_LEARNING_RATE", defaults.learning_rate)?,
            batch_size: parse_var(lookup, "PREDICTION_BATCH_SIZE", defaults.batch_size)?,
            max_epochs: parse_var(lookup, "PREDICTION_MAX_EPOCHS", defaults.max_epochs)?,
            patience: parse_var(lookup, "PREDICTION_PATIENCE", defaults.patience)?,
            min_delta: parse_var(lookup, "PREDICTION_MIN_DELTA", defaults.min_delta)?,
            clip_norm: parse_var(lookup, "PREDICTION_CLIP_NORM", defaults.clip_norm)?,
            seed: parse_var(lookup, "PREDICTION_SEED", defaults.seed)?,
            max_training_duration: Duration::from_secs(timeout_secs),
            residual: parse_var(lookup, "PREDICTION_RESIDUAL", defaults.residual)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_profile_defaults_differ_in_head_and_batching() {
        let fraction = ModelConfig::for_profile(Profile::Fraction);
        let percent = ModelConfig::for_profile(Profile::Percent);

        assert_eq!(fraction.dense_units, None);
        assert_eq!(percent.dense_units, Some(25));
        assert_eq!(fraction.batch_size, 32);
        assert_eq!(percent.batch_size, 16);
        assert_eq!(fraction.max_epochs, 50);
        assert_eq!(percent.max_epochs, 20);
    }

    #[test]
    fn test_lookup_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PREDICTION_HIDDEN_UNITS", "16"),
            ("PREDICTION_DENSE_UNITS", "0"),
            ("PREDICTION_TIMEOUT_SECS", "5"),
        ]
        .into_iter()
        .collect();
        let lookup = |k: &str| vars.get(k).map(|v| v.to_string());

        let config = ModelConfig::from_lookup(Profile::Percent, &lookup).unwrap();
        assert_eq!(config.hidden_units, 16);
        assert_eq!(config.dense_units, None);
        assert_eq!(config.max_training_duration, Duration::from_secs(5));
        assert_eq!(config.batch_size, 16);
    }

    #[test]
    fn test_malformed_value_is_an_error() {
        let lookup = |k: &str| (k == "PREDICTION_BATCH_SIZE").then(|| "sixteen".to_string());
        assert!(ModelConfig::from_lookup(Profile::Fraction, &lookup).is_err());
    }
}
