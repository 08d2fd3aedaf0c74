//! Experiment configuration from environment variables.
//!
//! Hyper-parameters are read once at start-up into [`HyperParameters`] and
//! passed explicitly from there on. Every experiment has its own defaults;
//! any variable that is set overrides the default.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Tunable settings of one training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperParameters {
    pub batch_size: usize,
    pub train_validate_split: f64,
    /// Extra dense blocks on top of the first
    pub repeat_deep_arch: usize,
    pub dense_size: usize,
    pub epochs: usize,
    pub learning_rate: f32,
    pub dropout: f32,
    /// Zero means: derive the scale from the training data
    pub geom_scale: f32,
    pub patience: usize,
    pub early_stopping: bool,
    pub seed: u64,
}

impl HyperParameters {
    pub fn archaeology_defaults() -> Self {
        Self {
            batch_size: 32,
            train_validate_split: 0.1,
            repeat_deep_arch: 0,
            dense_size: 32,
            epochs: 200,
            learning_rate: 1e-4,
            dropout: 0.0,
            geom_scale: 0.0,
            patience: 16,
            early_stopping: false,
            seed: 42,
        }
    }

    pub fn building_defaults() -> Self {
        Self {
            batch_size: 512,
            dropout: 0.5,
            ..Self::archaeology_defaults()
        }
    }

    /// Override `defaults` from the process environment.
    pub fn from_env(defaults: Self) -> Result<Self, ConfigError> {
        Self::from_lookup(defaults, |key| std::env::var(key).ok())
    }

    /// Override `defaults` with every key `lookup` resolves.
    pub fn from_lookup<F>(defaults: Self, mut lookup: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let hp = Self {
            batch_size: parse_or(&mut lookup, "BATCH_SIZE", defaults.batch_size)?,
            train_validate_split: parse_or(
                &mut lookup,
                "TRAIN_VALIDATE_SPLIT",
                defaults.train_validate_split,
            )?,
            repeat_deep_arch: parse_or(&mut lookup, "REPEAT_DEEP_ARCH", defaults.repeat_deep_arch)?,
            dense_size: parse_or(&mut lookup, "DENSE_SIZE", defaults.dense_size)?,
            epochs: parse_or(&mut lookup, "EPOCHS", defaults.epochs)?,
            learning_rate: parse_or(&mut lookup, "LEARNING_RATE", defaults.learning_rate)?,
            dropout: parse_or(&mut lookup, "DROPOUT", defaults.dropout)?,
            geom_scale: parse_or(&mut lookup, "GEOM_SCALE", defaults.geom_scale)?,
            patience: parse_or(&mut lookup, "PATIENCE", defaults.patience)?,
            early_stopping: lookup("EARLY_STOPPING")
                .map(|value| parse_bool("EARLY_STOPPING", &value))
                .transpose()?
                .unwrap_or(defaults.early_stopping),
            seed: parse_or(&mut lookup, "SEED", defaults.seed)?,
        };
        hp.validate()?;
        Ok(hp)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let out_of_range = |key: &str, reason: String| ConfigError::OutOfRange {
            key: key.to_string(),
            reason,
        };
        if self.batch_size == 0 {
            return Err(out_of_range("BATCH_SIZE", "must be at least 1".into()));
        }
        if self.epochs == 0 {
            return Err(out_of_range("EPOCHS", "must be at least 1".into()));
        }
        if self.dense_size == 0 {
            return Err(out_of_range("DENSE_SIZE", "must be at least 1".into()));
        }
        if !(0.0..1.0).contains(&self.train_validate_split) {
            return Err(out_of_range(
                "TRAIN_VALIDATE_SPLIT",
                format!("{} is not in [0, 1)", self.train_validate_split),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(out_of_range(
                "DROPOUT",
                format!("{} is not in [0, 1)", self.dropout),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(out_of_range(
                "LEARNING_RATE",
                format!("{} is not positive", self.learning_rate),
            ));
        }
        if !(self.geom_scale >= 0.0 && self.geom_scale.is_finite()) {
            return Err(out_of_range(
                "GEOM_SCALE",
                format!("{} is negative", self.geom_scale),
            ));
        }
        Ok(())
    }

    /// `(ENV_NAME, value)` pairs sorted by name, for run reports.
    pub fn to_pairs(&self) -> Vec<(&'static str, String)> {
        let pairs: BTreeMap<&'static str, String> = [
            ("BATCH_SIZE", self.batch_size.to_string()),
            ("DENSE_SIZE", self.dense_size.to_string()),
            ("DROPOUT", self.dropout.to_string()),
            ("EARLY_STOPPING", self.early_stopping.to_string()),
            ("EPOCHS", self.epochs.to_string()),
            ("GEOM_SCALE", self.geom_scale.to_string()),
            ("LEARNING_RATE", self.learning_rate.to_string()),
            ("PATIENCE", self.patience.to_string()),
            ("REPEAT_DEEP_ARCH", self.repeat_deep_arch.to_string()),
            ("SEED", self.seed.to_string()),
            ("TRAIN_VALIDATE_SPLIT", self.train_validate_split.to_string()),
        ]
        .into_iter()
        .collect();
        pairs.into_iter().collect()
    }
}

/// Where a run reads data and writes logs, checkpoints and notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    pub data_folder: PathBuf,
    pub log_dir: PathBuf,
    pub checkpoint_path: Option<PathBuf>,
    pub slack_webhook_url: Option<String>,
}

impl RunSettings {
    pub fn from_env(default_data_folder: &str) -> Self {
        Self::from_lookup(default_data_folder, |key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(default_data_folder: &str, mut lookup: F) -> Self
    where
        F: FnMut(&str) -> Option<String>,
    {
        let non_empty = |value: String| (!value.trim().is_empty()).then_some(value);
        Self {
            data_folder: lookup("DATA_FOLDER")
                .and_then(non_empty)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(default_data_folder)),
            log_dir: lookup("LOG_DIR")
                .and_then(non_empty)
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("logs")),
            checkpoint_path: lookup("CHECKPOINT_PATH")
                .and_then(non_empty)
                .map(PathBuf::from),
            slack_webhook_url: lookup("SLACK_WEBHOOK_URL").and_then(non_empty),
        }
    }
}

fn parse_or<T, F>(lookup: &mut F, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: FnMut(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| {
            value.trim().parse::<T>().map_err(|_| ConfigError::Parse {
                key: key.to_string(),
                value,
                expected: std::any::type_name::<T>(),
            })
        })
        .transpose()
        .map(|parsed| parsed.unwrap_or(default))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Parse {
            key: key.to_string(),
            value: value.to_string(),
            expected: "bool",
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl FnMut(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let hp = HyperParameters::from_lookup(HyperParameters::building_defaults(), |_| None)
            .unwrap();
        assert_eq!(hp.batch_size, 512);
        assert_eq!(hp.dropout, 0.5);
        assert_eq!(hp.learning_rate, 1e-4);
        assert!(!hp.early_stopping);

        let arch = HyperParameters::archaeology_defaults();
        assert_eq!(arch.batch_size, 32);
        assert_eq!(arch.dropout, 0.0);
    }

    #[test]
    fn test_overrides_are_applied() {
        let hp = HyperParameters::from_lookup(
            HyperParameters::archaeology_defaults(),
            lookup_from(&[
                ("BATCH_SIZE", "64"),
                ("LEARNING_RATE", "0.001"),
                ("EARLY_STOPPING", "yes"),
                ("GEOM_SCALE", " 2.5 "),
            ]),
        )
        .unwrap();
        assert_eq!(hp.batch_size, 64);
        assert_eq!(hp.learning_rate, 1e-3);
        assert_eq!(hp.geom_scale, 2.5);
        assert!(hp.early_stopping);
        assert_eq!(hp.epochs, 200);
    }

    #[test]
    fn test_bool_is_parsed_strictly() {
        let off = HyperParameters::from_lookup(
            HyperParameters::archaeology_defaults(),
            lookup_from(&[("EARLY_STOPPING", "False")]),
        )
        .unwrap();
        assert!(!off.early_stopping);

        let result = HyperParameters::from_lookup(
            HyperParameters::archaeology_defaults(),
            lookup_from(&[("EARLY_STOPPING", "maybe")]),
        );
        assert!(matches!(result, Err(ConfigError::Parse { expected: "bool", .. })));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let unparsable = HyperParameters::from_lookup(
            HyperParameters::archaeology_defaults(),
            lookup_from(&[("EPOCHS", "ten")]),
        );
        assert!(matches!(unparsable, Err(ConfigError::Parse { ref key, .. }) if key == "EPOCHS"));

        for (key, value) in [
            ("BATCH_SIZE", "0"),
            ("DROPOUT", "1.0"),
            ("TRAIN_VALIDATE_SPLIT", "-0.1"),
            ("LEARNING_RATE", "0"),
            ("GEOM_SCALE", "-3"),
        ] {
            let result = HyperParameters::from_lookup(
                HyperParameters::archaeology_defaults(),
                lookup_from(&[(key, value)]),
            );
            assert!(
                matches!(result, Err(ConfigError::OutOfRange { key: ref k, .. }) if k == key),
                "{key}={value} accepted"
            );
        }
    }

    #[test]
    fn test_pairs_are_sorted() {
        let pairs = HyperParameters::archaeology_defaults().to_pairs();
        let keys: Vec<&str> = pairs.iter().map(|(k, _)| *k).collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
        assert_eq!(pairs.len(), 11);
        assert!(pairs.contains(&("BATCH_SIZE", "32".to_string())));
    }

    #[test]
    fn test_run_settings() {
        let settings = RunSettings::from_lookup(
            "../files/buildings/",
            lookup_from(&[("LOG_DIR", "/tmp/runs"), ("SLACK_WEBHOOK_URL", "")]),
        );
        assert_eq!(settings.data_folder, PathBuf::from("../files/buildings/"));
        assert_eq!(settings.log_dir, PathBuf::from("/tmp/runs"));
        assert!(settings.checkpoint_path.is_none());
        assert!(settings.slack_webhook_url.is_none());
    }
}
