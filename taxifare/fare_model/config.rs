//! TOML configuration for training runs.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

use crate::{
    data::DEFAULT_NROWS,
    encoders::{LocalTime, MAX_OFFSET_HOURS},
    model::{
        linear::DEFAULT_RIDGE,
        sgd::{DEFAULT_EPOCHS, DEFAULT_LEARNING_RATE},
        Estimator, EstimatorKind, LinearRegression, SgdRegressor,
    },
    trainer::MODEL_ARTIFACT_PATH,
    tracking::{DEFAULT_EXPERIMENT_NAME, DEFAULT_TRACKING_URI},
};

/// Hold-out share used by the training entry point.
pub const DEFAULT_TEST_SIZE: f64 = 0.15;

/// Complete run configuration; every section and field is optional in TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainerConfig {
    /// Input data.
    pub data: DataSection,
    /// Estimator choice and hyperparameters.
    pub model: ModelSection,
    /// Feature engineering.
    pub features: FeatureSection,
    /// Experiment tracking.
    pub tracking: TrackingSection,
    /// Files written by a run.
    pub output: OutputSection,
}

/// `[data]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataSection {
    /// CSV to train on.
    pub path: PathBuf,
    /// Rows to read; `0` reads the whole file.
    pub nrows: usize,
    /// Share of cleaned rows held out for evaluation.
    pub test_size: f64,
    /// Shuffle seed for the split.
    pub seed: u64,
}

impl Default for DataSection {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/train.csv"),
            nrows: DEFAULT_NROWS,
            test_size: DEFAULT_TEST_SIZE,
            seed: 42,
        }
    }
}

impl DataSection {
    /// Row limit for the loader.
    #[must_use]
    pub const fn row_limit(&self) -> Option<usize> {
        if self.nrows == 0 {
            None
        } else {
            Some(self.nrows)
        }
    }
}

/// `[model]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ModelSection {
    /// `linear` or `sgd`.
    pub kind: EstimatorKind,
    /// Ridge term for `linear`.
    pub ridge: f64,
    /// Step size for `sgd`.
    pub learning_rate: f64,
    /// Passes over the data for `sgd`.
    pub epochs: usize,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            kind: EstimatorKind::default(),
            ridge: DEFAULT_RIDGE,
            learning_rate: DEFAULT_LEARNING_RATE,
            epochs: DEFAULT_EPOCHS,
        }
    }
}

impl ModelSection {
    /// Unfitted estimator described by this section.
    #[must_use]
    pub fn estimator(&self) -> Estimator {
        match self.kind {
            EstimatorKind::Linear => LinearRegression::new(self.ridge).into(),
            EstimatorKind::Sgd => SgdRegressor::new(self.learning_rate, self.epochs).into(),
        }
    }
}

/// `[features]`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeatureSection {
    /// Local time used for calendar features.
    pub timezone: LocalTime,
}

/// `[tracking]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackingSection {
    /// Tracking server.
    pub uri: String,
    /// Experiment runs are filed under.
    pub experiment_name: String,
    /// Keep tracking in process instead of contacting the server.
    pub offline: bool,
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self {
            uri: DEFAULT_TRACKING_URI.into(),
            experiment_name: DEFAULT_EXPERIMENT_NAME.into(),
            offline: false,
        }
    }
}

/// `[output]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    /// Where the fitted pipeline is written.
    pub artifact_path: PathBuf,
    /// Directory for JSON-lines logs.
    pub log_dir: PathBuf,
    /// Run manifest (JSON lines).
    pub manifest: PathBuf,
}

impl Default for OutputSection {
    fn default() -> Self {
        Self {
            artifact_path: PathBuf::from(MODEL_ARTIFACT_PATH),
            log_dir: PathBuf::from("logs"),
            manifest: PathBuf::from("runs/manifest.jsonl"),
        }
    }
}

impl TrainerConfig {
    /// Loads and validates a TOML file. A relative `data.path` is resolved
    /// against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading trainer config {}", path.display()))?;
        let mut config =
            Self::from_toml_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        if config.data.path.is_relative() {
            if let Some(dir) = path.parent() {
                config.data.path = dir.join(&config.data.path);
            }
        }
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        let test_size = self.data.test_size;
        if !(test_size > 0.0 && test_size < 1.0) {
            bail!("data.test_size must lie in (0, 1), got {test_size}");
        }
        if !(self.model.ridge.is_finite() && self.model.ridge >= 0.0) {
            bail!("model.ridge must be finite and non-negative");
        }
        if !(self.model.learning_rate.is_finite() && self.model.learning_rate > 0.0) {
            bail!("model.learning_rate must be positive");
        }
        if self.model.epochs == 0 {
            bail!("model.epochs must be at least 1");
        }
        if let LocalTime::FixedOffset(hours) = self.features.timezone {
            if !(-MAX_OFFSET_HOURS..=MAX_OFFSET_HOURS).contains(&hours) {
                bail!("features.timezone fixed-offset must lie in -23..=23 hours, got {hours}");
            }
        }
        if self.tracking.experiment_name.trim().is_empty() {
            bail!("tracking.experiment_name must not be empty");
        }
        Ok(())
    }
}
