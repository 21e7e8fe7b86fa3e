#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Taxi fare model: trip data, feature engineering, regression, experiment
//! tracking and persistence behind a single trainer.

/// Trip CSV loading, cleaning, splitting and synthetic data.
#[path = "../data/main.rs"]
pub mod data;

/// Distance and calendar feature transformers.
#[path = "../encoders/main.rs"]
pub mod encoders;

/// Scaling, one-hot encoding and column routing.
#[path = "../preprocessing/main.rs"]
pub mod preprocessing;

/// Regression estimators.
#[path = "../model/main.rs"]
pub mod model;

/// Error metrics.
#[path = "../metrics.rs"]
pub mod metrics;

/// Preprocessor plus estimator, and artifact persistence.
#[path = "../pipeline.rs"]
pub mod pipeline;

/// Experiment tracking clients and per-trainer sessions.
#[path = "../tracking/main.rs"]
pub mod tracking;

/// Training orchestration.
#[path = "../trainer.rs"]
pub mod trainer;

/// TOML run configuration.
#[path = "../config.rs"]
pub mod config;

/// Telemetry helpers for structured logging.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// High-level training entry point.
#[path = "../main.rs"]
pub mod workflow;

pub use config::TrainerConfig;
pub use data::{clean_data, get_data, split_target, train_test_split, Trip, TripFrame};
pub use metrics::rmse;
pub use model::{Estimator, EstimatorKind, LinearRegression, Regressor, SgdRegressor};
pub use pipeline::{FarePipeline, FittedFarePipeline};
pub use preprocessing::Preprocessor;
pub use telemetry::{FareTelemetry, FareTelemetryBuilder};
pub use tracking::{ExperimentSession, ExperimentTracker, InMemoryTracker, MlflowClient};
pub use trainer::{Trainer, TrainerError, MODEL_ARTIFACT_PATH};
pub use workflow::{TrainingReport, TrainingRun};
