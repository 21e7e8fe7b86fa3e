//! Experiment tracking: the tracker seam, an MLflow REST client, an in-process
//! tracker and the per-trainer session that memoizes client, experiment and run.

/// Process-local tracker.
pub mod memory;
/// MLflow REST 2.0 client.
pub mod mlflow;
/// Lazily initialized per-trainer session.
pub mod session;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use memory::{InMemoryTracker, MetricPoint, RunRecord};
pub use mlflow::{classify_error, MlflowClient};
pub use session::{Connector, ExperimentSession};

/// Shared tracking server used when nothing else is configured.
pub const DEFAULT_TRACKING_URI: &str = "https://mlflow.lewagon.co/";
/// Experiment runs are filed under by default.
pub const DEFAULT_EXPERIMENT_NAME: &str = "TaxiFareModel v1";

/// Failures reported by a tracker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TrackerError {
    /// The named resource exists already (experiment names are unique).
    #[error("already exists: {0}")]
    AlreadyExists(String),
    /// The named resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Network failure, bad endpoint or unreadable response.
    #[error("transport error: {0}")]
    Transport(String),
    /// Any other error the server reported.
    #[error("tracking server returned {status} {code}: {message}")]
    Api {
        /// HTTP status.
        status: u16,
        /// Server error code such as `INVALID_PARAMETER_VALUE`.
        code: String,
        /// Server message.
        message: String,
    },
}

/// An experiment as known to the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Experiment {
    /// Opaque identifier.
    pub experiment_id: String,
    /// Unique name.
    pub name: String,
}

/// Identity of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunInfo {
    /// Opaque identifier.
    pub run_id: String,
    /// Owning experiment.
    pub experiment_id: String,
}

/// Remote bookkeeping for experiments, runs, parameters and metrics.
///
/// Calls block until the tracker answers.
pub trait ExperimentTracker: Send + Sync {
    /// Endpoint the tracker talks to, used to build UI links.
    fn tracking_uri(&self) -> &str;

    /// Creates an experiment and returns its id; fails with
    /// [`TrackerError::AlreadyExists`] when the name is taken.
    fn create_experiment(&self, name: &str) -> Result<String, TrackerError>;

    /// Looks an experiment up by name.
    fn get_experiment_by_name(&self, name: &str) -> Result<Experiment, TrackerError>;

    /// Starts a run under an experiment.
    fn create_run(&self, experiment_id: &str) -> Result<RunInfo, TrackerError>;

    /// Records a parameter on a run.
    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackerError>;

    /// Appends a metric value on a run.
    fn log_metric(&self, run_id: &str, key: &str, value: f64, step: u64)
        -> Result<(), TrackerError>;
}
