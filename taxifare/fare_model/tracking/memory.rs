use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Experiment, ExperimentTracker, RunInfo, TrackerError};

/// URI reported by trackers that never leave the process.
pub const IN_MEMORY_URI: &str = "memory://local";

/// One logged metric value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    /// Logged value.
    pub value: f64,
    /// Step supplied by the caller.
    pub step: u64,
    /// Wall clock time of the call.
    pub timestamp: DateTime<Utc>,
}

/// Everything recorded against one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Identity.
    pub info: RunInfo,
    /// Parameters; each key is written once.
    pub params: BTreeMap<String, String>,
    /// Metric history per key in logging order.
    pub metrics: BTreeMap<String, Vec<MetricPoint>>,
}

#[derive(Debug, Default)]
struct TrackerState {
    experiments: Vec<Experiment>,
    runs: HashMap<String, RunRecord>,
}

/// Tracker that keeps everything in memory, for offline runs and tests.
#[derive(Debug)]
pub struct InMemoryTracker {
    uri: String,
    state: Mutex<TrackerState>,
}

impl Default for InMemoryTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTracker {
    /// Empty tracker reporting [`IN_MEMORY_URI`].
    #[must_use]
    pub fn new() -> Self {
        Self::with_uri(IN_MEMORY_URI)
    }

    /// Empty tracker reporting a custom URI in experiment links.
    #[must_use]
    pub fn with_uri(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            state: Mutex::new(TrackerState::default()),
        }
    }

    /// All experiments in creation order.
    #[must_use]
    pub fn experiments(&self) -> Vec<Experiment> {
        self.state.lock().experiments.clone()
    }

    /// Snapshot of a run.
    #[must_use]
    pub fn run(&self, run_id: &str) -> Option<RunRecord> {
        self.state.lock().runs.get(run_id).cloned()
    }

    /// Snapshots of every run under an experiment.
    #[must_use]
    pub fn runs_for(&self, experiment_id: &str) -> Vec<RunRecord> {
        self.state
            .lock()
            .runs
            .values()
            .filter(|run| run.info.experiment_id == experiment_id)
            .cloned()
            .collect()
    }
}

impl ExperimentTracker for InMemoryTracker {
    fn tracking_uri(&self) -> &str {
        &self.uri
    }

    fn create_experiment(&self, name: &str) -> Result<String, TrackerError> {
        let mut state = self.state.lock();
        if state.experiments.iter().any(|exp| exp.name == name) {
            return Err(TrackerError::AlreadyExists(format!(
                "Experiment '{name}' already exists."
            )));
        }
        let experiment_id = state.experiments.len().to_string();
        state.experiments.push(Experiment {
            experiment_id: experiment_id.clone(),
            name: name.to_string(),
        });
        Ok(experiment_id)
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Experiment, TrackerError> {
        self.state
            .lock()
            .experiments
            .iter()
            .find(|exp| exp.name == name)
            .cloned()
            .ok_or_else(|| TrackerError::NotFound(format!("Experiment '{name}' does not exist.")))
    }

    fn create_run(&self, experiment_id: &str) -> Result<RunInfo, TrackerError> {
        let mut state = self.state.lock();
        if !state
            .experiments
            .iter()
            .any(|exp| exp.experiment_id == experiment_id)
        {
            return Err(TrackerError::NotFound(format!(
                "No Experiment with id={experiment_id} exists"
            )));
        }
        let info = RunInfo {
            run_id: Uuid::new_v4().simple().to_string(),
            experiment_id: experiment_id.to_string(),
        };
        state.runs.insert(
            info.run_id.clone(),
            RunRecord {
                info: info.clone(),
                params: BTreeMap::new(),
                metrics: BTreeMap::new(),
            },
        );
        Ok(info)
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackerError> {
        let mut state = self.state.lock();
        let run = run_mut(&mut state, run_id)?;
        match run.params.get(key) {
            Some(existing) if existing != value => Err(TrackerError::Api {
                status: 400,
                code: "INVALID_PARAMETER_VALUE".into(),
                message: format!(
                    "Changing param values is not allowed. Param with key='{key}' was already \
                     logged with value='{existing}' for run ID='{run_id}'. Attempted logging \
                     new value '{value}'."
                ),
            }),
            Some(_) => Ok(()),
            None => {
                run.params.insert(key.to_string(), value.to_string());
                Ok(())
            }
        }
    }

    fn log_metric(
        &self,
        run_id: &str,
        key: &str,
        value: f64,
        step: u64,
    ) -> Result<(), TrackerError> {
        let mut state = self.state.lock();
        run_mut(&mut state, run_id)?
            .metrics
            .entry(key.to_string())
            .or_default()
            .push(MetricPoint {
                value,
                step,
                timestamp: Utc::now(),
            });
        Ok(())
    }
}

fn run_mut<'a>(
    state: &'a mut TrackerState,
    run_id: &str,
) -> Result<&'a mut RunRecord, TrackerError> {
    state
        .runs
        .get_mut(run_id)
        .ok_or_else(|| TrackerError::NotFound(format!("Run '{run_id}' not found")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn experiment_names_are_unique() {
        let tracker = InMemoryTracker::new();
        let id = tracker.create_experiment("fares").unwrap();
        assert!(matches!(
            tracker.create_experiment("fares"),
            Err(TrackerError::AlreadyExists(_))
        ));
        assert_eq!(tracker.get_experiment_by_name("fares").unwrap().experiment_id, id);
        assert!(matches!(
            tracker.get_experiment_by_name("tips"),
            Err(TrackerError::NotFound(_))
        ));
    }

    #[test]
    fn params_are_write_once_and_metrics_append() {
        let tracker = InMemoryTracker::new();
        let exp = tracker.create_experiment("fares").unwrap();
        let run = tracker.create_run(&exp).unwrap();

        tracker.log_param(&run.run_id, "model", "linear").unwrap();
        tracker.log_param(&run.run_id, "model", "linear").unwrap();
        assert!(matches!(
            tracker.log_param(&run.run_id, "model", "sgd"),
            Err(TrackerError::Api { status: 400, .. })
        ));

        tracker.log_metric(&run.run_id, "RMSE", 2.5, 0).unwrap();
        tracker.log_metric(&run.run_id, "RMSE", 2.0, 1).unwrap();
        let record = tracker.run(&run.run_id).unwrap();
        assert_eq!(record.params["model"], "linear");
        let steps: Vec<u64> = record.metrics["RMSE"].iter().map(|p| p.step).collect();
        assert_eq!(steps, vec![0, 1]);
        assert_eq!(tracker.runs_for(&exp).len(), 1);
    }

    #[test]
    fn runs_need_an_existing_experiment() {
        let tracker = InMemoryTracker::new();
        assert!(matches!(tracker.create_run("7"), Err(TrackerError::NotFound(_))));
        assert!(matches!(
            tracker.log_metric("missing", "RMSE", 1.0, 0),
            Err(TrackerError::NotFound(_))
        ));
    }
}
