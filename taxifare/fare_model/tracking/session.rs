use std::{collections::HashMap, fmt, sync::Arc};

use once_cell::unsync::OnceCell;

use super::{
    ExperimentTracker, MlflowClient, RunInfo, TrackerError, DEFAULT_EXPERIMENT_NAME,
    DEFAULT_TRACKING_URI,
};

/// Opens a tracker for a tracking URI.
pub type Connector = Box<dyn Fn(&str) -> Result<Arc<dyn ExperimentTracker>, TrackerError>>;

/// Per-trainer view of the tracker.
///
/// The client, the experiment id and the run are each resolved on first use
/// and reused for the lifetime of the session. A fresh session resolves them
/// again. Failed resolutions are not cached.
pub struct ExperimentSession {
    tracking_uri: String,
    experiment_name: String,
    connector: Connector,
    client: OnceCell<Arc<dyn ExperimentTracker>>,
    experiment_id: OnceCell<String>,
    run: OnceCell<RunInfo>,
    steps: HashMap<String, u64>,
}

impl fmt::Debug for ExperimentSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExperimentSession")
            .field("tracking_uri", &self.tracking_uri)
            .field("experiment_name", &self.experiment_name)
            .field("experiment_id", &self.experiment_id.get())
            .field("run", &self.run.get())
            .finish_non_exhaustive()
    }
}

impl Default for ExperimentSession {
    fn default() -> Self {
        Self::mlflow(DEFAULT_TRACKING_URI, DEFAULT_EXPERIMENT_NAME)
    }
}

impl ExperimentSession {
    /// Session backed by an MLflow server; nothing is contacted until first use.
    #[must_use]
    pub fn mlflow(tracking_uri: impl Into<String>, experiment_name: impl Into<String>) -> Self {
        Self::with_connector(
            tracking_uri,
            experiment_name,
            Box::new(connect_mlflow),
        )
    }

    /// Session over an already constructed tracker.
    #[must_use]
    pub fn with_tracker(
        tracker: Arc<dyn ExperimentTracker>,
        experiment_name: impl Into<String>,
    ) -> Self {
        let uri = tracker.tracking_uri().to_string();
        Self::with_connector(
            uri,
            experiment_name,
            Box::new(move |_: &str| -> Result<Arc<dyn ExperimentTracker>, TrackerError> {
                Ok(Arc::clone(&tracker))
            }),
        )
    }

    /// Session whose client comes from `connector`.
    #[must_use]
    pub fn with_connector(
        tracking_uri: impl Into<String>,
        experiment_name: impl Into<String>,
        connector: Connector,
    ) -> Self {
        Self {
            tracking_uri: tracking_uri.into(),
            experiment_name: experiment_name.into(),
            connector,
            client: OnceCell::new(),
            experiment_id: OnceCell::new(),
            run: OnceCell::new(),
            steps: HashMap::new(),
        }
    }

    /// Renames the experiment, discarding any resolved experiment and run.
    #[must_use]
    pub fn with_experiment_name(mut self, experiment_name: impl Into<String>) -> Self {
        self.experiment_name = experiment_name.into();
        self.experiment_id = OnceCell::new();
        self.run = OnceCell::new();
        self.steps.clear();
        self
    }

    /// Configured tracking URI.
    #[must_use]
    pub fn tracking_uri(&self) -> &str {
        &self.tracking_uri
    }

    /// Experiment name runs are filed under.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        &self.experiment_name
    }

    /// The tracker client, connecting on first call.
    pub fn client(&self) -> Result<&Arc<dyn ExperimentTracker>, TrackerError> {
        self.client
            .get_or_try_init(|| (self.connector)(&self.tracking_uri))
    }

    /// The experiment id, creating the experiment on first call. Only an
    /// "already exists" answer falls back to a lookup by name.
    pub fn experiment_id(&self) -> Result<&str, TrackerError> {
        self.experiment_id
            .get_or_try_init(|| {
                let client = self.client()?;
                match client.create_experiment(&self.experiment_name) {
                    Ok(id) => Ok(id),
                    Err(TrackerError::AlreadyExists(_)) => client
                        .get_experiment_by_name(&self.experiment_name)
                        .map(|experiment| experiment.experiment_id),
                    Err(err) => Err(err),
                }
            })
            .map(String::as_str)
    }

    /// The session's run, created on first call.
    pub fn run(&self) -> Result<&RunInfo, TrackerError> {
        self.run.get_or_try_init(|| {
            let experiment_id = self.experiment_id()?;
            self.client()?.create_run(experiment_id)
        })
    }

    /// Records a parameter on the session's run.
    pub fn log_param(&self, key: &str, value: impl fmt::Display) -> Result<(), TrackerError> {
        let run = self.run()?;
        self.client()?
            .log_param(&run.run_id, key, &value.to_string())
    }

    /// Appends a metric value on the session's run and returns the step it
    /// was logged at. Steps count up from zero per key.
    pub fn log_metric(&mut self, key: &str, value: f64) -> Result<u64, TrackerError> {
        let step = self.steps.get(key).map_or(0, |last| last + 1);
        let run = self.run()?;
        self.client()?.log_metric(&run.run_id, key, value, step)?;
        self.steps.insert(key.to_string(), step);
        Ok(step)
    }

    /// Link to the experiment in the tracking UI.
    pub fn experiment_url(&self) -> Result<String, TrackerError> {
        let experiment_id = self.experiment_id()?;
        Ok(format!(
            "{}/#/experiments/{experiment_id}",
            self.tracking_uri.trim_end_matches('/')
        ))
    }
}

fn connect_mlflow(uri: &str) -> Result<Arc<dyn ExperimentTracker>, TrackerError> {
    Ok(Arc::new(MlflowClient::new(uri)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{Experiment, InMemoryTracker};
    use parking_lot::Mutex;

    /// Counts calls and can be told to fail experiment creation.
    #[derive(Default)]
    struct Recording {
        inner: InMemoryTracker,
        calls: Mutex<Vec<&'static str>>,
        create_failure: Option<TrackerError>,
    }

    impl Recording {
        fn calls(&self, name: &str) -> usize {
            self.calls.lock().iter().filter(|c| **c == name).count()
        }
    }

    impl ExperimentTracker for Recording {
        fn tracking_uri(&self) -> &str {
            "https://tracker.test/"
        }
        fn create_experiment(&self, name: &str) -> Result<String, TrackerError> {
            self.calls.lock().push("create_experiment");
            match &self.create_failure {
                Some(err) => Err(err.clone()),
                None => self.inner.create_experiment(name),
            }
        }
        fn get_experiment_by_name(&self, name: &str) -> Result<Experiment, TrackerError> {
            self.calls.lock().push("get_experiment_by_name");
            self.inner.get_experiment_by_name(name)
        }
        fn create_run(&self, experiment_id: &str) -> Result<RunInfo, TrackerError> {
            self.calls.lock().push("create_run");
            self.inner.create_run(experiment_id)
        }
        fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackerError> {
            self.inner.log_param(run_id, key, value)
        }
        fn log_metric(
            &self,
            run_id: &str,
            key: &str,
            value: f64,
            step: u64,
        ) -> Result<(), TrackerError> {
            self.inner.log_metric(run_id, key, value, step)
        }
    }

    #[test]
    fn create_or_get_returns_the_same_id_twice() {
        let tracker: Arc<InMemoryTracker> = Arc::new(InMemoryTracker::new());
        let first = ExperimentSession::with_tracker(tracker.clone(), "TaxiFareModel v1");
        let second = ExperimentSession::with_tracker(tracker.clone(), "TaxiFareModel v1");
        assert_eq!(first.experiment_id().unwrap(), second.experiment_id().unwrap());
        assert_eq!(tracker.experiments().len(), 1);
    }

    #[test]
    fn client_experiment_and_run_are_resolved_once() {
        let tracker = Arc::new(Recording::default());
        let connects = Arc::new(Mutex::new(0_usize));
        let counter = Arc::clone(&connects);
        let shared = Arc::clone(&tracker);
        let mut session = ExperimentSession::with_connector(
            "https://tracker.test/",
            "fares",
            Box::new(move |_: &str| -> Result<Arc<dyn ExperimentTracker>, TrackerError> {
                *counter.lock() += 1;
                Ok(shared.clone())
            }),
        );

        session.log_param("model", "linear").unwrap();
        session.log_metric("RMSE", 3.0).unwrap();
        session.log_metric("RMSE", 2.0).unwrap();
        let run_id = session.run().unwrap().run_id.clone();

        assert_eq!(*connects.lock(), 1);
        assert_eq!(tracker.calls("create_experiment"), 1);
        assert_eq!(tracker.calls("create_run"), 1);
        assert_eq!(tracker.inner.run(&run_id).unwrap().metrics["RMSE"].len(), 2);
    }

    #[test]
    fn only_already_exists_falls_back_to_lookup() {
        let tracker = Arc::new(Recording {
            create_failure: Some(TrackerError::Transport("connection refused".into())),
            ..Recording::default()
        });
        let session = ExperimentSession::with_tracker(tracker.clone(), "fares");
        assert!(matches!(session.experiment_id(), Err(TrackerError::Transport(_))));
        assert_eq!(tracker.calls("get_experiment_by_name"), 0);

        let tracker = Arc::new(Recording {
            create_failure: Some(TrackerError::AlreadyExists("fares".into())),
            ..Recording::default()
        });
        tracker.inner.create_experiment("fares").unwrap();
        let session = ExperimentSession::with_tracker(tracker.clone(), "fares");
        assert_eq!(session.experiment_id().unwrap(), "0");
        assert_eq!(tracker.calls("get_experiment_by_name"), 1);
    }

    #[test]
    fn metric_steps_count_per_key() {
        let tracker = Arc::new(InMemoryTracker::new());
        let mut session = ExperimentSession::with_tracker(tracker, "fares");
        assert_eq!(session.log_metric("RMSE", 3.0).unwrap(), 0);
        assert_eq!(session.log_metric("RMSE", 2.5).unwrap(), 1);
        assert_eq!(session.log_metric("MAE", 2.0).unwrap(), 0);
    }

    #[test]
    fn experiment_url_points_at_the_ui() {
        let tracker = Arc::new(InMemoryTracker::with_uri("https://mlflow.lewagon.co/"));
        let session = ExperimentSession::with_tracker(tracker, "fares");
        assert_eq!(
            session.experiment_url().unwrap(),
            "https://mlflow.lewagon.co/#/experiments/0"
        );
    }

    #[test]
    fn default_session_targets_the_shared_server_lazily() {
        let session = ExperimentSession::default();
        assert_eq!(session.tracking_uri(), DEFAULT_TRACKING_URI);
        assert_eq!(session.experiment_name(), DEFAULT_EXPERIMENT_NAME);
        assert!(format!("{session:?}").contains("experiment_id: None"));
    }
}
