//! Orchestrates pipeline construction, fitting, evaluation, experiment
//! logging and persistence for one training run.

use std::path::Path;

use serde_json::json;
use shared_logging::LogLevel;
use thiserror::Error;

use crate::{
    data::{DataError, TripFrame},
    metrics::{rmse, MetricError},
    model::{Estimator, Regressor},
    pipeline::{FarePipeline, FittedFarePipeline, PipelineError},
    preprocessing::Preprocessor,
    telemetry::FareTelemetry,
    tracking::{ExperimentSession, TrackerError},
};

/// Fixed artifact path used by [`Trainer::save_model`].
pub const MODEL_ARTIFACT_PATH: &str = "model.bin";

/// Errors surfaced by the trainer.
#[derive(Debug, Error)]
pub enum TrainerError {
    /// `evaluate` or `save_model` before `run`.
    #[error("pipeline has not been fitted; call run() first")]
    PipelineNotFitted,
    /// Loading or reshaping data failed.
    #[error(transparent)]
    Data(#[from] DataError),
    /// Fitting, predicting or persisting the pipeline failed.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    /// The score could not be computed.
    #[error(transparent)]
    Metric(#[from] MetricError),
    /// The tracker rejected a call.
    #[error("experiment tracking failed: {0}")]
    Tracking(#[from] TrackerError),
}

/// Owns the training data, the estimator and everything derived from them.
#[derive(Debug)]
pub struct Trainer {
    x: TripFrame,
    y: Vec<f64>,
    estimator: Estimator,
    preprocessor: Preprocessor,
    pipeline: Option<FarePipeline>,
    fitted: Option<FittedFarePipeline>,
    score: Option<f64>,
    session: ExperimentSession,
    telemetry: FareTelemetry,
}

impl Trainer {
    /// Trainer over `(x, y)` that logs to the shared MLflow server under the
    /// default experiment name.
    #[must_use]
    pub fn new(x: TripFrame, y: Vec<f64>, estimator: impl Into<Estimator>) -> Self {
        Self {
            x,
            y,
            estimator: estimator.into(),
            preprocessor: Preprocessor::default(),
            pipeline: None,
            fitted: None,
            score: None,
            session: ExperimentSession::default(),
            telemetry: FareTelemetry::disabled("trainer"),
        }
    }

    /// Files runs under another experiment.
    #[must_use]
    pub fn with_experiment_name(mut self, name: impl Into<String>) -> Self {
        self.session = self.session.with_experiment_name(name);
        self
    }

    /// Replaces the tracking session.
    #[must_use]
    pub fn with_session(mut self, session: ExperimentSession) -> Self {
        self.session = session;
        self
    }

    /// Routes trainer logs through `telemetry`.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: FareTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Uses a differently configured preprocessing stage.
    #[must_use]
    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    /// Experiment name runs are filed under.
    #[must_use]
    pub fn experiment_name(&self) -> &str {
        self.session.experiment_name()
    }

    /// Assembles preprocessing plus the estimator, replacing any previous
    /// pipeline. A previously fitted pipeline is discarded.
    pub fn build_pipeline(&mut self) -> &FarePipeline {
        let pipeline = FarePipeline::new(self.preprocessor.clone(), self.estimator.clone());
        self.fitted = None;
        self.pipeline.insert(pipeline)
    }

    /// Builds a fresh pipeline and fits it on the training data.
    pub fn run(&mut self) -> Result<&FittedFarePipeline, TrainerError> {
        let rows = self.x.len();
        let pipeline = self.build_pipeline().clone();
        let fitted = match pipeline.fit(&self.x, &self.y) {
            Ok(fitted) => fitted,
            Err(err) => {
                let _ = self.telemetry.log(
                    LogLevel::Error,
                    "trainer.run.failed",
                    json!({ "rows": rows, "error": err.to_string() }),
                );
                return Err(err.into());
            }
        };
        let _ = self.telemetry.log(
            LogLevel::Info,
            "trainer.run.fitted",
            json!({
                "rows": rows,
                "features": fitted.preprocessor().n_features_out(),
                "model": fitted.estimator().describe(),
            }),
        );
        Ok(self.fitted.insert(fitted))
    }

    /// Scores the fitted pipeline on held-out data with RMSE, stores the
    /// score, then logs the model description, the training size and the
    /// score to the tracker. Each call appends a new RMSE entry.
    pub fn evaluate(&mut self, x_test: &TripFrame, y_test: &[f64]) -> Result<f64, TrainerError> {
        let fitted = self.fitted.as_ref().ok_or(TrainerError::PipelineNotFitted)?;
        let predictions = fitted.predict(x_test)?;
        let score = rmse(&predictions, y_test)?;
        let model = fitted.estimator().describe();
        self.score = Some(score);

        self.session.log_param("model", &model)?;
        self.session.log_param("train_samples", self.y.len())?;
        let step = self.session.log_metric("RMSE", score)?;
        let _ = self.telemetry.log(
            LogLevel::Info,
            "trainer.evaluate",
            json!({
                "rmse": score,
                "rows": x_test.len(),
                "step": step,
                "experiment": self.session.experiment_name(),
            }),
        );
        Ok(score)
    }

    /// Writes the fitted pipeline to [`MODEL_ARTIFACT_PATH`], overwriting it.
    pub fn save_model(&self) -> Result<(), TrainerError> {
        self.save_model_to(MODEL_ARTIFACT_PATH)
    }

    /// Writes the fitted pipeline to `path`, overwriting it.
    pub fn save_model_to(&self, path: impl AsRef<Path>) -> Result<(), TrainerError> {
        let fitted = self.fitted.as_ref().ok_or(TrainerError::PipelineNotFitted)?;
        fitted.save(path.as_ref())?;
        let _ = self.telemetry.log(
            LogLevel::Info,
            "trainer.model.saved",
            json!({ "path": path.as_ref().display().to_string() }),
        );
        Ok(())
    }

    /// Last RMSE computed by [`evaluate`](Self::evaluate).
    #[must_use]
    pub const fn score(&self) -> Option<f64> {
        self.score
    }

    /// Most recently built pipeline.
    #[must_use]
    pub const fn pipeline(&self) -> Option<&FarePipeline> {
        self.pipeline.as_ref()
    }

    /// Pipeline fitted by the last [`run`](Self::run).
    #[must_use]
    pub const fn fitted_pipeline(&self) -> Option<&FittedFarePipeline> {
        self.fitted.as_ref()
    }

    /// Tracking session.
    #[must_use]
    pub const fn session(&self) -> &ExperimentSession {
        &self.session
    }

    /// Link to the experiment in the tracking UI.
    pub fn experiment_url(&self) -> Result<String, TrainerError> {
        Ok(self.session.experiment_url()?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        data::{split_target, synthetic_trips},
        model::{LinearRegression, SgdRegressor},
        tracking::{ExperimentTracker, InMemoryTracker},
    };
    use shared_logging::read_records;
    use tempfile::tempdir;

    fn offline_trainer(tracker: &Arc<InMemoryTracker>, estimator: Estimator) -> Trainer {
        let (x, y) = split_target(synthetic_trips(100, 11));
        Trainer::new(x, y, estimator)
            .with_session(ExperimentSession::with_tracker(tracker.clone(), "TaxiFareModel v1"))
    }

    #[test]
    fn evaluate_before_run_is_an_error() {
        let tracker = Arc::new(InMemoryTracker::new());
        let mut trainer = offline_trainer(&tracker, Estimator::default());
        let (x_test, y_test) = split_target(synthetic_trips(5, 2));
        assert!(matches!(
            trainer.evaluate(&x_test, &y_test),
            Err(TrainerError::PipelineNotFitted)
        ));
        assert!(matches!(trainer.save_model(), Err(TrainerError::PipelineNotFitted)));
        assert!(trainer.score().is_none());
        assert!(tracker.experiments().is_empty());
    }

    #[test]
    fn learns_distance_fare_relation_end_to_end() {
        let tracker = Arc::new(InMemoryTracker::new());
        let mut trainer = offline_trainer(&tracker, LinearRegression::default().into());
        let (x_test, y_test) = split_target(synthetic_trips(20, 99));

        trainer.run().unwrap();
        let score = trainer.evaluate(&x_test, &y_test).unwrap();
        assert!(score < 1.0, "rmse {score}");
        assert_eq!(trainer.score(), Some(score));

        let exp = tracker.get_experiment_by_name("TaxiFareModel v1").unwrap();
        let runs = tracker.runs_for(&exp.experiment_id);
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].params["train_samples"], "100");
        assert!(runs[0].params["model"].starts_with("LinearRegression"));
    }

    #[test]
    fn repeated_evaluate_appends_metric_entries() {
        let tracker = Arc::new(InMemoryTracker::new());
        let mut trainer = offline_trainer(&tracker, Estimator::default());
        let (x_test, y_test) = split_target(synthetic_trips(20, 5));
        trainer.run().unwrap();
        trainer.evaluate(&x_test, &y_test).unwrap();
        trainer.evaluate(&x_test, &y_test).unwrap();

        let run_id = trainer.session().run().unwrap().run_id.clone();
        let record = tracker.run(&run_id).unwrap();
        let steps: Vec<u64> = record.metrics["RMSE"].iter().map(|p| p.step).collect();
        assert_eq!(steps, vec![0, 1]);
        assert_eq!(tracker.runs_for(&record.info.experiment_id).len(), 1);
    }

    #[test]
    fn rebuilding_discards_the_fitted_pipeline() {
        let tracker = Arc::new(InMemoryTracker::new());
        let mut trainer = offline_trainer(&tracker, SgdRegressor::default().into());
        trainer.run().unwrap();
        assert!(trainer.fitted_pipeline().is_some());
        let pipeline = trainer.build_pipeline();
        assert!(!pipeline.estimator().is_fitted());
        assert!(trainer.fitted_pipeline().is_none());
    }

    #[test]
    fn saved_model_reproduces_predictions() {
        let tracker = Arc::new(InMemoryTracker::new());
        let dir = tempdir().unwrap();
        let telemetry = FareTelemetry::builder("trainer")
            .log_path(dir.path().join("trainer.log"))
            .build()
            .unwrap();
        let mut trainer =
            offline_trainer(&tracker, Estimator::default()).with_telemetry(telemetry);
        let (x_test, _) = split_target(synthetic_trips(10, 3));
        trainer.run().unwrap();

        let path = dir.path().join("model.bin");
        trainer.save_model_to(&path).unwrap();
        let restored = FittedFarePipeline::load(&path).unwrap();
        assert_eq!(
            restored.predict(&x_test).unwrap(),
            trainer.fitted_pipeline().unwrap().predict(&x_test).unwrap()
        );

        let messages: Vec<String> = read_records(dir.path().join("trainer.log"))
            .unwrap()
            .into_iter()
            .map(|r| r.message)
            .collect();
        assert_eq!(messages, vec!["trainer.run.fitted", "trainer.model.saved"]);
    }

    #[test]
    fn experiment_name_and_url_follow_the_session() {
        let tracker = Arc::new(InMemoryTracker::with_uri("https://mlflow.lewagon.co/"));
        let trainer = offline_trainer(&tracker, Estimator::default())
            .with_experiment_name("[NY] [fares] linear v2");
        assert_eq!(trainer.experiment_name(), "[NY] [fares] linear v2");
        assert_eq!(
            trainer.experiment_url().unwrap(),
            "https://mlflow.lewagon.co/#/experiments/0"
        );
    }

    #[test]
    fn tracking_failures_surface_from_evaluate() {
        let (x, y) = split_target(synthetic_trips(30, 4));
        let session = ExperimentSession::mlflow("ftp://nowhere", "fares");
        let mut trainer =
            Trainer::new(x.clone(), y.clone(), Estimator::default()).with_session(session);
        trainer.run().unwrap();
        let err = trainer.evaluate(&x, &y).unwrap_err();
        assert!(matches!(err, TrainerError::Tracking(TrackerError::Transport(_))));
        assert!(trainer.score().is_some());
    }
}
