//! Training entry point: load, clean, split, fit, evaluate and persist in one call.

use std::{path::PathBuf, sync::Arc};

use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_logging::LogLevel;

use crate::{
    config::TrainerConfig,
    data::{clean_data, get_data, split_target, train_test_split, CleaningReport, CleaningRules},
    model::Regressor,
    preprocessing::Preprocessor,
    telemetry::FareTelemetry,
    tracking::{ExperimentSession, InMemoryTracker},
    trainer::{Trainer, TrainerError},
};

/// Outcome of a completed training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    /// Rows removed and kept by cleaning.
    pub cleaning: CleaningReport,
    /// Rows the model was fitted on.
    pub train_rows: usize,
    /// Rows held out for scoring.
    pub test_rows: usize,
    /// Hold-out RMSE.
    pub rmse: f64,
    /// Estimator description.
    pub model: String,
    /// Link to the experiment in the tracking UI.
    pub experiment_url: String,
    /// Where the fitted pipeline was written.
    pub artifact_path: PathBuf,
}

/// One configured training run.
#[derive(Debug)]
pub struct TrainingRun {
    config: TrainerConfig,
    rules: CleaningRules,
    session: Option<ExperimentSession>,
    telemetry: FareTelemetry,
}

impl TrainingRun {
    /// Run driven entirely by `config`.
    #[must_use]
    pub fn new(config: TrainerConfig) -> Self {
        Self {
            config,
            rules: CleaningRules::default(),
            session: None,
            telemetry: FareTelemetry::disabled("trainer"),
        }
    }

    /// Overrides the tracking session derived from the config.
    #[must_use]
    pub fn with_session(mut self, session: ExperimentSession) -> Self {
        self.session = Some(session);
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: FareTelemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Uses custom cleaning bounds.
    #[must_use]
    pub fn with_cleaning_rules(mut self, rules: CleaningRules) -> Self {
        self.rules = rules;
        self
    }

    /// Session described by the `[tracking]` section: MLflow, or an
    /// in-process tracker when `offline` is set.
    #[must_use]
    pub fn session_for(config: &TrainerConfig) -> ExperimentSession {
        let tracking = &config.tracking;
        if tracking.offline {
            ExperimentSession::with_tracker(
                Arc::new(InMemoryTracker::new()),
                tracking.experiment_name.clone(),
            )
        } else {
            ExperimentSession::mlflow(tracking.uri.clone(), tracking.experiment_name.clone())
        }
    }

    /// Executes the run.
    pub fn execute(self) -> Result<TrainingReport, TrainerError> {
        let Self {
            config,
            rules,
            session,
            telemetry,
        } = self;
        let session = session.unwrap_or_else(|| Self::session_for(&config));

        let raw = get_data(&config.data.path, config.data.row_limit())?;
        let (trips, cleaning) = clean_data(raw, &rules);
        let _ = telemetry.log(
            LogLevel::Info,
            "data.cleaned",
            json!({
                "path": config.data.path.display().to_string(),
                "rows_in": cleaning.rows_in,
                "rows_out": cleaning.rows_out,
            }),
        );

        let (train, test) = train_test_split(trips, config.data.test_size, config.data.seed)?;
        let (x_train, y_train) = split_target(train);
        let (x_test, y_test) = split_target(test);
        let (train_rows, test_rows) = (x_train.len(), x_test.len());

        let mut trainer = Trainer::new(x_train, y_train, config.model.estimator())
            .with_preprocessor(Preprocessor::new(config.features.timezone))
            .with_session(session)
            .with_telemetry(telemetry);
        let model = trainer.run()?.estimator().describe();
        let rmse = trainer.evaluate(&x_test, &y_test)?;
        trainer.save_model_to(&config.output.artifact_path)?;
        let experiment_url = trainer.experiment_url()?;

        Ok(TrainingReport {
            cleaning,
            train_rows,
            test_rows,
            rmse,
            model,
            experiment_url,
            artifact_path: config.output.artifact_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{synthetic_trips, write_csv, DataError},
        pipeline::FittedFarePipeline,
    };
    use tempfile::tempdir;

    fn offline_config(dir: &std::path::Path) -> TrainerConfig {
        let mut config = TrainerConfig::default();
        config.data.path = dir.join("train.csv");
        config.tracking.offline = true;
        config.output.artifact_path = dir.join("out/model.bin");
        config
    }

    #[test]
    fn trains_from_csv_and_writes_the_artifact() {
        let dir = tempdir().unwrap();
        let config = offline_config(dir.path());
        write_csv(&config.data.path, &synthetic_trips(200, 21)).unwrap();

        let report = TrainingRun::new(config.clone()).execute().unwrap();
        assert_eq!(report.cleaning.rows_out, 200);
        assert_eq!(report.test_rows, 30);
        assert_eq!(report.train_rows, 170);
        assert!(report.rmse < 1.0, "rmse {}", report.rmse);
        assert_eq!(report.experiment_url, "memory://local/#/experiments/0");
        assert!(FittedFarePipeline::load(&config.output.artifact_path).is_ok());
    }

    #[test]
    fn missing_data_file_is_a_data_error() {
        let dir = tempdir().unwrap();
        let err = TrainingRun::new(offline_config(dir.path()))
            .execute()
            .unwrap_err();
        assert!(matches!(err, TrainerError::Data(DataError::Io(_))));
    }

    #[test]
    fn online_config_targets_mlflow() {
        let config = TrainerConfig::default();
        let session = TrainingRun::session_for(&config);
        assert_eq!(session.tracking_uri(), "https://mlflow.lewagon.co/");
        assert_eq!(session.experiment_name(), "TaxiFareModel v1");
    }
}
