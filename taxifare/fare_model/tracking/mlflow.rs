use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};

use super::{Experiment, ExperimentTracker, RunInfo, TrackerError};

const API_PREFIX: &str = "api/2.0/mlflow";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking MLflow REST client.
///
/// Requests run on a private current-thread runtime, so callers stay synchronous.
pub struct MlflowClient {
    tracking_uri: String,
    base: String,
    http: Client,
    runtime: Runtime,
    timeout: Duration,
}

impl std::fmt::Debug for MlflowClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MlflowClient")
            .field("tracking_uri", &self.tracking_uri)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl MlflowClient {
    /// Points a client at `tracking_uri` (`http://` or `https://`).
    pub fn new(tracking_uri: impl Into<String>) -> Result<Self, TrackerError> {
        let tracking_uri = tracking_uri.into();
        if !(tracking_uri.starts_with("http://") || tracking_uri.starts_with("https://")) {
            return Err(TrackerError::Transport(format!(
                "tracking uri must be http(s): {tracking_uri}"
            )));
        }
        let http = Client::builder()
            .user_agent("taxifare-model/0.1")
            .build()
            .map_err(transport)?;
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|err| TrackerError::Transport(format!("starting runtime: {err}")))?;
        Ok(Self {
            base: tracking_uri.trim_end_matches('/').to_string(),
            tracking_uri,
            http,
            runtime,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Overrides the per-request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full URL of a REST method, e.g. `experiments/create`.
    #[must_use]
    pub fn endpoint(&self, method: &str) -> String {
        format!("{}/{API_PREFIX}/{method}", self.base)
    }

    fn post<B: Serialize, R: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
    ) -> Result<R, TrackerError> {
        self.send(self.http.post(self.endpoint(method)).json(body))
    }

    fn get<R: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, &str)],
    ) -> Result<R, TrackerError> {
        self.send(self.http.get(self.endpoint(method)).query(query))
    }

    fn send<R: DeserializeOwned>(&self, request: RequestBuilder) -> Result<R, TrackerError> {
        self.runtime.block_on(async {
            let response = request.timeout(self.timeout).send().await.map_err(transport)?;
            let status = response.status();
            let body = response.text().await.map_err(transport)?;
            if !status.is_success() {
                return Err(classify_error(status.as_u16(), &body));
            }
            let body = if body.trim().is_empty() { "{}" } else { body.as_str() };
            serde_json::from_str(body)
                .map_err(|err| TrackerError::Transport(format!("malformed response: {err}")))
        })
    }
}

/// Maps an MLflow error response onto [`TrackerError`].
#[must_use]
pub fn classify_error(status: u16, body: &str) -> TrackerError {
    #[derive(Deserialize)]
    struct ErrorBody {
        #[serde(default)]
        error_code: String,
        #[serde(default)]
        message: String,
    }

    let parsed = serde_json::from_str::<ErrorBody>(body).unwrap_or_else(|_| ErrorBody {
        error_code: String::new(),
        message: body.trim().to_string(),
    });
    match parsed.error_code.as_str() {
        "RESOURCE_ALREADY_EXISTS" => TrackerError::AlreadyExists(parsed.message),
        "RESOURCE_DOES_NOT_EXIST" => TrackerError::NotFound(parsed.message),
        _ => TrackerError::Api {
            status,
            code: parsed.error_code,
            message: parsed.message,
        },
    }
}

fn transport(err: reqwest::Error) -> TrackerError {
    TrackerError::Transport(err.to_string())
}

#[derive(Serialize)]
struct CreateExperiment<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Deserialize)]
struct GetExperimentResponse {
    experiment: Experiment,
}

#[derive(Serialize)]
struct CreateRun<'a> {
    experiment_id: &'a str,
    start_time: i64,
}

#[derive(Deserialize)]
struct CreateRunResponse {
    run: RunBody,
}

#[derive(Deserialize)]
struct RunBody {
    info: RunInfo,
}

#[derive(Serialize)]
struct LogParam<'a> {
    run_id: &'a str,
    key: &'a str,
    value: &'a str,
}

#[derive(Serialize)]
struct LogMetric<'a> {
    run_id: &'a str,
    key: &'a str,
    value: f64,
    timestamp: i64,
    step: u64,
}

impl ExperimentTracker for MlflowClient {
    fn tracking_uri(&self) -> &str {
        &self.tracking_uri
    }

    fn create_experiment(&self, name: &str) -> Result<String, TrackerError> {
        let response: CreateExperimentResponse =
            self.post("experiments/create", &CreateExperiment { name })?;
        Ok(response.experiment_id)
    }

    fn get_experiment_by_name(&self, name: &str) -> Result<Experiment, TrackerError> {
        let response: GetExperimentResponse =
            self.get("experiments/get-by-name", &[("experiment_name", name)])?;
        Ok(response.experiment)
    }

    fn create_run(&self, experiment_id: &str) -> Result<RunInfo, TrackerError> {
        let response: CreateRunResponse = self.post(
            "runs/create",
            &CreateRun {
                experiment_id,
                start_time: Utc::now().timestamp_millis(),
            },
        )?;
        Ok(response.run.info)
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), TrackerError> {
        let _: IgnoredAny = self.post("runs/log-parameter", &LogParam { run_id, key, value })?;
        Ok(())
    }

    fn log_metric(
        &self,
        run_id: &str,
        key: &str,
        value: f64,
        step: u64,
    ) -> Result<(), TrackerError> {
        let body = LogMetric {
            run_id,
            key,
            value,
            timestamp: Utc::now().timestamp_millis(),
            step,
        };
        let _: IgnoredAny = self.post("runs/log-metric", &body)?;
        Ok(())
    }
}
