use std::{fmt, path::PathBuf, sync::Arc};

use anyhow::Result;
use serde_json::Value;
use shared_logging::{JsonLogger, LogLevel, LogRecord};

/// Builder for fare model telemetry sinks.
pub struct FareTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    min_level: LogLevel,
}

impl FareTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            min_level: LogLevel::Debug,
        }
    }

    /// Sets the log path.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Drops records below `level`.
    #[must_use]
    pub const fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<FareTelemetry> {
        let logger = match self.log_path {
            Some(path) => Some(JsonLogger::with_min_level(path, self.min_level)?),
            None => None,
        };
        Ok(FareTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                logger,
            }),
        })
    }
}

/// Telemetry handle shared by the trainer and the CLI.
#[derive(Clone)]
pub struct FareTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for FareTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FareTelemetry")
            .field("module", &self.inner.module)
            .field("log_path", &self.inner.logger.as_ref().map(JsonLogger::path))
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    logger: Option<JsonLogger>,
}

impl FareTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> FareTelemetryBuilder {
        FareTelemetryBuilder::new(module)
    }

    /// Handle that discards everything.
    #[must_use]
    pub fn disabled(module: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(TelemetryInner {
                module: module.into(),
                logger: None,
            }),
        }
    }

    /// Component name stamped on each record.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }

    /// Logs structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if let Some(logger) = &self.inner.logger {
            let record = LogRecord::new(&self.inner.module, level, message).with_metadata(metadata);
            logger.log(&record)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shared_logging::read_records;
    use tempfile::tempdir;

    #[test]
    fn telemetry_writes_filtered_records() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("logs/trainer.log");
        let telemetry = FareTelemetry::builder("trainer")
            .log_path(&path)
            .min_level(LogLevel::Info)
            .build()
            .unwrap();
        telemetry
            .log(LogLevel::Debug, "trainer.fit.batch", json!({ "rows": 10 }))
            .unwrap();
        telemetry
            .log(LogLevel::Info, "trainer.evaluate", json!({ "rmse": 2.5 }))
            .unwrap();
        let records = read_records(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].module, "trainer");
        assert_eq!(records[0].metadata["rmse"], json!(2.5));
    }

    #[test]
    fn disabled_telemetry_is_silent() {
        let telemetry = FareTelemetry::disabled("trainer");
        telemetry
            .log(LogLevel::Error, "trainer.failed", Value::Null)
            .unwrap();
        assert_eq!(telemetry.module(), "trainer");
    }
}
