//! Preprocessor and estimator fitted together, plus artifact persistence.

use std::{
    fs::{self, File},
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use ndarray::Array1;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    data::TripFrame,
    model::{Estimator, ModelError, Regressor},
    preprocessing::{FittedPreprocessor, PreprocessingError, Preprocessor},
};

/// Errors raised while fitting, predicting with or persisting a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Feature engineering failed.
    #[error(transparent)]
    Preprocessing(#[from] PreprocessingError),
    /// The estimator failed.
    #[error(transparent)]
    Model(#[from] ModelError),
    /// Frame rows and targets disagree in length.
    #[error("{rows} rows but {targets} targets")]
    TargetMismatch {
        /// Frame rows.
        rows: usize,
        /// Target values.
        targets: usize,
    },
    /// Reading or writing the artifact failed.
    #[error("artifact i/o on {path}: {source}")]
    Io {
        /// Artifact path.
        path: PathBuf,
        /// Underlying error.
        source: io::Error,
    },
    /// The artifact bytes are not a fitted fare pipeline.
    #[error("artifact {path} could not be encoded or decoded: {source}")]
    Codec {
        /// Artifact path.
        path: PathBuf,
        /// Underlying error.
        source: bincode::Error,
    },
}

/// Unfitted pipeline: the column transformer followed by an estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FarePipeline {
    preprocessor: Preprocessor,
    estimator: Estimator,
}

impl FarePipeline {
    /// Appends `estimator` after `preprocessor`.
    #[must_use]
    pub const fn new(preprocessor: Preprocessor, estimator: Estimator) -> Self {
        Self {
            preprocessor,
            estimator,
        }
    }

    /// Preprocessing stage.
    #[must_use]
    pub const fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Final stage.
    #[must_use]
    pub const fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Fits the preprocessor on `frame`, then the estimator on the transformed
    /// features. The unfitted pipeline is left untouched.
    pub fn fit(
        &self,
        frame: &TripFrame,
        targets: &[f64],
    ) -> Result<FittedFarePipeline, PipelineError> {
        if frame.len() != targets.len() {
            return Err(PipelineError::TargetMismatch {
                rows: frame.len(),
                targets: targets.len(),
            });
        }
        let preprocessor = self.preprocessor.fit(frame)?;
        let features = preprocessor.transform(frame)?;
        let mut estimator = self.estimator.clone();
        estimator.fit(&features, &Array1::from_vec(targets.to_vec()))?;
        Ok(FittedFarePipeline {
            preprocessor,
            estimator,
        })
    }
}

/// Pipeline with learned statistics and parameters, ready to predict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedFarePipeline {
    preprocessor: FittedPreprocessor,
    estimator: Estimator,
}

impl FittedFarePipeline {
    /// Predicts one fare per row.
    pub fn predict(&self, frame: &TripFrame) -> Result<Vec<f64>, PipelineError> {
        let features = self.preprocessor.transform(frame)?;
        Ok(self.estimator.predict(&features)?.to_vec())
    }

    /// Fitted preprocessing stage.
    #[must_use]
    pub const fn preprocessor(&self) -> &FittedPreprocessor {
        &self.preprocessor
    }

    /// Fitted estimator.
    #[must_use]
    pub const fn estimator(&self) -> &Estimator {
        &self.estimator
    }

    /// Writes the pipeline with bincode, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PipelineError> {
        let path = path.as_ref();
        let io_err = |source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
        bincode::serialize_into(&mut writer, self).map_err(|source| PipelineError::Codec {
            path: path.to_path_buf(),
            source,
        })?;
        writer.flush().map_err(io_err)
    }

    /// Reads a pipeline written by [`save`](Self::save).
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PipelineError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| PipelineError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        bincode::deserialize_from(BufReader::new(file)).map_err(|source| PipelineError::Codec {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        data::{split_target, synthetic_trips},
        model::{LinearRegression, SgdRegressor},
    };
    use tempfile::tempdir;

    fn synthetic_frame(count: usize, seed: u64) -> (TripFrame, Vec<f64>) {
        split_target(synthetic_trips(count, seed))
    }

    #[test]
    fn fitted_pipeline_survives_a_save_load_cycle() {
        let (frame, y) = synthetic_frame(60, 3);
        let fitted = FarePipeline::new(Preprocessor::default(), LinearRegression::default().into())
            .fit(&frame, &y)
            .unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("artifacts/model.bin");
        fitted.save(&path).unwrap();
        fitted.save(&path).unwrap();
        let restored = FittedFarePipeline::load(&path).unwrap();

        assert_eq!(restored, fitted);
        assert_eq!(restored.predict(&frame).unwrap(), fitted.predict(&frame).unwrap());
    }

    #[test]
    fn fit_does_not_mutate_the_template() {
        let (frame, y) = synthetic_frame(30, 8);
        let pipeline = FarePipeline::new(Preprocessor::default(), SgdRegressor::default().into());
        let fitted = pipeline.fit(&frame, &y).unwrap();
        assert!(!pipeline.estimator().is_fitted());
        assert!(fitted.estimator().is_fitted());
    }

    #[test]
    fn misaligned_targets_are_rejected() {
        let (frame, _) = synthetic_frame(5, 1);
        let err = FarePipeline::new(Preprocessor::default(), Estimator::default())
            .fit(&frame, &[1.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, PipelineError::TargetMismatch { rows: 5, targets: 2 }));
    }

    #[test]
    fn loading_garbage_reports_codec_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("model.bin");
        fs::write(&path, b"not a model").unwrap();
        assert!(matches!(
            FittedFarePipeline::load(&path),
            Err(PipelineError::Codec { .. })
        ));
        assert!(matches!(
            FittedFarePipeline::load(dir.path().join("missing.bin")),
            Err(PipelineError::Io { .. })
        ));
    }
}
