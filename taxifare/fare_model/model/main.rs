//! Regression estimators fitted on the preprocessed feature matrix.

/// Closed-form least squares.
pub mod linear;
/// Full-batch gradient descent.
pub mod sgd;

use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use linear::LinearRegression;
pub use sgd::SgdRegressor;

/// Errors raised by estimators.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Predict called before fit.
    #[error("model has not been fitted")]
    NotFitted,
    /// Fit called with no samples.
    #[error("cannot fit on zero samples")]
    EmptyTrainingSet,
    /// Feature rows and targets disagree in length.
    #[error("{rows} feature rows but {targets} targets")]
    TargetMismatch {
        /// Feature rows.
        rows: usize,
        /// Target values.
        targets: usize,
    },
    /// Column count differs from the one seen during fit.
    #[error("feature mismatch: expected {expected} features, got {got}")]
    FeatureMismatch {
        /// Columns seen during fit.
        expected: usize,
        /// Columns received.
        got: usize,
    },
    /// Normal equations have no unique solution.
    #[error("normal equations are singular; increase the ridge term")]
    Singular,
    /// NaN or infinity in inputs or learned parameters.
    #[error("non-finite values in {0}")]
    NonFinite(&'static str),
    /// Hyperparameter outside its domain.
    #[error("invalid hyperparameter: {0}")]
    InvalidHyperparameter(String),
}

/// A regression estimator: learns from a feature matrix and targets, then predicts.
pub trait Regressor {
    /// Learns parameters, replacing any previous fit.
    fn fit(&mut self, features: &Array2<f64>, targets: &Array1<f64>) -> Result<(), ModelError>;

    /// Predicts one target per feature row.
    fn predict(&self, features: &Array2<f64>) -> Result<Array1<f64>, ModelError>;

    /// Short description including hyperparameters, logged with each run.
    fn describe(&self) -> String;

    /// Whether [`fit`](Self::fit) has completed.
    fn is_fitted(&self) -> bool;
}

/// Estimators selectable by configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    /// [`LinearRegression`].
    #[default]
    Linear,
    /// [`SgdRegressor`].
    Sgd,
}

/// Closed set of estimators the fare pipeline can persist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Estimator {
    /// Least squares.
    Linear(LinearRegression),
    /// Gradient descent.
    Sgd(SgdRegressor),
}

impl Default for Estimator {
    fn default() -> Self {
        Self::Linear(LinearRegression::default())
    }
}

impl From<LinearRegression> for Estimator {
    fn from(model: LinearRegression) -> Self {
        Self::Linear(model)
    }
}

impl From<SgdRegressor> for Estimator {
    fn from(model: SgdRegressor) -> Self {
        Self::Sgd(model)
    }
}

impl Estimator {
    /// Which variant this is.
    #[must_use]
    pub const fn kind(&self) -> EstimatorKind {
        match self {
            Self::Linear(_) => EstimatorKind::Linear,
            Self::Sgd(_) => EstimatorKind::Sgd,
        }
    }
}

impl Regressor for Estimator {
    fn fit(&mut self, features: &Array2<f64>, targets: &Array1<f64>) -> Result<(), ModelError> {
        match self {
            Self::Linear(model) => model.fit(features, targets),
            Self::Sgd(model) => model.fit(features, targets),
        }
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        match self {
            Self::Linear(model) => model.predict(features),
            Self::Sgd(model) => model.predict(features),
        }
    }

    fn describe(&self) -> String {
        match self {
            Self::Linear(model) => model.describe(),
            Self::Sgd(model) => model.describe(),
        }
    }

    fn is_fitted(&self) -> bool {
        match self {
            Self::Linear(model) => model.is_fitted(),
            Self::Sgd(model) => model.is_fitted(),
        }
    }
}

fn check_training_set(features: &Array2<f64>, targets: &Array1<f64>) -> Result<(), ModelError> {
    if features.nrows() == 0 {
        return Err(ModelError::EmptyTrainingSet);
    }
    if features.nrows() != targets.len() {
        return Err(ModelError::TargetMismatch {
            rows: features.nrows(),
            targets: targets.len(),
        });
    }
    if features.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite("features"));
    }
    if targets.iter().any(|v| !v.is_finite()) {
        return Err(ModelError::NonFinite("targets"));
    }
    Ok(())
}

fn check_width(expected: usize, features: &Array2<f64>) -> Result<(), ModelError> {
    if features.ncols() == expected {
        Ok(())
    } else {
        Err(ModelError::FeatureMismatch {
            expected,
            got: features.ncols(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn estimator_dispatches_to_the_wrapped_model() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];
        for mut estimator in [
            Estimator::default(),
            Estimator::from(SgdRegressor::new(0.1, 3000)),
        ] {
            assert!(!estimator.is_fitted());
            estimator.fit(&x, &y).unwrap();
            assert!(estimator.is_fitted());
            let predicted = estimator.predict(&array![[10.0]]).unwrap();
            assert!((predicted[0] - 21.0).abs() < 1e-3, "{}", estimator.describe());
        }
    }

    #[test]
    fn training_set_checks() {
        let mut estimator = Estimator::default();
        assert!(matches!(
            estimator.fit(&Array2::zeros((0, 1)), &Array1::zeros(0)),
            Err(ModelError::EmptyTrainingSet)
        ));
        assert!(matches!(
            estimator.fit(&Array2::zeros((3, 1)), &Array1::zeros(2)),
            Err(ModelError::TargetMismatch { rows: 3, targets: 2 })
        ));
        assert!(matches!(
            estimator.fit(&array![[f64::INFINITY]], &array![1.0]),
            Err(ModelError::NonFinite("features"))
        ));
        assert_eq!(Estimator::default().kind(), EstimatorKind::Linear);
    }
}
