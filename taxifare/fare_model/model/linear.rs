use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::{check_training_set, check_width, ModelError, Regressor};

/// Ridge term added to the centred Gram matrix.
pub const DEFAULT_RIDGE: f64 = 1e-6;

/// Ordinary least squares with an unpenalized intercept.
///
/// Features and targets are centred before solving the normal equations, so
/// the intercept is recovered exactly and collinear one-hot blocks only see
/// the small ridge term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    ridge: f64,
    coefficients: Option<Array1<f64>>,
    intercept: f64,
}

impl Default for LinearRegression {
    fn default() -> Self {
        Self::new(DEFAULT_RIDGE)
    }
}

impl LinearRegression {
    /// Unfitted model with the given ridge term.
    #[must_use]
    pub const fn new(ridge: f64) -> Self {
        Self {
            ridge,
            coefficients: None,
            intercept: 0.0,
        }
    }

    /// Ridge term.
    #[must_use]
    pub const fn ridge(&self) -> f64 {
        self.ridge
    }

    /// Learned weights, one per feature column.
    #[must_use]
    pub const fn coefficients(&self) -> Option<&Array1<f64>> {
        self.coefficients.as_ref()
    }

    /// Learned intercept.
    #[must_use]
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }
}

impl Regressor for LinearRegression {
    fn fit(&mut self, features: &Array2<f64>, targets: &Array1<f64>) -> Result<(), ModelError> {
        if !(self.ridge.is_finite() && self.ridge >= 0.0) {
            return Err(ModelError::InvalidHyperparameter(format!(
                "ridge must be finite and non-negative, got {}",
                self.ridge
            )));
        }
        check_training_set(features, targets)?;

        let feature_mean = features
            .mean_axis(Axis(0))
            .ok_or(ModelError::EmptyTrainingSet)?;
        let target_mean = targets.mean().ok_or(ModelError::EmptyTrainingSet)?;
        let centred = features - &feature_mean;
        let centred_targets = targets - target_mean;

        let mut gram = centred.t().dot(&centred);
        gram.diag_mut().mapv_inplace(|v| v + self.ridge);
        let rhs = centred.t().dot(&centred_targets);

        let coefficients = solve(gram, rhs)?;
        self.intercept = target_mean - feature_mean.dot(&coefficients);
        self.coefficients = Some(coefficients);
        Ok(())
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let coefficients = self.coefficients.as_ref().ok_or(ModelError::NotFitted)?;
        check_width(coefficients.len(), features)?;
        Ok(features.dot(coefficients) + self.intercept)
    }

    fn describe(&self) -> String {
        format!("LinearRegression(ridge={:e})", self.ridge)
    }

    fn is_fitted(&self) -> bool {
        self.coefficients.is_some()
    }
}

/// Solves `a x = b` by Gaussian elimination with partial pivoting.
#[allow(clippy::cast_precision_loss)]
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, ModelError> {
    let n = b.len();
    if n == 0 {
        return Ok(b);
    }
    let scale = a.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())).max(1.0);
    let tolerance = scale * f64::EPSILON * n as f64;

    for col in 0..n {
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot_row, col]].abs() <= tolerance {
            return Err(ModelError::Singular);
        }
        if pivot_row != col {
            for k in 0..n {
                a.swap([col, k], [pivot_row, k]);
            }
            b.swap(col, pivot_row);
        }
        let pivot = a[[col, col]];
        for row in col + 1..n {
            let factor = a[[row, col]] / pivot;
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    if x.iter().any(|v: &f64| !v.is_finite()) {
        return Err(ModelError::NonFinite("coefficients"));
    }
    Ok(x)
}
