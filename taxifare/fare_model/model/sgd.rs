use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

use super::{check_training_set, check_width, ModelError, Regressor};

/// Default step size.
pub const DEFAULT_LEARNING_RATE: f64 = 0.05;
/// Default number of passes over the training set.
pub const DEFAULT_EPOCHS: usize = 1_000;

/// Linear model trained with full-batch gradient descent on squared error.
///
/// Weights start at zero so repeated fits on the same data are identical.
/// Inputs should be on comparable scales; the fare preprocessor already
/// standardizes distance and one-hot encodes the calendar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdRegressor {
    learning_rate: f64,
    epochs: usize,
    weights: Option<Array1<f64>>,
    bias: f64,
    final_loss: f64,
}

impl Default for SgdRegressor {
    fn default() -> Self {
        Self::new(DEFAULT_LEARNING_RATE, DEFAULT_EPOCHS)
    }
}

impl SgdRegressor {
    /// Unfitted model.
    #[must_use]
    pub const fn new(learning_rate: f64, epochs: usize) -> Self {
        Self {
            learning_rate,
            epochs,
            weights: None,
            bias: 0.0,
            final_loss: f64::NAN,
        }
    }

    /// Step size.
    #[must_use]
    pub const fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    /// Passes over the data.
    #[must_use]
    pub const fn epochs(&self) -> usize {
        self.epochs
    }

    /// Learned weights.
    #[must_use]
    pub const fn weights(&self) -> Option<&Array1<f64>> {
        self.weights.as_ref()
    }

    /// Learned bias.
    #[must_use]
    pub const fn bias(&self) -> f64 {
        self.bias
    }

    /// Mean squared error on the training set after the last epoch.
    #[must_use]
    pub const fn final_loss(&self) -> f64 {
        self.final_loss
    }
}

impl Regressor for SgdRegressor {
    #[allow(clippy::cast_precision_loss)]
    fn fit(&mut self, features: &Array2<f64>, targets: &Array1<f64>) -> Result<(), ModelError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ModelError::InvalidHyperparameter(format!(
                "learning rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if self.epochs == 0 {
            return Err(ModelError::InvalidHyperparameter(
                "epochs must be at least 1".into(),
            ));
        }
        check_training_set(features, targets)?;

        let n = features.nrows() as f64;
        let mut weights = Array1::<f64>::zeros(features.ncols());
        let mut bias = 0.0;
        for _ in 0..self.epochs {
            let error = features.dot(&weights) + bias - targets;
            let grad = features.t().dot(&error) / n;
            weights.scaled_add(-self.learning_rate, &grad);
            bias -= self.learning_rate * error.sum() / n;
        }

        let residual = features.dot(&weights) + bias - targets;
        let loss = residual.mapv(|r| r * r).sum() / n;
        if !loss.is_finite() || weights.iter().any(|w| !w.is_finite()) {
            return Err(ModelError::NonFinite("weights; lower the learning rate"));
        }
        self.weights = Some(weights);
        self.bias = bias;
        self.final_loss = loss;
        Ok(())
    }

    fn predict(&self, features: &Array2<f64>) -> Result<Array1<f64>, ModelError> {
        let weights = self.weights.as_ref().ok_or(ModelError::NotFitted)?;
        check_width(weights.len(), features)?;
        Ok(features.dot(weights) + self.bias)
    }

    fn describe(&self) -> String {
        format!(
            "SgdRegressor(learning_rate={}, epochs={})",
            self.learning_rate, self.epochs
        )
    }

    fn is_fitted(&self) -> bool {
        self.weights.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn converges_on_a_line() {
        let x = array![[0.0], [1.0], [2.0], [3.0]];
        let y = array![1.0, 3.0, 5.0, 7.0];
        let mut model = SgdRegressor::new(0.1, 2_000);
        model.fit(&x, &y).unwrap();
        assert!((model.weights().unwrap()[0] - 2.0).abs() < 1e-3);
        assert!((model.bias() - 1.0).abs() < 1e-3);
        assert!(model.final_loss() < 1e-6);
    }

    #[test]
    fn more_epochs_lower_the_loss() {
        let x = array![[-1.0, 0.5], [0.0, 1.0], [1.0, -0.5], [2.0, 0.0]];
        let y = array![0.0, 2.0, 1.0, 4.0];
        let mut short = SgdRegressor::new(0.05, 5);
        let mut long = SgdRegressor::new(0.05, 500);
        short.fit(&x, &y).unwrap();
        long.fit(&x, &y).unwrap();
        assert!(long.final_loss() < short.final_loss());
    }

    #[test]
    fn divergence_is_reported() {
        let x = array![[100.0], [200.0], [300.0]];
        let y = array![1.0, 2.0, 3.0];
        let mut model = SgdRegressor::new(10.0, 200);
        assert!(matches!(model.fit(&x, &y), Err(ModelError::NonFinite(_))));
        assert!(!model.is_fitted());
        assert!(matches!(
            SgdRegressor::new(0.1, 0).fit(&x, &y),
            Err(ModelError::InvalidHyperparameter(_))
        ));
    }
}
