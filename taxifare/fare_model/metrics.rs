//! Regression error metrics.

use thiserror::Error;

/// Reasons a metric cannot be computed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MetricError {
    /// No samples were given.
    #[error("cannot score zero samples")]
    Empty,
    /// Predictions and truths differ in length.
    #[error("{predictions} predictions but {truths} truths")]
    LengthMismatch {
        /// Number of predictions.
        predictions: usize,
        /// Number of truths.
        truths: usize,
    },
}

/// Mean of squared differences between aligned predictions and truths.
#[allow(clippy::cast_precision_loss)]
pub fn mean_squared_error(predictions: &[f64], truths: &[f64]) -> Result<f64, MetricError> {
    if predictions.len() != truths.len() {
        return Err(MetricError::LengthMismatch {
            predictions: predictions.len(),
            truths: truths.len(),
        });
    }
    if predictions.is_empty() {
        return Err(MetricError::Empty);
    }
    let total = predictions
        .iter()
        .zip(truths)
        .map(|(pred, truth)| (pred - truth).powi(2))
        .sum::<f64>();
    Ok(total / predictions.len() as f64)
}

/// Root-mean-squared error.
pub fn rmse(predictions: &[f64], truths: &[f64]) -> Result<f64, MetricError> {
    mean_squared_error(predictions, truths).map(f64::sqrt)
}
