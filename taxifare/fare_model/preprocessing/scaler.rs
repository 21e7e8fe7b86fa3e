use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::PreprocessingError;

/// Standard deviations at or below this are treated as zero.
pub const MIN_SCALE: f64 = 1e-12;

/// Centres each column on its training mean and divides by its training
/// standard deviation (population, `ddof = 0`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardScaler;

impl StandardScaler {
    /// Learns per-column statistics.
    ///
    /// A constant column keeps a scale of `1.0`, so it maps to zeros instead of dividing by zero.
    #[allow(clippy::unused_self)]
    pub fn fit(&self, data: &Array2<f64>) -> Result<FittedStandardScaler, PreprocessingError> {
        let (rows, cols) = data.dim();
        if rows == 0 {
            return Err(PreprocessingError::EmptyData(
                "cannot fit StandardScaler on zero rows".into(),
            ));
        }
        if let Some(((row, column), _)) = data.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(PreprocessingError::NonFinite { row, column });
        }
        let mean = data
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::zeros(cols));
        let variance = data.var_axis(Axis(0), 0.0);
        let scale = variance.mapv(|v| {
            let std = v.sqrt();
            if std > MIN_SCALE {
                std
            } else {
                1.0
            }
        });
        Ok(FittedStandardScaler {
            mean,
            variance,
            scale,
        })
    }
}

/// Scaler statistics learned from training data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedStandardScaler {
    mean: Array1<f64>,
    variance: Array1<f64>,
    scale: Array1<f64>,
}

impl FittedStandardScaler {
    /// Applies `(x - mean) / scale` column-wise.
    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>, PreprocessingError> {
        if data.ncols() != self.mean.len() {
            return Err(PreprocessingError::FeatureMismatch {
                expected: self.mean.len(),
                got: data.ncols(),
            });
        }
        Ok((data - &self.mean) / &self.scale)
    }

    /// Per-column training mean.
    #[must_use]
    pub fn mean(&self) -> &Array1<f64> {
        &self.mean
    }

    /// Per-column training variance.
    #[must_use]
    pub fn variance(&self) -> &Array1<f64> {
        &self.variance
    }

    /// Per-column divisor actually applied.
    #[must_use]
    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// Columns expected by [`transform`](Self::transform).
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.mean.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn standardises_to_zero_mean_unit_variance() {
        let data = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0], [4.0, 40.0]];
        let fitted = StandardScaler::default().fit(&data).unwrap();
        let scaled = fitted.transform(&data).unwrap();
        for column in scaled.columns() {
            assert!(column.mean().unwrap().abs() < 1e-12);
            let variance = column.mapv(|v| v * v).mean().unwrap();
            assert!((variance - 1.0).abs() < 1e-12);
        }
        assert_eq!(fitted.mean(), &array![2.5, 25.0]);
    }

    #[test]
    fn constant_column_falls_back_to_unit_scale() {
        let data = array![[5.0], [5.0], [5.0]];
        let fitted = StandardScaler::default().fit(&data).unwrap();
        assert_eq!(fitted.variance()[0], 0.0);
        assert_eq!(fitted.scale()[0], 1.0);
        let scaled = fitted.transform(&array![[5.0], [7.0]]).unwrap();
        assert_eq!(scaled, array![[0.0], [2.0]]);
    }

    #[test]
    fn uses_training_statistics_on_new_rows() {
        let fitted = StandardScaler::default()
            .fit(&array![[0.0], [2.0]])
            .unwrap();
        let scaled = fitted.transform(&array![[4.0]]).unwrap();
        assert_eq!(scaled, array![[3.0]]);
    }

    #[test]
    fn rejects_empty_nan_and_mismatched_input() {
        let empty = Array2::<f64>::zeros((0, 2));
        assert!(matches!(
            StandardScaler::default().fit(&empty),
            Err(PreprocessingError::EmptyData(_))
        ));
        assert!(matches!(
            StandardScaler::default().fit(&array![[1.0], [f64::NAN]]),
            Err(PreprocessingError::NonFinite { row: 1, column: 0 })
        ));
        let fitted = StandardScaler::default().fit(&array![[1.0, 2.0]]).unwrap();
        assert!(matches!(
            fitted.transform(&array![[1.0]]),
            Err(PreprocessingError::FeatureMismatch { expected: 2, got: 1 })
        ));
    }

    #[test]
    fn refitting_is_deterministic() {
        let data = array![[1.5, -2.0], [0.5, 4.0], [3.0, 1.0]];
        let first = StandardScaler::default().fit(&data).unwrap();
        let second = StandardScaler::default().fit(&data).unwrap();
        assert_eq!(first, second);
    }
}
