use std::collections::BTreeSet;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::PreprocessingError;

/// What to do with a category that was not present during fit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HandleUnknown {
    /// Emit an all-zero block for that column.
    #[default]
    Ignore,
    /// Fail the transform.
    Error,
}

/// Encodes each integer-coded column as a block of indicator columns.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OneHotEncoder {
    handle_unknown: HandleUnknown,
}

impl OneHotEncoder {
    /// Sets the unknown-category strategy.
    #[must_use]
    pub fn with_handle_unknown(mut self, handle_unknown: HandleUnknown) -> Self {
        self.handle_unknown = handle_unknown;
        self
    }

    /// Learns the sorted category set of every column.
    pub fn fit(&self, data: &Array2<f64>) -> Result<FittedOneHotEncoder, PreprocessingError> {
        if data.nrows() == 0 {
            return Err(PreprocessingError::EmptyData(
                "cannot fit OneHotEncoder on zero rows".into(),
            ));
        }
        let mut categories = Vec::with_capacity(data.ncols());
        for (column, values) in data.columns().into_iter().enumerate() {
            let mut seen = BTreeSet::new();
            for (row, value) in values.iter().enumerate() {
                seen.insert(category(*value, row, column)?);
            }
            categories.push(seen.into_iter().collect::<Vec<_>>());
        }
        let n_features_out = categories.iter().map(Vec::len).sum();
        Ok(FittedOneHotEncoder {
            categories,
            n_features_out,
            handle_unknown: self.handle_unknown,
        })
    }
}

#[allow(clippy::cast_possible_truncation)]
fn category(value: f64, row: usize, column: usize) -> Result<i64, PreprocessingError> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as i64)
    } else {
        Err(PreprocessingError::InvalidCategory { value, row, column })
    }
}

/// Category sets learned from training data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FittedOneHotEncoder {
    categories: Vec<Vec<i64>>,
    n_features_out: usize,
    handle_unknown: HandleUnknown,
}

impl FittedOneHotEncoder {
    /// Sorted categories per input column.
    #[must_use]
    pub fn categories(&self) -> &[Vec<i64>] {
        &self.categories
    }

    /// Width of the encoded output.
    #[must_use]
    pub fn n_features_out(&self) -> usize {
        self.n_features_out
    }

    /// Encodes `data`, one indicator block per input column.
    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>, PreprocessingError> {
        if data.ncols() != self.categories.len() {
            return Err(PreprocessingError::FeatureMismatch {
                expected: self.categories.len(),
                got: data.ncols(),
            });
        }
        let mut out = Array2::zeros((data.nrows(), self.n_features_out));
        for ((row, column), value) in data.indexed_iter() {
            let code = category(*value, row, column)?;
            let offset: usize = self.categories[..column].iter().map(Vec::len).sum();
            match self.categories[column].binary_search(&code) {
                Ok(position) => out[[row, offset + position]] = 1.0,
                Err(_) if self.handle_unknown == HandleUnknown::Ignore => {}
                Err(_) => {
                    return Err(PreprocessingError::UnknownCategory {
                        column,
                        value: code,
                    })
                }
            }
        }
        Ok(out)
    }
}
