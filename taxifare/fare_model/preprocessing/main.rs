//! Fit/transform preprocessing: scaling, one-hot encoding and the column router.

/// Per-feature routing and concatenation.
pub mod column_transformer;
/// Categorical one-hot encoding.
pub mod one_hot;
/// Zero-mean, unit-variance scaling.
pub mod scaler;

use thiserror::Error;

use crate::data::DataError;

pub use column_transformer::{FittedPreprocessor, Preprocessor};
pub use one_hot::{FittedOneHotEncoder, HandleUnknown, OneHotEncoder};
pub use scaler::{FittedStandardScaler, StandardScaler};

/// Errors raised while fitting or applying transformers.
#[derive(Debug, Error)]
pub enum PreprocessingError {
    /// Nothing to fit on.
    #[error("empty data: {0}")]
    EmptyData(String),
    /// Column count differs from the one seen during fit.
    #[error("feature mismatch: expected {expected} features, got {got}")]
    FeatureMismatch {
        /// Columns seen during fit.
        expected: usize,
        /// Columns received.
        got: usize,
    },
    /// A NaN or infinite input.
    #[error("non-finite value at row {row}, column {column}")]
    NonFinite {
        /// Row index.
        row: usize,
        /// Column index.
        column: usize,
    },
    /// A categorical value that is not a non-negative integer.
    #[error("invalid category {value} at row {row}, column {column}")]
    InvalidCategory {
        /// Offending value.
        value: f64,
        /// Row index.
        row: usize,
        /// Column index.
        column: usize,
    },
    /// A category absent at fit time, under [`HandleUnknown::Error`].
    #[error("category {value} in column {column} was not seen during fit")]
    UnknownCategory {
        /// Column index.
        column: usize,
        /// Offending category.
        value: i64,
    },
    /// A fixed UTC offset outside `-23..=23` hours.
    #[error("utc offset of {0} hours is out of range")]
    InvalidUtcOffset(i32),
    /// Column lookup failure on the input frame.
    #[error(transparent)]
    Frame(#[from] DataError),
    /// Route outputs could not be stacked.
    #[error("shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}
