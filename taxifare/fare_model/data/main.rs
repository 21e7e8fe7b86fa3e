//! Data provider: CSV loading, cleaning, hold-out splitting and synthetic trips.

/// Column names, row types and the named-column frame.
pub mod schema;
/// CSV reading and writing.
pub mod loader;
/// Invalid and outlier row removal.
pub mod cleaner;
/// Seeded train/test splitting.
pub mod split;
/// Deterministic synthetic trips.
pub mod synthetic;

use thiserror::Error;

pub use cleaner::{clean_data, clean_features, CleaningReport, CleaningRules};
pub use loader::{get_data, read_trips, write_csv, DEFAULT_NROWS};
pub use schema::{split_target, Column, RawTrip, Trip, TripFeatures, TripFrame};
pub use split::train_test_split;
pub use synthetic::synthetic_trips;

/// Errors raised while loading or reshaping trip data.
#[derive(Debug, Error)]
pub enum DataError {
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed CSV.
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    /// Requested column is not part of the frame.
    #[error("unknown column '{0}'")]
    UnknownColumn(String),
    /// Column exists but holds another kind of value.
    #[error("column '{column}' is {found}, expected {expected}")]
    ColumnKind {
        /// Column name.
        column: String,
        /// Kind the caller asked for.
        expected: &'static str,
        /// Kind actually stored.
        found: &'static str,
    },
    /// Hold-out ratio outside the open unit interval.
    #[error("test_size must lie in (0, 1), got {0}")]
    InvalidSplit(f64),
    /// Not enough rows to produce two non-empty partitions.
    #[error("cannot split {0} rows into non-empty train and test sets")]
    TooFewRows(usize),
}
