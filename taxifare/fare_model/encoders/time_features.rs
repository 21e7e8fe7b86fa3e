use chrono::{DateTime, Datelike, FixedOffset, Offset, TimeZone, Timelike, Utc};
use chrono_tz::America::New_York;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    data::{schema::PICKUP_DATETIME, TripFrame},
    preprocessing::PreprocessingError,
};

/// Names of the emitted columns, in output order.
pub const TIME_FEATURES: [&str; 4] = ["dow", "hour", "month", "year"];

/// Largest accepted fixed offset, in hours either side of UTC.
pub const MAX_OFFSET_HOURS: i32 = 23;

/// Clock in which calendar features are read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocalTime {
    /// Coordinated universal time.
    Utc,
    /// A constant offset from UTC, in whole hours.
    FixedOffset(i32),
    /// New York local time under the full `America/New_York` zone history.
    #[default]
    UsEastern,
}

impl LocalTime {
    /// Rejects fixed offsets outside `-23..=23` hours.
    pub fn check(self) -> Result<(), PreprocessingError> {
        if let Self::FixedOffset(hours) = self {
            if !(-MAX_OFFSET_HOURS..=MAX_OFFSET_HOURS).contains(&hours) {
                return Err(PreprocessingError::InvalidUtcOffset(hours));
            }
        }
        Ok(())
    }

    /// Offset from UTC in effect at `instant`, in hours.
    pub fn offset_hours(self, instant: DateTime<Utc>) -> Result<i32, PreprocessingError> {
        Ok(self.offset(instant)?.local_minus_utc() / 3600)
    }

    fn offset(self, instant: DateTime<Utc>) -> Result<FixedOffset, PreprocessingError> {
        match self {
            Self::Utc => Ok(Utc.fix()),
            Self::FixedOffset(hours) => {
                self.check()?;
                FixedOffset::east_opt(hours * 3600)
                    .ok_or(PreprocessingError::InvalidUtcOffset(hours))
            }
            Self::UsEastern => Ok(New_York
                .offset_from_utc_datetime(&instant.naive_utc())
                .fix()),
        }
    }

    fn localize(
        self,
        instant: DateTime<Utc>,
    ) -> Result<DateTime<FixedOffset>, PreprocessingError> {
        Ok(instant.with_timezone(&self.offset(instant)?))
    }
}

/// Extracts day-of-week (Monday = 0), hour, month and year from a timestamp column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeFeaturesEncoder {
    column: String,
    local_time: LocalTime,
}

impl Default for TimeFeaturesEncoder {
    fn default() -> Self {
        Self::new(PICKUP_DATETIME, LocalTime::default())
    }
}

impl TimeFeaturesEncoder {
    /// Reads `column` and evaluates the calendar in `local_time`.
    #[must_use]
    pub fn new(column: impl Into<String>, local_time: LocalTime) -> Self {
        Self {
            column: column.into(),
            local_time,
        }
    }

    /// Source column name.
    #[must_use]
    pub fn column(&self) -> &str {
        &self.column
    }

    /// Calendar features for one instant.
    pub fn features(&self, instant: DateTime<Utc>) -> Result<[f64; 4], PreprocessingError> {
        let local = self.local_time.localize(instant)?;
        Ok([
            f64::from(local.weekday().num_days_from_monday()),
            f64::from(local.hour()),
            f64::from(local.month()),
            f64::from(local.year()),
        ])
    }

    /// Emits a `(rows, 4)` matrix of categorical codes.
    pub fn transform(&self, frame: &TripFrame) -> Result<Array2<f64>, PreprocessingError> {
        self.local_time.check()?;
        let stamps = frame.timestamp_column(&self.column)?;
        let mut out = Array2::zeros((stamps.len(), TIME_FEATURES.len()));
        for (mut row, instant) in out.rows_mut().into_iter().zip(stamps) {
            for (cell, value) in row.iter_mut().zip(self.features(instant)?) {
                *cell = value;
            }
        }
        Ok(out)
    }
}
