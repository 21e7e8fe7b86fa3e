use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DataError;

/// Row identifier column.
pub const KEY: &str = "key";
/// Target column.
pub const FARE_AMOUNT: &str = "fare_amount";
/// Pickup timestamp column.
pub const PICKUP_DATETIME: &str = "pickup_datetime";
/// Pickup longitude column.
pub const PICKUP_LONGITUDE: &str = "pickup_longitude";
/// Pickup latitude column.
pub const PICKUP_LATITUDE: &str = "pickup_latitude";
/// Dropoff longitude column.
pub const DROPOFF_LONGITUDE: &str = "dropoff_longitude";
/// Dropoff latitude column.
pub const DROPOFF_LATITUDE: &str = "dropoff_latitude";
/// Passenger count column.
pub const PASSENGER_COUNT: &str = "passenger_count";

/// One CSV row as read from disk; every cell may be missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTrip {
    /// Row identifier.
    pub key: Option<String>,
    /// Fare paid, the regression target.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub fare_amount: Option<f64>,
    /// Pickup timestamp; `None` when absent or unparseable.
    #[serde(default, with = "timestamp_cell")]
    pub pickup_datetime: Option<DateTime<Utc>>,
    /// Pickup longitude.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub pickup_longitude: Option<f64>,
    /// Pickup latitude.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub pickup_latitude: Option<f64>,
    /// Dropoff longitude.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub dropoff_longitude: Option<f64>,
    /// Dropoff latitude.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub dropoff_latitude: Option<f64>,
    /// Passenger count.
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub passenger_count: Option<f64>,
}

/// A cleaned trip without its target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripFeatures {
    /// Row identifier.
    pub key: String,
    /// Pickup timestamp (UTC).
    pub pickup_datetime: DateTime<Utc>,
    /// Pickup longitude.
    pub pickup_longitude: f64,
    /// Pickup latitude.
    pub pickup_latitude: f64,
    /// Dropoff longitude.
    pub dropoff_longitude: f64,
    /// Dropoff latitude.
    pub dropoff_latitude: f64,
    /// Passenger count.
    pub passenger_count: u32,
}

/// A cleaned trip with its fare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Feature columns.
    pub features: TripFeatures,
    /// Fare paid.
    pub fare_amount: f64,
}

impl From<&Trip> for RawTrip {
    fn from(trip: &Trip) -> Self {
        let f = &trip.features;
        Self {
            key: Some(f.key.clone()),
            fare_amount: Some(trip.fare_amount),
            pickup_datetime: Some(f.pickup_datetime),
            pickup_longitude: Some(f.pickup_longitude),
            pickup_latitude: Some(f.pickup_latitude),
            dropoff_longitude: Some(f.dropoff_longitude),
            dropoff_latitude: Some(f.dropoff_latitude),
            passenger_count: Some(f64::from(f.passenger_count)),
        }
    }
}

/// A single named column pulled out of a [`TripFrame`].
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Floating point values.
    Numeric(Vec<f64>),
    /// UTC timestamps.
    Timestamp(Vec<DateTime<Utc>>),
    /// Free text.
    Text(Vec<String>),
}

impl Column {
    const fn kind(&self) -> &'static str {
        match self {
            Self::Numeric(_) => "numeric",
            Self::Timestamp(_) => "timestamp",
            Self::Text(_) => "text",
        }
    }
}

/// Ordered table of trip features with access by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TripFrame {
    rows: Vec<TripFeatures>,
}

impl TripFrame {
    /// Wraps the given rows.
    #[must_use]
    pub fn new(rows: Vec<TripFeatures>) -> Self {
        Self { rows }
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the frame has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Borrow the rows.
    #[must_use]
    pub fn rows(&self) -> &[TripFeatures] {
        &self.rows
    }

    /// Extracts a column by name.
    pub fn column(&self, name: &str) -> Result<Column, DataError> {
        let numeric =
            |get: fn(&TripFeatures) -> f64| Column::Numeric(self.rows.iter().map(get).collect());
        let column = match name {
            KEY => Column::Text(self.rows.iter().map(|r| r.key.clone()).collect()),
            PICKUP_DATETIME => {
                Column::Timestamp(self.rows.iter().map(|r| r.pickup_datetime).collect())
            }
            PICKUP_LONGITUDE => numeric(|r| r.pickup_longitude),
            PICKUP_LATITUDE => numeric(|r| r.pickup_latitude),
            DROPOFF_LONGITUDE => numeric(|r| r.dropoff_longitude),
            DROPOFF_LATITUDE => numeric(|r| r.dropoff_latitude),
            PASSENGER_COUNT => numeric(|r| f64::from(r.passenger_count)),
            other => return Err(DataError::UnknownColumn(other.to_string())),
        };
        Ok(column)
    }

    /// Extracts a numeric column, rejecting other kinds.
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, DataError> {
        match self.column(name)? {
            Column::Numeric(values) => Ok(values),
            other => Err(DataError::ColumnKind {
                column: name.to_string(),
                expected: "numeric",
                found: other.kind(),
            }),
        }
    }

    /// Extracts a timestamp column, rejecting other kinds.
    pub fn timestamp_column(&self, name: &str) -> Result<Vec<DateTime<Utc>>, DataError> {
        match self.column(name)? {
            Column::Timestamp(values) => Ok(values),
            other => Err(DataError::ColumnKind {
                column: name.to_string(),
                expected: "timestamp",
                found: other.kind(),
            }),
        }
    }
}

impl FromIterator<TripFeatures> for TripFrame {
    fn from_iter<I: IntoIterator<Item = TripFeatures>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Separates features from the fare target, preserving row order.
#[must_use]
pub fn split_target(trips: Vec<Trip>) -> (TripFrame, Vec<f64>) {
    let mut targets = Vec::with_capacity(trips.len());
    let frame = trips
        .into_iter()
        .map(|trip| {
            targets.push(trip.fare_amount);
            trip.features
        })
        .collect();
    (frame, targets)
}

/// Parses the timestamp layouts found in taxi exports.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(parsed.with_timezone(&Utc));
    }
    let naive = trimmed.strip_suffix("UTC").map_or(trimmed, str::trim_end);
    chrono::NaiveDateTime::parse_from_str(naive, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc())
}

mod timestamp_cell {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<DateTime<Utc>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format("%Y-%m-%d %H:%M:%S UTC").to_string()),
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<DateTime<Utc>>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw.as_deref().and_then(super::parse_timestamp))
    }
}
