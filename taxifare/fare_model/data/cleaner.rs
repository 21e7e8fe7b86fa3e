use serde::{Deserialize, Serialize};

use super::schema::{RawTrip, Trip, TripFeatures};

/// Plausibility bounds applied by [`clean_data`]. Ranges are inclusive except
/// `max_passengers`, which is exclusive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleaningRules {
    /// Accepted fare range.
    pub fare: (f64, f64),
    /// Passenger counts must stay below this value.
    pub max_passengers: f64,
    /// Accepted pickup latitude range.
    pub pickup_latitude: (f64, f64),
    /// Accepted pickup longitude range.
    pub pickup_longitude: (f64, f64),
    /// Accepted dropoff latitude range.
    pub dropoff_latitude: (f64, f64),
    /// Accepted dropoff longitude range.
    pub dropoff_longitude: (f64, f64),
}

impl Default for CleaningRules {
    fn default() -> Self {
        Self {
            fare: (0.0, 4000.0),
            max_passengers: 8.0,
            pickup_latitude: (40.0, 42.0),
            pickup_longitude: (-74.3, -72.9),
            dropoff_latitude: (40.0, 42.0),
            dropoff_longitude: (-74.0, -72.9),
        }
    }
}

/// Row accounting for one cleaning pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleaningReport {
    /// Rows handed to the cleaner.
    pub rows_in: usize,
    /// Rows dropped for a missing value.
    pub dropped_missing: usize,
    /// Rows dropped for a value outside the rules.
    pub dropped_out_of_range: usize,
    /// Rows kept.
    pub rows_out: usize,
}

/// Removes incomplete and implausible rows, returning the survivors in input order.
#[must_use]
pub fn clean_data(raw: Vec<RawTrip>, rules: &CleaningRules) -> (Vec<Trip>, CleaningReport) {
    clean_rows(raw, rules, true, |row| {
        let fare_amount = row.fare.unwrap_or_default();
        Trip {
            features: into_features(row),
            fare_amount,
        }
    })
}

/// Like [`clean_data`] for rows that will be scored: the fare may be absent
/// and is neither required nor range-checked.
#[must_use]
pub fn clean_features(
    raw: Vec<RawTrip>,
    rules: &CleaningRules,
) -> (Vec<TripFeatures>, CleaningReport) {
    clean_rows(raw, rules, false, into_features)
}

fn clean_rows<T>(
    raw: Vec<RawTrip>,
    rules: &CleaningRules,
    with_fare: bool,
    build: impl Fn(CompleteRow) -> T,
) -> (Vec<T>, CleaningReport) {
    let mut report = CleaningReport {
        rows_in: raw.len(),
        ..CleaningReport::default()
    };
    let mut kept = Vec::with_capacity(raw.len());
    for row in raw {
        let Some(row) = complete(row, with_fare) else {
            report.dropped_missing += 1;
            continue;
        };
        if plausible(&row, rules) {
            kept.push(build(row));
        } else {
            report.dropped_out_of_range += 1;
        }
    }
    report.rows_out = kept.len();
    (kept, report)
}

struct CompleteRow {
    key: String,
    fare: Option<f64>,
    pickup_datetime: chrono::DateTime<chrono::Utc>,
    pickup_longitude: f64,
    pickup_latitude: f64,
    dropoff_longitude: f64,
    dropoff_latitude: f64,
    passengers: f64,
}

fn complete(row: RawTrip, with_fare: bool) -> Option<CompleteRow> {
    let fare = if with_fare {
        Some(row.fare_amount.filter(|v| v.is_finite())?)
    } else {
        None
    };
    let values = [
        row.pickup_longitude?,
        row.pickup_latitude?,
        row.dropoff_longitude?,
        row.dropoff_latitude?,
        row.passenger_count?,
    ];
    if values.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(CompleteRow {
        key: row.key.filter(|k| !k.is_empty())?,
        fare,
        pickup_datetime: row.pickup_datetime?,
        pickup_longitude: values[0],
        pickup_latitude: values[1],
        dropoff_longitude: values[2],
        dropoff_latitude: values[3],
        passengers: values[4],
    })
}

fn plausible(row: &CompleteRow, rules: &CleaningRules) -> bool {
    let within = |value: f64, (low, high): (f64, f64)| (low..=high).contains(&value);
    let dropoff_at_origin = row.dropoff_latitude == 0.0 && row.dropoff_longitude == 0.0;
    let pickup_at_origin = row.pickup_latitude == 0.0 && row.pickup_longitude == 0.0;
    !dropoff_at_origin
        && !pickup_at_origin
        && row.fare.filter(|&fare| !within(fare, rules.fare)).is_none()
        && row.passengers >= 0.0
        && row.passengers < rules.max_passengers
        && within(row.pickup_latitude, rules.pickup_latitude)
        && within(row.pickup_longitude, rules.pickup_longitude)
        && within(row.dropoff_latitude, rules.dropoff_latitude)
        && within(row.dropoff_longitude, rules.dropoff_longitude)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn into_features(row: CompleteRow) -> TripFeatures {
    TripFeatures {
        key: row.key,
        pickup_datetime: row.pickup_datetime,
        pickup_longitude: row.pickup_longitude,
        pickup_latitude: row.pickup_latitude,
        dropoff_longitude: row.dropoff_longitude,
        dropoff_latitude: row.dropoff_latitude,
        // bounded to [0, max_passengers) by `plausible`
        passenger_count: row.passengers.round() as u32,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn raw() -> RawTrip {
        RawTrip {
            key: Some("k".into()),
            fare_amount: Some(9.5),
            pickup_datetime: Some(Utc.with_ymd_and_hms(2014, 3, 2, 8, 0, 0).unwrap()),
            pickup_longitude: Some(-73.98),
            pickup_latitude: Some(40.76),
            dropoff_longitude: Some(-73.95),
            dropoff_latitude: Some(40.78),
            passenger_count: Some(1.0),
        }
    }

    #[test]
    fn keeps_plausible_rows() {
        let (trips, report) = clean_data(vec![raw()], &CleaningRules::default());
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].fare_amount, 9.5);
        assert_eq!(report.rows_out, 1);
    }

    #[test]
    fn drops_missing_and_out_of_range_rows() {
        let missing_fare = RawTrip { fare_amount: None, ..raw() };
        let missing_time = RawTrip { pickup_datetime: None, ..raw() };
        let at_origin = RawTrip {
            dropoff_latitude: Some(0.0),
            dropoff_longitude: Some(0.0),
            ..raw()
        };
        let negative_fare = RawTrip { fare_amount: Some(-2.0), ..raw() };
        let crowded = RawTrip { passenger_count: Some(8.0), ..raw() };
        let far_west = RawTrip { dropoff_longitude: Some(-74.1), ..raw() };
        let rows = vec![
            raw(),
            missing_fare,
            missing_time,
            at_origin,
            negative_fare,
            crowded,
            far_west,
        ];

        let (trips, report) = clean_data(rows, &CleaningRules::default());

        assert_eq!(trips.len(), 1);
        assert_eq!(
            report,
            CleaningReport {
                rows_in: 7,
                dropped_missing: 2,
                dropped_out_of_range: 4,
                rows_out: 1,
            }
        );
    }

    #[test]
    fn pickup_longitude_bound_is_wider_than_dropoff() {
        let west_pickup = RawTrip { pickup_longitude: Some(-74.1), ..raw() };
        let (trips, _) = clean_data(vec![west_pickup], &CleaningRules::default());
        assert_eq!(trips.len(), 1);
    }

    #[test]
    fn feature_cleaning_ignores_the_fare() {
        let unlabeled = RawTrip { fare_amount: None, ..raw() };
        let refund = RawTrip { fare_amount: Some(-5.0), ..raw() };
        let no_key = RawTrip { key: Some(String::new()), ..raw() };
        let (rows, report) =
            clean_features(vec![unlabeled, refund, no_key], &CleaningRules::default());
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].passenger_count, 1);
        assert_eq!(report.dropped_missing, 1);
    }
}
