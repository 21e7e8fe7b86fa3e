use chrono::{DateTime, TimeZone, Utc};
use rand::{rngs::SmallRng, Rng, SeedableRng};

use super::schema::{Trip, TripFeatures};
use crate::encoders::distance::haversine_km;

/// Flag-drop component of the synthetic fare.
pub const SYNTHETIC_BASE_FARE: f64 = 3.0;
/// Per-kilometre component of the synthetic fare.
pub const SYNTHETIC_FARE_PER_KM: f64 = 2.0;

const LATITUDE: (f64, f64) = (40.60, 40.85);
const LONGITUDE: (f64, f64) = (-73.99, -73.75);
// 2009-01-01 .. 2015-06-30, the span of the public taxi fare export.
const FIRST_PICKUP: i64 = 1_230_768_000;
const LAST_PICKUP: i64 = 1_435_622_400;

/// Generates `count` plausible Manhattan-area trips whose fare is exactly
/// `SYNTHETIC_BASE_FARE + SYNTHETIC_FARE_PER_KM * haversine_km`.
#[must_use]
pub fn synthetic_trips(count: usize, seed: u64) -> Vec<Trip> {
    let mut rng = SmallRng::seed_from_u64(seed);
    (0..count)
        .map(|idx| {
            let pickup_datetime = pickup_time(&mut rng);
            let pickup_latitude = rng.gen_range(LATITUDE.0..LATITUDE.1);
            let pickup_longitude = rng.gen_range(LONGITUDE.0..LONGITUDE.1);
            let dropoff_latitude = rng.gen_range(LATITUDE.0..LATITUDE.1);
            let dropoff_longitude = rng.gen_range(LONGITUDE.0..LONGITUDE.1);
            let distance = haversine_km(
                pickup_latitude,
                pickup_longitude,
                dropoff_latitude,
                dropoff_longitude,
            );
            Trip {
                features: TripFeatures {
                    key: format!("{}.{idx:07}", pickup_datetime.format("%Y-%m-%d %H:%M:%S")),
                    pickup_datetime,
                    pickup_longitude,
                    pickup_latitude,
                    dropoff_longitude,
                    dropoff_latitude,
                    passenger_count: rng.gen_range(1..=6),
                },
                fare_amount: SYNTHETIC_FARE_PER_KM.mul_add(distance, SYNTHETIC_BASE_FARE),
            }
        })
        .collect()
}

fn pickup_time(rng: &mut SmallRng) -> DateTime<Utc> {
    let seconds = rng.gen_range(FIRST_PICKUP..LAST_PICKUP);
    Utc.timestamp_opt(seconds, 0).single().unwrap_or_default()
}
