use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::{
    data::schema::{DROPOFF_LATITUDE, DROPOFF_LONGITUDE, PICKUP_LATITUDE, PICKUP_LONGITUDE},
    data::TripFrame,
    preprocessing::PreprocessingError,
};

/// Mean Earth radius used by [`haversine_km`].
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometres between two points given in degrees.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (phi1, phi2) = (lat1.to_radians(), lat2.to_radians());
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();
    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().min(1.0).asin()
}

/// Maps four coordinate columns to a single `distance` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DistanceTransformer {
    start_lat: String,
    start_lon: String,
    end_lat: String,
    end_lon: String,
}

impl Default for DistanceTransformer {
    fn default() -> Self {
        Self::new(
            PICKUP_LATITUDE,
            PICKUP_LONGITUDE,
            DROPOFF_LATITUDE,
            DROPOFF_LONGITUDE,
        )
    }
}

impl DistanceTransformer {
    /// Reads the given start/end latitude and longitude columns.
    #[must_use]
    pub fn new(
        start_lat: impl Into<String>,
        start_lon: impl Into<String>,
        end_lat: impl Into<String>,
        end_lon: impl Into<String>,
    ) -> Self {
        Self {
            start_lat: start_lat.into(),
            start_lon: start_lon.into(),
            end_lat: end_lat.into(),
            end_lon: end_lon.into(),
        }
    }

    /// Input column names in `[start_lat, start_lon, end_lat, end_lon]` order.
    #[must_use]
    pub fn columns(&self) -> [&str; 4] {
        [
            self.start_lat.as_str(),
            self.start_lon.as_str(),
            self.end_lat.as_str(),
            self.end_lon.as_str(),
        ]
    }

    /// Computes one distance per row, shaped `(rows, 1)`.
    pub fn transform(&self, frame: &TripFrame) -> Result<Array2<f64>, PreprocessingError> {
        let start_lat = frame.numeric_column(&self.start_lat)?;
        let start_lon = frame.numeric_column(&self.start_lon)?;
        let end_lat = frame.numeric_column(&self.end_lat)?;
        let end_lon = frame.numeric_column(&self.end_lon)?;
        Ok(Array2::from_shape_fn((frame.len(), 1), |(row, _)| {
            haversine_km(start_lat[row], start_lon[row], end_lat[row], end_lon[row])
        }))
    }
}
