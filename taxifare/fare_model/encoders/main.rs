//! Stateless feature transformers turning raw trip columns into model inputs.

/// Great-circle distance between pickup and dropoff.
pub mod distance;
/// Calendar features extracted from the pickup timestamp.
pub mod time_features;

pub use distance::{haversine_km, DistanceTransformer, EARTH_RADIUS_KM};
pub use time_features::{LocalTime, TimeFeaturesEncoder, MAX_OFFSET_HOURS, TIME_FEATURES};
