use ndarray::{concatenate, Array2, Axis};
use serde::{Deserialize, Serialize};

use super::{
    FittedOneHotEncoder, FittedStandardScaler, HandleUnknown, OneHotEncoder,
    PreprocessingError, StandardScaler,
};
use crate::{
    data::TripFrame,
    encoders::{DistanceTransformer, LocalTime, TimeFeaturesEncoder},
};

/// Unfitted column router.
///
/// Two routes feed the model, concatenated in this order:
/// - geographic columns → [`DistanceTransformer`] → [`StandardScaler`]
/// - pickup timestamp → [`TimeFeaturesEncoder`] → [`OneHotEncoder`]
///
/// Every other frame column is dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preprocessor {
    distance: DistanceTransformer,
    scaler: StandardScaler,
    time: TimeFeaturesEncoder,
    one_hot: OneHotEncoder,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new(LocalTime::default())
    }
}

impl Preprocessor {
    /// Default routes with calendar features read in `local_time`.
    #[must_use]
    pub fn new(local_time: LocalTime) -> Self {
        Self {
            distance: DistanceTransformer::default(),
            scaler: StandardScaler::default(),
            time: TimeFeaturesEncoder::new(crate::data::schema::PICKUP_DATETIME, local_time),
            one_hot: OneHotEncoder::default(),
        }
    }

    /// Overrides the unknown-category strategy of the time route.
    #[must_use]
    pub fn with_handle_unknown(mut self, handle_unknown: HandleUnknown) -> Self {
        self.one_hot = self.one_hot.with_handle_unknown(handle_unknown);
        self
    }

    /// Frame columns consumed by the routes; anything else is dropped.
    #[must_use]
    pub fn input_columns(&self) -> Vec<&str> {
        let mut columns = self.distance.columns().to_vec();
        columns.push(self.time.column());
        columns
    }

    /// Learns scaler statistics and category sets from `frame` alone.
    pub fn fit(&self, frame: &TripFrame) -> Result<FittedPreprocessor, PreprocessingError> {
        if frame.is_empty() {
            return Err(PreprocessingError::EmptyData(
                "cannot fit preprocessing on an empty frame".into(),
            ));
        }
        let distances = self.distance.transform(frame)?;
        let calendar = self.time.transform(frame)?;
        Ok(FittedPreprocessor {
            distance: self.distance.clone(),
            scaler: self.scaler.fit(&distances)?,
            time: self.time.clone(),
            one_hot: self.one_hot.fit(&calendar)?,
        })
    }
}

/// Column router with learned statistics, ready to transform any frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedPreprocessor {
    distance: DistanceTransformer,
    scaler: FittedStandardScaler,
    time: TimeFeaturesEncoder,
    one_hot: FittedOneHotEncoder,
}

impl FittedPreprocessor {
    /// Builds the feature matrix: scaled distance followed by the one-hot calendar block.
    pub fn transform(&self, frame: &TripFrame) -> Result<Array2<f64>, PreprocessingError> {
        let distances = self.scaler.transform(&self.distance.transform(frame)?)?;
        let calendar = self.one_hot.transform(&self.time.transform(frame)?)?;
        Ok(concatenate(Axis(1), &[distances.view(), calendar.view()])?)
    }

    /// Width of the feature matrix.
    #[must_use]
    pub fn n_features_out(&self) -> usize {
        self.scaler.n_features() + self.one_hot.n_features_out()
    }

    /// Distance-route scaler statistics.
    #[must_use]
    pub fn scaler(&self) -> &FittedStandardScaler {
        &self.scaler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{split_target, synthetic_trips, TripFeatures};
    use chrono::{TimeZone, Utc};

    fn trip(lat: f64, lon: f64, lat2: f64, lon2: f64, hour: u32) -> TripFeatures {
        TripFeatures {
            key: format!("{lat}-{hour}"),
            pickup_datetime: Utc.with_ymd_and_hms(2014, 1, 6, hour, 0, 0).unwrap(),
            pickup_longitude: lon,
            pickup_latitude: lat,
            dropoff_longitude: lon2,
            dropoff_latitude: lat2,
            passenger_count: 1,
        }
    }

    #[test]
    fn routes_distance_and_calendar_and_drops_the_rest() {
        let preprocessor = Preprocessor::new(LocalTime::Utc);
        assert_eq!(
            preprocessor.input_columns(),
            vec![
                "pickup_latitude",
                "pickup_longitude",
                "dropoff_latitude",
                "dropoff_longitude",
                "pickup_datetime"
            ]
        );
        let frame = TripFrame::new(vec![
            trip(40.70, -73.90, 40.75, -73.95, 8),
            trip(40.70, -73.90, 40.80, -73.95, 9),
        ]);
        let fitted = preprocessor.fit(&frame).unwrap();
        let features = fitted.transform(&frame).unwrap();
        // 1 distance + dow{0} + hour{8,9} + month{1} + year{2014}
        assert_eq!(features.dim(), (2, 6));
        assert_eq!(fitted.n_features_out(), 6);
        assert!((features[[0, 0]] + features[[1, 0]]).abs() < 1e-9);
        assert_eq!(features.row(0).to_vec()[1..], [1.0, 1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn identical_training_distances_scale_to_zero() {
        // same unit step repeated: zero variance, unit-scale fallback
        let frame = TripFrame::new(vec![trip(0.0, 0.0, 0.0, 1.0, 1), trip(0.0, 0.0, 0.0, 1.0, 2)]);
        let fitted = Preprocessor::new(LocalTime::Utc).fit(&frame).unwrap();
        assert!(fitted.scaler().mean()[0] > 0.0);
        assert_eq!(fitted.scaler().scale()[0], 1.0);
        let features = fitted.transform(&frame).unwrap();
        assert_eq!(features[[0, 0]], 0.0);
        assert_eq!(features[[1, 0]], 0.0);
    }

    #[test]
    fn unseen_hour_yields_zero_block_at_predict_time() {
        let train = TripFrame::new(vec![trip(40.7, -73.9, 40.8, -73.9, 8)]);
        let fitted = Preprocessor::new(LocalTime::Utc).fit(&train).unwrap();
        let unseen = TripFrame::new(vec![trip(40.7, -73.9, 40.8, -73.9, 23)]);
        let features = fitted.transform(&unseen).unwrap();
        // dow, hour, month, year blocks each hold one category; hour is the unseen one
        assert_eq!(features.row(0).to_vec()[1..], [1.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn statistics_come_from_the_fitted_frame_only() {
        let (frame, _) = split_target(synthetic_trips(40, 5));
        let (train, held_out) = frame.rows().split_at(30);
        let train = TripFrame::new(train.to_vec());
        let held_out = TripFrame::new(held_out.to_vec());
        let preprocessor = Preprocessor::default();

        let fitted = preprocessor.fit(&train).unwrap();
        let refitted = preprocessor.fit(&train).unwrap();
        assert_eq!(fitted, refitted);

        let all = TripFrame::new(frame.rows().to_vec());
        let leaky = preprocessor.fit(&all).unwrap();
        assert_ne!(fitted.scaler().mean(), leaky.scaler().mean());
        assert_eq!(
            fitted.transform(&held_out).unwrap().ncols(),
            fitted.n_features_out()
        );
    }

    #[test]
    fn empty_frame_cannot_be_fitted() {
        assert!(matches!(
            Preprocessor::default().fit(&TripFrame::default()),
            Err(PreprocessingError::EmptyData(_))
        ));
    }
}
