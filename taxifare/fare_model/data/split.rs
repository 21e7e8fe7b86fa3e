use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

use super::DataError;

/// Shuffles `items` with a seeded RNG and returns `(train, test)`.
///
/// The test partition holds `ceil(len * test_size)` items; both partitions must be non-empty.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
pub fn train_test_split<T>(
    mut items: Vec<T>,
    test_size: f64,
    seed: u64,
) -> Result<(Vec<T>, Vec<T>), DataError> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(DataError::InvalidSplit(test_size));
    }
    let total = items.len();
    let n_test = (total as f64 * test_size).ceil() as usize;
    if n_test == 0 || n_test >= total {
        return Err(DataError::TooFewRows(total));
    }
    let mut rng = SmallRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
    let train = items.split_off(n_test);
    Ok((train, items))
}
