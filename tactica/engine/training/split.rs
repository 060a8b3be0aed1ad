use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

/// Shuffles `0..count` with `seed` and returns `(train, validation)` index lists.
///
/// The validation side holds `ceil(count * ratio)` rows clamped to `[1, count - 1]`;
/// with fewer than two rows everything goes to training.
#[must_use]
pub fn train_validation_split(
    count: usize,
    validation_ratio: f64,
    seed: u64,
) -> (Vec<usize>, Vec<usize>) {
    let mut indices: Vec<usize> = (0..count).collect();
    if count < 2 {
        return (indices, Vec::new());
    }
    let mut rng = SmallRng::seed_from_u64(seed);
    indices.shuffle(&mut rng);
    let train = indices.split_off(validation_size(count, validation_ratio));
    (train, indices)
}

/// Validation rows for `count` examples.
#[must_use]
pub fn validation_size(count: usize, validation_ratio: f64) -> usize {
    if count < 2 {
        return 0;
    }
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    let wanted = (count as f64 * validation_ratio.clamp(0.0, 1.0)).ceil() as usize;
    wanted.clamp(1, count - 1)
}
