//! A seeded generator for class-conditional synthetic data.
//!
//! Every class gets a random centroid in `[-1, 1]^d` and its examples are scattered uniformly
//! around that centroid. Labels cycle through the classes, so every class holds the same number of
//! examples (up to one).

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::{
    data::{DataError, Dataset, Example},
    settings::DatasetSettings,
};

/// Generates a dataset from the given settings.
///
/// # Errors
/// Fails if the settings describe an empty dataset.
pub fn generate(settings: &DatasetSettings) -> Result<Dataset, DataError> {
    let DatasetSettings {
        num_examples,
        num_classes,
        num_features,
        spread,
        seed,
    } = *settings;
    if num_classes == 0 || num_features == 0 {
        return Err(DataError::Empty);
    }

    let mut prng = ChaCha20Rng::seed_from_u64(seed);
    let centroids = (0..num_classes)
        .map(|_| {
            (0..num_features)
                .map(|_| prng.gen_range(-1_f32..=1_f32))
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>();

    let spread = spread.abs();
    let examples = (0..num_examples)
        .map(|i| {
            let label = i % num_classes;
            let features = centroids[label]
                .iter()
                .map(|c| {
                    if spread > 0. {
                        c + prng.gen_range(-spread..=spread)
                    } else {
                        *c
                    }
                })
                .collect();
            Example { features, label }
        })
        .collect();

    Dataset::new(examples, num_classes)
}
