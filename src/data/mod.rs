//! Datasets and their per-client views.
//!
//! A [`Dataset`] owns the examples of a run. Once it is partitioned, a [`FederatedDataset`] hands
//! out a read-only [`LocalDataset`] per client which only sees the examples of that client's
//! partition. Local datasets share the underlying examples, so cloning them is cheap.

pub mod synthetic;

use std::sync::Arc;

use rand::{seq::SliceRandom, Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use thiserror::Error;

use crate::partition::{ClientId, PartitionAssignment};

/// Errors related to datasets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DataError {
    #[error("the dataset is empty")]
    Empty,
    #[error("example {index} has {actual} features, expected {expected}")]
    FeatureCount {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("example {index} has label {label}, but there are only {num_classes} classes")]
    Label {
        index: usize,
        label: usize,
        num_classes: usize,
    },
    #[error("no partition for client {0}")]
    UnknownPartition(ClientId),
}

/// A labeled example.
#[derive(Debug, Clone, PartialEq)]
pub struct Example {
    pub features: Vec<f32>,
    pub label: usize,
}

/// A batch of examples borrowed from a [`LocalDataset`].
pub type Batch<'a> = Vec<&'a Example>;

/// A labeled dataset with a fixed number of features and classes.
#[derive(Debug, Clone)]
pub struct Dataset {
    examples: Arc<Vec<Example>>,
    num_features: usize,
    num_classes: usize,
}

impl Dataset {
    /// Creates a dataset.
    ///
    /// # Errors
    /// Fails if the dataset is empty, if the examples don't all have the same number of features
    /// or if a label is out of range.
    pub fn new(examples: Vec<Example>, num_classes: usize) -> Result<Self, DataError> {
        let num_features = examples.first().ok_or(DataError::Empty)?.features.len();
        for (index, example) in examples.iter().enumerate() {
            if example.features.len() != num_features {
                return Err(DataError::FeatureCount {
                    index,
                    expected: num_features,
                    actual: example.features.len(),
                });
            }
            if example.label >= num_classes {
                return Err(DataError::Label {
                    index,
                    label: example.label,
                    num_classes,
                });
            }
        }
        Ok(Self {
            examples: Arc::new(examples),
            num_features,
            num_classes,
        })
    }

    pub fn len(&self) -> usize {
        self.examples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Gets the label of every example in dataset order.
    pub fn labels(&self) -> Vec<usize> {
        self.examples.iter().map(|example| example.label).collect()
    }

    /// Views the whole dataset as a single local dataset.
    pub fn as_local(&self) -> LocalDataset {
        LocalDataset {
            examples: self.examples.clone(),
            indices: Arc::new((0..self.len()).collect()),
        }
    }

    /// Attaches a partition assignment to this dataset.
    pub fn federate(self, assignment: PartitionAssignment) -> FederatedDataset {
        FederatedDataset {
            dataset: self,
            assignment: Arc::new(assignment),
        }
    }
}

/// A dataset together with the assignment of its examples to clients.
#[derive(Debug, Clone)]
pub struct FederatedDataset {
    dataset: Dataset,
    assignment: Arc<PartitionAssignment>,
}

impl FederatedDataset {
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    pub fn assignment(&self) -> &PartitionAssignment {
        &self.assignment
    }

    /// Loads the examples assigned to the given client.
    ///
    /// # Errors
    /// Fails if the client has no partition.
    pub fn load_partition(&self, client_id: ClientId) -> Result<LocalDataset, DataError> {
        let indices = self
            .assignment
            .partition(client_id)
            .ok_or(DataError::UnknownPartition(client_id))?;
        Ok(LocalDataset {
            examples: self.dataset.examples.clone(),
            indices: Arc::new(indices.to_vec()),
        })
    }
}

/// A read-only view on a subset of a dataset.
#[derive(Debug, Clone)]
pub struct LocalDataset {
    examples: Arc<Vec<Example>>,
    indices: Arc<Vec<usize>>,
}

impl LocalDataset {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Iterates over the examples in order.
    pub fn iter(&self) -> impl Iterator<Item = &Example> {
        self.indices.iter().map(move |&idx| &self.examples[idx])
    }

    /// Splits off a deterministic, randomly chosen test subset.
    ///
    /// The test subset holds `round(len * test_fraction)` examples.
    pub fn train_test_split(&self, test_fraction: f64, seed: u64) -> (LocalDataset, LocalDataset) {
        let mut indices = self.indices.as_ref().clone();
        indices.shuffle(&mut ChaCha20Rng::seed_from_u64(seed));
        let test_len = ((indices.len() as f64) * test_fraction.max(0.).min(1.)).round() as usize;
        let train = indices.split_off(test_len);
        (
            LocalDataset {
                examples: self.examples.clone(),
                indices: Arc::new(train),
            },
            LocalDataset {
                examples: self.examples.clone(),
                indices: Arc::new(indices),
            },
        )
    }

    /// Cuts the dataset into batches in dataset order.
    ///
    /// With `drop_last`, a trailing batch smaller than `batch_size` is left out.
    pub fn batches(&self, batch_size: usize, drop_last: bool) -> Vec<Batch<'_>> {
        let order = self.indices.as_ref().clone();
        self.batches_in_order(order, batch_size, drop_last)
    }

    /// Cuts the dataset into batches after shuffling it with the given PRNG.
    pub fn shuffled_batches<R: Rng + ?Sized>(
        &self,
        batch_size: usize,
        drop_last: bool,
        prng: &mut R,
    ) -> Vec<Batch<'_>> {
        let mut order = self.indices.as_ref().clone();
        order.shuffle(prng);
        self.batches_in_order(order, batch_size, drop_last)
    }

    fn batches_in_order(
        &self,
        order: Vec<usize>,
        batch_size: usize,
        drop_last: bool,
    ) -> Vec<Batch<'_>> {
        if batch_size == 0 {
            return Vec::new();
        }
        order
            .chunks(batch_size)
            .filter(|chunk| !drop_last || chunk.len() == batch_size)
            .map(|chunk| chunk.iter().map(|&idx| &self.examples[idx]).collect())
            .collect()
    }
}
