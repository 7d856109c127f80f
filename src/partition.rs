//! Shard-based, label-skewed partitioning of a dataset across clients.
//!
//! The dataset indices are sorted by label, cut into contiguous shards of a fixed size, the shards
//! are shuffled with a seeded PRNG and then dealt round-robin to the partitions. A partition that
//! receives few shards sees few labels, which makes the partitioning non-IID. Handing out more
//! shards per partition brings each partition closer to the global label distribution.
//!
//! ```
//! # use fedsim::partition::ShardPartitioner;
//! let labels = vec![0, 1, 0, 1, 2, 2, 0, 1, 2, 0, 1, 2];
//! let partitioner = ShardPartitioner::new(3, 2, Some(2), 42);
//! let assignment = partitioner.build(&labels).unwrap();
//! assert_eq!(assignment.num_partitions(), 3);
//! assert!(assignment.iter().all(|(_, indices)| indices.len() == 4));
//! ```

use rand::{seq::SliceRandom, SeedableRng};
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::settings::PartitionSettings;

/// The identifier of a client, which is also the index of its partition.
pub type ClientId = usize;

/// Errors which can occur while partitioning a dataset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("insufficient data: {required} shards are required but only {available} are available")]
    InsufficientData { required: usize, available: usize },
    #[error("invalid partitioning configuration: {0}")]
    InvalidConfig(&'static str),
}

/// A contiguous block of label-sorted dataset indices.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Shard<'a>(&'a [usize]);

/// The dataset indices assigned to every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionAssignment {
    partitions: Vec<Vec<usize>>,
    dataset_size: usize,
}

impl PartitionAssignment {
    /// Gets the indices assigned to the given client, in the order the shards were dealt.
    pub fn partition(&self, client_id: ClientId) -> Option<&[usize]> {
        self.partitions.get(client_id).map(Vec::as_slice)
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    /// Iterates over `(client_id, indices)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (ClientId, &[usize])> {
        self.partitions
            .iter()
            .enumerate()
            .map(|(id, indices)| (id, indices.as_slice()))
    }

    /// Gets the number of assigned examples over all partitions.
    pub fn assigned_len(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    /// Gets the number of examples that were not assigned to any partition.
    pub fn dropped_len(&self) -> usize {
        self.dataset_size - self.assigned_len()
    }
}

/// Deterministically assigns dataset examples to clients in label-sorted shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardPartitioner {
    num_partitions: usize,
    num_shards_per_partition: usize,
    shard_size: Option<usize>,
    seed: u64,
}

impl From<PartitionSettings> for ShardPartitioner {
    fn from(settings: PartitionSettings) -> Self {
        let PartitionSettings {
            num_partitions,
            num_shards_per_partition,
            shard_size,
            seed,
        } = settings;
        Self::new(num_partitions, num_shards_per_partition, shard_size, seed)
    }
}

impl ShardPartitioner {
    /// Creates a new partitioner.
    ///
    /// If no `shard_size` is given, it is derived as the largest size for which every partition
    /// can receive `num_shards_per_partition` shards.
    pub fn new(
        num_partitions: usize,
        num_shards_per_partition: usize,
        shard_size: Option<usize>,
        seed: u64,
    ) -> Self {
        Self {
            num_partitions,
            num_shards_per_partition,
            shard_size,
            seed,
        }
    }

    /// Partitions a dataset given the label of every example.
    ///
    /// # Errors
    /// Fails if the configuration is degenerate or if the dataset doesn't contain enough full
    /// shards to serve every partition.
    pub fn build(&self, labels: &[usize]) -> Result<PartitionAssignment, PartitionError> {
        if self.num_partitions == 0 {
            return Err(PartitionError::InvalidConfig("zero partitions"));
        }
        if self.num_shards_per_partition == 0 {
            return Err(PartitionError::InvalidConfig("zero shards per partition"));
        }
        let required = self
            .num_partitions
            .checked_mul(self.num_shards_per_partition)
            .ok_or(PartitionError::InvalidConfig("too many shards"))?;
        let shard_size = self.shard_size.unwrap_or(labels.len() / required);
        if shard_size == 0 {
            if self.shard_size.is_some() {
                return Err(PartitionError::InvalidConfig("zero shard size"));
            }
            return Err(PartitionError::InsufficientData {
                required,
                available: 0,
            });
        }

        let mut sorted = (0..labels.len()).collect::<Vec<_>>();
        // stable: equal labels keep their dataset order
        sorted.sort_by_key(|&idx| labels[idx]);

        // `chunks_exact` drops the trailing incomplete shard
        let mut shards = sorted.chunks_exact(shard_size).map(Shard).collect::<Vec<_>>();
        if shards.len() < required {
            return Err(PartitionError::InsufficientData {
                required,
                available: shards.len(),
            });
        }

        let mut prng = ChaCha20Rng::seed_from_u64(self.seed);
        shards.shuffle(&mut prng);

        let mut partitions =
            vec![Vec::with_capacity(self.num_shards_per_partition * shard_size); self.num_partitions];
        for (i, Shard(indices)) in shards.iter().take(required).enumerate() {
            partitions[i % self.num_partitions].extend_from_slice(indices);
        }
        debug!(
            "dealt {} of {} shards of size {}",
            required,
            shards.len(),
            shard_size
        );

        Ok(PartitionAssignment {
            partitions,
            dataset_size: labels.len(),
        })
    }
}

/// Partitions a dataset of `labels.len()` examples, see [`ShardPartitioner::build`].
pub fn build(
    labels: &[usize],
    num_partitions: usize,
    num_shards_per_partition: usize,
    shard_size: usize,
    seed: u64,
) -> Result<PartitionAssignment, PartitionError> {
    ShardPartitioner::new(num_partitions, num_shards_per_partition, Some(shard_size), seed)
        .build(labels)
}
