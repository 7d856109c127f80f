//! Loading and validation of settings.
//!
//! Values defined in the configuration file can be overridden by environment variables with the
//! prefix `FEDSIM_` and `__` as section separator, e.g. `FEDSIM_FL__NUM_ROUNDS=5`. An example of a
//! configuration file can be found in the `configs/` directory located in the repository root.

#[cfg(test)]
mod tests;

use std::{fmt, path::Path, time::Duration};

use config::{Config, ConfigError, Environment, File};
use serde::{
    de::{self, Deserializer, Visitor},
    Deserialize,
    Serialize,
};
use thiserror::Error;
use tracing_subscriber::filter::EnvFilter;
use validator::{Validate, ValidationError, ValidationErrors};

#[derive(Error, Debug)]
/// An error related to loading and validation of settings.
pub enum SettingsError {
    #[error("configuration loading failed: {0}")]
    Loading(#[from] ConfigError),
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationErrors),
}

#[derive(Debug, Validate, Deserialize)]
/// The combined settings.
///
/// Each section in the configuration file corresponds to the identically named settings field.
pub struct Settings {
    #[validate]
    pub fl: FlSettings,
    #[validate]
    pub partition: PartitionSettings,
    #[validate]
    pub client: ClientSettings,
    #[validate]
    pub dataset: DatasetSettings,
    pub log: LoggingSettings,
}

impl Settings {
    /// Loads and validates the settings via a configuration file.
    ///
    /// # Errors
    /// Fails when the loading of the configuration file or its validation failed.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let settings: Settings = Self::load(path)?;
        settings.validate()?;
        Ok(settings)
    }

    fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(
                Environment::with_prefix("fedsim")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
/// The aggregation strategy of a run.
pub enum StrategyKind {
    /// Plain weighted averaging.
    FedAvg,
    /// Weighted averaging with a proximal term in the local objective of every client.
    FedProx,
}

#[derive(Debug, Validate, Deserialize, Clone, Copy)]
#[validate(schema(function = "validate_fl"))]
/// The round settings of the coordinator.
pub struct FlSettings {
    /// The number of rounds of a run.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [fl]
    /// num_rounds = 10
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDSIM_FL__NUM_ROUNDS=10
    /// ```
    #[validate(range(min = 1))]
    pub num_rounds: u64,

    /// The fraction of available clients selected for training in every round. The value must be
    /// between `0` (exclusive) and `1`.
    pub fraction_fit: f64,

    /// The fraction of available clients selected for evaluation in every round. The value must be
    /// between `0` and `1`. A fraction of `0` disables federated evaluation.
    pub fraction_evaluate: f64,

    /// The minimal number of clients selected for training.
    #[validate(range(min = 1))]
    pub min_fit_clients: usize,

    /// The minimal number of clients selected for evaluation if evaluation is enabled.
    #[serde(default)]
    pub min_evaluate_clients: usize,

    /// The time in seconds a client has to respond to a fit request.
    #[validate(range(min = 1))]
    pub fit_timeout: u64,

    /// The time in seconds a client has to respond to an evaluate request.
    #[validate(range(min = 1))]
    pub evaluate_timeout: u64,

    /// The aggregation strategy, either `"fedavg"` or `"fedprox"`.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [fl]
    /// strategy = "fedprox"
    /// proximal_mu = 0.01
    /// ```
    pub strategy: StrategyKind,

    /// The strength of the proximal term. `0` disables the penalty. Only used by `"fedprox"`.
    #[serde(default)]
    pub proximal_mu: f64,

    /// The seed of the client selection.
    #[serde(default)]
    pub selection_seed: u64,
}

impl FlSettings {
    pub fn fit_timeout(&self) -> Duration {
        Duration::from_secs(self.fit_timeout)
    }

    pub fn evaluate_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluate_timeout)
    }

    /// Checks the round settings.
    fn validate_fl(&self) -> Result<(), ValidationError> {
        // the validate attribute only accepts literals, therefore we check the invariants here
        if !(0. < self.fraction_fit && self.fraction_fit <= 1.) {
            return Err(ValidationError::new("invalid fit fraction"));
        }
        if !(0. ..=1.).contains(&self.fraction_evaluate) {
            return Err(ValidationError::new("invalid evaluate fraction"));
        }
        if !(self.proximal_mu >= 0. && self.proximal_mu.is_finite()) {
            return Err(ValidationError::new("invalid proximal mu"));
        }
        Ok(())
    }
}

/// A wrapper for validate derive.
fn validate_fl(s: &FlSettings) -> Result<(), ValidationError> {
    s.validate_fl()
}

#[derive(Debug, Validate, Deserialize, Clone, Copy, PartialEq, Eq)]
/// The data partitioning settings.
pub struct PartitionSettings {
    /// The number of partitions, which is also the number of simulated clients.
    #[validate(range(min = 1))]
    pub num_partitions: usize,

    /// The number of shards dealt to every partition. Few shards per partition produce a strong
    /// label skew.
    #[validate(range(min = 1))]
    pub num_shards_per_partition: usize,

    /// The number of examples per shard. If omitted, the shard size is derived from the dataset
    /// size such that every example can be dealt.
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [partition]
    /// shard_size = 50
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDSIM_PARTITION__SHARD_SIZE=50
    /// ```
    #[serde(default)]
    #[validate(range(min = 1))]
    pub shard_size: Option<usize>,

    /// The seed of the shard shuffling.
    pub seed: u64,
}

#[derive(Debug, Validate, Deserialize, Clone, Copy)]
#[validate(schema(function = "validate_client"))]
/// The local training settings of the clients.
pub struct ClientSettings {
    /// The number of full passes over the local training data per round.
    #[validate(range(min = 1))]
    pub local_epochs: usize,

    /// The learning rate of the local optimizer.
    pub learning_rate: f64,

    /// The number of examples per training batch.
    #[validate(range(min = 1))]
    pub batch_size: usize,

    /// The fraction of every partition held out for evaluation. The value must be between `0`
    /// (inclusive) and `1` (exclusive).
    pub val_fraction: f64,

    /// The seed of the local batch shuffling and the train/validation split.
    pub seed: u64,
}

impl ClientSettings {
    /// Checks the client settings.
    fn validate_client(&self) -> Result<(), ValidationError> {
        if !(self.learning_rate > 0. && self.learning_rate.is_finite()) {
            return Err(ValidationError::new("invalid learning rate"));
        }
        if !(0. ..1.).contains(&self.val_fraction) {
            return Err(ValidationError::new("invalid validation fraction"));
        }
        Ok(())
    }
}

/// A wrapper for validate derive.
fn validate_client(s: &ClientSettings) -> Result<(), ValidationError> {
    s.validate_client()
}

#[derive(Debug, Validate, Deserialize, Clone, Copy, PartialEq)]
/// The settings of the synthetic dataset.
pub struct DatasetSettings {
    /// The number of examples.
    #[validate(range(min = 1))]
    pub num_examples: usize,
    /// The number of classes.
    #[validate(range(min = 2))]
    pub num_classes: usize,
    /// The number of features per example.
    #[validate(range(min = 1))]
    pub num_features: usize,
    /// The maximal distance of a feature from its class centroid.
    pub spread: f32,
    /// The seed of the generator.
    pub seed: u64,
}

#[derive(Debug, Deserialize)]
/// Logging settings.
pub struct LoggingSettings {
    /// A comma-separated list of logging directives. More information about logging directives
    /// can be found [here].
    ///
    /// # Examples
    ///
    /// **TOML**
    /// ```text
    /// [log]
    /// filter = "info"
    /// ```
    ///
    /// **Environment variable**
    /// ```text
    /// FEDSIM_LOG__FILTER=info
    /// ```
    ///
    /// [here]: https://docs.rs/tracing-subscriber/0.3/tracing_subscriber/filter/struct.EnvFilter.html#directives
    #[serde(deserialize_with = "deserialize_env_filter")]
    pub filter: EnvFilter,
}

fn deserialize_env_filter<'de, D>(deserializer: D) -> Result<EnvFilter, D::Error>
where
    D: Deserializer<'de>,
{
    struct EnvFilterVisitor;

    impl<'de> Visitor<'de> for EnvFilterVisitor {
        type Value = EnvFilter;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(formatter, "a valid tracing filter directive: https://docs.rs/tracing-subscriber/0.3/tracing_subscriber/filter/struct.EnvFilter.html#directives")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            EnvFilter::try_new(value)
                .map_err(|_| de::Error::invalid_value(serde::de::Unexpected::Str(value), &self))
        }
    }

    deserializer.deserialize_str(EnvFilterVisitor)
}
