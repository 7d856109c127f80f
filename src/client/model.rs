//! The interface to a trainable model.

use thiserror::Error;

use crate::{
    data::{Batch, LocalDataset},
    model::{Metrics, Parameters, ShapeError},
};

/// Errors reported by a [`ModelUnit`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    #[error("invalid parameters: {0}")]
    Parameters(#[from] ShapeError),
    #[error("example has {actual} features, the model expects {expected}")]
    Features { expected: usize, actual: usize },
    #[error("label {0} is out of range")]
    Label(usize),
}

/// The proximal term of a local objective.
#[derive(Debug, Clone, Copy)]
pub struct Proximal<'a> {
    /// The penalty strength.
    pub mu: f64,
    /// The parameters the local parameters are pulled towards.
    pub anchor: &'a Parameters,
}

/// Options for a single pass over the local training data.
#[derive(Debug, Clone, Copy)]
pub struct TrainOptions<'a> {
    pub learning_rate: f64,
    /// If set, `mu / 2 * ||w - anchor||^2` is added to the loss of every step.
    pub proximal: Option<Proximal<'a>>,
}

/// A trainable model as seen by a client.
///
/// Implementors own their parameters. The client installs the global parameters before every
/// fit or evaluation and reads the local parameters back afterwards.
pub trait ModelUnit {
    /// Gets a copy of the current parameters.
    fn get_parameters(&self) -> Parameters;

    /// Replaces the current parameters.
    ///
    /// # Errors
    /// Fails if the shapes don't match the model.
    fn set_parameters(&mut self, parameters: &Parameters) -> Result<(), ModelError>;

    /// Runs one optimization step per batch and returns the mean loss over all steps,
    /// including the proximal penalty if one is configured.
    fn train_one_pass(
        &mut self,
        batches: &[Batch<'_>],
        options: &TrainOptions<'_>,
    ) -> Result<f64, ModelError>;

    /// Computes the mean loss and further metrics (at least `accuracy`) without changing the
    /// parameters.
    fn evaluate(&self, dataset: &LocalDataset) -> Result<(f64, Metrics), ModelError>;
}
