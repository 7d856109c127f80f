//! Model parameter representation.
//!
//! A [`Parameters`] value is the ordered sequence of [`Tensor`]s that makes up a model. The
//! coordinator only ever holds the global parameters behind a [`GlobalModel`] handle and replaces
//! that handle at the end of a round instead of mutating the tensors in place.

use std::{
    collections::BTreeMap,
    iter::{FromIterator, IntoIterator},
    slice::Iter,
    sync::Arc,
};

use derive_more::{From, Index, Into};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Scalar metrics reported by clients and produced by aggregation, keyed by metric name.
pub type Metrics = BTreeMap<String, f64>;

/// A shared, immutable handle to the global parameters of a run.
pub type GlobalModel = Arc<Parameters>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
/// Errors related to tensor shapes.
pub enum ShapeError {
    #[error("tensor shape {shape:?} requires {expected} elements but {actual} were given")]
    ElementCount {
        shape: Vec<usize>,
        expected: usize,
        actual: usize,
    },
    #[error("parameter shapes differ from the expected shapes")]
    Mismatch,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// A dense tensor of `f32` values in row-major order.
pub struct Tensor {
    shape: Vec<usize>,
    data: Vec<f32>,
}

impl Tensor {
    /// Creates a tensor from its shape and row-major data.
    ///
    /// # Errors
    /// Fails if the number of values doesn't match the shape.
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Result<Self, ShapeError> {
        let expected = shape.iter().product::<usize>();
        if expected != data.len() {
            return Err(ShapeError::ElementCount {
                shape,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self { shape, data })
    }

    /// Creates a tensor of zeros.
    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product::<usize>();
        Self {
            shape,
            data: vec![0_f32; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    /// Gets the number of elements of this tensor.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Default, From, Index, Into, Serialize, Deserialize)]
/// The ordered tensors of a machine learning model.
pub struct Parameters(Vec<Tensor>);

impl Parameters {
    /// Gets the number of tensors.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Creates an iterator that yields references to the tensors.
    pub fn iter(&self) -> Iter<Tensor> {
        self.0.iter()
    }

    /// Gets the shapes of all tensors in order.
    pub fn shapes(&self) -> Vec<&[usize]> {
        self.0.iter().map(Tensor::shape).collect()
    }

    /// Checks whether both parameter sequences have the same number of tensors with identical
    /// shapes.
    pub fn has_same_shapes(&self, other: &Parameters) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .zip(other.iter())
                .all(|(a, b)| a.shape() == b.shape())
    }

    /// Gets the total number of scalar values across all tensors.
    pub fn num_elements(&self) -> usize {
        self.iter().map(Tensor::len).sum()
    }

    /// Checks that every value is finite.
    pub fn is_finite(&self) -> bool {
        self.iter().all(|t| t.data().iter().all(|v| v.is_finite()))
    }

    /// Computes `||self - other||^2` over all tensors.
    ///
    /// # Errors
    /// Fails if the shapes differ.
    pub fn squared_distance(&self, other: &Parameters) -> Result<f64, ShapeError> {
        if !self.has_same_shapes(other) {
            return Err(ShapeError::Mismatch);
        }
        Ok(self
            .iter()
            .zip(other.iter())
            .flat_map(|(a, b)| a.data().iter().zip(b.data().iter()))
            .map(|(x, y)| {
                let d = f64::from(*x) - f64::from(*y);
                d * d
            })
            .sum())
    }
}

impl FromIterator<Tensor> for Parameters {
    fn from_iter<I: IntoIterator<Item = Tensor>>(iter: I) -> Self {
        Parameters(iter.into_iter().collect())
    }
}

impl IntoIterator for Parameters {
    type Item = Tensor;
    type IntoIter = std::vec::IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = &'a Tensor;
    type IntoIter = Iter<'a, Tensor>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
