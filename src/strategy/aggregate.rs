//! Weighted averaging of parameters and metrics.
//!
//! Both routines weight every contribution by its number of examples. All sums are accumulated in
//! `f64`, the averaged parameters are cast back to `f32` at the end.

use std::collections::BTreeMap;

use crate::{
    model::{Metrics, Parameters, Tensor},
    strategy::{AggregationError, NoEvaluationResultsError},
};

/// Averages parameters weighted by their number of examples.
///
/// # Errors
/// Fails if there is no contribution with a positive weight or if the shapes of the
/// contributions differ.
pub fn weighted_parameters(results: &[(usize, &Parameters)]) -> Result<Parameters, AggregationError> {
    let contributions = results
        .iter()
        .filter(|(num_examples, _)| *num_examples > 0)
        .collect::<Vec<_>>();
    let (_, reference) = contributions.first().ok_or(AggregationError::NoResults)?;
    if !contributions
        .iter()
        .all(|(_, parameters)| parameters.has_same_shapes(reference))
    {
        return Err(AggregationError::ShapeMismatch);
    }

    let total = contributions.iter().map(|(n, _)| *n as f64).sum::<f64>();
    let mut sums = reference
        .iter()
        .map(|tensor| vec![0_f64; tensor.len()])
        .collect::<Vec<_>>();
    for (num_examples, parameters) in contributions.iter() {
        let weight = *num_examples as f64 / total;
        for (sum, tensor) in sums.iter_mut().zip(parameters.iter()) {
            for (s, v) in sum.iter_mut().zip(tensor.data()) {
                *s += weight * f64::from(*v);
            }
        }
    }

    sums.into_iter()
        .zip(reference.iter())
        .map(|(sum, tensor)| {
            let data = sum.into_iter().map(|s| s as f32).collect();
            Tensor::new(tensor.shape().to_vec(), data).map_err(|_| AggregationError::ShapeMismatch)
        })
        .collect()
}

/// Averages metrics weighted by their number of examples.
///
/// Every metric name is averaged over the results that report it.
///
/// # Errors
/// Fails if no result has a positive weight.
pub fn weighted_metrics(results: &[(usize, &Metrics)]) -> Result<Metrics, NoEvaluationResultsError> {
    let mut sums = BTreeMap::<&str, (f64, f64)>::new();
    let mut total = 0;
    for (num_examples, metrics) in results.iter().filter(|(n, _)| *n > 0) {
        total += num_examples;
        for (name, value) in metrics.iter() {
            let (weighted, weight) = sums.entry(name.as_str()).or_default();
            *weighted += *num_examples as f64 * value;
            *weight += *num_examples as f64;
        }
    }
    if total == 0 {
        return Err(NoEvaluationResultsError);
    }
    Ok(sums
        .into_iter()
        .map(|(name, (weighted, weight))| (name.to_string(), weighted / weight))
        .collect())
}

/// Averages scalars weighted by their number of examples.
///
/// # Errors
/// Fails if no value has a positive weight.
pub fn weighted_scalar(values: &[(usize, f64)]) -> Result<f64, NoEvaluationResultsError> {
    let (weighted, total) = values
        .iter()
        .filter(|(n, _)| *n > 0)
        .fold((0_f64, 0_f64), |(weighted, total), (n, value)| {
            (weighted + *n as f64 * value, total + *n as f64)
        });
    if total > 0. {
        Ok(weighted / total)
    } else {
        Err(NoEvaluationResultsError)
    }
}
