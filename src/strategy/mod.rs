//! Aggregation strategies.
//!
//! A [`Strategy`] decides which clients take part in a round and how they are configured, and it
//! folds their results into the next global model. The aggregation itself is shared by all
//! strategies, see [`aggregate`]. The strategies only differ in how they configure the fit
//! requests.

pub mod aggregate;
pub mod fedavg;
pub mod fedprox;

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};

pub use self::{fedavg::FedAvg, fedprox::FedProx};
use crate::{
    client::{ClientError, ClientManager, ClientProxy, ClientUpdate, EvaluateIns, EvaluateRes, FitIns},
    model::{GlobalModel, Metrics, Parameters},
    partition::ClientId,
    settings::{ClientSettings, FlSettings, StrategyKind},
};

/// A client together with the reason why its request failed.
pub type Failure = (ClientId, ClientError);

/// Errors which can occur while aggregating fit results.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("no usable fit results")]
    NoResults,
    #[error("the fit results have different parameter shapes")]
    ShapeMismatch,
}

/// The error returned if a round produced no usable evaluation results.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("no usable evaluation results")]
pub struct NoEvaluationResultsError;

/// The outcome of a successful fit aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct FitAggregate {
    /// The new global parameters.
    pub parameters: Parameters,
    /// The weighted average of the fit metrics.
    pub metrics: Metrics,
    /// The total number of examples behind the new parameters.
    pub num_examples: usize,
    /// The clients whose updates were rejected because of their shapes.
    pub rejected: Vec<ClientId>,
}

/// The outcome of a successful evaluation aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateAggregate {
    /// The weighted average of the losses.
    pub loss: f64,
    /// The weighted average of the metrics. Also contains the loss under the key `loss`.
    pub metrics: Metrics,
}

/// The interface of an aggregation strategy.
pub trait Strategy: Send + Sync {
    /// Gets the name of the strategy.
    fn name(&self) -> &'static str;

    /// Selects the clients for a fit round and configures their requests.
    fn configure_fit(
        &self,
        round: u64,
        parameters: &GlobalModel,
        clients: &ClientManager,
    ) -> Vec<(Arc<dyn ClientProxy>, FitIns)>;

    /// Selects the clients for an evaluation round and configures their requests.
    ///
    /// An empty selection disables the evaluation of the round.
    fn configure_evaluate(
        &self,
        round: u64,
        parameters: &GlobalModel,
        clients: &ClientManager,
    ) -> Vec<(Arc<dyn ClientProxy>, EvaluateIns)>;

    /// Aggregates the fit results into new global parameters.
    ///
    /// Updates must have the shapes of the current global `parameters`.
    ///
    /// # Errors
    /// Fails if there is no usable result.
    fn aggregate_fit(
        &self,
        round: u64,
        parameters: &GlobalModel,
        results: Vec<ClientUpdate>,
        failures: &[Failure],
    ) -> Result<FitAggregate, AggregationError> {
        debug!(
            round,
            results = results.len(),
            failures = failures.len(),
            "aggregating fit results"
        );
        aggregate_fit(parameters, results)
    }

    /// Aggregates the evaluation results.
    ///
    /// # Errors
    /// Fails if there is no usable result.
    fn aggregate_evaluate(
        &self,
        round: u64,
        results: &[EvaluateRes],
        failures: &[Failure],
    ) -> Result<EvaluateAggregate, NoEvaluationResultsError> {
        debug!(
            round,
            results = results.len(),
            failures = failures.len(),
            "aggregating evaluation results"
        );
        aggregate_evaluate(results)
    }
}

/// Averages the updates weighted by their number of examples.
///
/// Updates without examples are ignored. Updates whose shapes differ from the `global` parameters
/// are rejected, so the shapes of the global model never change.
///
/// # Errors
/// Fails if no update is left.
pub fn aggregate_fit(
    global: &Parameters,
    results: Vec<ClientUpdate>,
) -> Result<FitAggregate, AggregationError> {
    let mut accepted = Vec::with_capacity(results.len());
    let mut rejected = Vec::new();
    for update in results.iter() {
        if update.num_examples == 0 {
            debug!(client_id = update.client_id, "ignoring update without examples");
            continue;
        }
        if !update.parameters.has_same_shapes(global) {
            warn!(client_id = update.client_id, "rejecting update with different shapes");
            rejected.push(update.client_id);
        } else {
            accepted.push(update);
        }
    }

    let parameters = aggregate::weighted_parameters(
        &accepted
            .iter()
            .map(|update| (update.num_examples, &update.parameters))
            .collect::<Vec<_>>(),
    )?;
    let metrics = aggregate::weighted_metrics(
        &accepted
            .iter()
            .map(|update| (update.num_examples, &update.metrics))
            .collect::<Vec<_>>(),
    )
    .unwrap_or_default();

    Ok(FitAggregate {
        parameters,
        metrics,
        num_examples: accepted.iter().map(|update| update.num_examples).sum(),
        rejected,
    })
}

/// Averages the evaluation results weighted by their number of examples.
///
/// # Errors
/// Fails if no result has examples.
pub fn aggregate_evaluate(
    results: &[EvaluateRes],
) -> Result<EvaluateAggregate, NoEvaluationResultsError> {
    let loss = aggregate::weighted_scalar(
        &results
            .iter()
            .map(|res| (res.num_examples, res.loss))
            .collect::<Vec<_>>(),
    )?;
    let mut metrics = aggregate::weighted_metrics(
        &results
            .iter()
            .map(|res| (res.num_examples, &res.metrics))
            .collect::<Vec<_>>(),
    )?;
    metrics.insert("loss".into(), loss);
    Ok(EvaluateAggregate { loss, metrics })
}

/// Computes how many of the `available` clients to select.
///
/// The count is `fraction * available` rounded, raised to `min_clients` and at least `1`, but
/// never more than `available`. A fraction of `0` selects nobody.
pub fn num_clients(fraction: f64, min_clients: usize, available: usize) -> usize {
    if fraction <= 0. {
        return 0;
    }
    let num = (fraction * available as f64).round() as usize;
    num.max(min_clients).max(1).min(available)
}

/// Creates the strategy configured in the settings.
pub fn from_settings(fl: &FlSettings, client: &ClientSettings) -> Arc<dyn Strategy> {
    let fedavg = FedAvg {
        fraction_fit: fl.fraction_fit,
        fraction_evaluate: fl.fraction_evaluate,
        min_fit_clients: fl.min_fit_clients,
        min_evaluate_clients: fl.min_evaluate_clients,
        local_epochs: client.local_epochs,
        learning_rate: client.learning_rate,
    };
    match fl.strategy {
        StrategyKind::FedAvg => Arc::new(fedavg),
        StrategyKind::FedProx => Arc::new(FedProx::new(fedavg, fl.proximal_mu)),
    }
}
