//! Federated averaging.

use std::sync::Arc;

use tracing::info;

use crate::{
    client::{ClientManager, ClientProxy, EvaluateIns, FitConfig, FitIns, Purpose},
    model::GlobalModel,
    strategy::{num_clients, Strategy},
};

/// Plain federated averaging.
///
/// Samples a fraction of the available clients per round and averages their updates weighted by
/// their number of examples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FedAvg {
    pub fraction_fit: f64,
    /// A fraction of `0` disables federated evaluation.
    pub fraction_evaluate: f64,
    pub min_fit_clients: usize,
    pub min_evaluate_clients: usize,
    pub local_epochs: usize,
    pub learning_rate: f64,
}

impl FedAvg {
    /// Samples the fit clients and configures them with the given proximal strength.
    pub(crate) fn fit_instructions(
        &self,
        round: u64,
        parameters: &GlobalModel,
        clients: &ClientManager,
        proximal_mu: f64,
    ) -> Vec<(Arc<dyn ClientProxy>, FitIns)> {
        let num = num_clients(
            self.fraction_fit,
            self.min_fit_clients,
            clients.num_available(),
        );
        let config = FitConfig {
            round,
            local_epochs: self.local_epochs,
            learning_rate: self.learning_rate,
            proximal_mu,
        };
        let selected = clients.sample(num, round, Purpose::Fit);
        info!(
            "selected {} of {} clients for fitting",
            selected.len(),
            clients.num_available()
        );
        selected
            .into_iter()
            .map(|client| {
                let ins = FitIns {
                    parameters: parameters.clone(),
                    config,
                };
                (client, ins)
            })
            .collect()
    }
}

impl Strategy for FedAvg {
    fn name(&self) -> &'static str {
        "fedavg"
    }

    fn configure_fit(
        &self,
        round: u64,
        parameters: &GlobalModel,
        clients: &ClientManager,
    ) -> Vec<(Arc<dyn ClientProxy>, FitIns)> {
        self.fit_instructions(round, parameters, clients, 0.)
    }

    fn configure_evaluate(
        &self,
        round: u64,
        parameters: &GlobalModel,
        clients: &ClientManager,
    ) -> Vec<(Arc<dyn ClientProxy>, EvaluateIns)> {
        let num = num_clients(
            self.fraction_evaluate,
            self.min_evaluate_clients,
            clients.num_available(),
        );
        clients
            .sample(num, round, Purpose::Evaluate)
            .into_iter()
            .map(|client| {
                let ins = EvaluateIns {
                    parameters: parameters.clone(),
                    round,
                };
                (client, ins)
            })
            .collect()
    }
}
