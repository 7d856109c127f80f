//! Federated optimization with a proximal term.

use std::sync::Arc;

use crate::{
    client::{ClientManager, ClientProxy, EvaluateIns, FitIns},
    model::GlobalModel,
    strategy::{FedAvg, Strategy},
};

/// FedProx.
///
/// Aggregates exactly like [`FedAvg`], but asks every client to add the proximal term
/// `mu / 2 * ||w - w_global||^2` to its local objective, which bounds how far the clients drift
/// from the global model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FedProx {
    inner: FedAvg,
    proximal_mu: f64,
}

impl FedProx {
    pub fn new(inner: FedAvg, proximal_mu: f64) -> Self {
        Self { inner, proximal_mu }
    }

    pub fn proximal_mu(&self) -> f64 {
        self.proximal_mu
    }
}

impl Strategy for FedProx {
    fn name(&self) -> &'static str {
        "fedprox"
    }

    fn configure_fit(
        &self,
        round: u64,
        parameters: &GlobalModel,
        clients: &ClientManager,
    ) -> Vec<(Arc<dyn ClientProxy>, FitIns)> {
        self.inner
            .fit_instructions(round, parameters, clients, self.proximal_mu)
    }

    fn configure_evaluate(
        &self,
        round: u64,
        parameters: &GlobalModel,
        clients: &ClientManager,
    ) -> Vec<(Arc<dyn ClientProxy>, EvaluateIns)> {
        self.inner.configure_evaluate(round, parameters, clients)
    }
}
