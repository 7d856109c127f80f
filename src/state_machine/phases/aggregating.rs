use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    client::ClientUpdate,
    state_machine::{
        phases::{Evaluating, Phase, PhaseError, PhaseName, PhaseState, Shared},
        StateMachine,
    },
    strategy::Failure,
};

/// The aggregating state.
#[derive(Debug)]
pub struct Aggregating {
    /// The successful fit results of the round.
    results: Vec<ClientUpdate>,
    /// The failed fit requests of the round.
    failures: Vec<Failure>,
}

#[async_trait]
impl Phase for PhaseState<Aggregating> {
    const NAME: PhaseName = PhaseName::Aggregating;

    /// Aggregates the fit results and installs the new global model.
    ///
    /// Updates which don't match the shapes of the current global model are rejected. The previous
    /// global model is kept if the aggregation fails.
    async fn process(&mut self) -> Result<(), PhaseError> {
        let round = self.shared.round_id();
        let results = std::mem::take(&mut self.private.results);
        let record = &mut self.shared.state.current;
        record.num_fit_failures = self.private.failures.len();

        let aggregate = self
            .shared
            .strategy
            .aggregate_fit(
                round,
                &self.shared.state.global_model,
                results,
                &self.private.failures,
            )?;
        let record = &mut self.shared.state.current;
        record.num_fit_failures += aggregate.rejected.len();
        record.aggregated_fit_metrics = aggregate.metrics;
        info!(
            "aggregated {} examples into a new global model",
            aggregate.num_examples
        );
        self.shared.state.global_model = Arc::new(aggregate.parameters);
        Ok(())
    }

    fn broadcast(&mut self) {
        info!("broadcasting the new global model");
        let model = self.shared.state.global_model.clone();
        self.shared.events.broadcast_model(model);
    }

    async fn next(self) -> Option<StateMachine> {
        Some(PhaseState::<Evaluating>::new(self.shared).into())
    }
}

impl PhaseState<Aggregating> {
    /// Creates a new aggregating state.
    pub fn new(shared: Shared, results: Vec<ClientUpdate>, failures: Vec<Failure>) -> Self {
        Self {
            private: Aggregating { results, failures },
            shared,
        }
    }
}
