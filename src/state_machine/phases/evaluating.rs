use async_trait::async_trait;
use tracing::{info, warn};

use crate::state_machine::{
    phases::{fan_out, Phase, PhaseError, PhaseName, PhaseState, RoundComplete, Shared},
    StateMachine,
};

/// The evaluating state.
#[derive(Debug)]
pub struct Evaluating;

#[async_trait]
impl Phase for PhaseState<Evaluating> {
    const NAME: PhaseName = PhaseName::Evaluating;

    /// Evaluates the global model on the selected clients.
    ///
    /// Never fails: evaluation failures are recorded and a round without usable results simply
    /// has no evaluation metrics.
    async fn process(&mut self) -> Result<(), PhaseError> {
        let round = self.shared.round_id();
        let instructions = self.shared.strategy.configure_evaluate(
            round,
            &self.shared.state.global_model,
            &self.shared.clients,
        );
        if instructions.is_empty() {
            info!("no clients selected for evaluation");
            return Ok(());
        }

        let num_selected = instructions.len();
        let (results, failures) = fan_out(
            instructions,
            self.shared.state.evaluate_timeout,
            |client, ins| async move { client.evaluate(ins).await },
        )
        .await;

        let metrics = match self
            .shared
            .strategy
            .aggregate_evaluate(round, &results, &failures)
        {
            Ok(aggregate) => {
                info!("evaluation loss: {}", aggregate.loss);
                Some(aggregate.metrics)
            }
            Err(err) => {
                warn!("{}", err);
                None
            }
        };

        let record = &mut self.shared.state.current;
        record.num_evaluate_clients = num_selected;
        record.num_evaluate_failures = failures.len();
        record.aggregated_evaluate_metrics = metrics;
        Ok(())
    }

    async fn next(self) -> Option<StateMachine> {
        Some(PhaseState::<RoundComplete>::new(self.shared).into())
    }
}

impl PhaseState<Evaluating> {
    /// Creates a new evaluating state.
    pub fn new(shared: Shared) -> Self {
        Self {
            private: Evaluating,
            shared,
        }
    }
}
