use async_trait::async_trait;
use thiserror::Error;
use tracing::error;

use crate::{
    state_machine::{
        phases::{Phase, PhaseName, PhaseState, RoundComplete, Shared},
        StateMachine,
    },
    strategy::AggregationError,
};

/// Errors which can occur during the execution of a round.
#[derive(Error, Debug)]
pub enum PhaseError {
    #[error("no clients available")]
    NoClients,
    #[error("aggregation failed: {0}")]
    Aggregation(#[from] AggregationError),
}

/// The failure state.
#[derive(Debug)]
pub struct Failure {
    error: PhaseError,
}

#[async_trait]
impl Phase for PhaseState<Failure> {
    const NAME: PhaseName = PhaseName::Failure;

    /// Marks the round as failed. The global model of the previous round is kept.
    async fn process(&mut self) -> Result<(), PhaseError> {
        error!("round failed: {}", self.private.error);
        self.shared.state.current.fit_error = Some(self.private.error.to_string());
        Ok(())
    }

    /// Moves on to the end of the round. The evaluation of a failed round is skipped.
    async fn next(self) -> Option<StateMachine> {
        Some(PhaseState::<RoundComplete>::new(self.shared).into())
    }
}

impl PhaseState<Failure> {
    /// Creates a new failure state.
    pub fn new(shared: Shared, error: PhaseError) -> Self {
        Self {
            private: Failure { error },
            shared,
        }
    }
}
