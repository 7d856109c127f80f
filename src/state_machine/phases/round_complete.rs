use async_trait::async_trait;
use tracing::info;

use crate::state_machine::{
    phases::{Phase, PhaseError, PhaseName, PhaseState, Selecting, Shared, Terminated},
    StateMachine,
};

/// The round complete state.
#[derive(Debug)]
pub struct RoundComplete;

#[async_trait]
impl Phase for PhaseState<RoundComplete> {
    const NAME: PhaseName = PhaseName::RoundComplete;

    async fn process(&mut self) -> Result<(), PhaseError> {
        let record = self.shared.state.current.clone();
        info!(
            fit_failures = record.num_fit_failures,
            evaluate_failures = record.num_evaluate_failures,
            failed = record.failed(),
            "completed round {}",
            record.round
        );
        self.shared.state.history.push(record);
        Ok(())
    }

    fn broadcast(&mut self) {
        if let Some(record) = self.shared.state.history.last() {
            let record = record.clone();
            self.shared.events.broadcast_record(record);
        }
    }

    async fn next(self) -> Option<StateMachine> {
        Some(if self.shared.state.is_done() {
            PhaseState::<Terminated>::new(self.shared).into()
        } else {
            PhaseState::<Selecting>::new(self.shared).into()
        })
    }
}

impl PhaseState<RoundComplete> {
    /// Creates a new round complete state.
    pub fn new(shared: Shared) -> Self {
        Self {
            private: RoundComplete,
            shared,
        }
    }
}
