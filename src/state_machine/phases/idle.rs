use async_trait::async_trait;
use tracing::info;

use crate::state_machine::{
    phases::{Phase, PhaseError, PhaseName, PhaseState, Selecting, Shared, Terminated},
    StateMachine,
};

/// The idle state.
#[derive(Debug)]
pub struct Idle;

#[async_trait]
impl Phase for PhaseState<Idle> {
    const NAME: PhaseName = PhaseName::Idle;

    async fn process(&mut self) -> Result<(), PhaseError> {
        info!(
            "starting a run of {} rounds with {} clients and strategy {}",
            self.shared.state.num_rounds,
            self.shared.clients.num_available(),
            self.shared.strategy.name(),
        );
        Ok(())
    }

    fn broadcast(&mut self) {
        info!("broadcasting the initial global model");
        let model = self.shared.state.global_model.clone();
        self.shared.events.broadcast_model(model);
    }

    async fn next(self) -> Option<StateMachine> {
        Some(if self.shared.state.is_done() {
            PhaseState::<Terminated>::new(self.shared).into()
        } else {
            PhaseState::<Selecting>::new(self.shared).into()
        })
    }
}

impl PhaseState<Idle> {
    /// Creates a new idle state.
    pub fn new(shared: Shared) -> Self {
        Self {
            private: Idle,
            shared,
        }
    }
}
