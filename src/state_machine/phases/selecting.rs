use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::{
    client::{ClientProxy, FitIns},
    state_machine::{
        coordinator::RoundRecord,
        phases::{Fitting, Phase, PhaseError, PhaseName, PhaseState, Shared},
        StateMachine,
    },
};

/// The selecting state.
pub struct Selecting {
    /// The fit requests of the selected clients.
    instructions: Vec<(Arc<dyn ClientProxy>, FitIns)>,
}

#[async_trait]
impl Phase for PhaseState<Selecting> {
    const NAME: PhaseName = PhaseName::Selecting;

    async fn process(&mut self) -> Result<(), PhaseError> {
        let round = self.shared.round_id();
        let instructions = self.shared.strategy.configure_fit(
            round,
            &self.shared.state.global_model,
            &self.shared.clients,
        );
        if instructions.is_empty() {
            return Err(PhaseError::NoClients);
        }
        self.shared.state.current.num_fit_clients = instructions.len();
        self.private.instructions = instructions;
        Ok(())
    }

    async fn next(self) -> Option<StateMachine> {
        let PhaseState { private, shared } = self;
        Some(PhaseState::<Fitting>::new(shared, private.instructions).into())
    }
}

impl PhaseState<Selecting> {
    /// Creates a new selecting state and starts the next round.
    pub fn new(mut shared: Shared) -> Self {
        // events of this round must already carry the new round id
        shared.set_round_id(shared.round_id() + 1);
        debug!("new round ID = {}", shared.round_id());
        info!(
            "starting round {} of {}",
            shared.round_id(),
            shared.state.num_rounds
        );
        shared.state.current = RoundRecord::new(shared.round_id());
        Self {
            private: Selecting {
                instructions: Vec::new(),
            },
            shared,
        }
    }
}
