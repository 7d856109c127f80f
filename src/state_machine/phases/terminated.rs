use async_trait::async_trait;
use tracing::{error_span, info};
use tracing_futures::Instrument;

use crate::state_machine::{
    coordinator::RunSummary,
    phases::{Phase, PhaseError, PhaseName, PhaseState, Shared},
    StateMachine,
};

/// The terminated state.
#[derive(Debug)]
pub struct Terminated;

#[async_trait]
impl Phase for PhaseState<Terminated> {
    const NAME: PhaseName = PhaseName::Terminated;

    async fn process(&mut self) -> Result<(), PhaseError> {
        self.log_history();
        Ok(())
    }

    async fn next(self) -> Option<StateMachine> {
        None
    }
}

impl PhaseState<Terminated> {
    /// Creates a new terminated state.
    pub fn new(shared: Shared) -> Self {
        Self {
            private: Terminated,
            shared,
        }
    }

    fn log_history(&self) {
        let history = &self.shared.state.history;
        let failed = history.iter().filter(|record| record.failed()).count();
        info!(
            "run terminated after {} rounds, {} of which failed",
            history.len(),
            failed
        );
    }

    /// Runs the terminated phase and hands out the final global model and the round history.
    pub async fn finish(mut self) -> RunSummary {
        let phase = Self::NAME;
        let span = error_span!("run_phase", phase = %phase, round_id = self.shared.round_id());
        async move {
            self.shared.events.broadcast_phase(phase);
            self.log_history();
            RunSummary::from(self.shared.state)
        }
        .instrument(span)
        .await
    }
}
