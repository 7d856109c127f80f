use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::{
    client::{ClientProxy, ClientUpdate, FitIns},
    state_machine::{
        phases::{fan_out, Aggregating, Phase, PhaseError, PhaseName, PhaseState, Shared},
        StateMachine,
    },
    strategy::Failure,
};

/// The fitting state.
pub struct Fitting {
    /// The fit requests which are yet to be sent.
    instructions: Vec<(Arc<dyn ClientProxy>, FitIns)>,
    /// The successful fit results.
    results: Vec<ClientUpdate>,
    /// The failed fit requests.
    failures: Vec<Failure>,
}

#[async_trait]
impl Phase for PhaseState<Fitting> {
    const NAME: PhaseName = PhaseName::Fitting;

    /// Sends the fit requests and waits until every selected client has responded or failed.
    async fn process(&mut self) -> Result<(), PhaseError> {
        let instructions = std::mem::take(&mut self.private.instructions);
        let num_selected = instructions.len();
        let (results, failures) = fan_out(
            instructions,
            self.shared.state.fit_timeout,
            |client, ins| async move { client.fit(ins).await },
        )
        .await;
        info!(
            "{} of {} clients returned an update",
            results.len(),
            num_selected
        );
        self.private.results = results;
        self.private.failures = failures;
        Ok(())
    }

    async fn next(self) -> Option<StateMachine> {
        let PhaseState { private, shared } = self;
        Some(PhaseState::<Aggregating>::new(shared, private.results, private.failures).into())
    }
}

impl PhaseState<Fitting> {
    /// Creates a new fitting state.
    pub fn new(shared: Shared, instructions: Vec<(Arc<dyn ClientProxy>, FitIns)>) -> Self {
        Self {
            private: Fitting {
                instructions,
                results: Vec::new(),
                failures: Vec::new(),
            },
            shared,
        }
    }
}
