use std::{fmt, sync::Arc};

use async_trait::async_trait;
use derive_more::Display;
use tracing::{error_span, info, warn};
use tracing_futures::Instrument;

use crate::{
    client::ClientManager,
    state_machine::{
        coordinator::CoordinatorState,
        events::EventPublisher,
        phases::{Failure, PhaseError},
        StateMachine,
    },
    strategy::Strategy,
};

/// The name of the current phase.
#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum PhaseName {
    #[display(fmt = "Idle")]
    Idle,
    #[display(fmt = "Selecting")]
    Selecting,
    #[display(fmt = "Fitting")]
    Fitting,
    #[display(fmt = "Aggregating")]
    Aggregating,
    #[display(fmt = "Evaluating")]
    Evaluating,
    #[display(fmt = "RoundComplete")]
    RoundComplete,
    #[display(fmt = "Failure")]
    Failure,
    #[display(fmt = "Terminated")]
    Terminated,
}

/// A trait that must be implemented by a state in order to move to a next state.
///
/// See the [module level documentation] for more details.
///
/// [module level documentation]: crate::state_machine
#[async_trait]
pub trait Phase {
    /// The name of the current phase.
    const NAME: PhaseName;

    /// Performs the tasks of this phase.
    async fn process(&mut self) -> Result<(), PhaseError>;

    /// Broadcasts data of this phase (nothing by default).
    fn broadcast(&mut self) {}

    /// Moves from this phase to the next phase.
    async fn next(self) -> Option<StateMachine>;
}

/// A struct that contains the coordinator state and the collaborators that are shared and
/// accessible by all `PhaseState`s.
pub struct Shared {
    /// The coordinator state.
    pub(in crate::state_machine) state: CoordinatorState,
    /// The event publisher.
    pub(in crate::state_machine) events: EventPublisher,
    /// The aggregation strategy.
    pub(in crate::state_machine) strategy: Arc<dyn Strategy>,
    /// The available clients.
    pub(in crate::state_machine) clients: ClientManager,
}

impl fmt::Debug for Shared {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("state", &self.state)
            .field("events", &self.events)
            .field("strategy", &self.strategy.name())
            .field("clients", &self.clients)
            .finish()
    }
}

impl Shared {
    /// Creates a new shared state.
    pub fn new(
        coordinator_state: CoordinatorState,
        publisher: EventPublisher,
        strategy: Arc<dyn Strategy>,
        clients: ClientManager,
    ) -> Self {
        Self {
            state: coordinator_state,
            events: publisher,
            strategy,
            clients,
        }
    }

    /// Sets the round ID to the given value.
    pub fn set_round_id(&mut self, id: u64) {
        self.state.round_id = id;
        self.events.set_round_id(id);
    }

    /// Returns the current round ID.
    pub fn round_id(&self) -> u64 {
        self.state.round_id
    }
}

/// The state corresponding to a phase of a round.
///
/// This contains the state-dependent `private` state and the state-independent `shared` state
/// which is shared across state transitions.
pub struct PhaseState<S> {
    /// The private state.
    pub(in crate::state_machine) private: S,
    /// The shared coordinator state and collaborators.
    pub(in crate::state_machine) shared: Shared,
}

impl<S> PhaseState<S>
where
    S: Send,
    Self: Phase,
{
    /// Runs the current phase to completion.
    ///
    /// 1. Performs the phase tasks.
    /// 2. Broadcasts the phase data.
    /// 3. Transitions to the next phase.
    pub async fn run_phase(mut self) -> Option<StateMachine> {
        let phase = Self::NAME;
        let span = error_span!("run_phase", phase = %phase, round_id = self.shared.round_id());

        async move {
            info!("starting phase");
            self.shared.events.broadcast_phase(phase);

            if let Err(err) = self.process().await {
                warn!("failed to perform the phase tasks");
                return Some(self.into_failure_state(err));
            }
            info!("phase ran successfully");

            self.broadcast();

            info!("transitioning to the next phase");
            self.next().await
        }
        .instrument(span)
        .await
    }
}

impl<S> PhaseState<S> {
    fn into_failure_state(self, err: PhaseError) -> StateMachine {
        PhaseState::<Failure>::new(self.shared, err).into()
    }
}
