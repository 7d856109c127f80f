//! The round orchestration of a federated learning run.
//!
//! A run is driven by the [`StateMachine`]. Every state of the machine is a [`PhaseState`] that
//! holds the phase-specific `private` state and the [`Shared`] state, which contains the
//! [`CoordinatorState`], the [`EventPublisher`], the aggregation [`Strategy`] and the
//! [`ClientManager`]. A phase performs its tasks, broadcasts its results and hands the shared state
//! over to the next phase.
//!
//! ```text
//! Idle -> Selecting -> Fitting -> Aggregating -> Evaluating -> RoundComplete -> Selecting ...
//!             |                        |                            |
//!             +------> Failure --------+                            +----> Terminated
//!                         |
//!                         +--------------------> RoundComplete
//! ```
//!
//! **Idle**
//!
//! Broadcasts the initial global model. Moves on to the first round, or terminates right away if
//! the run has no rounds.
//!
//! **Selecting**
//!
//! Starts a new round and asks the strategy to select and configure the clients of the fit round.
//! Fails if no client is selected.
//!
//! **Fitting**
//!
//! Sends the fit requests to all selected clients concurrently. Every request has its own
//! deadline. Clients that fail, time out or crash are recorded as failures of the round.
//!
//! **Aggregating**
//!
//! Aggregates the fit results into a new global model and broadcasts it. Fails if there is no
//! usable result, in which case the global model of the previous round is kept.
//!
//! **Evaluating**
//!
//! Evaluates the new global model on the clients selected by the strategy. A round without usable
//! evaluation results simply has no evaluation metrics.
//!
//! **Failure**
//!
//! Records why the round did not produce a new global model. The evaluation of the round is
//! skipped.
//!
//! **RoundComplete**
//!
//! Appends the record of the round to the history and broadcasts it. Moves on to the next round
//! or terminates after the last one.
//!
//! **Terminated**
//!
//! Hands out the final global model together with the history of all rounds.
//!
//! Every state change and every new global model is published through the [`EventSubscriber`]
//! handed out by the [`StateMachineInitializer`].
//!
//! [`CoordinatorState`]: coordinator::CoordinatorState
//! [`EventPublisher`]: events::EventPublisher
//! [`Strategy`]: crate::strategy::Strategy
//! [`ClientManager`]: crate::client::ClientManager

pub mod coordinator;
pub mod events;
pub mod phases;

use std::sync::Arc;

use derive_more::From;
use thiserror::Error;

use self::{
    coordinator::{CoordinatorState, RunSummary},
    events::{EventPublisher, EventSubscriber},
    phases::{
        Aggregating,
        Evaluating,
        Failure,
        Fitting,
        Idle,
        Phase,
        PhaseName,
        PhaseState,
        RoundComplete,
        Selecting,
        Shared,
        Terminated,
    },
};
use crate::{
    client::ClientManager,
    model::Parameters,
    settings::FlSettings,
    strategy::Strategy,
};

#[cfg(test)]
pub(crate) mod tests;

/// The state machine with all its states.
#[derive(From)]
pub enum StateMachine {
    Idle(PhaseState<Idle>),
    Selecting(PhaseState<Selecting>),
    Fitting(PhaseState<Fitting>),
    Aggregating(PhaseState<Aggregating>),
    Evaluating(PhaseState<Evaluating>),
    RoundComplete(PhaseState<RoundComplete>),
    Failure(PhaseState<Failure>),
    Terminated(PhaseState<Terminated>),
}

impl StateMachine
where
    PhaseState<Idle>: Phase,
    PhaseState<Selecting>: Phase,
    PhaseState<Fitting>: Phase,
    PhaseState<Aggregating>: Phase,
    PhaseState<Evaluating>: Phase,
    PhaseState<RoundComplete>: Phase,
    PhaseState<Failure>: Phase,
    PhaseState<Terminated>: Phase,
{
    /// Moves the [`StateMachine`] to the next state and consumes the current one.
    /// Returns the next state or `None` if the [`StateMachine`] reached the state [`Terminated`].
    pub async fn next(self) -> Option<Self> {
        match self {
            StateMachine::Idle(state) => state.run_phase().await,
            StateMachine::Selecting(state) => state.run_phase().await,
            StateMachine::Fitting(state) => state.run_phase().await,
            StateMachine::Aggregating(state) => state.run_phase().await,
            StateMachine::Evaluating(state) => state.run_phase().await,
            StateMachine::RoundComplete(state) => state.run_phase().await,
            StateMachine::Failure(state) => state.run_phase().await,
            StateMachine::Terminated(state) => state.run_phase().await,
        }
    }

    /// Runs the state machine until all rounds are done.
    ///
    /// Returns the final global model and the round history.
    pub async fn run(mut self) -> Option<RunSummary> {
        loop {
            self = match self {
                StateMachine::Terminated(state) => return Some(state.finish().await),
                state => state.next().await?,
            };
        }
    }
}

/// Error that can occur during the initialization of the [`StateMachine`].
#[derive(Debug, Error)]
pub enum StateMachineInitializationError {
    #[error("no clients registered")]
    NoClients,
    #[error("the initial global model has no parameters")]
    EmptyModel,
}

/// The state machine initializer that initializes a new state machine.
pub struct StateMachineInitializer {
    fl_settings: FlSettings,
    strategy: Arc<dyn Strategy>,
    clients: ClientManager,
    initial_model: Parameters,
}

impl StateMachineInitializer {
    /// Creates a new [`StateMachineInitializer`].
    pub fn new(
        fl_settings: FlSettings,
        strategy: Arc<dyn Strategy>,
        clients: ClientManager,
        initial_model: Parameters,
    ) -> Self {
        Self {
            fl_settings,
            strategy,
            clients,
            initial_model,
        }
    }

    /// Initializes a new [`StateMachine`] in the [`Idle`] state.
    ///
    /// # Errors
    /// Fails if there are no clients or if the initial model is empty.
    pub fn init(self) -> Result<(StateMachine, EventSubscriber), StateMachineInitializationError> {
        if self.clients.num_available() == 0 {
            return Err(StateMachineInitializationError::NoClients);
        }
        if self.initial_model.num_elements() == 0 {
            return Err(StateMachineInitializationError::EmptyModel);
        }

        let global_model = Arc::new(self.initial_model);
        let coordinator_state = CoordinatorState::new(&self.fl_settings, global_model.clone());
        let (event_publisher, event_subscriber) =
            EventPublisher::init(coordinator_state.round_id, PhaseName::Idle, global_model);
        let shared = Shared::new(
            coordinator_state,
            event_publisher,
            self.strategy,
            self.clients,
        );

        let state_machine = StateMachine::from(PhaseState::<Idle>::new(shared));
        Ok((state_machine, event_subscriber))
    }
}
