//! This module provides the `PhaseStates` of the [`StateMachine`].
//!
//! [`StateMachine`]: crate::state_machine::StateMachine

mod aggregating;
mod evaluating;
mod failure;
mod fan_out;
mod fitting;
mod idle;
mod phase;
mod round_complete;
mod selecting;
mod terminated;

pub use self::{
    aggregating::Aggregating,
    evaluating::Evaluating,
    failure::{Failure, PhaseError},
    fitting::Fitting,
    idle::Idle,
    phase::{Phase, PhaseName, PhaseState, Shared},
    round_complete::RoundComplete,
    selecting::Selecting,
    terminated::Terminated,
};
pub(in crate::state_machine) use self::fan_out::fan_out;
