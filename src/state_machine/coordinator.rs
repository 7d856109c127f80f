//! Coordinator state and round record types.

use std::time::Duration;

use serde::Serialize;

use crate::{
    model::{GlobalModel, Metrics},
    settings::FlSettings,
};

/// The observable outcome of one round.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    /// The round number, starting at `1`.
    pub round: u64,
    /// The weighted average of the fit metrics of the accepted updates.
    pub aggregated_fit_metrics: Metrics,
    /// The weighted average of the evaluation metrics, or `None` if the round has no usable
    /// evaluation results.
    pub aggregated_evaluate_metrics: Option<Metrics>,
    /// The number of clients selected for fitting.
    pub num_fit_clients: usize,
    pub num_fit_failures: usize,
    /// The number of clients selected for evaluation.
    pub num_evaluate_clients: usize,
    pub num_evaluate_failures: usize,
    /// The reason why no new global model was installed in this round.
    pub fit_error: Option<String>,
}

impl RoundRecord {
    /// Creates an empty record for the given round.
    pub fn new(round: u64) -> Self {
        Self {
            round,
            aggregated_fit_metrics: Metrics::new(),
            aggregated_evaluate_metrics: None,
            num_fit_clients: 0,
            num_fit_failures: 0,
            num_evaluate_clients: 0,
            num_evaluate_failures: 0,
            fit_error: None,
        }
    }

    /// Checks whether the round kept the previous global model.
    pub fn failed(&self) -> bool {
        self.fit_error.is_some()
    }
}

/// The coordinator state.
#[derive(Debug, Clone)]
pub struct CoordinatorState {
    /// The current round, `0` before the first round.
    pub round_id: u64,
    /// The number of rounds of the run.
    pub num_rounds: u64,
    /// The current global model.
    pub global_model: GlobalModel,
    /// The record of the current round.
    pub current: RoundRecord,
    /// The records of the completed rounds.
    pub history: Vec<RoundRecord>,
    /// The deadline of a single fit request.
    pub fit_timeout: Duration,
    /// The deadline of a single evaluate request.
    pub evaluate_timeout: Duration,
}

impl CoordinatorState {
    pub fn new(fl_settings: &FlSettings, global_model: GlobalModel) -> Self {
        Self {
            round_id: 0,
            num_rounds: fl_settings.num_rounds,
            global_model,
            current: RoundRecord::new(0),
            history: Vec::new(),
            fit_timeout: fl_settings.fit_timeout(),
            evaluate_timeout: fl_settings.evaluate_timeout(),
        }
    }

    /// Checks whether all rounds have been run.
    pub fn is_done(&self) -> bool {
        self.round_id >= self.num_rounds
    }
}

/// The final output of a run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    /// The global model after the last round.
    pub global_model: GlobalModel,
    /// The records of all rounds in order.
    pub history: Vec<RoundRecord>,
}

impl RunSummary {
    /// Gets the number of rounds which kept the previous global model.
    pub fn num_failed_rounds(&self) -> usize {
        self.history.iter().filter(|record| record.failed()).count()
    }

    /// Gets the evaluation metrics of the last round that has some.
    pub fn last_evaluate_metrics(&self) -> Option<&Metrics> {
        self.history
            .iter()
            .rev()
            .find_map(|record| record.aggregated_evaluate_metrics.as_ref())
    }
}

impl From<CoordinatorState> for RunSummary {
    fn from(state: CoordinatorState) -> Self {
        let CoordinatorState {
            global_model,
            history,
            ..
        } = state;
        Self {
            global_model,
            history,
        }
    }
}
