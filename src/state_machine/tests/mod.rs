pub mod utils;

use std::{sync::Arc, time::Duration};

use self::{
    builder::StateMachineBuilder,
    utils::{enable_logging, full_participation, Script, ScriptedClient},
};
use crate::{
    client::ClientManager,
    model::{tests::vector, Parameters},
    state_machine::{
        phases::PhaseName,
        StateMachineInitializationError,
        StateMachineInitializer,
    },
    strategy::FedAvg,
};

fn clients(scripts: Vec<Script>) -> ClientManager {
    scripts
        .into_iter()
        .enumerate()
        .map(|(id, script)| ScriptedClient::new(id, script))
        .collect()
}

#[tokio::test]
async fn test_run_produces_one_record_per_round() {
    enable_logging();
    let (state_machine, _events) = StateMachineBuilder::new().build();
    let summary = state_machine.run().await.unwrap();

    let rounds = summary
        .history
        .iter()
        .map(|record| record.round)
        .collect::<Vec<_>>();
    assert_eq!(rounds, vec![1, 2, 3]);
    assert_eq!(*summary.global_model, vector(&[2.]));
    assert_eq!(summary.num_failed_rounds(), 0);
    for record in summary.history.iter() {
        assert_eq!(record.num_fit_clients, 3);
        assert_eq!(record.num_fit_failures, 0);
        assert_eq!(record.num_evaluate_clients, 3);
        assert_eq!(record.num_evaluate_failures, 0);
        assert_eq!(record.aggregated_fit_metrics["train_loss"], 2.);
        let metrics = record.aggregated_evaluate_metrics.as_ref().unwrap();
        assert_eq!(metrics["loss"], 2.);
        assert_eq!(metrics["accuracy"], 2.);
    }
    assert_eq!(summary.last_evaluate_metrics().unwrap()["loss"], 2.);
}

#[tokio::test]
async fn test_weighted_global_model() {
    let clients = clients(vec![
        Script::succeed(10, &[1., 0.]),
        Script::succeed(30, &[3., 4.]),
    ]);
    let (state_machine, _events) = StateMachineBuilder::new()
        .with_clients(clients)
        .with_global_model(vector(&[0., 0.]))
        .with_num_rounds(1)
        .build();
    let summary = state_machine.run().await.unwrap();
    assert_eq!(*summary.global_model, vector(&[2.5, 3.]));
}

#[tokio::test]
async fn test_failed_rounds_keep_the_global_model() {
    let clients = clients(vec![Script::Fail, Script::Fail]);
    let (state_machine, events) = StateMachineBuilder::new()
        .with_clients(clients)
        .with_num_rounds(2)
        .build();
    let initial = events.model_listener().get_latest().event;

    let summary = state_machine.run().await.unwrap();
    assert!(Arc::ptr_eq(&summary.global_model, &initial));
    assert_eq!(summary.history.len(), 2);
    assert_eq!(summary.num_failed_rounds(), 2);
    for record in summary.history.iter() {
        assert_eq!(record.num_fit_clients, 2);
        assert_eq!(record.num_fit_failures, 2);
        assert_eq!(
            record.fit_error.as_deref(),
            Some("aggregation failed: no usable fit results")
        );
        // evaluation is skipped after a failed aggregation
        assert_eq!(record.num_evaluate_clients, 0);
        assert!(record.aggregated_evaluate_metrics.is_none());
    }
    assert!(summary.last_evaluate_metrics().is_none());
}

#[tokio::test]
async fn test_round_without_clients_fails() {
    let (state_machine, _events) = StateMachineBuilder::new()
        .with_clients(ClientManager::new(0))
        .with_num_rounds(1)
        .build();
    let summary = state_machine.run().await.unwrap();
    assert_eq!(summary.history.len(), 1);
    assert_eq!(
        summary.history[0].fit_error.as_deref(),
        Some("no clients available")
    );
    assert_eq!(summary.history[0].num_fit_clients, 0);
}

#[tokio::test(start_paused = true)]
async fn test_slow_clients_time_out() {
    let clients = clients(vec![
        Script::succeed(10, &[1.]),
        Script::Sleep(Duration::from_secs(60)),
    ]);
    let (state_machine, _events) = StateMachineBuilder::new()
        .with_clients(clients)
        .with_num_rounds(1)
        .with_fit_timeout(Duration::from_secs(10))
        .with_evaluate_timeout(Duration::from_secs(5))
        .build();
    let summary = state_machine.run().await.unwrap();

    assert_eq!(*summary.global_model, vector(&[1.]));
    let record = &summary.history[0];
    assert_eq!(record.num_fit_failures, 1);
    assert_eq!(record.num_evaluate_failures, 1);
    assert_eq!(
        record.aggregated_evaluate_metrics.as_ref().unwrap()["loss"],
        1.
    );
}

#[tokio::test(start_paused = true)]
async fn test_clients_within_the_deadline_are_aggregated() {
    let clients = clients(vec![
        Script::succeed(1000, &[0.]),
        Script::Sleep(Duration::from_secs(5)),
    ]);
    let (state_machine, _events) = StateMachineBuilder::new()
        .with_clients(clients)
        .with_num_rounds(1)
        .build();
    let summary = state_machine.run().await.unwrap();

    assert_eq!(*summary.global_model, vector(&[50.]));
    assert_eq!(summary.history[0].num_fit_failures, 0);
}

#[tokio::test]
async fn test_crashed_client_is_a_failure() {
    let clients = clients(vec![Script::succeed(10, &[2.]), Script::Panic]);
    let (state_machine, _events) = StateMachineBuilder::new()
        .with_clients(clients)
        .with_num_rounds(1)
        .build();
    let summary = state_machine.run().await.unwrap();

    assert_eq!(*summary.global_model, vector(&[2.]));
    let record = &summary.history[0];
    assert!(!record.failed());
    assert_eq!(record.num_fit_failures, 1);
    assert_eq!(record.num_evaluate_failures, 1);
}

#[tokio::test]
async fn test_misshaped_updates_are_rejected() {
    let clients = clients(vec![
        Script::succeed(10, &[4.]),
        Script::succeed(10, &[1., 2.]),
    ]);
    let (state_machine, _events) = StateMachineBuilder::new()
        .with_clients(clients)
        .with_num_rounds(1)
        .build();
    let summary = state_machine.run().await.unwrap();

    assert_eq!(*summary.global_model, vector(&[4.]));
    assert_eq!(summary.history[0].num_fit_failures, 1);
}

#[tokio::test]
async fn test_misshaped_first_update_does_not_change_the_global_shapes() {
    let clients = clients(vec![
        Script::succeed(10, &[1., 2.]),
        Script::succeed(10, &[4.]),
        Script::succeed(10, &[6.]),
    ]);
    let (state_machine, _events) = StateMachineBuilder::new()
        .with_clients(clients)
        .with_num_rounds(2)
        .build();
    let summary = state_machine.run().await.unwrap();

    assert_eq!(*summary.global_model, vector(&[5.]));
    assert_eq!(summary.num_failed_rounds(), 0);
    for record in summary.history.iter() {
        assert_eq!(record.num_fit_failures, 1);
    }
}

#[tokio::test]
async fn test_evaluation_disabled() {
    let strategy = FedAvg {
        fraction_evaluate: 0.,
        ..full_participation()
    };
    let (state_machine, _events) = StateMachineBuilder::new()
        .with_strategy(strategy)
        .with_num_rounds(2)
        .build();
    let summary = state_machine.run().await.unwrap();

    assert_eq!(summary.num_failed_rounds(), 0);
    for record in summary.history.iter() {
        assert_eq!(record.num_evaluate_clients, 0);
        assert!(record.aggregated_evaluate_metrics.is_none());
    }
}

#[tokio::test]
async fn test_evaluation_failures_do_not_fail_the_round() {
    let clients = (0..3)
        .map(|id| ScriptedClient::new(id, Script::succeed(10, &[1.])).with_evaluate(Script::Fail))
        .collect::<ClientManager>();
    let (state_machine, _events) = StateMachineBuilder::new()
        .with_clients(clients)
        .with_num_rounds(1)
        .build();
    let summary = state_machine.run().await.unwrap();

    let record = &summary.history[0];
    assert!(!record.failed());
    assert_eq!(record.num_evaluate_clients, 3);
    assert_eq!(record.num_evaluate_failures, 3);
    assert!(record.aggregated_evaluate_metrics.is_none());
    assert_eq!(*summary.global_model, vector(&[1.]));
}

#[tokio::test]
async fn test_zero_rounds() {
    let (state_machine, _events) = StateMachineBuilder::new().with_num_rounds(0).build();
    assert!(state_machine.is_idle());
    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_terminated());

    let summary = state_machine.run().await.unwrap();
    assert!(summary.history.is_empty());
    assert_eq!(*summary.global_model, vector(&[0.]));
}

#[tokio::test]
async fn test_terminated_is_final() {
    let (state_machine, events) = StateMachineBuilder::new().with_num_rounds(0).build();
    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_terminated());

    assert!(state_machine.next().await.is_none());
    assert_eq!(events.phase_listener().get_latest().event, PhaseName::Terminated);
}

#[tokio::test]
async fn test_phase_sequence() {
    let (state_machine, events) = StateMachineBuilder::new().with_num_rounds(1).build();
    let phases = events.phase_listener();
    assert!(state_machine.is_idle());

    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_selecting());
    assert_eq!(phases.get_latest().event, PhaseName::Idle);
    assert_eq!(phases.get_latest().round_id, 0);

    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_fitting());
    assert_eq!(phases.get_latest().event, PhaseName::Selecting);
    assert_eq!(phases.get_latest().round_id, 1);

    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_aggregating());
    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_evaluating());
    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_round_complete());

    let state = state_machine.into_round_complete_phase_state();
    assert_eq!(state.shared.state.current.round, 1);
    assert!(state.shared.state.history.is_empty());

    let state_machine = state.run_phase().await.unwrap();
    assert!(state_machine.is_terminated());
    let state = state_machine.into_terminated_phase_state();
    assert_eq!(state.shared.state.history.len(), 1);

    let summary = state.finish().await;
    assert_eq!(summary.history[0].round, 1);
    assert_eq!(phases.get_latest().event, PhaseName::Terminated);
}

#[tokio::test]
async fn test_phase_sequence_of_a_failed_round() {
    let clients = clients(vec![Script::Fail]);
    let (state_machine, _events) = StateMachineBuilder::new()
        .with_clients(clients)
        .with_num_rounds(2)
        .build();

    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_selecting());
    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_fitting());
    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_aggregating());
    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_failure());
    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_round_complete());
    let state_machine = state_machine.next().await.unwrap();
    assert!(state_machine.is_selecting());
}

#[tokio::test]
async fn test_events() {
    let (state_machine, events) = StateMachineBuilder::new().with_num_rounds(2).build();
    let mut records = events.record_listener();
    let models = events.model_listener();

    let run = tokio::spawn(state_machine.run());
    let mut completed = Vec::new();
    while let Some(event) = records.changed().await {
        if let Some(record) = event.event {
            assert_eq!(event.round_id, record.round);
            completed.push(record.round);
        }
    }
    let summary = run.await.unwrap().unwrap();

    // the listener may skip intermediate values, but never the last one
    assert_eq!(completed.last(), Some(&2));
    let latest = models.get_latest();
    assert_eq!(latest.round_id, 2);
    assert!(Arc::ptr_eq(&latest.event, &summary.global_model));
    assert_eq!(events.phase_listener().get_latest().event, PhaseName::Terminated);
}

#[tokio::test]
async fn test_initializer() {
    let clients = clients(vec![Script::succeed(10, &[1.])]);
    let (state_machine, events) = StateMachineInitializer::new(
        utils::fl_settings(),
        Arc::new(full_participation()),
        clients,
        vector(&[0.]),
    )
    .init()
    .unwrap();
    assert!(state_machine.is_idle());
    assert_eq!(events.phase_listener().get_latest().event, PhaseName::Idle);

    let summary = state_machine.run().await.unwrap();
    assert_eq!(summary.history.len(), 3);
}

#[test]
fn test_initializer_errors() {
    let no_clients = StateMachineInitializer::new(
        utils::fl_settings(),
        Arc::new(full_participation()),
        ClientManager::new(0),
        vector(&[0.]),
    )
    .init();
    assert!(matches!(
        no_clients,
        Err(StateMachineInitializationError::NoClients)
    ));

    let empty_model = StateMachineInitializer::new(
        utils::fl_settings(),
        Arc::new(full_participation()),
        clients(vec![Script::Fail]),
        Parameters::default(),
    )
    .init();
    assert!(matches!(
        empty_model,
        Err(StateMachineInitializationError::EmptyModel)
    ));
}
