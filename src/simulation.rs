//! Wiring of a complete simulated run.
//!
//! A run generates the dataset, deals its examples to the clients, registers one in-process client
//! per partition and hands everything over to the [`StateMachine`].
//!
//! [`StateMachine`]: crate::state_machine::StateMachine

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::{
    client::{ClientManager, LocalClient, ModelUnit, SoftmaxRegression},
    data::{synthetic, DataError},
    partition::{PartitionError, ShardPartitioner},
    settings::Settings,
    state_machine::{
        coordinator::RunSummary,
        events::EventSubscriber,
        StateMachine,
        StateMachineInitializationError,
        StateMachineInitializer,
    },
    strategy,
};

/// Errors which can occur while setting up a run.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("failed to generate the dataset: {0}")]
    Data(#[from] DataError),
    #[error("failed to partition the dataset: {0}")]
    Partition(#[from] PartitionError),
    #[error("failed to initialize the state machine: {0}")]
    Initialization(#[from] StateMachineInitializationError),
    #[error("the run was aborted")]
    Aborted,
}

/// Sets up a run from the given settings.
///
/// Partitions whose training split can't fill a single batch are not registered as clients, since
/// they could never contribute an example.
///
/// # Errors
/// Fails if the dataset can't be generated or partitioned, or if no client could be set up.
pub fn init(settings: &Settings) -> Result<(StateMachine, EventSubscriber), SimulationError> {
    let dataset = synthetic::generate(&settings.dataset)?;
    info!(
        "generated {} examples with {} features and {} classes",
        dataset.len(),
        dataset.num_features(),
        dataset.num_classes()
    );

    let assignment = ShardPartitioner::from(settings.partition).build(&dataset.labels())?;
    if assignment.dropped_len() > 0 {
        warn!(
            "{} examples are not assigned to any client",
            assignment.dropped_len()
        );
    }

    let num_features = dataset.num_features();
    let num_classes = dataset.num_classes();
    let factory = Arc::new(move || SoftmaxRegression::new(num_features, num_classes));
    let federated = dataset.federate(assignment);

    let mut clients = ClientManager::new(settings.fl.selection_seed);
    for client_id in 0..federated.assignment().num_partitions() {
        let partition = federated.load_partition(client_id)?;
        let client = LocalClient::new(client_id, partition, factory.clone(), &settings.client);
        if client.train_len() < settings.client.batch_size {
            warn!(
                client_id,
                train = client.train_len(),
                "skipping client without a full training batch"
            );
            continue;
        }
        info!(
            client_id,
            train = client.train_len(),
            val = client.val_len(),
            "registering client"
        );
        clients.register(Arc::new(client));
    }

    let strategy = strategy::from_settings(&settings.fl, &settings.client);
    let initial_model = factory().get_parameters();
    let state_machine =
        StateMachineInitializer::new(settings.fl, strategy, clients, initial_model).init()?;
    Ok(state_machine)
}

/// Runs all rounds of a simulation.
///
/// # Errors
/// Fails if the run can't be set up.
pub async fn run(settings: &Settings) -> Result<RunSummary, SimulationError> {
    let (state_machine, _events) = init(settings)?;
    state_machine.run().await.ok_or(SimulationError::Aborted)
}
