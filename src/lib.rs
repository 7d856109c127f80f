//! `fedsim` simulates federated learning on a single machine.
//!
//! A synthetic classification dataset is dealt to a population of simulated clients in
//! label-sorted shards, so that every client only sees a few classes. A coordinator then runs a
//! fixed number of rounds. In every round it samples clients, lets them train the current global
//! model on their local data and folds their updates into the next global model with an
//! aggregation strategy.
//!
//! # Modules
//!
//! - [`data`] and [`partition`]: the dataset and its non-IID assignment to clients.
//! - [`client`]: the local model, the local training loop and the clients themselves.
//! - [`strategy`]: client selection and aggregation, i.e. [`FedAvg`] and [`FedProx`].
//! - [`state_machine`]: the round orchestration.
//! - [`simulation`]: the wiring of a complete run from [`Settings`].
//!
//! [`FedAvg`]: strategy::FedAvg
//! [`FedProx`]: strategy::FedProx
//! [`Settings`]: settings::Settings

pub mod client;
pub mod data;
pub mod model;
pub mod partition;
pub mod settings;
pub mod simulation;
pub mod state_machine;
pub mod strategy;
