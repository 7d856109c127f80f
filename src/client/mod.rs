//! Simulated clients.
//!
//! A client owns one partition of the dataset and answers the fit and evaluate requests of the
//! coordinator. The coordinator only talks to clients through the [`ClientProxy`] trait, so that
//! in-process clients and test doubles are interchangeable.

pub mod local;
pub mod manager;
pub mod model;
pub mod softmax;
pub mod trainer;

use std::time::Duration;

use async_trait::async_trait;
use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

pub use self::{
    local::LocalClient,
    manager::{ClientManager, Purpose},
    model::{ModelError, ModelUnit, Proximal, TrainOptions},
    softmax::SoftmaxRegression,
    trainer::ClientTrainer,
};
use crate::{
    model::{GlobalModel, Metrics, Parameters},
    partition::ClientId,
};

/// Errors which can occur while a client handles a request.
#[derive(Debug, Display, Error, Clone, PartialEq)]
pub enum ClientError {
    /// Local training failed: {0}.
    Training(String),
    /// The local dataset has no usable examples.
    EmptyDataset,
    /// The model rejected the request: {0}.
    Model(#[from] ModelError),
    /// The client did not respond within {0:?}.
    Timeout(Duration),
    /// The client crashed: {0}.
    Crashed(String),
}

/// The per-client configuration of a fit request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FitConfig {
    /// The round the request belongs to.
    pub round: u64,
    pub local_epochs: usize,
    pub learning_rate: f64,
    /// The strength of the proximal term, `0` disables it.
    pub proximal_mu: f64,
}

/// A fit request.
#[derive(Debug, Clone)]
pub struct FitIns {
    pub parameters: GlobalModel,
    pub config: FitConfig,
}

/// An evaluate request.
#[derive(Debug, Clone)]
pub struct EvaluateIns {
    pub parameters: GlobalModel,
    pub round: u64,
}

/// The result of a successful local fit.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientUpdate {
    pub client_id: ClientId,
    /// The locally trained parameters.
    pub parameters: Parameters,
    /// The number of examples consumed by one local training pass.
    pub num_examples: usize,
    pub metrics: Metrics,
}

/// The result of a successful local evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluateRes {
    pub client_id: ClientId,
    pub loss: f64,
    pub num_examples: usize,
    pub metrics: Metrics,
}

/// The coordinator's handle on a client.
#[async_trait]
pub trait ClientProxy: Send + Sync {
    /// Gets the id of the client.
    fn id(&self) -> ClientId;

    /// Trains the given global parameters on the local data of the client.
    async fn fit(&self, ins: FitIns) -> Result<ClientUpdate, ClientError>;

    /// Evaluates the given global parameters on the local data of the client.
    async fn evaluate(&self, ins: EvaluateIns) -> Result<EvaluateRes, ClientError>;
}
