use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::time;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::{
    client::{ClientError, ClientProxy, ClientUpdate, EvaluateIns, EvaluateRes, FitIns},
    model::{tests::vector, Metrics},
    partition::ClientId,
    settings::{FlSettings, StrategyKind},
    strategy::FedAvg,
};

pub fn enable_logging() {
    let _fmt_subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(true)
        .try_init();
}

/// The scripted behavior of a [`ScriptedClient`].
#[derive(Debug, Clone)]
pub enum Script {
    /// Responds with single-tensor parameters made of `values`.
    Succeed {
        num_examples: usize,
        values: Vec<f32>,
    },
    /// Responds with a training error.
    Fail,
    /// Sleeps before it succeeds with `1000` examples and the value `100`.
    Sleep(Duration),
    /// Panics instead of responding.
    Panic,
}

impl Script {
    pub fn succeed(num_examples: usize, values: &[f32]) -> Self {
        Script::Succeed {
            num_examples,
            values: values.to_vec(),
        }
    }

    async fn play(&self) -> Result<(usize, Vec<f32>), ClientError> {
        match self {
            Script::Succeed {
                num_examples,
                values,
            } => Ok((*num_examples, values.clone())),
            Script::Fail => Err(ClientError::Training("scripted failure".into())),
            Script::Sleep(duration) => {
                time::sleep(*duration).await;
                Ok((1000, vec![100.]))
            }
            Script::Panic => panic!("scripted panic"),
        }
    }
}

/// A client that answers with scripted responses.
///
/// A successful fit reports the first value as `train_loss`. A successful evaluation reports the
/// first value as loss and as `accuracy`.
#[derive(Debug, Clone)]
pub struct ScriptedClient {
    id: ClientId,
    fit: Script,
    evaluate: Script,
}

impl ScriptedClient {
    pub fn new(id: ClientId, script: Script) -> Self {
        Self {
            id,
            fit: script.clone(),
            evaluate: script,
        }
    }

    pub fn with_evaluate(mut self, script: Script) -> Self {
        self.evaluate = script;
        self
    }
}

#[async_trait]
impl ClientProxy for ScriptedClient {
    fn id(&self) -> ClientId {
        self.id
    }

    async fn fit(&self, _ins: FitIns) -> Result<ClientUpdate, ClientError> {
        let (num_examples, values) = self.fit.play().await?;
        let mut metrics = Metrics::new();
        metrics.insert("train_loss".into(), f64::from(values[0]));
        Ok(ClientUpdate {
            client_id: self.id,
            parameters: vector(&values),
            num_examples,
            metrics,
        })
    }

    async fn evaluate(&self, _ins: EvaluateIns) -> Result<EvaluateRes, ClientError> {
        let (num_examples, values) = self.evaluate.play().await?;
        let mut metrics = Metrics::new();
        metrics.insert("accuracy".into(), f64::from(values[0]));
        Ok(EvaluateRes {
            client_id: self.id,
            loss: f64::from(values[0]),
            num_examples,
            metrics,
        })
    }
}

pub fn evaluate_ins() -> EvaluateIns {
    EvaluateIns {
        parameters: Arc::new(vector(&[0.])),
        round: 1,
    }
}

pub fn fl_settings() -> FlSettings {
    FlSettings {
        num_rounds: 3,
        fraction_fit: 1.,
        fraction_evaluate: 1.,
        min_fit_clients: 1,
        min_evaluate_clients: 1,
        fit_timeout: 10,
        evaluate_timeout: 10,
        strategy: StrategyKind::FedAvg,
        proximal_mu: 0.,
        selection_seed: 0,
    }
}

/// A strategy which selects all clients for fitting and evaluation.
pub fn full_participation() -> FedAvg {
    FedAvg {
        fraction_fit: 1.,
        fraction_evaluate: 1.,
        min_fit_clients: 1,
        min_evaluate_clients: 1,
        local_epochs: 1,
        learning_rate: 0.1,
    }
}
