//! In-process clients.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::task;

use crate::{
    client::{
        model::ModelUnit,
        trainer::ClientTrainer,
        ClientError,
        ClientProxy,
        ClientUpdate,
        EvaluateIns,
        EvaluateRes,
        FitIns,
    },
    data::LocalDataset,
    partition::ClientId,
    settings::ClientSettings,
};

/// A client which trains in the same process as the coordinator.
///
/// Every request builds a fresh model from the factory and runs on the blocking thread pool, so a
/// slow client never stalls the coordinator and a panicking client only fails its own request.
pub struct LocalClient<F> {
    id: ClientId,
    factory: Arc<F>,
    train: LocalDataset,
    val: LocalDataset,
    trainer: ClientTrainer,
}

impl<F, M> LocalClient<F>
where
    F: Fn() -> M + Send + Sync + 'static,
    M: ModelUnit,
{
    /// Creates a client from its partition.
    ///
    /// A `val_fraction` of the partition is held out for evaluation. The split and the batch
    /// shuffling are seeded per client.
    pub fn new(
        id: ClientId,
        dataset: LocalDataset,
        factory: Arc<F>,
        settings: &ClientSettings,
    ) -> Self {
        let seed = settings.seed.wrapping_add(id as u64);
        let (train, val) = dataset.train_test_split(settings.val_fraction, seed);
        Self {
            id,
            factory,
            train,
            val,
            trainer: ClientTrainer::new(settings.batch_size, seed),
        }
    }

    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    pub fn val_len(&self) -> usize {
        self.val.len()
    }
}

#[async_trait]
impl<F, M> ClientProxy for LocalClient<F>
where
    F: Fn() -> M + Send + Sync + 'static,
    M: ModelUnit,
{
    fn id(&self) -> ClientId {
        self.id
    }

    /// Trains on the blocking pool. A fit whose request times out keeps running there until it
    /// finishes; its result is discarded.
    async fn fit(&self, ins: FitIns) -> Result<ClientUpdate, ClientError> {
        let id = self.id;
        let factory = self.factory.clone();
        let train = self.train.clone();
        let trainer = self.trainer;
        task::spawn_blocking(move || {
            let mut model = factory();
            trainer.fit(&mut model, id, &ins.parameters, &train, &ins.config)
        })
        .await
        .map_err(|err| ClientError::Crashed(err.to_string()))?
    }

    async fn evaluate(&self, ins: EvaluateIns) -> Result<EvaluateRes, ClientError> {
        let id = self.id;
        let factory = self.factory.clone();
        let val = self.val.clone();
        let trainer = self.trainer;
        task::spawn_blocking(move || {
            let mut model = factory();
            trainer.evaluate(&mut model, id, &ins.parameters, &val)
        })
        .await
        .map_err(|err| ClientError::Crashed(err.to_string()))?
    }
}
