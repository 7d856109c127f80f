//! Bounded local optimization.

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::debug;

use crate::{
    client::{
        model::{ModelUnit, Proximal, TrainOptions},
        ClientError,
        ClientUpdate,
        EvaluateRes,
        FitConfig,
    },
    data::LocalDataset,
    model::{Metrics, Parameters},
    partition::ClientId,
};

/// Runs local training and evaluation on a model unit.
///
/// The trainer itself is stateless. Every call starts from the given parameters, so nothing
/// carries over from one round to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientTrainer {
    batch_size: usize,
    seed: u64,
}

impl ClientTrainer {
    /// Creates a trainer. The `seed` drives the per-epoch batch shuffling.
    pub fn new(batch_size: usize, seed: u64) -> Self {
        Self { batch_size, seed }
    }

    /// Trains `global` for `config.local_epochs` passes over `dataset`.
    ///
    /// Batches are reshuffled every epoch and incomplete trailing batches are skipped, so the
    /// reported number of examples is the number of examples in full batches. If
    /// `config.proximal_mu > 0` the local objective is penalized by the distance to `global`.
    ///
    /// # Errors
    /// Fails if the dataset doesn't fill a single batch, if the model rejects the parameters or
    /// the data, or if training diverges.
    pub fn fit<M: ModelUnit>(
        &self,
        model: &mut M,
        client_id: ClientId,
        global: &Parameters,
        dataset: &LocalDataset,
        config: &FitConfig,
    ) -> Result<ClientUpdate, ClientError> {
        if config.local_epochs == 0 {
            return Err(ClientError::Training("zero local epochs".into()));
        }
        model.set_parameters(global)?;

        let mut prng = ChaCha20Rng::seed_from_u64(self.seed);
        prng.set_stream(config.round);
        let options = TrainOptions {
            learning_rate: config.learning_rate,
            proximal: if config.proximal_mu > 0. {
                Some(Proximal {
                    mu: config.proximal_mu,
                    anchor: global,
                })
            } else {
                None
            },
        };

        let mut num_examples = 0;
        let mut loss = f64::NAN;
        for epoch in 0..config.local_epochs {
            let batches = dataset.shuffled_batches(self.batch_size, true, &mut prng);
            if batches.is_empty() {
                return Err(ClientError::EmptyDataset);
            }
            num_examples = batches.iter().map(Vec::len).sum();
            loss = model.train_one_pass(&batches, &options)?;
            if !loss.is_finite() {
                return Err(ClientError::Training(format!(
                    "non-finite loss in epoch {}",
                    epoch
                )));
            }
            debug!(client_id, epoch, loss, "finished local epoch");
        }

        let parameters = model.get_parameters();
        if !parameters.is_finite() {
            return Err(ClientError::Training("non-finite parameters".into()));
        }

        let mut metrics = Metrics::new();
        metrics.insert("train_loss".into(), loss);
        Ok(ClientUpdate {
            client_id,
            parameters,
            num_examples,
            metrics,
        })
    }

    /// Evaluates `parameters` on the whole `dataset` without training.
    ///
    /// # Errors
    /// Fails if the dataset is empty, if the model rejects the parameters or the data, or if the
    /// loss is not finite.
    pub fn evaluate<M: ModelUnit>(
        &self,
        model: &mut M,
        client_id: ClientId,
        parameters: &Parameters,
        dataset: &LocalDataset,
    ) -> Result<EvaluateRes, ClientError> {
        if dataset.is_empty() {
            return Err(ClientError::EmptyDataset);
        }
        model.set_parameters(parameters)?;
        let (loss, metrics) = model.evaluate(dataset)?;
        if !loss.is_finite() {
            return Err(ClientError::Training("non-finite evaluation loss".into()));
        }
        Ok(EvaluateRes {
            client_id,
            loss,
            num_examples: dataset.len(),
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::SoftmaxRegression,
        data::{Dataset, Example},
        model::tests::vector,
        settings::DatasetSettings,
    };

    fn dataset() -> LocalDataset {
        crate::data::synthetic::generate(&DatasetSettings {
            num_examples: 50,
            num_classes: 2,
            num_features: 4,
            spread: 0.1,
            seed: 0,
        })
        .unwrap()
        .as_local()
    }

    fn config(proximal_mu: f64) -> FitConfig {
        FitConfig {
            round: 1,
            local_epochs: 2,
            learning_rate: 0.1,
            proximal_mu,
        }
    }

    #[test]
    fn test_fit() {
        let trainer = ClientTrainer::new(8, 0);
        let mut model = SoftmaxRegression::new(4, 2);
        let global = model.get_parameters();
        let update = trainer
            .fit(&mut model, 3, &global, &dataset(), &config(0.))
            .unwrap();

        assert_eq!(update.client_id, 3);
        // 50 examples give 6 full batches of 8
        assert_eq!(update.num_examples, 48);
        assert!(update.metrics["train_loss"].is_finite());
        assert!(update.parameters.has_same_shapes(&global));
        assert_ne!(update.parameters, global);
    }

    #[test]
    fn test_fit_is_deterministic() {
        let trainer = ClientTrainer::new(8, 0);
        let global = SoftmaxRegression::new(4, 2).get_parameters();
        let first = trainer
            .fit(&mut SoftmaxRegression::new(4, 2), 0, &global, &dataset(), &config(0.1))
            .unwrap();
        let second = trainer
            .fit(&mut SoftmaxRegression::new(4, 2), 0, &global, &dataset(), &config(0.1))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_fit_starts_from_global() {
        // a model that was trained before must not leak its state into the next fit
        let trainer = ClientTrainer::new(8, 0);
        let global = SoftmaxRegression::new(4, 2).get_parameters();
        let fresh = trainer
            .fit(&mut SoftmaxRegression::new(4, 2), 0, &global, &dataset(), &config(0.))
            .unwrap();

        let mut reused = SoftmaxRegression::new(4, 2);
        trainer
            .fit(&mut reused, 0, &global, &dataset(), &config(0.))
            .unwrap();
        let again = trainer
            .fit(&mut reused, 0, &global, &dataset(), &config(0.))
            .unwrap();
        assert_eq!(fresh, again);
    }

    #[test]
    fn test_fit_empty_dataset() {
        let trainer = ClientTrainer::new(64, 0);
        let mut model = SoftmaxRegression::new(4, 2);
        let global = model.get_parameters();
        assert_eq!(
            trainer
                .fit(&mut model, 0, &global, &dataset(), &config(0.))
                .unwrap_err(),
            ClientError::EmptyDataset
        );
    }

    #[test]
    fn test_fit_diverges() {
        let examples = (0..16)
            .map(|_| Example {
                features: vec![1e30, -1e30],
                label: 0,
            })
            .collect();
        let data = Dataset::new(examples, 2).unwrap().as_local();
        let trainer = ClientTrainer::new(4, 0);
        let mut model = SoftmaxRegression::new(2, 2);
        let global = model.get_parameters();
        let config = FitConfig {
            learning_rate: 1e30,
            ..config(0.)
        };
        assert!(matches!(
            trainer.fit(&mut model, 0, &global, &data, &config),
            Err(ClientError::Training(_))
        ));
    }

    #[test]
    fn test_fit_rejects_shapes() {
        let trainer = ClientTrainer::new(8, 0);
        let mut model = SoftmaxRegression::new(4, 2);
        assert!(matches!(
            trainer.fit(&mut model, 0, &vector(&[1.]), &dataset(), &config(0.)),
            Err(ClientError::Model(_))
        ));
    }

    #[test]
    fn test_evaluate() {
        let trainer = ClientTrainer::new(8, 0);
        let mut model = SoftmaxRegression::new(4, 2);
        let parameters = model.get_parameters();
        let res = trainer
            .evaluate(&mut model, 1, &parameters, &dataset())
            .unwrap();
        assert_eq!(res.num_examples, 50);
        assert!((res.loss - 2_f64.ln()).abs() < 1e-6);
        assert!(res.metrics.contains_key("accuracy"));
        assert_eq!(model.get_parameters(), parameters);
    }
}
