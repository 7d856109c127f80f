//! Multinomial logistic regression trained with plain SGD.

use crate::{
    client::model::{ModelError, ModelUnit, TrainOptions},
    data::{Batch, Example, LocalDataset},
    model::{Metrics, Parameters, ShapeError, Tensor},
};

/// A linear classifier with a `[num_classes, num_features]` weight tensor and a `[num_classes]`
/// bias tensor.
#[derive(Debug, Clone)]
pub struct SoftmaxRegression {
    weights: Tensor,
    bias: Tensor,
    num_features: usize,
    num_classes: usize,
}

impl SoftmaxRegression {
    /// Creates a zero-initialized model.
    pub fn new(num_features: usize, num_classes: usize) -> Self {
        Self {
            weights: Tensor::zeros(vec![num_classes, num_features]),
            bias: Tensor::zeros(vec![num_classes]),
            num_features,
            num_classes,
        }
    }

    fn check(&self, example: &Example) -> Result<(), ModelError> {
        if example.features.len() != self.num_features {
            return Err(ModelError::Features {
                expected: self.num_features,
                actual: example.features.len(),
            });
        }
        if example.label >= self.num_classes {
            return Err(ModelError::Label(example.label));
        }
        Ok(())
    }

    /// Computes the class probabilities of an example.
    fn probabilities(&self, features: &[f32]) -> Vec<f64> {
        let w = self.weights.data();
        let b = self.bias.data();
        let logits = (0..self.num_classes)
            .map(|c| {
                let row = &w[c * self.num_features..(c + 1) * self.num_features];
                row.iter()
                    .zip(features)
                    .map(|(w, x)| f64::from(*w) * f64::from(*x))
                    .sum::<f64>()
                    + f64::from(b[c])
            })
            .collect::<Vec<_>>();
        let max = logits.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let exp = logits.iter().map(|l| (l - max).exp()).collect::<Vec<_>>();
        let total = exp.iter().sum::<f64>();
        exp.into_iter().map(|e| e / total).collect()
    }

    fn cross_entropy(probabilities: &[f64], label: usize) -> f64 {
        -probabilities[label].max(f64::MIN_POSITIVE).ln()
    }

    fn step(&mut self, batch: &[&Example], options: &TrainOptions<'_>) -> Result<f64, ModelError> {
        let mut grad_w = vec![0_f64; self.weights.len()];
        let mut grad_b = vec![0_f64; self.bias.len()];
        let mut loss = 0_f64;

        for example in batch {
            self.check(example)?;
            let probs = self.probabilities(&example.features);
            loss += Self::cross_entropy(&probs, example.label);
            for (c, p) in probs.iter().enumerate() {
                let delta = p - if c == example.label { 1. } else { 0. };
                grad_b[c] += delta;
                let row = &mut grad_w[c * self.num_features..(c + 1) * self.num_features];
                for (g, x) in row.iter_mut().zip(&example.features) {
                    *g += delta * f64::from(*x);
                }
            }
        }

        let n = batch.len().max(1) as f64;
        loss /= n;
        grad_w.iter_mut().chain(grad_b.iter_mut()).for_each(|g| *g /= n);

        if let Some(proximal) = options.proximal {
            let current = self.get_parameters();
            loss += proximal.mu / 2. * current.squared_distance(proximal.anchor)?;
            let anchor = proximal.anchor.iter().collect::<Vec<_>>();
            for (g, (w, a)) in grad_w
                .iter_mut()
                .zip(self.weights.data().iter().zip(anchor[0].data()))
            {
                *g += proximal.mu * (f64::from(*w) - f64::from(*a));
            }
            for (g, (b, a)) in grad_b
                .iter_mut()
                .zip(self.bias.data().iter().zip(anchor[1].data()))
            {
                *g += proximal.mu * (f64::from(*b) - f64::from(*a));
            }
        }

        let lr = options.learning_rate;
        for (w, g) in self.weights.data_mut().iter_mut().zip(&grad_w) {
            *w -= (lr * g) as f32;
        }
        for (b, g) in self.bias.data_mut().iter_mut().zip(&grad_b) {
            *b -= (lr * g) as f32;
        }
        Ok(loss)
    }
}

impl ModelUnit for SoftmaxRegression {
    fn get_parameters(&self) -> Parameters {
        vec![self.weights.clone(), self.bias.clone()].into()
    }

    fn set_parameters(&mut self, parameters: &Parameters) -> Result<(), ModelError> {
        if !parameters.has_same_shapes(&self.get_parameters()) {
            return Err(ShapeError::Mismatch.into());
        }
        if let [weights, bias] = parameters.iter().collect::<Vec<_>>().as_slice() {
            self.weights = (*weights).clone();
            self.bias = (*bias).clone();
        }
        Ok(())
    }

    fn train_one_pass(
        &mut self,
        batches: &[Batch<'_>],
        options: &TrainOptions<'_>,
    ) -> Result<f64, ModelError> {
        let mut total = 0_f64;
        for batch in batches {
            total += self.step(batch, options)?;
        }
        Ok(total / batches.len().max(1) as f64)
    }

    fn evaluate(&self, dataset: &LocalDataset) -> Result<(f64, Metrics), ModelError> {
        let mut loss = 0_f64;
        let mut correct = 0_usize;
        for example in dataset.iter() {
            self.check(example)?;
            let probs = self.probabilities(&example.features);
            loss += Self::cross_entropy(&probs, example.label);
            let predicted = probs
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |best, (c, &p)| {
                    if p > best.1 {
                        (c, p)
                    } else {
                        best
                    }
                })
                .0;
            if predicted == example.label {
                correct += 1;
            }
        }
        let n = dataset.len().max(1) as f64;
        let mut metrics = Metrics::new();
        metrics.insert("accuracy".into(), correct as f64 / n);
        Ok((loss / n, metrics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        client::model::Proximal,
        data::{Dataset, Example},
    };

    fn separable() -> LocalDataset {
        let examples = (0..60)
            .map(|i| {
                let label = i % 3;
                let mut features = vec![0_f32; 3];
                features[label] = 1.;
                Example { features, label }
            })
            .collect();
        Dataset::new(examples, 3).unwrap().as_local()
    }

    fn options(learning_rate: f64) -> TrainOptions<'static> {
        TrainOptions {
            learning_rate,
            proximal: None,
        }
    }

    #[test]
    fn test_training_reduces_loss() {
        let data = separable();
        let mut model = SoftmaxRegression::new(3, 3);
        let (initial_loss, _) = model.evaluate(&data).unwrap();
        assert!((initial_loss - 3_f64.ln()).abs() < 1e-9);

        let batches = data.batches(10, true);
        for _ in 0..20 {
            model.train_one_pass(&batches, &options(0.5)).unwrap();
        }
        let (loss, metrics) = model.evaluate(&data).unwrap();
        assert!(loss < initial_loss);
        assert_eq!(metrics["accuracy"], 1.);
    }

    #[test]
    fn test_evaluate_does_not_change_parameters() {
        let data = separable();
        let model = SoftmaxRegression::new(3, 3);
        let before = model.get_parameters();
        model.evaluate(&data).unwrap();
        assert_eq!(before, model.get_parameters());
    }

    #[test]
    fn test_proximal_term_bounds_drift() {
        let data = separable();
        let batches = data.batches(10, true);
        let anchor = SoftmaxRegression::new(3, 3).get_parameters();

        let mut plain = SoftmaxRegression::new(3, 3);
        let mut proximal = SoftmaxRegression::new(3, 3);
        let prox_options = TrainOptions {
            learning_rate: 0.5,
            proximal: Some(Proximal {
                mu: 1.,
                anchor: &anchor,
            }),
        };
        for _ in 0..20 {
            plain.train_one_pass(&batches, &options(0.5)).unwrap();
            proximal.train_one_pass(&batches, &prox_options).unwrap();
        }

        let plain_drift = plain.get_parameters().squared_distance(&anchor).unwrap();
        let proximal_drift = proximal.get_parameters().squared_distance(&anchor).unwrap();
        assert!(proximal_drift < plain_drift);
    }

    #[test]
    fn test_set_parameters_checks_shapes() {
        let mut model = SoftmaxRegression::new(3, 3);
        let wrong = SoftmaxRegression::new(2, 3).get_parameters();
        assert!(model.set_parameters(&wrong).is_err());

        let right = SoftmaxRegression::new(3, 3).get_parameters();
        assert!(model.set_parameters(&right).is_ok());
    }

    #[test]
    fn test_rejects_wrong_features() {
        let mut model = SoftmaxRegression::new(2, 3);
        let data = separable();
        let batches = data.batches(10, true);
        assert_eq!(
            model.train_one_pass(&batches, &options(0.1)).unwrap_err(),
            ModelError::Features {
                expected: 2,
                actual: 3
            }
        );
    }
}
