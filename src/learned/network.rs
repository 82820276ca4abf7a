//! One-hidden-layer feed-forward regression network.
//!
//! ```text
//! h = ReLU(W₁ x + b₁)
//! ŷ = w₂ · h + b₂
//! ```
//!
//! Trained by mini-batch gradient descent on mean squared error, with the
//! training set reshuffled every epoch. Layers are `nalgebra` dense
//! matrices and vectors.
//!
//! # Reference
//! Glorot & Bengio (2010), "Understanding the difficulty of training deep
//! feedforward neural networks" (weight initialization)

use nalgebra::{DMatrix, DVector};
use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Normal};

use super::features::{FEATURE_COUNT, FeatureVector, TrainingSample};

/// Mini-batch SGD settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainingSettings {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f64,
}

/// Regression network with `FEATURE_COUNT` inputs and one output.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    /// Hidden × input weights.
    w1: DMatrix<f64>,
    b1: DVector<f64>,
    /// Output weights, one per hidden unit.
    w2: DVector<f64>,
    b2: f64,
}

/// Forward-pass intermediates of one sample.
struct Activations {
    input: DVector<f64>,
    pre: DVector<f64>,
    hidden: DVector<f64>,
    output: f64,
}

impl Network {
    /// Xavier-initialized network with `hidden` units.
    pub fn new<R: Rng>(hidden: usize, rng: &mut R) -> Self {
        let hidden = hidden.max(1);
        let input_std = (2.0 / (FEATURE_COUNT + hidden) as f64).sqrt();
        let output_std = (2.0 / (hidden + 1) as f64).sqrt();
        let w1 = match Normal::new(0.0, input_std) {
            Ok(normal) => DMatrix::from_fn(hidden, FEATURE_COUNT, |_, _| normal.sample(&mut *rng)),
            Err(_) => DMatrix::zeros(hidden, FEATURE_COUNT),
        };
        let w2 = match Normal::new(0.0, output_std) {
            Ok(normal) => DVector::from_fn(hidden, |_, _| normal.sample(&mut *rng)),
            Err(_) => DVector::zeros(hidden),
        };
        Self {
            w1,
            b1: DVector::zeros(hidden),
            w2,
            b2: 0.5,
        }
    }

    /// Zero-weight network that always predicts `output`.
    #[cfg(test)]
    pub(crate) fn constant(hidden: usize, output: f64) -> Self {
        let hidden = hidden.max(1);
        Self {
            w1: DMatrix::zeros(hidden, FEATURE_COUNT),
            b1: DVector::zeros(hidden),
            w2: DVector::zeros(hidden),
            b2: output,
        }
    }

    pub fn hidden_size(&self) -> usize {
        self.w2.len()
    }

    /// Predicted output.
    pub fn predict(&self, x: &FeatureVector) -> f64 {
        self.forward(x).output
    }

    fn forward(&self, x: &FeatureVector) -> Activations {
        let input = DVector::from_row_slice(x);
        let pre = &self.w1 * &input + &self.b1;
        let hidden = pre.map(|z| z.max(0.0));
        let output = self.w2.dot(&hidden) + self.b2;
        Activations {
            input,
            pre,
            hidden,
            output,
        }
    }

    /// Mean squared error over `samples` (0 when empty).
    pub fn mse(&self, samples: &[TrainingSample]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples
            .iter()
            .map(|s| (self.predict(&s.features) - s.target).powi(2))
            .sum::<f64>()
            / samples.len() as f64
    }

    /// Trains in place; returns the training MSE after each epoch.
    ///
    /// `should_stop` is polled between epochs.
    pub fn train<R: Rng>(
        &mut self,
        samples: &[TrainingSample],
        settings: TrainingSettings,
        rng: &mut R,
        mut should_stop: impl FnMut() -> bool,
    ) -> Vec<f64> {
        let mut history = Vec::with_capacity(settings.epochs);
        if samples.is_empty() {
            return history;
        }
        let batch_size = settings.batch_size.max(1);
        let mut order: Vec<usize> = (0..samples.len()).collect();

        for _ in 0..settings.epochs {
            if should_stop() {
                break;
            }
            order.shuffle(rng);
            for batch in order.chunks(batch_size) {
                self.step(samples, batch, settings.learning_rate);
            }
            history.push(self.mse(samples));
        }
        history
    }

    fn step(&mut self, samples: &[TrainingSample], batch: &[usize], learning_rate: f64) {
        let hidden = self.hidden_size();
        let mut g_w1 = DMatrix::<f64>::zeros(hidden, FEATURE_COUNT);
        let mut g_b1 = DVector::<f64>::zeros(hidden);
        let mut g_w2 = DVector::<f64>::zeros(hidden);
        let mut g_b2 = 0.0;
        let scale = 2.0 / batch.len() as f64;

        for &i in batch {
            let sample = &samples[i];
            let a = self.forward(&sample.features);
            let d_out = scale * (a.output - sample.target);
            g_b2 += d_out;
            g_w2 += &a.hidden * d_out;
            let relu_grad = a.pre.map(|z| if z > 0.0 { 1.0 } else { 0.0 });
            let d_hidden = self.w2.component_mul(&relu_grad) * d_out;
            g_w1 += &d_hidden * a.input.transpose();
            g_b1 += d_hidden;
        }

        self.b2 -= learning_rate * g_b2;
        self.w2 -= g_w2 * learning_rate;
        self.b1 -= g_b1 * learning_rate;
        self.w1 -= g_w1 * learning_rate;
    }

    /// Σ|W₁| per input feature, normalized to sum to 1.
    pub fn feature_importance(&self) -> FeatureVector {
        let mut importance = [0.0; FEATURE_COUNT];
        for (acc, column) in importance.iter_mut().zip(self.w1.column_iter()) {
            *acc = column.iter().map(|w| w.abs()).sum();
        }
        let total: f64 = importance.iter().sum();
        if total > 0.0 {
            for v in &mut importance {
                *v /= total;
            }
        }
        importance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    fn synthetic(rng: &mut SmallRng, n: usize) -> Vec<TrainingSample> {
        (0..n)
            .map(|_| {
                let features: FeatureVector = std::array::from_fn(|_| rng.random::<f64>());
                let target = 0.2 + 0.5 * features[4] + 0.2 * features[10];
                TrainingSample { features, target }
            })
            .collect()
    }

    #[test]
    fn test_training_reduces_loss() {
        let mut rng = SmallRng::seed_from_u64(42);
        let samples = synthetic(&mut rng, 200);
        let mut net = Network::new(16, &mut rng);
        let before = net.mse(&samples);
        let settings = TrainingSettings {
            epochs: 60,
            batch_size: 16,
            learning_rate: 0.05,
        };
        let history = net.train(&samples, settings, &mut rng, || false);

        assert_eq!(history.len(), 60);
        let after = history[history.len() - 1];
        assert!(after < before);
        assert!(after < 0.01, "final mse {after}");
    }

    #[test]
    fn test_feature_importance_normalized() {
        let mut rng = SmallRng::seed_from_u64(7);
        let net = Network::new(8, &mut rng);
        let importance = net.feature_importance();
        assert!((importance.iter().sum::<f64>() - 1.0).abs() < 1e-9);
        assert!(importance.iter().all(|&v| v >= 0.0));
    }

    #[test]
    fn test_stop_hook_and_empty_input() {
        let mut rng = SmallRng::seed_from_u64(1);
        let samples = synthetic(&mut rng, 20);
        let mut net = Network::new(4, &mut rng);
        let settings = TrainingSettings {
            epochs: 50,
            batch_size: 4,
            learning_rate: 0.01,
        };
        assert!(net.train(&samples, settings, &mut rng, || true).is_empty());
        assert!(net.train(&[], settings, &mut rng, || false).is_empty());
        assert_eq!(net.mse(&[]), 0.0);
    }

    #[test]
    fn test_same_seed_same_network() {
        let a = Network::new(8, &mut SmallRng::seed_from_u64(3));
        let b = Network::new(8, &mut SmallRng::seed_from_u64(3));
        assert_eq!(a, b);
        let x = [0.5; FEATURE_COUNT];
        assert_eq!(a.predict(&x), b.predict(&x));
    }

    #[test]
    fn test_layer_shapes() {
        let net = Network::new(6, &mut SmallRng::seed_from_u64(9));
        assert_eq!(net.w1.shape(), (6, FEATURE_COUNT));
        assert_eq!(net.b1.len(), 6);
        assert_eq!(net.hidden_size(), 6);
        let a = net.forward(&[0.25; FEATURE_COUNT]);
        assert_eq!(a.hidden.len(), 6);
        assert!(a.hidden.iter().all(|&h| h >= 0.0));
        assert_eq!(a.output, net.predict(&[0.25; FEATURE_COUNT]));
    }
}
