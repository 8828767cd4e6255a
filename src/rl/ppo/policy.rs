//! Policy/value model interface and the reference network for the on-policy agent

use burn::module::Module;
use burn::nn::{LayerNorm, LayerNormConfig, Linear, LinearConfig, Relu};
use burn::prelude::*;
use burn::tensor::activation::log_softmax;

use crate::rl::observation::{ObservationShape, ObservationTensors};

/// A model producing action logits and a state value for each observation
pub trait PolicyValueModel<B: Backend>: Module<B> {
    /// Returns logits `[batch, num_actions]` and values `[batch]`
    fn forward(&self, obs: ObservationTensors<B>) -> (Tensor<B, 2>, Tensor<B, 1>);
}

/// Configuration for [`PolicyValueNet`]
#[derive(Config, Debug)]
pub struct PolicyValueNetConfig {
    /// Hidden layer size for both heads
    #[config(default = 256)]
    pub hidden_size: usize,
}

/// Separate policy and value heads over the flattened observation
#[derive(Module, Debug)]
pub struct PolicyValueNet<B: Backend> {
    policy_input: Linear<B>,
    policy_norm: LayerNorm<B>,
    policy_output: Linear<B>,
    value_input: Linear<B>,
    value_norm: LayerNorm<B>,
    value_output: Linear<B>,
    activation: Relu,
}

impl<B: Backend> PolicyValueNet<B> {
    pub fn new(
        device: &B::Device,
        shape: ObservationShape,
        num_actions: usize,
        config: &PolicyValueNetConfig,
    ) -> Self {
        let input_size = shape.flat_len();
        let hidden = config.hidden_size;

        Self {
            policy_input: LinearConfig::new(input_size, hidden).init(device),
            policy_norm: LayerNormConfig::new(hidden).init(device),
            policy_output: LinearConfig::new(hidden, num_actions).init(device),
            value_input: LinearConfig::new(input_size, hidden).init(device),
            value_norm: LayerNormConfig::new(hidden).init(device),
            value_output: LinearConfig::new(hidden, 1).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> PolicyValueModel<B> for PolicyValueNet<B> {
    fn forward(&self, obs: ObservationTensors<B>) -> (Tensor<B, 2>, Tensor<B, 1>) {
        let x = obs.flatten();

        let policy = self
            .activation
            .forward(self.policy_norm.forward(self.policy_input.forward(x.clone())));
        let logits = self.policy_output.forward(policy);

        let value = self
            .activation
            .forward(self.value_norm.forward(self.value_input.forward(x)));
        let value = self.value_output.forward(value).squeeze(1);

        (logits, value)
    }
}

/// Log-probability of `actions` and entropy of the categorical distribution
/// defined by `logits`
pub fn evaluate_actions<B: Backend>(
    logits: Tensor<B, 2>,
    actions: Tensor<B, 1, Int>,
) -> (Tensor<B, 1>, Tensor<B, 1>) {
    let log_probs = log_softmax(logits, 1);
    let probs = log_probs.clone().exp();

    let batch_size = actions.dims()[0];
    let action_log_prob = log_probs
        .clone()
        .gather(1, actions.reshape([batch_size, 1]))
        .squeeze(1);

    // Entropy: -sum(p * log(p))
    let entropy = -(probs * log_probs).sum_dim(1).squeeze(1);

    (action_log_prob, entropy)
}

/// PPO clipped surrogate policy loss: `-mean(min(r * A, clip(r) * A))`
pub fn clipped_surrogate_loss<B: Backend>(
    ratio: Tensor<B, 1>,
    advantages: Tensor<B, 1>,
    clip_epsilon: f32,
) -> Tensor<B, 1> {
    let clipped_ratio = ratio.clone().clamp(1.0 - clip_epsilon, 1.0 + clip_epsilon);

    let surr1 = ratio * advantages.clone();
    let surr2 = clipped_ratio * advantages;
    -surr1.min_pair(surr2).mean()
}

/// Numerically stable log-softmax over a plain slice
pub fn log_softmax_slice(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let log_sum = logits.iter().map(|l| (l - max).exp()).sum::<f32>().ln() + max;
    logits.iter().map(|l| l - log_sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::observation::Observation;
    use crate::rl::tensor;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_policy_value_net_output_shapes() {
        let device = Default::default();
        let shape = ObservationShape::new(5, 3, 3);
        let net = PolicyValueNet::<TestBackend>::new(
            &device,
            shape,
            11,
            &PolicyValueNetConfig::new().with_hidden_size(16),
        );

        let obs = Observation::new(vec![1.0; 25], vec![0.5; 3], vec![0.2; 3]);
        let batch = ObservationTensors::from_observations(&[&obs, &obs], shape, &device).unwrap();
        let (logits, values) = net.forward(batch);

        assert_eq!(logits.dims(), [2, 11]);
        assert_eq!(values.dims(), [2]);
    }

    #[test]
    fn test_surrogate_with_unit_ratio_is_negative_mean_advantage() {
        let device = Default::default();
        let advantages = [1.5, -0.5, 2.0, -3.0];
        let ratio = Tensor::<TestBackend, 1>::ones([4], &device);
        let adv = Tensor::<TestBackend, 1>::from_floats(advantages.as_slice(), &device);

        let loss = tensor::scalar(clipped_surrogate_loss(ratio, adv, 0.2)).unwrap();
        let expected = -advantages.iter().sum::<f32>() / 4.0;
        assert!((loss - expected).abs() < 1e-6);
    }

    #[test]
    fn test_surrogate_clips_large_ratio() {
        let device = Default::default();
        let ratio = Tensor::<TestBackend, 1>::from_floats([2.0].as_slice(), &device);
        let adv = Tensor::<TestBackend, 1>::from_floats([1.0].as_slice(), &device);

        // Positive advantage: gain is capped at 1 + epsilon
        let loss = tensor::scalar(clipped_surrogate_loss(ratio, adv, 0.2)).unwrap();
        assert!((loss + 1.2).abs() < 1e-6);
    }

    #[test]
    fn test_evaluate_actions_uniform_logits() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::zeros([2, 4], &device);
        let actions = tensor::index_tensor::<TestBackend>(&[0, 3], &device);

        let (log_probs, entropy) = evaluate_actions(logits, actions);
        let log_probs = tensor::to_vec(log_probs).unwrap();
        let entropy = tensor::to_vec(entropy).unwrap();

        for lp in log_probs {
            assert!((lp - (0.25f32).ln()).abs() < 1e-5);
        }
        for h in entropy {
            assert!((h - (4.0f32).ln()).abs() < 1e-5);
        }
    }

    #[test]
    fn test_log_softmax_slice_normalizes() {
        let log_probs = log_softmax_slice(&[1.0, 2.0, 3.0]);
        let total: f32 = log_probs.iter().map(|l| l.exp()).sum();
        assert!((total - 1.0).abs() < 1e-6);
        assert!(log_probs[2] > log_probs[0]);
    }
}
