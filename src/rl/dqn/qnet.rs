//! Action-value model interface, dueling reference network and the
//! double-estimation TD target

use burn::module::{Module, Param};
use burn::nn::{Linear, LinearConfig, Relu};
use burn::prelude::*;

use crate::rl::observation::{ObservationShape, ObservationTensors};

/// A model producing one value per action
pub trait QValueModel<B: Backend>: Module<B> {
    /// Returns Q-values `[batch, num_actions]`
    fn forward(&self, obs: ObservationTensors<B>) -> Tensor<B, 2>;

    /// Blend parameters toward `online`
    ///
    /// θ′ ← τθ + (1 − τ)θ′
    fn soft_update(&mut self, online: &Self, tau: f32);
}

#[derive(Config, Debug)]
pub struct DuelingQNetConfig {
    #[config(default = 256)]
    pub hidden_size: usize,
}

/// Two hidden layers feeding separate state-value and advantage streams
#[derive(Module, Debug)]
pub struct DuelingQNet<B: Backend> {
    input: Linear<B>,
    hidden: Linear<B>,
    value: Linear<B>,
    advantage: Linear<B>,
    activation: Relu,
}

impl<B: Backend> DuelingQNet<B> {
    pub fn new(
        device: &B::Device,
        shape: ObservationShape,
        num_actions: usize,
        config: &DuelingQNetConfig,
    ) -> Self {
        let hidden = config.hidden_size;
        Self {
            input: LinearConfig::new(shape.flat_len(), hidden).init(device),
            hidden: LinearConfig::new(hidden, hidden).init(device),
            value: LinearConfig::new(hidden, 1).init(device),
            advantage: LinearConfig::new(hidden, num_actions).init(device),
            activation: Relu::new(),
        }
    }
}

impl<B: Backend> QValueModel<B> for DuelingQNet<B> {
    fn forward(&self, obs: ObservationTensors<B>) -> Tensor<B, 2> {
        let x = self.activation.forward(self.input.forward(obs.flatten()));
        let x = self.activation.forward(self.hidden.forward(x));

        // Q = V + (A - mean(A))
        let value = self.value.forward(x.clone());
        let advantage = self.advantage.forward(x);
        let mean_advantage = advantage.clone().mean_dim(1);
        value + advantage - mean_advantage
    }

    fn soft_update(&mut self, online: &Self, tau: f32) {
        soft_update_linear(&mut self.input, &online.input, tau);
        soft_update_linear(&mut self.hidden, &online.hidden, tau);
        soft_update_linear(&mut self.value, &online.value, tau);
        soft_update_linear(&mut self.advantage, &online.advantage, tau);
    }
}

fn soft_update_param<B: Backend, const D: usize>(
    this: &mut Param<Tensor<B, D>>,
    that: &Param<Tensor<B, D>>,
    tau: f32,
) {
    // Detach so the target never joins the online autodiff graph
    *this = this
        .clone()
        .map(|tensor| tensor * (1.0 - tau) + that.val().detach() * tau);
}

/// Soft-update a linear layer's weight and bias in place
pub fn soft_update_linear<B: Backend>(this: &mut Linear<B>, that: &Linear<B>, tau: f32) {
    soft_update_param(&mut this.weight, &that.weight, tau);

    if let (Some(b1), Some(b2)) = (&mut this.bias, &that.bias) {
        soft_update_param(b1, b2, tau);
    }
}

/// Double-DQN target `r + (1 - done) * gamma * Q_target(s', argmax_a Q_online(s', a))`
pub fn double_q_targets<B: Backend>(
    online_next_q: Tensor<B, 2>,
    target_next_q: Tensor<B, 2>,
    rewards: Tensor<B, 1>,
    dones: Tensor<B, 1>,
    gamma: f32,
) -> Tensor<B, 1> {
    let best_actions = online_next_q.argmax(1);
    let next_values = target_next_q.gather(1, best_actions).squeeze(1);
    let not_done = dones.neg().add_scalar(1.0);
    rewards + not_done * next_values * gamma
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::observation::Observation;
    use crate::rl::tensor;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn q_tensor(rows: [[f32; 3]; 2]) -> Tensor<TestBackend, 2> {
        Tensor::from_floats(rows, &Default::default())
    }

    fn floats(values: [f32; 2]) -> Tensor<TestBackend, 1> {
        Tensor::from_floats(values, &Default::default())
    }

    #[test]
    fn test_identical_models_give_vanilla_max_target() {
        let q = q_tensor([[1.0, 3.0, 2.0], [0.5, -1.0, 0.0]]);
        let targets = double_q_targets(
            q.clone(),
            q,
            floats([1.0, 2.0]),
            floats([0.0, 0.0]),
            0.99,
        );
        let targets = tensor::to_vec(targets).unwrap();
        assert!((targets[0] - (1.0 + 0.99 * 3.0)).abs() < 1e-6);
        assert!((targets[1] - (2.0 + 0.99 * 0.5)).abs() < 1e-6);
    }

    #[test]
    fn test_target_evaluates_online_choice() {
        // Online picks action 1; the target network values it at 0
        let online = q_tensor([[1.0, 3.0, 2.0], [0.0, 0.0, 4.0]]);
        let target = q_tensor([[5.0, 0.0, 1.0], [1.0, 1.0, -2.0]]);
        let targets = double_q_targets(online, target, floats([1.0, 0.5]), floats([0.0, 0.0]), 0.9);
        let targets = tensor::to_vec(targets).unwrap();
        assert!((targets[0] - 1.0).abs() < 1e-6);
        assert!((targets[1] - (0.5 - 0.9 * 2.0)).abs() < 1e-6);
    }

    #[test]
    fn test_terminal_transitions_do_not_bootstrap() {
        let q = q_tensor([[1.0, 3.0, 2.0], [0.5, -1.0, 0.0]]);
        let targets = double_q_targets(q.clone(), q, floats([1.0, 2.0]), floats([1.0, 1.0]), 0.99);
        let targets = tensor::to_vec(targets).unwrap();
        assert!((targets[0] - 1.0).abs() < 1e-6);
        assert!((targets[1] - 2.0).abs() < 1e-6);
    }

    fn forward_values(net: &DuelingQNet<TestBackend>, shape: ObservationShape) -> Vec<f32> {
        let obs = Observation::new(vec![128.0; shape.grid_cells()], vec![0.3; 2], vec![0.7; 2]);
        let batch = ObservationTensors::single(&obs, shape, &Default::default()).unwrap();
        tensor::to_vec(net.forward(batch)).unwrap()
    }

    #[test]
    fn test_soft_update_extremes() {
        let device = Default::default();
        let shape = ObservationShape::new(3, 2, 2);
        let config = DuelingQNetConfig::new().with_hidden_size(8);
        let online = DuelingQNet::<TestBackend>::new(&device, shape, 5, &config);
        let mut target = DuelingQNet::<TestBackend>::new(&device, shape, 5, &config);

        let before = forward_values(&target, shape);
        target.soft_update(&online, 0.0);
        let unchanged = forward_values(&target, shape);
        for (a, b) in before.iter().zip(&unchanged) {
            assert!((a - b).abs() < 1e-6);
        }

        target.soft_update(&online, 1.0);
        let copied = forward_values(&target, shape);
        let expected = forward_values(&online, shape);
        assert_eq!(copied.len(), 5);
        for (a, b) in copied.iter().zip(&expected) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}
