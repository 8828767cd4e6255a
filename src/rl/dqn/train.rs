//! Double DQN trainer with prioritized replay and soft target sync

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamW, AdamWConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::exploration::EpsilonGreedy;
use super::qnet::{QValueModel, double_q_targets};
use super::replay::{PrioritizedReplay, Transition};
use crate::error::{self, TrainError};
use crate::rl::observation::{Observation, ObservationShape, ObservationTensors};
use crate::rl::{stats, tensor};

/// DQN hyperparameters
#[derive(Config, Debug)]
pub struct DqnConfig {
    /// Replay memory size
    #[config(default = 100000)]
    pub capacity: usize,
    #[config(default = 128)]
    pub batch_size: usize,
    /// Updates are skipped until memory holds this many transitions
    #[config(default = 128)]
    pub min_batch_size: usize,
    #[config(default = 0.99)]
    pub gamma: f32,
    /// Priority exponent
    #[config(default = 0.6)]
    pub alpha: f32,
    /// Importance-sampling exponent
    #[config(default = 0.4)]
    pub beta: f32,
    /// Added to |TD error| so no priority reaches zero
    #[config(default = 1e-5)]
    pub priority_epsilon: f32,
    /// Soft target update rate
    #[config(default = 0.005)]
    pub tau: f32,
    #[config(default = 5e-4)]
    pub learning_rate: f64,
    #[config(default = 5.0)]
    pub max_grad_norm: f32,
    #[config(default = 1.0)]
    pub epsilon_start: f32,
    #[config(default = 0.01)]
    pub epsilon_min: f32,
    #[config(default = 0.992)]
    pub epsilon_decay: f32,
    /// Subtracted after the multiplicative decay
    #[config(default = 0.0015)]
    pub epsilon_adjustment: f32,
    /// Seed for exploration and replay sampling
    #[config(default = 0)]
    pub seed: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DqnUpdateStats {
    /// Importance-weighted squared TD loss
    pub loss: f32,
    pub mean_td_error: f32,
    /// Mean Q(s, a) of the sampled batch
    pub mean_q: f32,
    /// Exploration rate after this update's decay
    pub epsilon: f32,
}

pub struct DqnTrainer<B, M>
where
    B: AutodiffBackend,
    M: QValueModel<B> + AutodiffModule<B>,
{
    online: M,
    target: M,
    optimizer: OptimizerAdaptor<AdamW, M, B>,
    memory: PrioritizedReplay,
    exploration: EpsilonGreedy,
    shape: ObservationShape,
    num_actions: usize,
    config: DqnConfig,
    device: B::Device,
    rng: StdRng,
    updates: usize,
}

impl<B, M> DqnTrainer<B, M>
where
    B: AutodiffBackend,
    M: QValueModel<B> + AutodiffModule<B>,
{
    /// The target network starts as an exact copy of `model`
    pub fn new(
        model: M,
        shape: ObservationShape,
        num_actions: usize,
        config: DqnConfig,
        device: B::Device,
    ) -> error::Result<Self> {
        let optimizer = AdamWConfig::new()
            .with_grad_clipping(Some(GradientClippingConfig::Norm(config.max_grad_norm)))
            .init();
        let memory = PrioritizedReplay::new(config.capacity, config.alpha, config.priority_epsilon)?;
        let exploration = EpsilonGreedy::new(
            config.epsilon_start,
            config.epsilon_min,
            config.epsilon_decay,
            config.epsilon_adjustment,
        )?;

        Ok(Self {
            target: model.clone(),
            online: model,
            optimizer,
            memory,
            exploration,
            shape,
            num_actions,
            rng: StdRng::seed_from_u64(config.seed),
            config,
            device,
            updates: 0,
        })
    }

    pub fn online(&self) -> &M {
        &self.online
    }

    pub fn target(&self) -> &M {
        &self.target
    }

    pub fn memory(&self) -> &PrioritizedReplay {
        &self.memory
    }

    pub fn config(&self) -> &DqnConfig {
        &self.config
    }

    pub fn epsilon(&self) -> f32 {
        self.exploration.epsilon()
    }

    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Q-values of the online network for one observation
    pub fn q_values(&self, observation: &Observation) -> error::Result<Vec<f32>> {
        let obs = ObservationTensors::<B>::single(observation, self.shape, &self.device)?;
        let q = tensor::to_vec(self.online.forward(obs).detach())?;
        if let Some(&bad) = q.iter().find(|v| !v.is_finite()) {
            return Err(TrainError::TrainingDivergence {
                stage: "dqn q-values",
                loss: bad,
            });
        }
        Ok(q)
    }

    /// Epsilon-greedy action for one observation
    pub fn act(&mut self, observation: &Observation) -> error::Result<usize> {
        let q = self.q_values(observation)?;
        self.exploration.select(&q, &mut self.rng)
    }

    pub fn store(&mut self, transition: Transition) -> error::Result<()> {
        self.shape.validate(&transition.observation)?;
        self.shape.validate(&transition.next_observation)?;
        if transition.action >= self.num_actions {
            return Err(TrainError::invalid_input(format!(
                "action index {} outside [0, {})",
                transition.action, self.num_actions
            )));
        }
        self.memory.insert(transition);
        Ok(())
    }

    /// One prioritized Double-DQN step
    ///
    /// Priorities of the sampled slots are rewritten before the loss is
    /// computed. Non-finite TD errors abort the step before that rewrite, and
    /// any divergence leaves the target network and epsilon untouched.
    pub fn update(&mut self) -> error::Result<Option<DqnUpdateStats>> {
        if self.memory.len() < self.config.min_batch_size {
            tracing::trace!(
                "Skipping DQN update: {} of {} transitions",
                self.memory.len(),
                self.config.min_batch_size
            );
            return Ok(None);
        }

        let batch = self.memory.sample(self.config.batch_size, &mut self.rng)?;
        let weights = stats::importance_weights(&batch.probabilities, self.memory.len(), self.config.beta);
        let batch_size = batch.len();

        let (states, next_states, actions, rewards, dones) = {
            let transitions = batch
                .indices
                .iter()
                .map(|&i| self.memory.get(i))
                .collect::<Option<Vec<&Transition>>>()
                .ok_or_else(|| TrainError::invalid_input("sampled slot is empty"))?;

            let observations: Vec<&Observation> = transitions.iter().map(|t| &t.observation).collect();
            let next_observations: Vec<&Observation> =
                transitions.iter().map(|t| &t.next_observation).collect();
            let actions: Vec<usize> = transitions.iter().map(|t| t.action).collect();
            let rewards: Vec<f32> = transitions.iter().map(|t| t.reward).collect();
            let dones: Vec<f32> = transitions
                .iter()
                .map(|t| if t.done { 1.0 } else { 0.0 })
                .collect();

            (
                ObservationTensors::<B>::from_observations(&observations, self.shape, &self.device)?,
                ObservationTensors::<B>::from_observations(&next_observations, self.shape, &self.device)?,
                tensor::index_tensor::<B>(&actions, &self.device),
                Tensor::<B, 1>::from_floats(rewards.as_slice(), &self.device),
                Tensor::<B, 1>::from_floats(dones.as_slice(), &self.device),
            )
        };

        // Online network picks a*, target network evaluates it
        let online_next_q = self.online.forward(next_states.clone()).detach();
        let target_next_q = self.target.forward(next_states).detach();
        let targets =
            double_q_targets(online_next_q, target_next_q, rewards, dones, self.config.gamma).detach();

        let q_taken = self
            .online
            .forward(states)
            .gather(1, actions.reshape([batch_size, 1]))
            .squeeze(1);

        let q_values = tensor::to_vec(q_taken.clone().detach())?;
        let td_errors = tensor::to_vec((targets.clone() - q_taken.clone().detach()).abs())?;
        if let Some(&bad) = td_errors.iter().find(|td| !td.is_finite()) {
            tracing::warn!("Non-finite TD error {}, priorities left as they were", bad);
            return Err(TrainError::TrainingDivergence {
                stage: "dqn td error",
                loss: bad,
            });
        }
        self.memory.update_priorities(&batch.indices, &td_errors)?;

        // Parameters are unchanged since q_taken was computed, so its graph
        // serves for the loss
        let weights_tensor = Tensor::<B, 1>::from_floats(weights.as_slice(), &self.device);
        let loss = (weights_tensor * (q_taken - targets).powf_scalar(2.0)).mean();
        let loss_value = stats::ensure_finite("dqn loss", tensor::scalar(loss.clone().detach())?)?;

        let grads = GradientsParams::from_grads(loss.backward(), &self.online);
        self.online = self
            .optimizer
            .step(self.config.learning_rate, self.online.clone(), grads);

        self.target.soft_update(&self.online, self.config.tau);
        let epsilon = self.exploration.decay();
        self.updates += 1;

        let update_stats = DqnUpdateStats {
            loss: loss_value,
            mean_td_error: stats::mean(&td_errors),
            mean_q: stats::mean(&q_values),
            epsilon,
        };

        tracing::debug!(
            "DQN update {}: loss={:.4}, td={:.4}, q={:.3}, epsilon={:.3}, memory={}",
            self.updates,
            update_stats.loss,
            update_stats.mean_td_error,
            update_stats.mean_q,
            update_stats.epsilon,
            self.memory.len()
        );

        Ok(Some(update_stats))
    }
}
