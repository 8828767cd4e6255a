//! PPO trainer: categorical acting, GAE and clipped-surrogate updates

use burn::grad_clipping::GradientClippingConfig;
use burn::module::AutodiffModule;
use burn::optim::{AdamW, AdamWConfig, GradientsParams, Optimizer, adaptor::OptimizerAdaptor};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use rand::SeedableRng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use super::policy::{PolicyValueModel, clipped_surrogate_loss, evaluate_actions, log_softmax_slice};
use super::trajectory::{TrajectoryStep, TrajectoryStore};
use crate::error::{self, TrainError};
use crate::rl::observation::{Observation, ObservationShape, ObservationTensors};
use crate::rl::{stats, tensor};

/// PPO hyperparameters
#[derive(Config, Debug)]
pub struct PpoConfig {
    /// Discount factor
    #[config(default = 0.99)]
    pub gamma: f32,
    /// GAE lambda
    #[config(default = 0.95)]
    pub gae_lambda: f32,
    /// PPO clip epsilon
    #[config(default = 0.2)]
    pub clip_epsilon: f32,
    /// Value loss coefficient
    #[config(default = 0.5)]
    pub value_coef: f32,
    /// Entropy bonus coefficient
    #[config(default = 0.01)]
    pub entropy_coef: f32,
    /// Passes over the trajectory per update
    #[config(default = 4)]
    pub epochs: usize,
    #[config(default = 64)]
    pub minibatch_size: usize,
    /// Updates are skipped until the store holds this many steps
    #[config(default = 64)]
    pub min_batch_size: usize,
    #[config(default = 3e-4)]
    pub learning_rate: f64,
    /// Max gradient norm for clipping
    #[config(default = 0.5)]
    pub max_grad_norm: f32,
    /// Seed for action sampling and minibatch shuffling
    #[config(default = 0)]
    pub seed: u64,
}

/// Result of acting on one observation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActOutput {
    pub action: usize,
    pub value: f32,
    pub log_prob: f32,
}

/// Averages over all minibatch steps of one update
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PpoUpdateStats {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
    /// Estimate of KL(old || new) from the probability ratios
    pub approx_kl: f32,
    /// Share of samples whose ratio left the clip range
    pub clip_fraction: f32,
    pub minibatches: usize,
}

pub struct PpoTrainer<B, M>
where
    B: AutodiffBackend,
    M: PolicyValueModel<B> + AutodiffModule<B>,
{
    model: M,
    optimizer: OptimizerAdaptor<AdamW, M, B>,
    store: TrajectoryStore,
    config: PpoConfig,
    device: B::Device,
    rng: StdRng,
    updates: usize,
}

impl<B, M> PpoTrainer<B, M>
where
    B: AutodiffBackend,
    M: PolicyValueModel<B> + AutodiffModule<B>,
{
    pub fn new(
        model: M,
        shape: ObservationShape,
        num_actions: usize,
        config: PpoConfig,
        device: B::Device,
    ) -> error::Result<Self> {
        if config.minibatch_size == 0 {
            return Err(TrainError::invalid_input("minibatch size must be positive"));
        }
        if config.epochs == 0 {
            return Err(TrainError::invalid_input("epochs must be positive"));
        }

        let optimizer = AdamWConfig::new()
            .with_grad_clipping(Some(GradientClippingConfig::Norm(config.max_grad_norm)))
            .init();

        Ok(Self {
            model,
            optimizer,
            store: TrajectoryStore::new(shape, num_actions),
            rng: StdRng::seed_from_u64(config.seed),
            config,
            device,
            updates: 0,
        })
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn config(&self) -> &PpoConfig {
        &self.config
    }

    pub fn trajectory(&self) -> &TrajectoryStore {
        &self.store
    }

    /// Number of completed (non-skipped) updates
    pub fn updates(&self) -> usize {
        self.updates
    }

    /// Sample an action from the current policy
    pub fn act(&mut self, observation: &Observation) -> error::Result<ActOutput> {
        let obs = ObservationTensors::<B>::single(observation, self.store.shape(), &self.device)?;
        let (logits, value) = self.model.forward(obs);

        let value = stats::ensure_finite("ppo value", tensor::scalar(value.detach())?)?;
        let log_probs = log_softmax_slice(&tensor::to_vec(logits.detach())?);
        if let Some(&bad) = log_probs.iter().find(|lp| lp.is_nan()) {
            return Err(TrainError::TrainingDivergence {
                stage: "ppo policy",
                loss: bad,
            });
        }

        let probs: Vec<f32> = log_probs.iter().map(|lp| lp.exp()).collect();
        let dist = WeightedIndex::new(&probs)
            .map_err(|e| TrainError::invalid_input(format!("bad action distribution: {}", e)))?;
        let action = dist.sample(&mut self.rng);

        Ok(ActOutput {
            action,
            value,
            log_prob: log_probs[action],
        })
    }

    pub fn store(&mut self, step: TrajectoryStep) -> error::Result<()> {
        self.store.push(step)
    }

    /// Record the outcome of an action chosen by [`PpoTrainer::act`]
    pub fn record(
        &mut self,
        observation: Observation,
        output: ActOutput,
        reward: f32,
        done: bool,
    ) -> error::Result<()> {
        self.store(TrajectoryStep {
            observation,
            action: output.action,
            reward,
            value: output.value,
            log_prob: output.log_prob,
            done,
        })
    }

    /// Run a PPO update over the stored trajectory
    ///
    /// Returns `Ok(None)` and keeps the data when fewer than `min_batch_size`
    /// steps are stored. Otherwise the store is emptied, whether or not the
    /// update succeeds.
    pub fn update(&mut self) -> error::Result<Option<PpoUpdateStats>> {
        if self.store.len() < self.config.min_batch_size {
            tracing::trace!(
                "Skipping PPO update: {} of {} steps",
                self.store.len(),
                self.config.min_batch_size
            );
            return Ok(None);
        }

        let trajectory = self.store.take();
        let update_stats = self.optimize(&trajectory)?;
        self.updates += 1;

        tracing::debug!(
            "PPO update {} over {} steps: policy_loss={:.4}, value_loss={:.4}, entropy={:.4}, kl={:.4}, clip={:.3}",
            self.updates,
            trajectory.len(),
            update_stats.policy_loss,
            update_stats.value_loss,
            update_stats.entropy,
            update_stats.approx_kl,
            update_stats.clip_fraction
        );

        Ok(Some(update_stats))
    }

    /// Value of the last stored observation, or 0 when that step ended the episode
    fn bootstrap_value(&self, trajectory: &TrajectoryStore) -> error::Result<f32> {
        match trajectory.last() {
            Some(last) if !last.done => {
                let obs =
                    ObservationTensors::<B>::single(&last.observation, trajectory.shape(), &self.device)?;
                let (_, value) = self.model.forward(obs);
                stats::ensure_finite("ppo bootstrap", tensor::scalar(value.detach())?)
            }
            _ => Ok(0.0),
        }
    }

    fn optimize(&mut self, trajectory: &TrajectoryStore) -> error::Result<PpoUpdateStats> {
        let last_value = self.bootstrap_value(trajectory)?;
        let gae = trajectory.compute_returns_and_advantages(
            last_value,
            self.config.gamma,
            self.config.gae_lambda,
        )?;
        let advantages = stats::normalize(&gae.advantages);

        let steps = trajectory.steps();
        let shape = trajectory.shape();
        let clip_epsilon = self.config.clip_epsilon;

        let mut totals = PpoUpdateStats::default();
        let mut indices: Vec<usize> = (0..steps.len()).collect();

        for _ in 0..self.config.epochs {
            indices.shuffle(&mut self.rng);

            for batch_indices in indices.chunks(self.config.minibatch_size) {
                let observations: Vec<&Observation> =
                    batch_indices.iter().map(|&i| &steps[i].observation).collect();
                let actions: Vec<usize> = batch_indices.iter().map(|&i| steps[i].action).collect();
                let old_log_probs: Vec<f32> =
                    batch_indices.iter().map(|&i| steps[i].log_prob).collect();
                let batch_returns: Vec<f32> = batch_indices.iter().map(|&i| gae.returns[i]).collect();
                let batch_advantages: Vec<f32> =
                    batch_indices.iter().map(|&i| advantages[i]).collect();

                let obs_tensor =
                    ObservationTensors::<B>::from_observations(&observations, shape, &self.device)?;
                let actions_tensor = tensor::index_tensor::<B>(&actions, &self.device);
                let old_log_probs_tensor =
                    Tensor::<B, 1>::from_floats(old_log_probs.as_slice(), &self.device);
                let returns_tensor =
                    Tensor::<B, 1>::from_floats(batch_returns.as_slice(), &self.device);
                let advantages_tensor =
                    Tensor::<B, 1>::from_floats(batch_advantages.as_slice(), &self.device);

                let (logits, values) = self.model.forward(obs_tensor);
                let (new_log_probs, entropy) = evaluate_actions(logits, actions_tensor);

                let ratio = (new_log_probs - old_log_probs_tensor).exp();
                let policy_loss =
                    clipped_surrogate_loss(ratio.clone(), advantages_tensor, clip_epsilon);
                let value_loss = (values - returns_tensor).powf_scalar(2.0).mean();
                let entropy_mean = entropy.mean();

                let loss = policy_loss.clone()
                    + value_loss.clone() * self.config.value_coef
                    - entropy_mean.clone() * self.config.entropy_coef;
                stats::ensure_finite("ppo loss", tensor::scalar(loss.clone().detach())?)?;

                let ratios = tensor::to_vec(ratio.detach())?;
                let (approx_kl, clip_fraction) = ratio_diagnostics(&ratios, clip_epsilon);

                let grads = GradientsParams::from_grads(loss.backward(), &self.model);
                self.model = self
                    .optimizer
                    .step(self.config.learning_rate, self.model.clone(), grads);

                totals.policy_loss += tensor::scalar(policy_loss.detach())?;
                totals.value_loss += tensor::scalar(value_loss.detach())?;
                totals.entropy += tensor::scalar(entropy_mean.detach())?;
                totals.approx_kl += approx_kl;
                totals.clip_fraction += clip_fraction;
                totals.minibatches += 1;
            }
        }

        let n = totals.minibatches.max(1) as f32;
        Ok(PpoUpdateStats {
            policy_loss: totals.policy_loss / n,
            value_loss: totals.value_loss / n,
            entropy: totals.entropy / n,
            approx_kl: totals.approx_kl / n,
            clip_fraction: totals.clip_fraction / n,
            minibatches: totals.minibatches,
        })
    }
}

/// Approximate KL `mean((r - 1) - ln r)` and the clipped share of ratios
fn ratio_diagnostics(ratios: &[f32], clip_epsilon: f32) -> (f32, f32) {
    if ratios.is_empty() {
        return (0.0, 0.0);
    }
    let n = ratios.len() as f32;
    let approx_kl = ratios.iter().map(|r| (r - 1.0) - r.ln()).sum::<f32>() / n;
    let clipped = ratios
        .iter()
        .filter(|r| (*r - 1.0).abs() > clip_epsilon)
        .count();
    (approx_kl, clipped as f32 / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rl::ppo::policy::{PolicyValueNet, PolicyValueNetConfig};
    use burn::backend::{Autodiff, NdArray};

    type TestBackend = Autodiff<NdArray>;

    fn shape() -> ObservationShape {
        ObservationShape::new(3, 2, 2)
    }

    fn observation(fill: f32) -> Observation {
        let shape = shape();
        Observation::new(
            vec![fill * 255.0; shape.grid_cells()],
            vec![fill; shape.self_len],
            vec![1.0 - fill; shape.enemy_len],
        )
    }

    fn trainer(config: PpoConfig) -> PpoTrainer<TestBackend, PolicyValueNet<TestBackend>> {
        let device = Default::default();
        let model = PolicyValueNet::new(
            &device,
            shape(),
            4,
            &PolicyValueNetConfig::new().with_hidden_size(8),
        );
        PpoTrainer::new(model, shape(), 4, config, device).unwrap()
    }

    fn fill_store(trainer: &mut PpoTrainer<TestBackend, PolicyValueNet<TestBackend>>, steps: usize) {
        for i in 0..steps {
            let obs = observation((i % 5) as f32 / 5.0);
            let output = trainer.act(&obs).unwrap();
            let reward = if output.action == 0 { 1.0 } else { -0.1 };
            trainer.record(obs, output, reward, i + 1 == steps).unwrap();
        }
    }

    #[test]
    fn test_ppo_config_default() {
        let config = PpoConfig::new();
        assert_eq!(config.epochs, 4);
        assert_eq!(config.minibatch_size, 64);
        assert_eq!(config.min_batch_size, 64);
        assert!((config.clip_epsilon - 0.2).abs() < 1e-6);
        assert!((config.learning_rate - 3e-4).abs() < 1e-12);
    }

    #[test]
    fn test_act_returns_valid_action() {
        let mut trainer = trainer(PpoConfig::new());
        let output = trainer.act(&observation(0.5)).unwrap();
        assert!(output.action < 4);
        assert!(output.log_prob <= 0.0);
        assert!(output.value.is_finite());
    }

    #[test]
    fn test_act_rejects_malformed_observation() {
        let mut trainer = trainer(PpoConfig::new());
        let bad = Observation::new(vec![0.0; 4], vec![0.0; 2], vec![0.0; 2]);
        assert!(matches!(trainer.act(&bad), Err(TrainError::InvalidInput(_))));
    }

    #[test]
    fn test_update_below_threshold_keeps_store() {
        let mut trainer = trainer(PpoConfig::new().with_min_batch_size(8));
        fill_store(&mut trainer, 5);

        assert!(trainer.update().unwrap().is_none());
        assert_eq!(trainer.trajectory().len(), 5);
        assert_eq!(trainer.updates(), 0);
    }

    #[test]
    fn test_update_clears_store_and_reports_stats() {
        let mut trainer = trainer(
            PpoConfig::new()
                .with_min_batch_size(8)
                .with_minibatch_size(4)
                .with_epochs(2),
        );
        fill_store(&mut trainer, 10);

        let stats = trainer.update().unwrap().unwrap();
        assert!(trainer.trajectory().is_empty());
        assert_eq!(trainer.updates(), 1);
        // 10 steps in chunks of 4 -> 3 minibatches per epoch
        assert_eq!(stats.minibatches, 6);
        assert!(stats.policy_loss.is_finite());
        assert!(stats.value_loss >= 0.0);
        assert!(stats.entropy > 0.0);
        assert!((0.0..=1.0).contains(&stats.clip_fraction));
    }

    #[test]
    fn test_store_rejects_out_of_range_action() {
        let mut trainer = trainer(PpoConfig::new());
        let result = trainer.store(TrajectoryStep {
            observation: observation(0.0),
            action: 4,
            reward: 0.0,
            value: 0.0,
            log_prob: 0.0,
            done: false,
        });
        assert!(matches!(result, Err(TrainError::InvalidInput(_))));
    }

    #[test]
    fn test_new_rejects_empty_minibatches() {
        let device = Default::default();
        let model = PolicyValueNet::<TestBackend>::new(
            &device,
            shape(),
            4,
            &PolicyValueNetConfig::new().with_hidden_size(8),
        );
        let result = PpoTrainer::new(
            model.clone(),
            shape(),
            4,
            PpoConfig::new().with_min_batch_size(2).with_minibatch_size(0),
            device.clone(),
        );
        assert!(matches!(result, Err(TrainError::InvalidInput(_))));

        let result = PpoTrainer::new(model, shape(), 4, PpoConfig::new().with_epochs(0), device);
        assert!(matches!(result, Err(TrainError::InvalidInput(_))));
    }

    #[test]
    fn test_divergent_update_still_clears_store() {
        let mut trainer = trainer(PpoConfig::new().with_min_batch_size(4).with_minibatch_size(4));
        fill_store(&mut trainer, 3);
        let obs = observation(0.2);
        let output = trainer.act(&obs).unwrap();
        trainer.record(obs, output, f32::INFINITY, false).unwrap();

        let result = trainer.update();
        assert!(matches!(result, Err(TrainError::TrainingDivergence { .. })));
        assert!(trainer.trajectory().is_empty());
        assert_eq!(trainer.updates(), 0);
    }

    #[test]
    fn test_ratio_diagnostics() {
        let (kl, clip) = ratio_diagnostics(&[1.0, 1.0], 0.2);
        assert!(kl.abs() < 1e-6);
        assert_eq!(clip, 0.0);

        let (kl, clip) = ratio_diagnostics(&[1.5, 1.0, 0.7, 1.1], 0.2);
        assert!(kl > 0.0);
        assert!((clip - 0.5).abs() < 1e-6);
    }
}
