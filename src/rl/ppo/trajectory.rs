//! On-policy trajectory store and Generalized Advantage Estimation

use crate::error::{Result, TrainError};
use crate::rl::observation::{Observation, ObservationShape};

/// One acted step of an on-policy rollout
#[derive(Debug, Clone)]
pub struct TrajectoryStep {
    pub observation: Observation,
    /// Index into the action set
    pub action: usize,
    pub reward: f32,
    /// Value estimate when the action was chosen
    pub value: f32,
    /// Log-probability of `action` under the acting policy
    pub log_prob: f32,
    /// Episode ended after this step
    pub done: bool,
}

/// Per-step advantage and return estimates
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Gae {
    pub advantages: Vec<f32>,
    pub returns: Vec<f32>,
}

impl Gae {
    pub fn len(&self) -> usize {
        self.advantages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.advantages.is_empty()
    }
}

/// Generalized Advantage Estimation over a whole trajectory
///
/// `last_value` bootstraps the state following the final step (pass 0 when
/// that state is terminal).
pub fn compute_gae(
    rewards: &[f32],
    values: &[f32],
    last_value: f32,
    gamma: f32,
    gae_lambda: f32,
) -> Result<Gae> {
    compute_gae_with_dones(
        rewards,
        values,
        &vec![false; rewards.len()],
        last_value,
        gamma,
        gae_lambda,
    )
}

/// GAE that stops bootstrapping and propagation at episode boundaries
pub fn compute_gae_with_dones(
    rewards: &[f32],
    values: &[f32],
    dones: &[bool],
    last_value: f32,
    gamma: f32,
    gae_lambda: f32,
) -> Result<Gae> {
    let n = rewards.len();
    if values.len() != n || dones.len() != n {
        return Err(TrainError::invalid_input(format!(
            "trajectory lengths differ: {} rewards, {} values, {} done flags",
            n,
            values.len(),
            dones.len()
        )));
    }

    let mut advantages = vec![0.0; n];
    let mut returns = vec![0.0; n];

    // Must run back to front: A_t depends on A_{t+1}
    let mut gae = 0.0;
    let mut next_value = last_value;
    for t in (0..n).rev() {
        let not_done = if dones[t] { 0.0 } else { 1.0 };
        let delta = rewards[t] + gamma * next_value * not_done - values[t];
        gae = delta + gamma * gae_lambda * not_done * gae;
        advantages[t] = gae;
        returns[t] = gae + values[t];
        next_value = values[t];
    }

    Ok(Gae {
        advantages,
        returns,
    })
}

/// Time-ordered store for a single rollout
///
/// Data is single-use: the trainer clears it after every update pass.
#[derive(Debug, Clone)]
pub struct TrajectoryStore {
    shape: ObservationShape,
    num_actions: usize,
    steps: Vec<TrajectoryStep>,
}

impl TrajectoryStore {
    pub fn new(shape: ObservationShape, num_actions: usize) -> Self {
        Self {
            shape,
            num_actions,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, step: TrajectoryStep) -> Result<()> {
        self.shape.validate(&step.observation)?;
        if step.action >= self.num_actions {
            return Err(TrainError::invalid_input(format!(
                "action index {} outside [0, {})",
                step.action, self.num_actions
            )));
        }
        self.steps.push(step);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    pub fn steps(&self) -> &[TrajectoryStep] {
        &self.steps
    }

    pub fn last(&self) -> Option<&TrajectoryStep> {
        self.steps.last()
    }

    pub fn shape(&self) -> ObservationShape {
        self.shape
    }

    pub fn num_actions(&self) -> usize {
        self.num_actions
    }

    /// Move the recorded steps out, leaving an empty store with the same layout
    pub fn take(&mut self) -> TrajectoryStore {
        TrajectoryStore {
            shape: self.shape,
            num_actions: self.num_actions,
            steps: std::mem::take(&mut self.steps),
        }
    }

    /// Compute advantages and returns using GAE
    pub fn compute_returns_and_advantages(
        &self,
        last_value: f32,
        gamma: f32,
        gae_lambda: f32,
    ) -> Result<Gae> {
        let rewards: Vec<f32> = self.steps.iter().map(|s| s.reward).collect();
        let values: Vec<f32> = self.steps.iter().map(|s| s.value).collect();
        let dones: Vec<bool> = self.steps.iter().map(|s| s.done).collect();
        compute_gae_with_dones(&rewards, &values, &dones, last_value, gamma, gae_lambda)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obs(shape: ObservationShape) -> Observation {
        Observation::new(
            vec![0.0; shape.grid_cells()],
            vec![0.0; shape.self_len],
            vec![0.0; shape.enemy_len],
        )
    }

    #[test]
    fn test_gae_without_discount_is_td_residual() {
        let rewards = [1.0, -2.0, 0.5, 3.0];
        let values = [0.2, 0.4, -0.1, 1.0];
        let gae = compute_gae(&rewards, &values, 0.7, 0.0, 0.0).unwrap();

        for t in 0..rewards.len() {
            let delta = rewards[t] - values[t];
            assert!((gae.advantages[t] - delta).abs() < 1e-6);
        }
    }

    #[test]
    fn test_gae_single_step_equals_delta() {
        let gae = compute_gae(&[1.0], &[0.25], 0.5, 0.99, 0.95).unwrap();
        let delta = 1.0 + 0.99 * 0.5 - 0.25;
        assert_eq!(gae.advantages[0], delta);
    }

    #[test]
    fn test_gae_returns_are_advantage_plus_value() {
        let rewards = [0.3, 1.0, -0.5, 0.0, 2.0];
        let values = [0.1, 0.9, 0.4, -0.3, 0.6];
        let gae = compute_gae(&rewards, &values, 1.2, 0.99, 0.95).unwrap();

        for t in 0..rewards.len() {
            assert_eq!(gae.returns[t], gae.advantages[t] + values[t]);
        }
    }

    #[test]
    fn test_gae_three_step_reference() {
        let gae = compute_gae(&[1.0, 0.0, 1.0], &[0.5, 0.5, 0.5], 0.5, 0.99, 0.95).unwrap();

        // deltas: 0.995, -0.005, 0.995
        let a2 = 0.995;
        let a1 = -0.005 + 0.99 * 0.95 * a2;
        let a0 = 0.995 + 0.99 * 0.95 * a1;
        let expected = [a0, a1, a2];
        for t in 0..3 {
            assert!((gae.advantages[t] - expected[t]).abs() < 1e-5);
            assert!((gae.returns[t] - (expected[t] + 0.5)).abs() < 1e-5);
        }
        // Hand-computed values
        assert!((gae.advantages[0] - 1.8704).abs() < 1e-3);
        assert!((gae.advantages[1] - 0.9308).abs() < 1e-3);
    }

    #[test]
    fn test_gae_empty_trajectory() {
        let gae = compute_gae(&[], &[], 0.0, 0.99, 0.95).unwrap();
        assert!(gae.is_empty());
    }

    #[test]
    fn test_gae_length_mismatch_is_invalid() {
        assert!(matches!(
            compute_gae(&[1.0, 2.0], &[0.0], 0.0, 0.99, 0.95),
            Err(TrainError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_gae_stops_at_episode_boundary() {
        let gae = compute_gae_with_dones(
            &[1.0, 1.0],
            &[0.0, 0.0],
            &[true, false],
            5.0,
            0.99,
            0.95,
        )
        .unwrap();
        // First step is terminal: no bootstrap from step 1
        assert!((gae.advantages[0] - 1.0).abs() < 1e-6);
        assert!((gae.advantages[1] - (1.0 + 0.99 * 5.0)).abs() < 1e-5);
    }

    #[test]
    fn test_store_validates_inputs() {
        let shape = ObservationShape::new(3, 2, 2);
        let mut store = TrajectoryStore::new(shape, 4);

        let step = TrajectoryStep {
            observation: obs(shape),
            action: 4,
            reward: 0.0,
            value: 0.0,
            log_prob: 0.0,
            done: false,
        };
        assert!(store.push(step.clone()).is_err());

        let bad_obs = TrajectoryStep {
            observation: obs(ObservationShape::new(2, 2, 2)),
            action: 0,
            ..step.clone()
        };
        assert!(store.push(bad_obs).is_err());

        store.push(TrajectoryStep { action: 3, ..step }).unwrap();
        assert_eq!(store.len(), 1);

        let taken = store.take();
        assert_eq!(taken.len(), 1);
        assert!(store.is_empty());
        assert_eq!(store.num_actions(), 4);
    }
}
