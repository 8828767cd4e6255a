//! Running training statistics and console summaries

use std::collections::VecDeque;
use std::time::Instant;

use super::dqn::DqnUpdateStats;
use super::ppo::PpoUpdateStats;

/// Mean over the last `window_size` values
#[derive(Debug, Clone)]
pub struct MovingAverage {
    values: VecDeque<f32>,
    window_size: usize,
    sum: f32,
}

impl MovingAverage {
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            values: VecDeque::with_capacity(window_size),
            window_size,
            sum: 0.0,
        }
    }

    pub fn push(&mut self, value: f32) {
        if self.values.len() == self.window_size {
            if let Some(old) = self.values.pop_front() {
                self.sum -= old;
            }
        }
        self.values.push_back(value);
        self.sum += value;
    }

    pub fn average(&self) -> f32 {
        if self.values.is_empty() {
            0.0
        } else {
            self.sum / self.values.len() as f32
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Episode outcomes and update diagnostics for one training run
#[derive(Debug)]
pub struct TrainingMetrics {
    pub episode_rewards: MovingAverage,
    pub episode_lengths: MovingAverage,
    /// Share of episodes ending with the enemy down
    pub win_rate: MovingAverage,
    pub death_rate: MovingAverage,
    pub policy_loss: MovingAverage,
    pub value_loss: MovingAverage,
    pub entropy: MovingAverage,
    pub approx_kl: MovingAverage,
    pub td_loss: MovingAverage,
    pub td_error: MovingAverage,
    pub mean_q: MovingAverage,
    /// Latest exploration rate (off-policy runs only)
    pub epsilon: Option<f32>,
    pub episodes: usize,
    pub updates: usize,
    pub total_timesteps: usize,
    start_time: Instant,
}

impl TrainingMetrics {
    pub fn new(window_size: usize) -> Self {
        Self {
            episode_rewards: MovingAverage::new(window_size),
            episode_lengths: MovingAverage::new(window_size),
            win_rate: MovingAverage::new(window_size),
            death_rate: MovingAverage::new(window_size),
            policy_loss: MovingAverage::new(window_size),
            value_loss: MovingAverage::new(window_size),
            entropy: MovingAverage::new(window_size),
            approx_kl: MovingAverage::new(window_size),
            td_loss: MovingAverage::new(window_size),
            td_error: MovingAverage::new(window_size),
            mean_q: MovingAverage::new(window_size),
            epsilon: None,
            episodes: 0,
            updates: 0,
            total_timesteps: 0,
            start_time: Instant::now(),
        }
    }

    pub fn record_episode(&mut self, reward: f32, length: usize, won: bool, died: bool) {
        self.episodes += 1;
        self.total_timesteps += length;
        self.episode_rewards.push(reward);
        self.episode_lengths.push(length as f32);
        self.win_rate.push(if won { 1.0 } else { 0.0 });
        self.death_rate.push(if died { 1.0 } else { 0.0 });
    }

    pub fn record_ppo_update(&mut self, stats: &PpoUpdateStats) {
        self.updates += 1;
        self.policy_loss.push(stats.policy_loss);
        self.value_loss.push(stats.value_loss);
        self.entropy.push(stats.entropy);
        self.approx_kl.push(stats.approx_kl);
    }

    pub fn record_dqn_update(&mut self, stats: &DqnUpdateStats) {
        self.updates += 1;
        self.td_loss.push(stats.loss);
        self.td_error.push(stats.mean_td_error);
        self.mean_q.push(stats.mean_q);
        self.epsilon = Some(stats.epsilon);
    }

    pub fn training_duration_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    pub fn timesteps_per_second(&self) -> f64 {
        let duration = self.training_duration_secs();
        if duration > 0.0 {
            self.total_timesteps as f64 / duration
        } else {
            0.0
        }
    }

    pub fn log_to_console(&self) {
        tracing::info!(
            "Episode {} | Updates {} | Timesteps {} | SPS {:.1}",
            self.episodes,
            self.updates,
            self.total_timesteps,
            self.timesteps_per_second()
        );
        tracing::info!(
            "  Episode: reward={:.2}, length={:.1}, win={:.1}%, death={:.1}%",
            self.episode_rewards.average(),
            self.episode_lengths.average(),
            self.win_rate.average() * 100.0,
            self.death_rate.average() * 100.0
        );
        if !self.policy_loss.is_empty() {
            tracing::info!(
                "  PPO: policy={:.4}, value={:.4}, entropy={:.4}, kl={:.4}",
                self.policy_loss.average(),
                self.value_loss.average(),
                self.entropy.average(),
                self.approx_kl.average()
            );
        }
        if let Some(epsilon) = self.epsilon {
            tracing::info!(
                "  DQN: loss={:.4}, td={:.4}, q={:.3}, epsilon={:.3}",
                self.td_loss.average(),
                self.td_error.average(),
                self.mean_q.average(),
                epsilon
            );
        }
    }
}

impl Default for TrainingMetrics {
    fn default() -> Self {
        Self::new(100)
    }
}
