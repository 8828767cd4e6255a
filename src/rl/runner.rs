//! Episode loops: act, step the environment, store experience, update

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use burn::module::AutodiffModule;
use burn::tensor::backend::AutodiffBackend;

use super::dqn::{DqnTrainer, QValueModel, Transition};
use super::env::{Environment, StepInfo};
use super::metrics::TrainingMetrics;
use super::ppo::{PolicyValueModel, PpoTrainer};
use crate::error::{self, TrainError};

/// Settings for a training run
#[derive(Config, Debug)]
pub struct RunConfig {
    #[config(default = 500)]
    pub episodes: usize,
    /// Log a summary every N episodes
    #[config(default = 10)]
    pub log_every: usize,
    /// Window for moving averages
    #[config(default = 100)]
    pub metrics_window: usize,
    /// Hidden layer size of the reference networks
    #[config(default = 256)]
    pub hidden_size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentKind {
    /// On-policy PPO with GAE
    Ppo,
    /// Double DQN with prioritized replay
    Dqn,
}

impl FromStr for AgentKind {
    type Err = TrainError;

    fn from_str(s: &str) -> error::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ppo" => Ok(AgentKind::Ppo),
            "dqn" => Ok(AgentKind::Dqn),
            other => Err(TrainError::Config(format!(
                "unknown agent '{}', expected 'ppo' or 'dqn'",
                other
            ))),
        }
    }
}

impl fmt::Display for AgentKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AgentKind::Ppo => write!(f, "ppo"),
            AgentKind::Dqn => write!(f, "dqn"),
        }
    }
}

/// Summary of one finished episode
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EpisodeOutcome {
    pub reward: f32,
    pub length: usize,
    pub won: bool,
    pub died: bool,
}

impl EpisodeOutcome {
    fn finish(reward: f32, length: usize, info: &StepInfo) -> Self {
        Self {
            reward,
            length,
            won: info.kills > 0,
            died: info.died,
        }
    }
}

/// Play one episode with the on-policy agent, updating whenever enough
/// steps are stored
pub fn run_ppo_episode<B, M, E>(
    trainer: &mut PpoTrainer<B, M>,
    env: &mut E,
    metrics: &mut TrainingMetrics,
) -> error::Result<EpisodeOutcome>
where
    B: AutodiffBackend,
    M: PolicyValueModel<B> + AutodiffModule<B>,
    E: Environment,
{
    let mut observation = env.reset()?;
    let mut total_reward = 0.0;
    let mut length = 0;

    loop {
        let output = trainer.act(&observation)?;
        let result = env.step(output.action)?;
        total_reward += result.reward;
        length += 1;

        trainer.record(observation, output, result.reward, result.done)?;
        if let Some(stats) = trainer.update()? {
            metrics.record_ppo_update(&stats);
        }

        if result.done {
            return Ok(EpisodeOutcome::finish(total_reward, length, &result.info));
        }
        observation = result.observation;
    }
}

/// Play one episode with the off-policy agent, updating after every step
pub fn run_dqn_episode<B, M, E>(
    trainer: &mut DqnTrainer<B, M>,
    env: &mut E,
    metrics: &mut TrainingMetrics,
) -> error::Result<EpisodeOutcome>
where
    B: AutodiffBackend,
    M: QValueModel<B> + AutodiffModule<B>,
    E: Environment,
{
    let mut observation = env.reset()?;
    let mut total_reward = 0.0;
    let mut length = 0;

    loop {
        let action = trainer.act(&observation)?;
        let result = env.step(action)?;
        total_reward += result.reward;
        length += 1;

        trainer.store(Transition {
            observation,
            action,
            reward: result.reward,
            next_observation: result.observation.clone(),
            done: result.done,
        })?;
        if let Some(stats) = trainer.update()? {
            metrics.record_dqn_update(&stats);
        }

        if result.done {
            return Ok(EpisodeOutcome::finish(total_reward, length, &result.info));
        }
        observation = result.observation;
    }
}

/// Train the on-policy agent for `config.episodes` episodes
pub fn train_ppo<B, M, E>(
    trainer: &mut PpoTrainer<B, M>,
    env: &mut E,
    config: &RunConfig,
) -> error::Result<TrainingMetrics>
where
    B: AutodiffBackend,
    M: PolicyValueModel<B> + AutodiffModule<B>,
    E: Environment,
{
    tracing::info!("Starting PPO training for {} episodes", config.episodes);
    let mut metrics = TrainingMetrics::new(config.metrics_window);

    for episode in 0..config.episodes {
        let outcome = run_ppo_episode(trainer, env, &mut metrics)?;
        record(&mut metrics, &outcome, episode, config);
    }

    tracing::info!("PPO training complete after {} updates", trainer.updates());
    Ok(metrics)
}

/// Train the off-policy agent for `config.episodes` episodes
pub fn train_dqn<B, M, E>(
    trainer: &mut DqnTrainer<B, M>,
    env: &mut E,
    config: &RunConfig,
) -> error::Result<TrainingMetrics>
where
    B: AutodiffBackend,
    M: QValueModel<B> + AutodiffModule<B>,
    E: Environment,
{
    tracing::info!("Starting DQN training for {} episodes", config.episodes);
    let mut metrics = TrainingMetrics::new(config.metrics_window);

    for episode in 0..config.episodes {
        let outcome = run_dqn_episode(trainer, env, &mut metrics)?;
        record(&mut metrics, &outcome, episode, config);
    }

    tracing::info!(
        "DQN training complete after {} updates (epsilon {:.3})",
        trainer.updates(),
        trainer.epsilon()
    );
    Ok(metrics)
}

fn record(metrics: &mut TrainingMetrics, outcome: &EpisodeOutcome, episode: usize, config: &RunConfig) {
    metrics.record_episode(outcome.reward, outcome.length, outcome.won, outcome.died);
    tracing::debug!(
        "Episode {}: reward={:.2}, length={}, won={}, died={}",
        episode,
        outcome.reward,
        outcome.length,
        outcome.won,
        outcome.died
    );
    if config.log_every > 0 && (episode + 1) % config.log_every == 0 {
        metrics.log_to_console();
    }
}
