//! Off-policy agent: prioritized replay, Double DQN targets and
//! epsilon-greedy exploration

pub mod exploration;
pub mod qnet;
pub mod replay;
pub mod train;

pub use exploration::EpsilonGreedy;
pub use qnet::{DuelingQNet, DuelingQNetConfig, QValueModel, double_q_targets};
pub use replay::{PrioritizedReplay, SampledBatch, Transition};
pub use train::{DqnConfig, DqnTrainer, DqnUpdateStats};
