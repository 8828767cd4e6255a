//! On-policy agent: trajectory store, GAE and the clipped-surrogate update

pub mod policy;
pub mod train;
pub mod trajectory;

pub use policy::{PolicyValueModel, PolicyValueNet, PolicyValueNetConfig};
pub use train::{ActOutput, PpoConfig, PpoTrainer, PpoUpdateStats};
pub use trajectory::{Gae, TrajectoryStep, TrajectoryStore, compute_gae, compute_gae_with_dones};
