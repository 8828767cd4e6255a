pub mod error;
pub mod rl;

// Re-export commonly used types for convenience
pub use error::{Result, TrainError};
pub use rl::dqn::{DqnConfig, DqnTrainer};
pub use rl::ppo::{PpoConfig, PpoTrainer};
