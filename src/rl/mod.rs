//! Reinforcement learning engines for StrikeForce agents
//!
//! Two independent agents share one problem shape: observe a square grid plus
//! self/enemy status vectors, pick one of a fixed set of commands, receive a
//! delayed reward.
//!
//! # Architecture
//!
//! ```text
//! Environment (Skirmish, or a game behind ChannelEnv)
//!     │  Observation
//!     ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │  ObservationTensors                                         │
//! │  - grid / 255, status vectors as-is                         │
//! └─────────────────────────────────────────────────────────────┘
//!     │
//!     ├──────────────────────────────┐
//!     ▼                              ▼
//! ┌────────────────────────────┐ ┌──────────────────────────────┐
//! │  PPO (on-policy)           │ │  DQN (off-policy)            │
//! │  - categorical act         │ │  - epsilon-greedy act        │
//! │  - TrajectoryStore         │ │  - PrioritizedReplay         │
//! │  - GAE + clipped surrogate │ │  - Double-DQN targets        │
//! │  - store cleared per update│ │  - soft target sync          │
//! └────────────────────────────┘ └──────────────────────────────┘
//!     │                              │
//!     └──────────────┬───────────────┘
//!                    ▼
//!          runner (episode loops) + TrainingMetrics
//! ```

// Plain data and helpers
pub mod action_set;
pub mod observation;
pub mod stats;

// Environment boundary
pub mod env;
pub mod skirmish;

// Burn-dependent modules
pub mod dqn;
pub mod metrics;
pub mod ppo;
pub mod runner;
pub mod tensor;

pub use action_set::{ActionSet, STRIKEFORCE_SYMBOLS};
pub use env::{ChannelEnv, Environment, GameEndpoint, StepInfo, StepResult, channel_env};
pub use metrics::{MovingAverage, TrainingMetrics};
pub use observation::{Observation, ObservationShape, ObservationTensors};
pub use runner::{AgentKind, EpisodeOutcome, RunConfig, train_dqn, train_ppo};
pub use skirmish::{SkirmishConfig, SkirmishEnv};
