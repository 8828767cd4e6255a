use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TrainError {
    /// Out-of-range action, malformed observation, inconsistent batch data
    InvalidInput(String),
    /// Non-finite loss or model output during an update
    TrainingDivergence { stage: &'static str, loss: f32 },
    /// Tensor data could not be read back from the backend
    Tensor(String),
    /// The environment boundary failed
    Environment(String),
    /// Configuration could not be loaded
    Config(String),
}

impl TrainError {
    pub fn invalid_input(message: impl Into<String>) -> Self {
        TrainError::InvalidInput(message.into())
    }
}

impl fmt::Display for TrainError {
    fn fmt(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TrainError::InvalidInput(message) => write!(formatter, "Invalid input: {}", message),
            TrainError::TrainingDivergence { stage, loss } => {
                write!(formatter, "Training diverged in {} (loss {})", stage, loss)
            }
            TrainError::Tensor(message) => write!(formatter, "Tensor data error: {}", message),
            TrainError::Environment(message) => write!(formatter, "Environment error: {}", message),
            TrainError::Config(message) => write!(formatter, "Config error: {}", message),
        }
    }
}

impl Error for TrainError {}

pub type Result<T> = std::result::Result<T, TrainError>;
