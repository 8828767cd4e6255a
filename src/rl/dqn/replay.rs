//! Fixed-capacity prioritized replay memory
//!
//! Transitions and priorities live in two parallel arrays sharing one write
//! cursor, so slot `i` of one always pairs with slot `i` of the other.

use rand::Rng;
use rand::distr::Distribution;
use rand::distr::weighted::WeightedIndex;

use crate::error::{Result, TrainError};
use crate::rl::observation::Observation;

/// One off-policy experience tuple
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub observation: Observation,
    pub action: usize,
    pub reward: f32,
    pub next_observation: Observation,
    pub done: bool,
}

/// Slot indices drawn by [`PrioritizedReplay::sample`] with their sampling
/// probabilities
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampledBatch {
    pub indices: Vec<usize>,
    pub probabilities: Vec<f32>,
}

impl SampledBatch {
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct PrioritizedReplay {
    capacity: usize,
    alpha: f32,
    priority_epsilon: f32,
    transitions: Vec<Transition>,
    priorities: Vec<f32>,
    /// Next slot to overwrite once full
    position: usize,
}

impl PrioritizedReplay {
    pub fn new(capacity: usize, alpha: f32, priority_epsilon: f32) -> Result<Self> {
        if capacity == 0 {
            return Err(TrainError::invalid_input("replay capacity must be positive"));
        }
        Ok(Self {
            capacity,
            alpha,
            priority_epsilon,
            transitions: Vec::with_capacity(capacity.min(4096)),
            priorities: Vec::with_capacity(capacity.min(4096)),
            position: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    pub fn get(&self, index: usize) -> Option<&Transition> {
        self.transitions.get(index)
    }

    pub fn priority(&self, index: usize) -> Option<f32> {
        self.priorities.get(index).copied()
    }

    /// Largest stored priority, 1.0 when empty
    pub fn max_priority(&self) -> f32 {
        if self.priorities.is_empty() {
            1.0
        } else {
            self.priorities.iter().copied().fold(f32::MIN, f32::max)
        }
    }

    /// Append, or overwrite the oldest slot once at capacity
    ///
    /// New entries take the current max priority so they are seen at least
    /// once before their TD error is known.
    pub fn insert(&mut self, transition: Transition) {
        let priority = self.max_priority();
        if self.transitions.len() < self.capacity {
            self.transitions.push(transition);
            self.priorities.push(priority);
        } else {
            self.transitions[self.position] = transition;
            self.priorities[self.position] = priority;
        }
        self.position = (self.position + 1) % self.capacity;
    }

    /// Draw `batch_size` slots with replacement, `P(i) = p_i^a / sum(p^a)`
    pub fn sample<R: Rng>(&self, batch_size: usize, rng: &mut R) -> Result<SampledBatch> {
        if self.is_empty() {
            return Err(TrainError::invalid_input("cannot sample from empty replay memory"));
        }
        if batch_size == 0 {
            return Err(TrainError::invalid_input("batch size must be positive"));
        }

        let scaled: Vec<f32> = self.priorities.iter().map(|p| p.powf(self.alpha)).collect();
        let total: f32 = scaled.iter().sum();
        let dist = WeightedIndex::new(&scaled)
            .map_err(|e| TrainError::invalid_input(format!("invalid priorities: {}", e)))?;

        let indices: Vec<usize> = (0..batch_size).map(|_| dist.sample(rng)).collect();
        let probabilities = indices.iter().map(|&i| scaled[i] / total).collect();

        Ok(SampledBatch {
            indices,
            probabilities,
        })
    }

    /// Rewrite priorities as `(|td| + eps)^alpha`
    ///
    /// The exponent is applied here and again at sampling time.
    pub fn update_priorities(&mut self, indices: &[usize], td_errors: &[f32]) -> Result<()> {
        if indices.len() != td_errors.len() {
            return Err(TrainError::invalid_input(format!(
                "{} indices but {} TD errors",
                indices.len(),
                td_errors.len()
            )));
        }
        if let Some(&bad) = indices.iter().find(|&&i| i >= self.len()) {
            return Err(TrainError::invalid_input(format!(
                "replay index {} outside [0, {})",
                bad,
                self.len()
            )));
        }

        if let Some(&bad) = td_errors.iter().find(|td| !td.is_finite()) {
            return Err(TrainError::invalid_input(format!("non-finite TD error {}", bad)));
        }

        for (&index, td_error) in indices.iter().zip(td_errors) {
            self.priorities[index] = (td_error.abs() + self.priority_epsilon).powf(self.alpha);
        }
        Ok(())
    }
}
