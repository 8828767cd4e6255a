//! Epsilon-greedy action selection with multiplicative-subtractive decay

use rand::Rng;

use crate::error::{Result, TrainError};

#[derive(Debug, Clone, PartialEq)]
pub struct EpsilonGreedy {
    epsilon: f32,
    min_epsilon: f32,
    decay_rate: f32,
    adjustment: f32,
}

impl EpsilonGreedy {
    /// `start` is clamped into `[min_epsilon, 1]`
    pub fn new(start: f32, min_epsilon: f32, decay_rate: f32, adjustment: f32) -> Result<Self> {
        if !(0.0..=1.0).contains(&min_epsilon) {
            return Err(TrainError::invalid_input(format!(
                "minimum epsilon {} outside [0, 1]",
                min_epsilon
            )));
        }
        if !start.is_finite() || !decay_rate.is_finite() || !adjustment.is_finite() {
            return Err(TrainError::invalid_input("epsilon schedule must be finite"));
        }
        Ok(Self {
            epsilon: start.clamp(min_epsilon, 1.0),
            min_epsilon,
            decay_rate,
            adjustment,
        })
    }

    pub fn epsilon(&self) -> f32 {
        self.epsilon
    }

    /// `epsilon <- max(min, epsilon * decay_rate - adjustment)`
    pub fn decay(&mut self) -> f32 {
        self.epsilon = (self.epsilon * self.decay_rate - self.adjustment).max(self.min_epsilon);
        self.epsilon
    }

    /// Uniform random action with probability epsilon, else the greedy one
    pub fn select<R: Rng>(&self, q_values: &[f32], rng: &mut R) -> Result<usize> {
        if q_values.is_empty() {
            return Err(TrainError::invalid_input("no action values to choose from"));
        }
        if rng.random::<f32>() < self.epsilon {
            Ok(rng.random_range(0..q_values.len()))
        } else {
            Ok(greedy(q_values))
        }
    }
}

/// Index of the largest value; the lowest index wins ties
pub fn greedy(values: &[f32]) -> usize {
    let mut best = 0;
    for (i, &v) in values.iter().enumerate().skip(1) {
        if v > values[best] {
            best = i;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_decay_formula_and_floor() {
        let mut exploration = EpsilonGreedy::new(1.0, 0.01, 0.992, 0.0015).unwrap();
        let e1 = exploration.decay();
        assert!((e1 - (0.992 - 0.0015)).abs() < 1e-6);

        let mut previous = e1;
        for _ in 0..2000 {
            let e = exploration.decay();
            assert!(e <= previous);
            previous = e;
        }
        assert!((exploration.epsilon() - 0.01).abs() < 1e-7);
    }

    #[test]
    fn test_greedy_when_epsilon_is_floor_zero() {
        let exploration = EpsilonGreedy::new(0.0, 0.0, 0.992, 0.0015).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..20 {
            assert_eq!(exploration.select(&[0.1, 2.0, -1.0, 2.0], &mut rng).unwrap(), 1);
        }
    }

    #[test]
    fn test_full_exploration_covers_actions() {
        let exploration = EpsilonGreedy::new(1.0, 0.01, 0.992, 0.0015).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let mut seen = [false; 4];
        for _ in 0..200 {
            seen[exploration.select(&[0.0, 0.0, 0.0, 9.0], &mut rng).unwrap()] = true;
        }
        assert!(seen.iter().all(|&s| s));
    }

    #[test]
    fn test_select_rejects_empty_values() {
        let exploration = EpsilonGreedy::new(0.5, 0.01, 0.992, 0.0015).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        assert!(exploration.select(&[], &mut rng).is_err());
    }

    #[test]
    fn test_new_rejects_bad_floor() {
        assert!(matches!(
            EpsilonGreedy::new(1.0, 1.5, 0.992, 0.0015),
            Err(TrainError::InvalidInput(_))
        ));
        assert!(EpsilonGreedy::new(1.0, f32::NAN, 0.992, 0.0015).is_err());
        assert!(EpsilonGreedy::new(f32::NAN, 0.01, 0.992, 0.0015).is_err());

        let exploration = EpsilonGreedy::new(3.0, 0.2, 0.992, 0.0015).unwrap();
        assert_eq!(exploration.epsilon(), 1.0);
    }

    #[test]
    fn test_greedy_tie_breaks_low() {
        assert_eq!(greedy(&[1.0, 1.0, 1.0]), 0);
        assert_eq!(greedy(&[-3.0, -1.0, -2.0]), 1);
    }
}
