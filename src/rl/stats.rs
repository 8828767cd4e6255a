//! Normalization and numerical-stability helpers shared by both trainers

use crate::error::{Result, TrainError};

/// Added to standard deviations before dividing
pub const STD_EPSILON: f32 = 1e-8;

pub fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}

/// Sample standard deviation (n - 1 denominator); 0 for fewer than two values
pub fn std_dev(values: &[f32]) -> f32 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f32>() / (values.len() - 1) as f32;
    var.sqrt()
}

/// Shift to zero mean and scale to unit variance
///
/// When the variance collapses every entry maps to (almost) zero instead of
/// dividing by zero.
pub fn normalize(values: &[f32]) -> Vec<f32> {
    let m = mean(values);
    let std = std_dev(values) + STD_EPSILON;
    values.iter().map(|v| (v - m) / std).collect()
}

/// Importance-sampling weights `(N * P(i))^-beta`, scaled so the largest is 1
pub fn importance_weights(probabilities: &[f32], memory_len: usize, beta: f32) -> Vec<f32> {
    let n = memory_len as f32;
    let raw: Vec<f32> = probabilities
        .iter()
        .map(|&p| (n * p).powf(-beta))
        .collect();
    let max = raw.iter().copied().fold(f32::MIN_POSITIVE, f32::max);
    raw.iter().map(|w| w / max).collect()
}

/// Surface NaN/inf as a divergence of `stage`
pub fn ensure_finite(stage: &'static str, value: f32) -> Result<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        tracing::warn!("Non-finite value {} in {}", value, stage);
        Err(TrainError::TrainingDivergence { stage, loss: value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_zero_mean_unit_std() {
        let normalized = normalize(&[1.0, 2.0, 3.0, 4.0]);
        assert!(mean(&normalized).abs() < 1e-6);
        assert!((std_dev(&normalized) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_normalize_constant_input_is_finite() {
        let normalized = normalize(&[2.5; 8]);
        assert!(normalized.iter().all(|v| v.is_finite() && v.abs() < 1e-6));

        let single = normalize(&[3.0]);
        assert!(single[0].abs() < 1e-6);
    }

    #[test]
    fn test_importance_weights_bounded_by_one() {
        let probabilities = [0.5, 0.1, 0.3, 0.1];
        let weights = importance_weights(&probabilities, 4, 0.4);

        let max = weights.iter().copied().fold(f32::MIN, f32::max);
        assert!((max - 1.0).abs() < 1e-6);
        assert!(weights.iter().all(|&w| w > 0.0 && w <= 1.0));
        // Rarest samples get the largest correction
        assert!((weights[1] - 1.0).abs() < 1e-6);
        assert!(weights[0] < weights[2]);
    }

    #[test]
    fn test_importance_weights_uniform_sampling() {
        let weights = importance_weights(&[0.25; 4], 4, 0.4);
        assert!(weights.iter().all(|&w| (w - 1.0).abs() < 1e-6));
    }

    #[test]
    fn test_ensure_finite() {
        assert_eq!(ensure_finite("test", 1.5).unwrap(), 1.5);
        assert!(matches!(
            ensure_finite("test", f32::NAN),
            Err(TrainError::TrainingDivergence { stage: "test", .. })
        ));
        assert!(ensure_finite("test", f32::INFINITY).is_err());
    }
}
