//! training::options: validated configuration for training and test
//! sample generation.
use serde::{Deserialize, Serialize};

use crate::model::errors::{ChangeError, ChangeResult};

/// Training configuration.
///
/// Fields:
/// - `n_samples`: number of simulated prior draws.
/// - `poly_degree`: total degree of the polynomial features.
/// - `regularization`: ridge penalty `α ≥ 0`.
/// - `k`: neighbours per local moment estimate (clamped to `n_samples`).
/// - `step`: finite-difference step along each direction.
/// - `shrinkage`: `λ` added to the diagonal of each local covariance.
/// - `seed`: base seed; sample `i` uses a stream derived from `seed` and `i`.
/// - `model_name`: overrides the forward model's name.
///
/// Default:
/// - `n_samples = 1000`, `poly_degree = 2`, `regularization = 1.0`,
///   `k = 100`, `step = 1e-6`, `shrinkage = 1e-6`, `seed = 0`,
///   `model_name = None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainOptions {
    pub n_samples: usize,
    pub poly_degree: usize,
    pub regularization: f64,
    pub k: usize,
    pub step: f64,
    pub shrinkage: f64,
    pub seed: u64,
    pub model_name: Option<String>,
}

impl TrainOptions {
    /// Create validated training options.
    ///
    /// # Errors
    /// - [`ChangeError::InvalidOption`] when `n_samples` or `k` is zero,
    ///   `step` is not finite and positive, or `regularization` /
    ///   `shrinkage` is negative or non-finite.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        n_samples: usize, poly_degree: usize, regularization: f64, k: usize, step: f64,
        shrinkage: f64, seed: u64, model_name: Option<String>,
    ) -> ChangeResult<Self> {
        let opts =
            Self { n_samples, poly_degree, regularization, k, step, shrinkage, seed, model_name };
        opts.validate()?;
        Ok(opts)
    }

    /// Check the invariants enforced by [`TrainOptions::new`].
    pub fn validate(&self) -> ChangeResult<()> {
        if self.n_samples == 0 {
            return Err(invalid("n_samples", 0.0, "at least one training sample is required"));
        }
        if self.k == 0 {
            return Err(invalid("k", 0.0, "at least one neighbour is required"));
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return Err(invalid("step", self.step, "must be finite and positive"));
        }
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(invalid("regularization", self.regularization, "must be finite and >= 0"));
        }
        if !(self.shrinkage.is_finite() && self.shrinkage >= 0.0) {
            return Err(invalid("shrinkage", self.shrinkage, "must be finite and >= 0"));
        }
        Ok(())
    }
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            n_samples: 1000,
            poly_degree: 2,
            regularization: 1.0,
            k: 100,
            step: 1e-6,
            shrinkage: 1e-6,
            seed: 0,
            model_name: None,
        }
    }
}

/// Test-sample generation configuration.
///
/// Default: `n_samples = 1000`, `effect_size = 0.1`, `noise_level = 0.0`,
/// `n_repeats = 100`, `seed = 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TestSampleOptions {
    pub n_samples: usize,
    /// Magnitude of the simulated change along the true direction.
    pub effect_size: f64,
    /// Measurement noise standard deviation.
    pub noise_level: f64,
    /// Repeated noisy evaluations per sample when the forward model has
    /// its own noise model.
    pub n_repeats: usize,
    pub seed: u64,
}

impl TestSampleOptions {
    /// Create validated test-sample options.
    ///
    /// # Errors
    /// - [`ChangeError::InvalidOption`] for a non-finite or negative
    ///   `effect_size`/`noise_level`, or fewer than two repeats.
    pub fn new(
        n_samples: usize, effect_size: f64, noise_level: f64, n_repeats: usize, seed: u64,
    ) -> ChangeResult<Self> {
        let opts = Self { n_samples, effect_size, noise_level, n_repeats, seed };
        opts.validate()?;
        Ok(opts)
    }

    pub fn validate(&self) -> ChangeResult<()> {
        if !(self.effect_size.is_finite() && self.effect_size >= 0.0) {
            return Err(invalid("effect_size", self.effect_size, "must be finite and >= 0"));
        }
        if !(self.noise_level.is_finite() && self.noise_level >= 0.0) {
            return Err(invalid("noise_level", self.noise_level, "must be finite and >= 0"));
        }
        if self.n_repeats < 2 {
            return Err(invalid(
                "n_repeats",
                self.n_repeats as f64,
                "a noise covariance needs at least two repeats",
            ));
        }
        Ok(())
    }
}

impl Default for TestSampleOptions {
    fn default() -> Self {
        Self { n_samples: 1000, effect_size: 0.1, noise_level: 0.0, n_repeats: 100, seed: 0 }
    }
}

// ---- Helper methods ----

fn invalid(name: &'static str, value: f64, reason: &'static str) -> ChangeError {
    ChangeError::InvalidOption { name, value, reason }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(TrainOptions::default().validate().is_ok());
        assert!(TestSampleOptions::default().validate().is_ok());
    }

    #[test]
    // Purpose
    // -------
    // Each out-of-range training option is rejected and named.
    fn train_options_reject_out_of_range_values() {
        let cases = [
            (TrainOptions { n_samples: 0, ..Default::default() }, "n_samples"),
            (TrainOptions { k: 0, ..Default::default() }, "k"),
            (TrainOptions { step: 0.0, ..Default::default() }, "step"),
            (TrainOptions { regularization: -1.0, ..Default::default() }, "regularization"),
            (TrainOptions { shrinkage: f64::NAN, ..Default::default() }, "shrinkage"),
        ];
        for (opts, expected) in cases {
            match opts.validate() {
                Err(ChangeError::InvalidOption { name, .. }) => assert_eq!(name, expected),
                other => panic!("expected InvalidOption for {expected}, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_sample_options_need_two_repeats() {
        let err = TestSampleOptions::new(10, 0.1, 0.0, 1, 0).unwrap_err();
        assert!(matches!(err, ChangeError::InvalidOption { name: "n_repeats", .. }));
    }

    #[test]
    fn train_options_round_trip_through_json() {
        let opts = TrainOptions::new(50, 1, 0.5, 10, 1e-5, 1e-6, 7, Some("demo".into())).unwrap();
        let json = serde_json::to_string(&opts).unwrap();
        let back: TrainOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back, opts);
    }
}
