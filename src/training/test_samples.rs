//! training::test_samples: simulated observations with known changes.
//!
//! Each sample draws a true class uniformly from `0..n_classes`. Class 0
//! keeps the parameters unchanged; class `k ≥ 1` moves them by
//! `effect_size` along the `k`-th direction variant, in the direction's
//! constrained sign (a random sign for two-sided variants). Draws whose
//! changed parameters fall outside a prior's support are redrawn.
//!
//! Noise:
//! - Forward models with their own noise model are evaluated
//!   `n_repeats` times per state. The first repeat is the observation and
//!   the covariance of the repeated differences is `Σₙ`.
//! - Otherwise white Gaussian noise of standard deviation `noise_level` is
//!   added to each state and `Σₙ = noise_level²·I`.
use ndarray::{Array1, Array2, Array3, Axis};
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::StandardNormal;
use rayon::prelude::*;
use tracing::info;

use crate::{
    direction::{DirectionVector, DomainConstraint},
    model::errors::{ChangeError, ChangeResult},
    numerics::linalg::sample_covariance,
    training::{
        forward::{ForwardModel, ParamSet},
        options::TestSampleOptions,
        trainer::{Trainer, perturb},
    },
};

/// Parameter draws attempted per sample before giving up.
pub const MAX_TEST_DRAWS: usize = 1000;

/// Batch of simulated observations with their true classes.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSamples {
    /// True class per sample; 0 is "no change".
    pub true_change: Array1<usize>,
    /// `n_samples × n_dim` baseline observations.
    pub y1: Array2<f64>,
    /// `n_samples × n_dim` changed observations.
    pub y2: Array2<f64>,
    /// `n_samples × n_dim × n_dim` noise covariance of `y2 − y1`.
    pub sigma_n: Array3<f64>,
}

impl TestSamples {
    /// Observed change `y2 − y1`.
    pub fn delta(&self) -> Array2<f64> {
        &self.y2 - &self.y1
    }

    pub fn len(&self) -> usize {
        self.true_change.len()
    }

    pub fn is_empty(&self) -> bool {
        self.true_change.is_empty()
    }
}

struct TestSample {
    class: usize,
    y1: Array1<f64>,
    y2: Array1<f64>,
    sigma_n: Array2<f64>,
}

impl<M: ForwardModel> Trainer<M> {
    /// generate_test_samples: simulate labelled observations.
    ///
    /// Class indices follow the class order of a model trained from this
    /// trainer.
    ///
    /// # Errors
    /// - [`ChangeError::InvalidOption`] for invalid options.
    /// - [`ChangeError::TestSampleRejected`] when no admissible draw is
    ///   found within [`MAX_TEST_DRAWS`] attempts.
    /// - [`ChangeError::ForwardModel`] / [`ChangeError::ShapeMismatch`] for
    ///   failing forward evaluations.
    pub fn generate_test_samples(&self, opts: &TestSampleOptions) -> ChangeResult<TestSamples> {
        opts.validate()?;
        let variants: Vec<(&DirectionVector, DomainConstraint)> = self
            .directions()
            .iter()
            .flat_map(|d| d.constraints.iter().map(move |&c| (&d.vector, c)))
            .collect();
        info!(
            n_samples = opts.n_samples,
            n_classes = variants.len() + 1,
            noise_model = self.forward_model().has_noise_model(),
            "generating test samples"
        );

        let samples = (0..opts.n_samples)
            .into_par_iter()
            .map(|idx| self.simulate_test_sample(idx, opts, &variants))
            .collect::<ChangeResult<Vec<_>>>()?;

        let n_dim = self.n_dim();
        let mut out = TestSamples {
            true_change: Array1::zeros(opts.n_samples),
            y1: Array2::zeros((opts.n_samples, n_dim)),
            y2: Array2::zeros((opts.n_samples, n_dim)),
            sigma_n: Array3::zeros((opts.n_samples, n_dim, n_dim)),
        };
        for (idx, sample) in samples.into_iter().enumerate() {
            out.true_change[idx] = sample.class;
            out.y1.row_mut(idx).assign(&sample.y1);
            out.y2.row_mut(idx).assign(&sample.y2);
            out.sigma_n.index_axis_mut(Axis(0), idx).assign(&sample.sigma_n);
        }
        Ok(out)
    }

    // ---- Helper methods ----

    fn simulate_test_sample(
        &self, idx: usize, opts: &TestSampleOptions, variants: &[(&DirectionVector, DomainConstraint)],
    ) -> ChangeResult<TestSample> {
        let mut rng = StdRng::seed_from_u64(opts.seed.wrapping_add(idx as u64));
        let class = rng.gen_range(0..=variants.len());
        let (before, after) = self.draw_test_pair(class, variants, opts.effect_size, &mut rng)?;
        let n_dim = self.n_dim();
        let noise = opts.noise_level;

        if self.forward_model().has_noise_model() {
            let noisy = |params: &ParamSet, rng: &mut StdRng| -> ChangeResult<Array1<f64>> {
                let y = self.forward_model().evaluate_noisy(params, noise, rng)?;
                self.check_output(y)
            };
            let y1 = noisy(&before, &mut rng)?;
            let y2 = noisy(&after, &mut rng)?;
            let mut diffs = Array2::<f64>::zeros((opts.n_repeats, n_dim));
            diffs.row_mut(0).assign(&(&y2 - &y1));
            for r in 1..opts.n_repeats {
                let a = noisy(&before, &mut rng)?;
                let b = noisy(&after, &mut rng)?;
                diffs.row_mut(r).assign(&(&b - &a));
            }
            let sigma_n = sample_covariance(diffs.view());
            Ok(TestSample { class, y1, y2, sigma_n })
        } else {
            let white = |rng: &mut StdRng| {
                Array1::from_shape_fn(n_dim, |_| noise * rng.sample::<f64, _>(StandardNormal))
            };
            let y1 = self.evaluate(&before)? + white(&mut rng);
            let y2 = self.evaluate(&after)? + white(&mut rng);
            let sigma_n = Array2::<f64>::eye(n_dim) * (noise * noise);
            Ok(TestSample { class, y1, y2, sigma_n })
        }
    }

    fn draw_test_pair(
        &self, class: usize, variants: &[(&DirectionVector, DomainConstraint)], effect_size: f64,
        rng: &mut StdRng,
    ) -> ChangeResult<(ParamSet, ParamSet)> {
        for _ in 0..MAX_TEST_DRAWS {
            let before = self.draw_params(rng);
            let after = match class.checked_sub(1) {
                None => before.clone(),
                Some(v) => {
                    let (vector, constraint) = variants[v];
                    let sign = match constraint {
                        DomainConstraint::Positive => 1.0,
                        DomainConstraint::Negative => -1.0,
                        DomainConstraint::TwoSided if rng.gen::<bool>() => 1.0,
                        DomainConstraint::TwoSided => -1.0,
                    };
                    perturb(&before, vector, effect_size * sign)
                }
            };
            if self.is_admissible(&after) {
                return Ok((before, after));
            }
        }
        Err(ChangeError::TestSampleRejected { attempts: MAX_TEST_DRAWS })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        direction::DirectionSpec,
        training::{
            forward::{ParamPrior, StatrsPrior},
            trainer::PriorWeights,
        },
    };
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::RngCore;
    use statrs::distribution::{Normal, Uniform};

    fn linear(p: &ParamSet) -> anyhow::Result<Array1<f64>> {
        Ok(array![p["a"], p["b"], p["a"] + p["b"]])
    }

    fn priors() -> Vec<(String, Box<dyn ParamPrior>)> {
        vec![
            ("a".to_string(), StatrsPrior::boxed(Normal::new(2.0, 0.1).unwrap())),
            ("b".to_string(), StatrsPrior::boxed(Uniform::new(0.5, 1.5).unwrap())),
        ]
    }

    fn specs(lines: &[&str]) -> Option<Vec<DirectionSpec>> {
        Some(lines.iter().map(|l| l.parse().unwrap()).collect())
    }

    #[test]
    // Purpose
    // -------
    // Without noise, the observed change is exactly the forward-model
    // response to the true class's change, and changed parameters stay in
    // the prior support.
    //
    // Given
    // -----
    // - y = (a, b, a + b), directions "a, positive" and "b, negative",
    //   effect 0.2, no noise.
    //
    // Expect
    // ------
    // - Class 0: Δy = 0; class 1: Δy = (0.2, 0, 0.2);
    //   class 2: Δy = (0, −0.2, −0.2) with b − 0.2 ≥ 0.5.
    // - Σₙ = 0 for every sample.
    fn noise_free_changes_follow_the_true_class() {
        // Arrange
        let trainer =
            Trainer::new(linear, priors(), specs(&["a, positive", "b, negative"]), PriorWeights::default())
                .unwrap();
        let opts = TestSampleOptions::new(200, 0.2, 0.0, 2, 5).unwrap();

        // Act
        let samples = trainer.generate_test_samples(&opts).unwrap();

        // Assert
        let delta = samples.delta();
        let expected = [array![0.0, 0.0, 0.0], array![0.2, 0.0, 0.2], array![0.0, -0.2, -0.2]];
        for (i, &class) in samples.true_change.iter().enumerate() {
            assert!(class < 3);
            for (got, want) in delta.row(i).iter().zip(expected[class].iter()) {
                assert_relative_eq!(*got, *want, epsilon = 1e-12);
            }
            if class == 2 {
                assert!(samples.y1[[i, 1]] >= 0.7 - 1e-12);
            }
        }
        assert!(samples.sigma_n.iter().all(|&v| v == 0.0));
        assert!((0..3).all(|c| samples.true_change.iter().any(|&t| t == c)));
    }

    #[test]
    fn white_noise_covariance_is_scaled_identity() {
        let trainer = Trainer::new(linear, priors(), None, PriorWeights::default()).unwrap();
        let opts = TestSampleOptions::new(10, 0.1, 0.05, 2, 1).unwrap();

        let samples = trainer.generate_test_samples(&opts).unwrap();

        assert_eq!(samples.len(), 10);
        for cov in samples.sigma_n.outer_iter() {
            assert_eq!(cov, Array2::<f64>::eye(3) * (0.05 * 0.05));
        }
        assert!(samples.true_change.iter().all(|&c| c < trainer.n_classes()));
    }

    struct NoisyLinear;

    impl ForwardModel for NoisyLinear {
        fn evaluate(&self, p: &ParamSet) -> anyhow::Result<Array1<f64>> {
            linear(p)
        }

        fn has_noise_model(&self) -> bool {
            true
        }

        fn evaluate_noisy(
            &self, p: &ParamSet, noise_level: f64, rng: &mut dyn RngCore,
        ) -> anyhow::Result<Array1<f64>> {
            let y = linear(p)?;
            Ok(y.mapv(|v| v + noise_level * rng.sample::<f64, _>(StandardNormal)))
        }
    }

    #[test]
    // Purpose
    // -------
    // With an internal noise model, Σₙ is the covariance of repeated
    // differences: 2σ² on the diagonal for independent output noise.
    fn repeated_noisy_evaluations_estimate_difference_covariance() {
        let trainer = Trainer::new(NoisyLinear, priors(), None, PriorWeights::default()).unwrap();
        let opts = TestSampleOptions::new(3, 0.1, 0.1, 4000, 9).unwrap();

        let samples = trainer.generate_test_samples(&opts).unwrap();

        for cov in samples.sigma_n.outer_iter() {
            for i in 0..3 {
                assert_relative_eq!(cov[[i, i]], 0.02, epsilon = 3e-3);
            }
            assert_relative_eq!(cov[[0, 1]], 0.0, epsilon = 3e-3);
            assert_eq!(cov[[0, 2]], cov[[2, 0]]);
        }
    }

    #[test]
    fn inadmissible_changes_are_eventually_rejected() {
        let priors: Vec<(String, Box<dyn ParamPrior>)> = vec![
            ("a".to_string(), StatrsPrior::boxed(Uniform::new(0.5, 0.6).unwrap())),
            ("b".to_string(), StatrsPrior::boxed(Uniform::new(0.5, 1.5).unwrap())),
        ];
        let trainer =
            Trainer::new(linear, priors, specs(&["a, positive"]), PriorWeights::default()).unwrap();
        let opts = TestSampleOptions::new(20, 1.0, 0.0, 2, 0).unwrap();

        let err = trainer.generate_test_samples(&opts).unwrap_err();

        assert!(matches!(err, ChangeError::TestSampleRejected { attempts: MAX_TEST_DRAWS }));
    }
}
