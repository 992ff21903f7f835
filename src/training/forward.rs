//! training::forward: the simulator and parameter-prior interfaces.
//!
//! A [`ForwardModel`] maps a named parameter set to a measurement vector of
//! fixed length. Any simulation context the simulator needs (acquisition
//! settings, constants) lives inside the implementing type. Closures of
//! the form `Fn(&ParamSet) -> anyhow::Result<Array1<f64>>` implement the
//! trait directly.
//!
//! A [`ParamPrior`] supplies draws, densities, and summary values for one
//! free parameter. [`StatrsPrior`] adapts any univariate `statrs`
//! distribution.
use std::collections::BTreeMap;

use anyhow::bail;
use ndarray::Array1;
use rand::{RngCore, distributions::Distribution as Sampler};
use statrs::{
    distribution::{Continuous, ContinuousCDF},
    statistics::{Distribution as Moments, Median},
};

/// Parameter values keyed by name.
pub type ParamSet = BTreeMap<String, f64>;

/// User-implemented simulator interface.
///
/// Required:
/// - `evaluate(&ParamSet) -> anyhow::Result<Array1<f64>>`: deterministic
///   noise-free prediction. Every call must return the same length.
///
/// Optional:
/// - `name()`: used as the default change-model name.
/// - `has_noise_model()` / `evaluate_noisy(...)`: an internal noise model
///   for test-sample generation. When absent, white Gaussian noise is
///   added to `evaluate` instead.
pub trait ForwardModel: Send + Sync {
    // Required methods
    fn evaluate(&self, params: &ParamSet) -> anyhow::Result<Array1<f64>>;

    // Optional methods
    fn name(&self) -> Option<String> {
        None
    }

    fn has_noise_model(&self) -> bool {
        false
    }

    fn evaluate_noisy(
        &self, _params: &ParamSet, _noise_level: f64, _rng: &mut dyn RngCore,
    ) -> anyhow::Result<Array1<f64>> {
        bail!("forward model has no internal noise model")
    }
}

impl<F> ForwardModel for F
where
    F: Fn(&ParamSet) -> anyhow::Result<Array1<f64>> + Send + Sync,
{
    fn evaluate(&self, params: &ParamSet) -> anyhow::Result<Array1<f64>> {
        self(params)
    }
}

/// Prior distribution of one forward-model parameter.
pub trait ParamPrior: Send + Sync {
    /// Draw one value.
    fn sample(&self, rng: &mut dyn RngCore) -> f64;

    /// Probability density at `x`; zero outside the support.
    fn density(&self, x: f64) -> f64;

    /// Central value used to test-evaluate the forward model.
    fn mean(&self) -> f64;

    /// Central interval holding `confidence` of the probability mass.
    fn interval(&self, confidence: f64) -> (f64, f64);
}

/// [`ParamPrior`] backed by a `statrs` continuous distribution.
///
/// `mean` falls back to the median for distributions without a finite
/// mean.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StatrsPrior<D>(pub D);

impl<D> StatrsPrior<D>
where
    StatrsPrior<D>: ParamPrior + 'static,
{
    /// Wrap `dist` as a boxed trait object, the form [`Trainer`] takes.
    ///
    /// [`Trainer`]: crate::training::Trainer
    pub fn boxed(dist: D) -> Box<dyn ParamPrior> {
        Box::new(StatrsPrior(dist))
    }
}

impl<D> ParamPrior for StatrsPrior<D>
where
    D: Continuous<f64, f64>
        + ContinuousCDF<f64, f64>
        + Moments<f64>
        + Median<f64>
        + Sampler<f64>
        + Send
        + Sync,
{
    fn sample(&self, rng: &mut dyn RngCore) -> f64 {
        self.0.sample(rng)
    }

    fn density(&self, x: f64) -> f64 {
        self.0.pdf(x)
    }

    fn mean(&self) -> f64 {
        self.0.mean().filter(|m| m.is_finite()).unwrap_or_else(|| self.0.median())
    }

    fn interval(&self, confidence: f64) -> (f64, f64) {
        let tail = (1.0 - confidence.clamp(0.0, 1.0)) / 2.0;
        (self.0.inverse_cdf(tail), self.0.inverse_cdf(1.0 - tail))
    }
}
