//! training::trainer: simulate a forward model and fit change models.
//!
//! Purpose
//! -------
//! Turn a forward model, parameter priors, and a list of change directions
//! into a [`ChangeModel`]. Construction validates the whole configuration
//! up front; training then runs four phases:
//!
//! 1. Simulation: draw parameters from the priors, evaluate the baseline
//!    `y₁`, and for every direction evaluate `y₂` after a step of `step`
//!    along the direction. The derivative is `(y₂ − y₁) / step`.
//! 2. Neighbourhoods: one k-d tree over all baselines, queried once per
//!    sample.
//! 3. Moments: neighbour-pooled derivative mean and log-Cholesky covariance
//!    link per direction and sample.
//! 4. Regression: two polynomial ridge fits per direction, shared by every
//!    constraint variant of that direction.
//!
//! Invariants & assumptions
//! ------------------------
//! - Stored directions have unit Euclidean norm. Their names keep the
//!   direction as written (before normalization).
//! - Perturbed parameters are `|v + w·step|` for every parameter, which
//!   keeps positive parameters in their domain.
//! - Sample `i` draws from `StdRng::seed_from_u64(seed + i)`, so results do
//!   not depend on how rayon schedules samples.
//!
//! Conventions
//! -----------
//! - A derivative jump `max |y₂ − y₁| > 1000·step` is reported as a
//!   [`Diagnostic::DerivativeInstability`] and a `warn!` event; training
//!   continues.
//! - Configuration problems are [`ChangeError`]s returned before any
//!   simulation starts.
use std::{collections::BTreeSet, sync::Arc};

use ndarray::{Array1, Array2};
use rand::{SeedableRng, rngs::StdRng, RngCore};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::{
    direction::{DirectionSpec, DirectionVector, parse::parse_direction_specs},
    model::{
        change_model::ChangeModel,
        diagnostics::{Diagnostic, Diagnostics, ProgressCounter, ProgressSink},
        direction_model::ChangeDirectionModel,
        errors::{ChangeError, ChangeResult},
    },
    regression::PolyRidge,
    training::{
        forward::{ForwardModel, ParamPrior, ParamSet},
        kdtree::KdTree,
        moments::local_moments,
        options::TrainOptions,
    },
};

/// Ratio of the largest allowed output jump to the finite-difference step.
pub const DERIVATIVE_JUMP_RATIO: f64 = 1e3;

/// Name used when neither the options nor the forward model provide one.
pub const UNNAMED_MODEL: &str = "unnamed";

/// Prior weight of each change direction relative to the null class.
#[derive(Debug, Clone, PartialEq)]
pub enum PriorWeights {
    /// Same weight for every direction.
    Uniform(f64),
    /// One weight per direction, in direction order.
    PerDirection(Vec<f64>),
}

impl Default for PriorWeights {
    fn default() -> Self {
        PriorWeights::Uniform(1.0)
    }
}

impl From<f64> for PriorWeights {
    fn from(weight: f64) -> Self {
        PriorWeights::Uniform(weight)
    }
}

impl From<Vec<f64>> for PriorWeights {
    fn from(weights: Vec<f64>) -> Self {
        PriorWeights::PerDirection(weights)
    }
}

/// Result of [`Trainer::train`].
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    pub model: ChangeModel,
    /// Recoverable events raised while simulating.
    pub diagnostics: Diagnostics,
}

/// Trainer: validated training configuration for one forward model.
///
/// Fields
/// ------
/// - `forward_model`: the simulator.
/// - `param_names` / `priors`: free parameters in the order supplied.
/// - `directions`: unit-norm directions with their constraints.
/// - `direction_names`: canonical names of the directions as written.
/// - `prior_weights`: one weight per direction.
/// - `n_dim`: output length of the forward model.
pub struct Trainer<M> {
    forward_model: M,
    param_names: Vec<String>,
    priors: Vec<Box<dyn ParamPrior>>,
    directions: Vec<DirectionSpec>,
    direction_names: Vec<String>,
    prior_weights: Vec<f64>,
    n_dim: usize,
}

impl<M: ForwardModel> Trainer<M> {
    /// Validate a training configuration.
    ///
    /// Parameters
    /// ----------
    /// - `forward_model`: simulator producing at least two outputs.
    /// - `priors`: `(name, prior)` per free parameter.
    /// - `directions`: change directions; `None` means one two-sided unit
    ///   direction per parameter.
    /// - `prior_weights`: a single weight or one per direction.
    ///
    /// Errors
    /// ------
    /// - [`ChangeError::NoParameters`] / [`ChangeError::DuplicateParameter`]
    ///   for an empty or repeated prior list.
    /// - [`ChangeError::EmptyModel`] for an empty direction list.
    /// - [`ChangeError::UnknownParameter`] when a direction names a
    ///   parameter without a prior.
    /// - [`ChangeError::Direction`] for an all-zero direction.
    /// - [`ChangeError::PriorWeightMismatch`] / [`ChangeError::InvalidPriorWeight`].
    /// - [`ChangeError::ForwardModel`] when the model fails at the prior
    ///   means, [`ChangeError::ForwardModelDimension`] when it returns
    ///   fewer than two values.
    pub fn new(
        forward_model: M, priors: Vec<(String, Box<dyn ParamPrior>)>,
        directions: Option<Vec<DirectionSpec>>, prior_weights: PriorWeights,
    ) -> ChangeResult<Self> {
        if priors.is_empty() {
            return Err(ChangeError::NoParameters);
        }
        let mut seen = BTreeSet::new();
        for (name, _) in &priors {
            if !seen.insert(name.as_str()) {
                return Err(ChangeError::DuplicateParameter { name: name.clone() });
            }
        }
        let (param_names, priors): (Vec<String>, Vec<Box<dyn ParamPrior>>) =
            priors.into_iter().unzip();

        let specs = directions
            .unwrap_or_else(|| param_names.iter().map(|p| DirectionSpec::unit(p)).collect());
        if specs.is_empty() {
            return Err(ChangeError::EmptyModel);
        }

        let mut directions = Vec::with_capacity(specs.len());
        let mut direction_names = Vec::with_capacity(specs.len());
        for spec in specs {
            let name = spec.vector.canonical_name();
            let is_known = |p: &&str| param_names.iter().any(|q| q.as_str() == *p);
            if let Some(unknown) = spec.vector.names().find(|p| !is_known(p)) {
                return Err(ChangeError::UnknownParameter {
                    name: unknown.to_string(),
                    direction: name,
                    available: param_names.clone(),
                });
            }
            let vector = spec.vector.normalized()?;
            directions.push(DirectionSpec::new(vector, spec.constraints));
            direction_names.push(name);
        }

        let prior_weights = match prior_weights {
            PriorWeights::Uniform(w) => vec![w; directions.len()],
            PriorWeights::PerDirection(ws) if ws.len() != directions.len() => {
                return Err(ChangeError::PriorWeightMismatch {
                    expected: directions.len(),
                    found: ws.len(),
                });
            }
            PriorWeights::PerDirection(ws) => ws,
        };
        if let Some((index, &value)) =
            prior_weights.iter().enumerate().find(|(_, w)| !(w.is_finite() && **w >= 0.0))
        {
            return Err(ChangeError::InvalidPriorWeight { index, value });
        }

        let means: ParamSet =
            param_names.iter().cloned().zip(priors.iter().map(|p| p.mean())).collect();
        let n_dim = forward_model.evaluate(&means)?.len();
        if n_dim < 2 {
            return Err(ChangeError::ForwardModelDimension { found: n_dim });
        }

        Ok(Self { forward_model, param_names, priors, directions, direction_names, prior_weights, n_dim })
    }

    /// [`Trainer::new`] with directions parsed from direction-file text
    /// (one direction per line, `#` comments allowed).
    ///
    /// # Errors
    /// Everything [`Trainer::new`] reports, plus [`ChangeError::Direction`]
    /// for text that does not parse.
    pub fn with_direction_text(
        forward_model: M, priors: Vec<(String, Box<dyn ParamPrior>)>, text: &str,
        prior_weights: PriorWeights,
    ) -> ChangeResult<Self> {
        let specs = parse_direction_specs(text)?;
        Self::new(forward_model, priors, Some(specs), prior_weights)
    }

    pub fn forward_model(&self) -> &M {
        &self.forward_model
    }

    pub fn param_names(&self) -> &[String] {
        &self.param_names
    }

    /// Unit-norm directions with their constraints.
    pub fn directions(&self) -> &[DirectionSpec] {
        &self.directions
    }

    /// Canonical direction names as written, before normalization.
    pub fn direction_names(&self) -> &[String] {
        &self.direction_names
    }

    pub fn prior_weights(&self) -> &[f64] {
        &self.prior_weights
    }

    pub fn n_dim(&self) -> usize {
        self.n_dim
    }

    /// Number of classes of the trained model: null class plus one per
    /// direction and constraint.
    pub fn n_classes(&self) -> usize {
        1 + self.directions.iter().map(|d| d.constraints.len()).sum::<usize>()
    }

    /// train: simulate, estimate local moments, and fit every direction.
    ///
    /// # Errors
    /// - [`ChangeError::InvalidOption`] for invalid options.
    /// - [`ChangeError::ForwardModel`] / [`ChangeError::ShapeMismatch`]
    ///   when a simulation fails or changes output length.
    /// - [`ChangeError::MomentEstimation`] when a local covariance cannot be
    ///   factorized.
    /// - [`ChangeError::Numeric`] when a ridge fit fails.
    pub fn train(&self, opts: &TrainOptions) -> ChangeResult<TrainOutcome> {
        self.train_with_progress(opts, None)
    }

    /// [`Trainer::train`] with a progress callback invoked once per
    /// simulated sample.
    pub fn train_with_progress(
        &self, opts: &TrainOptions, progress: Option<&dyn ProgressSink>,
    ) -> ChangeResult<TrainOutcome> {
        opts.validate()?;
        let n_samples = opts.n_samples;
        info!(
            n_samples,
            n_directions = self.directions.len(),
            n_dim = self.n_dim,
            "generating training samples"
        );

        let counter = ProgressCounter::new(progress, n_samples);
        let simulated = (0..n_samples)
            .into_par_iter()
            .map(|idx| {
                let sample = self.simulate_training_sample(idx, opts);
                counter.tick();
                sample
            })
            .collect::<ChangeResult<Vec<_>>>()?;

        let mut y1 = Array2::<f64>::zeros((n_samples, self.n_dim));
        let mut derivatives =
            vec![Array2::<f64>::zeros((n_samples, self.n_dim)); self.directions.len()];
        let mut diagnostics = Diagnostics::new();
        for (idx, sample) in simulated.into_iter().enumerate() {
            y1.row_mut(idx).assign(&sample.baseline);
            for (target, derivative) in derivatives.iter_mut().zip(&sample.derivatives) {
                target.row_mut(idx).assign(derivative);
            }
            diagnostics.extend(sample.diagnostics);
        }
        if !diagnostics.is_empty() {
            warn!(
                count = diagnostics.instability_count(),
                "derivatives are too large in some samples; something might be wrong"
            );
        }

        let k = opts.k.min(n_samples);
        info!(k, "estimating local derivative moments");
        let tree = KdTree::new(y1.clone())?;
        let neighbourhoods = tree.neighbourhoods(k);

        let mut models = Vec::with_capacity(self.n_classes() - 1);
        for (d, spec) in self.directions.iter().enumerate() {
            let name = &self.direction_names[d];
            let moments = local_moments(name, &neighbourhoods, derivatives[d].view(), opts.shrinkage)?;
            let mean_regressor = Arc::new(PolyRidge::fit(
                y1.view(),
                moments.means.view(),
                opts.poly_degree,
                opts.regularization,
            )?);
            let cov_regressor = Arc::new(PolyRidge::fit(
                y1.view(),
                moments.links.view(),
                opts.poly_degree,
                opts.regularization,
            )?);
            debug!(direction = %name, degree = opts.poly_degree, "fitted direction regressors");

            for &constraint in &spec.constraints {
                models.push(ChangeDirectionModel::new(
                    format!("{name}, {constraint}"),
                    spec.vector.clone(),
                    constraint,
                    self.prior_weights[d],
                    Arc::clone(&mean_regressor),
                    Arc::clone(&cov_regressor),
                )?);
            }
        }

        let model_name = opts
            .model_name
            .clone()
            .or_else(|| self.forward_model.name())
            .unwrap_or_else(|| UNNAMED_MODEL.to_string());
        let model = ChangeModel::new(model_name, models)?;
        info!(model = %model.model_name(), classes = ?model.class_names(), "trained change model");
        Ok(TrainOutcome { model, diagnostics })
    }

    // ---- Helper methods ----

    /// Draw one value per parameter from its prior.
    pub(crate) fn draw_params(&self, rng: &mut dyn RngCore) -> ParamSet {
        self.param_names.iter().cloned().zip(self.priors.iter().map(|p| p.sample(rng))).collect()
    }

    /// Whether every prior has positive density at `params`.
    pub(crate) fn is_admissible(&self, params: &ParamSet) -> bool {
        self.param_names
            .iter()
            .zip(&self.priors)
            .all(|(name, prior)| params.get(name).is_some_and(|&v| prior.density(v) > 0.0))
    }

    /// Forward evaluation with an output-length check.
    pub(crate) fn evaluate(&self, params: &ParamSet) -> ChangeResult<Array1<f64>> {
        let y = self.forward_model.evaluate(params)?;
        self.check_output(y)
    }

    pub(crate) fn check_output(&self, y: Array1<f64>) -> ChangeResult<Array1<f64>> {
        if y.len() != self.n_dim {
            return Err(ChangeError::ShapeMismatch {
                context: "forward model output",
                expected: self.n_dim,
                found: y.len(),
            });
        }
        Ok(y)
    }

    fn simulate_training_sample(&self, idx: usize, opts: &TrainOptions) -> ChangeResult<SimulatedSample> {
        let mut rng = StdRng::seed_from_u64(opts.seed.wrapping_add(idx as u64));
        let params = self.draw_params(&mut rng);
        let baseline = self.evaluate(&params)?;
        let threshold = DERIVATIVE_JUMP_RATIO * opts.step;

        let mut derivatives = Vec::with_capacity(self.directions.len());
        let mut diagnostics = Vec::new();
        for (d, spec) in self.directions.iter().enumerate() {
            let changed = self.evaluate(&perturb(&params, &spec.vector, opts.step))?;
            let jump = &changed - &baseline;
            let max_jump = jump.iter().fold(0.0_f64, |acc, v| acc.max(v.abs()));
            if max_jump > threshold {
                warn!(sample = idx, direction = %self.direction_names[d], max_jump, threshold, "derivative is too large");
                diagnostics.push(Diagnostic::DerivativeInstability {
                    sample: idx,
                    direction: self.direction_names[d].clone(),
                    max_jump,
                    threshold,
                });
            }
            derivatives.push(jump / opts.step);
        }
        Ok(SimulatedSample { baseline, derivatives, diagnostics })
    }
}

/// Move every parameter by `amount` along `direction`, then take absolute
/// values.
pub(crate) fn perturb(params: &ParamSet, direction: &DirectionVector, amount: f64) -> ParamSet {
    params.iter().map(|(name, v)| (name.clone(), (v + direction.weight(name) * amount).abs())).collect()
}

struct SimulatedSample {
    baseline: Array1<f64>,
    derivatives: Vec<Array1<f64>>,
    diagnostics: Vec<Diagnostic>,
}
