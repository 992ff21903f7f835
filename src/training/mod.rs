//! training: simulation-based fitting of change models.
//!
//! Purpose
//! -------
//! Learn, for every change direction, how the expected signal change and
//! its spread depend on the baseline signal, using nothing but a forward
//! model and prior distributions over its parameters.
//!
//! Key behaviors
//! -------------
//! - [`ForwardModel`] / [`ParamPrior`]: the user-supplied simulator and
//!   priors ([`StatrsPrior`] adapts `statrs` distributions).
//! - [`Trainer::new`]: fail-fast validation of parameters, directions,
//!   prior weights, and the forward model's output length.
//! - [`Trainer::train`]: simulation, k-nearest-neighbour moment
//!   estimation ([`KdTree`], [`local_moments`]), and polynomial ridge
//!   regression, producing a [`ChangeModel`](crate::model::ChangeModel).
//! - [`Trainer::generate_test_samples`]: labelled synthetic observations
//!   for evaluating a trained model.
//!
//! Invariants & assumptions
//! ------------------------
//! - Forward models are deterministic for `evaluate` and safe to call from
//!   several threads at once.
//! - Every random stream is derived from a configured seed and the sample
//!   index.
//!
//! Testing notes
//! -------------
//! - Unit tests use small linear forward models whose derivatives are
//!   known exactly; the end-to-end pipeline is covered in `tests/`.

pub mod forward;
pub mod kdtree;
pub mod moments;
pub mod options;
pub mod test_samples;
pub mod trainer;

// ---- Re-exports (primary public surface) ----------------------------------

pub use self::forward::{ForwardModel, ParamPrior, ParamSet, StatrsPrior};
pub use self::kdtree::KdTree;
pub use self::moments::{LocalMoments, local_moments};
pub use self::options::{TestSampleOptions, TrainOptions};
pub use self::test_samples::{MAX_TEST_DRAWS, TestSamples};
pub use self::trainer::{
    DERIVATIVE_JUMP_RATIO, PriorWeights, TrainOutcome, Trainer, UNNAMED_MODEL,
};
