//! bench_change: Bayesian estimation of directional change in
//! multi-dimensional measurements.
//!
//! Purpose
//! -------
//! Decide, for every sample of a batch, which of a set of hypothesised
//! parameter changes best explains an observed signal change, or whether
//! no change happened at all. A forward model of the measurement process
//! is simulated once to learn how each change direction moves the signal;
//! the resulting [`model::ChangeModel`] then scores batches of observations
//! without further simulation.
//!
//! Key behaviors
//! -------------
//! - [`direction`]: change directions such as `a - 0.5*b, positive`, their
//!   text grammar, and sign constraints.
//! - [`training`]: the forward-model and prior interfaces, the
//!   [`training::Trainer`] (simulation, k-nearest-neighbour moment
//!   estimation, ridge regression), and synthetic test samples.
//! - [`model`]: per-direction models, batch inference with posterior
//!   probabilities and magnitude peaks, persistence, and evaluation.
//! - [`regression`]: polynomial features and ridge regression.
//! - [`numerics`]: linear algebra helpers, mode and range finding, and
//!   adaptive quadrature.
//!
//! Invariants & assumptions
//! ------------------------
//! - Class 0 is always "no change"; classes `1..` follow the direction
//!   order and, within a direction, its constraint order.
//! - Trained models are immutable and shared read-only across worker
//!   threads.
//! - Per-sample numerical failures during inference never abort a batch;
//!   they become sentinel scores plus [`model::Diagnostic`]s.
//!
//! Conventions
//! -----------
//! - Batch data uses `ndarray`: `y` and `Δy` are `n_samples × n_dim`,
//!   noise covariances are `n_samples × n_dim × n_dim`.
//! - Logging goes through `tracing`; the crate never installs a
//!   subscriber.
//!
//! Downstream usage
//! ----------------
//! ```ignore
//! use bench_change::prelude::*;
//!
//! let trainer = Trainer::with_direction_text(model, priors, "a\nb, positive", PriorWeights::default())?;
//! let trained = trainer.train(&TrainOptions::default())?.model;
//! trained.save("model.json")?;
//! let inference = ChangeModel::load("model.json")?
//!     .predict(y.view(), dy.view(), sigma_n.view(), &InferenceOptions::default())?;
//! ```

pub mod direction;
pub mod model;
pub mod numerics;
pub mod regression;
pub mod training;

/// Common imports for training and applying change models.
pub mod prelude {
    pub use crate::direction::{DirectionSpec, DirectionVector, DomainConstraint};
    pub use crate::model::{
        ChangeError, ChangeModel, ChangeResult, Diagnostic, Inference, InferenceOptions,
        ProgressSink, confusion_matrix, performance_measures,
    };
    pub use crate::training::{
        ForwardModel, ParamPrior, ParamSet, PriorWeights, StatrsPrior, TestSampleOptions,
        TrainOptions, Trainer,
    };
}
