//! Bayesian inference of stellar distances from astrometric parallax.
//!
//! This library provides:
//! - A radial density-law distance distribution with closed-form PDF, CDF
//!   and inverse-CDF sampling
//! - A gradient-compatible log-density for use inside a NUTS sampler
//! - Per-object posterior models over distance (parallax-only) and over
//!   sky position plus distance (correlated astrometry)
//! - An inference engine that drives ensembles of walkers in bursts with
//!   convergence monitoring and incremental chain persistence

#![warn(unused_imports)]

/// Commonly used types re-exported for convenience
pub mod prelude {
    pub use crate::dist::diffable::EffLogDensity;
    pub use crate::dist::eff::{Eff, SamplePolicy};
    pub use crate::dist::error::DistError;
    pub use crate::engine::convergence::ParamSummary;
    pub use crate::engine::data::{load_observations, ObservableColumns, Observation};
    pub use crate::engine::error::{DataError, EngineError};
    pub use crate::engine::run::{EngineConfig, InferenceEngine, ObjectOutcome, ObjectReport};
    pub use crate::model::error::{ConfigError, PosteriorError};
    pub use crate::model::posterior::{Posterior1d, Posterior3d};
    pub use crate::model::prior::Prior;
}

/// The radial distance distribution and its numerical underpinnings
pub mod dist {
    /// Gradient-compatible log-density
    pub mod diffable;
    /// The distribution itself: PDF, CDF, inverse-CDF sampling
    pub mod eff;
    pub mod error;
    /// Bracketed root finding for CDF inversion
    pub(crate) mod solve;
    /// Hypergeometric and Gamma-function helpers
    pub(crate) mod special;
}

/// Priors and per-object posterior models
pub mod model {
    pub mod error;
    /// Posterior log-densities with analytic gradients
    pub mod posterior;
    /// Distance priors: Uniform, Gaussian, Cauchy, and the radial law
    pub mod prior;
}

/// The inference engine: data loading, sampling, diagnostics, persistence
pub mod engine {
    /// Split rank-normalized R-hat, ESS, and posterior summaries
    pub mod convergence;
    /// Observation tables
    pub mod data;
    pub mod error;
    /// Chain files and the summary artifact
    pub mod output;
    /// Burst-wise ensemble sampling over a catalog
    pub mod run;
}
