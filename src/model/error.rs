use nuts_rs::LogpError;
use thiserror::Error;

use crate::dist::error::DistError;

/// Errors raised while assembling priors and posterior models.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The prior specification string did not match the expected
    /// `Name(param1, param2, ...)` format.
    #[error("invalid prior specification '{input}': {reason}")]
    PriorFormat { input: String, reason: String },

    /// The prior family name is not one of the supported distributions.
    #[error("unknown prior family '{family}'; available: {available}")]
    UnknownPrior { family: String, available: String },

    /// Wrong number of hyperparameters for the named prior family.
    #[error("{family} prior requires exactly {expected} parameters, got {got}")]
    PriorParamCount {
        family: &'static str,
        expected: usize,
        got: usize,
    },

    /// A hyperparameter violates its constraint (e.g. non-positive scale).
    #[error("invalid prior hyperparameter: {0}")]
    PriorParam(String),

    /// An observation uncertainty must be strictly positive.
    #[error("observation uncertainty {name}={value} must be positive")]
    NonPositiveUncertainty { name: &'static str, value: f64 },

    /// A correlation coefficient left the interval [-1, 1].
    #[error("correlation coefficient {name}={value} outside [-1, 1]")]
    CorrelationOutOfRange { name: &'static str, value: f64 },

    /// The assembled observation covariance admits no Cholesky factorization.
    #[error("observation covariance matrix is not positive definite")]
    CovarianceNotPositiveDefinite,

    #[error(transparent)]
    Distribution(#[from] DistError),
}

/// Errors surfaced from inside a log-posterior evaluation.
///
/// The sampler distinguishes recoverable failures (the proposal is rejected
/// and sampling continues) from unrecoverable ones (the chain aborts). A
/// position outside the posterior support is the normal, recoverable case.
#[derive(Debug, Error)]
pub enum PosteriorError {
    /// The proposed position lies outside the posterior support
    /// (e.g. a non-positive distance).
    #[error("position outside posterior support")]
    OutOfSupport,

    /// The log-density or its gradient evaluated to a non-finite value.
    #[error("non-finite log-posterior at proposed position")]
    NonFinite,
}

impl LogpError for PosteriorError {
    fn is_recoverable(&self) -> bool {
        match self {
            PosteriorError::OutOfSupport => true,
            PosteriorError::NonFinite => true,
        }
    }
}
