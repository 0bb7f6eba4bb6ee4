use thiserror::Error;

/// Error types for distribution construction and random-variate generation.
#[derive(Debug, Error)]
pub enum DistError {
    /// A distribution parameter violates its mathematical constraint.
    ///
    /// Raised at construction time and never silently defaulted. The constraint
    /// string states the condition that was violated (e.g. `"rc > 0"`).
    #[error("invalid distribution parameter {name}={value}: requires {constraint}")]
    Domain {
        name: &'static str,
        value: f64,
        constraint: &'static str,
    },

    /// The inverse-CDF root finder failed to locate a quantile inside its bracket.
    ///
    /// Carries the offending uniform variate and the CDF values at both bracket
    /// endpoints so the failure can be reproduced and diagnosed.
    #[error(
        "quantile solve failed for u={u}: cdf({bracket_lo})={cdf_lo}, cdf({bracket_hi})={cdf_hi}"
    )]
    Convergence {
        u: f64,
        bracket_lo: f64,
        bracket_hi: f64,
        cdf_lo: f64,
        cdf_hi: f64,
    },
}
