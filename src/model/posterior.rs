//! Per-object posterior models over the true distance.
//!
//! Both models implement the `nuts_rs::CpuLogpFunc` seam: dimensionality plus
//! a joint log-density with analytic gradient. Out-of-support positions are
//! reported as recoverable sampler errors, so the proposal is rejected and
//! the chain keeps running; values are never clamped into the support.
//!
//! The parallax convention is the astrometric one: a star at distance `d`
//! parsecs has true parallax `1000 / d` milliarcseconds.

use nalgebra::{Cholesky, Const, Matrix3, Vector3};
use nuts_rs::CpuLogpFunc;

use crate::model::error::{ConfigError, PosteriorError};
use crate::model::prior::Prior;

/// Milliarcseconds of parallax for a star at 1 pc.
const MAS_PER_PC: f64 = 1000.0;

const LN_TWO_PI: f64 = 1.837_877_066_409_345_3;

/// Posterior over a single latent distance given one parallax measurement.
///
/// Likelihood: `parallax_obs ~ Normal(1000 / d, parallax_error²)` with the
/// configured prior on `d`.
#[derive(Debug, Clone)]
pub struct Posterior1d {
    prior: Prior,
    parallax: f64,
    parallax_error: f64,
}

impl Posterior1d {
    /// Builds the posterior for one object, validating the uncertainty.
    pub fn new(prior: Prior, parallax: f64, parallax_error: f64) -> Result<Self, ConfigError> {
        if !(parallax_error > 0.0) {
            return Err(ConfigError::NonPositiveUncertainty {
                name: "parallax_error",
                value: parallax_error,
            });
        }
        Ok(Self {
            prior,
            parallax,
            parallax_error,
        })
    }

    pub fn prior(&self) -> &Prior {
        &self.prior
    }
}

impl CpuLogpFunc for Posterior1d {
    type LogpError = PosteriorError;
    type TransformParams = ();

    fn dim(&self) -> usize {
        1
    }

    fn logp(&mut self, position: &[f64], grad: &mut [f64]) -> Result<f64, Self::LogpError> {
        let d = position[0];
        if d <= 0.0 {
            return Err(PosteriorError::OutOfSupport);
        }
        let prior_lp = self.prior.ln_pdf(d);
        if prior_lp == f64::NEG_INFINITY {
            return Err(PosteriorError::OutOfSupport);
        }

        let sigma = self.parallax_error;
        let resid = self.parallax - MAS_PER_PC / d;
        let like = -0.5 * (resid / sigma).powi(2) - sigma.ln() - 0.5 * LN_TWO_PI;

        let logp = like + prior_lp;
        if !logp.is_finite() {
            return Err(PosteriorError::NonFinite);
        }

        // d(resid)/dd = 1000 / d^2, so the likelihood pulls the distance
        // toward 1000 / parallax_obs.
        grad[0] = -resid * MAS_PER_PC / (d * d * sigma * sigma) + self.prior.ln_pdf_grad(d);
        if !grad[0].is_finite() {
            return Err(PosteriorError::NonFinite);
        }
        Ok(logp)
    }
}

/// Posterior over sky position and distance given correlated astrometry.
///
/// Latents are `(ra, dec, d)` in degrees and parsecs. The observed vector
/// `(ra_obs, dec_obs, parallax_obs)` is modeled as a trivariate normal
/// centered on `(ra, dec, 1000/d)` with the full covariance assembled from
/// the per-axis uncertainties and the three correlation coefficients. The
/// Cholesky factorization is computed once at construction; a covariance
/// that does not factor is a configuration error, not a sampling error.
///
/// Sky coordinates carry flat priors; the distance prior is the configured
/// one, shared with the 1D model.
#[derive(Debug, Clone)]
pub struct Posterior3d {
    prior: Prior,
    observed: Vector3<f64>,
    chol: Cholesky<f64, Const<3>>,
    log_norm: f64,
}

impl Posterior3d {
    /// Builds the posterior from one astrometric observation.
    ///
    /// `uncertainties` are `(ra_error, dec_error, parallax_error)` and
    /// `correlations` are `(ra_dec_corr, ra_parallax_corr, dec_parallax_corr)`.
    pub fn new(
        prior: Prior,
        observed: (f64, f64, f64),
        uncertainties: (f64, f64, f64),
        correlations: (f64, f64, f64),
    ) -> Result<Self, ConfigError> {
        let (sd_ra, sd_dec, sd_plx) = uncertainties;
        for (name, value) in [
            ("ra_error", sd_ra),
            ("dec_error", sd_dec),
            ("parallax_error", sd_plx),
        ] {
            if !(value > 0.0) {
                return Err(ConfigError::NonPositiveUncertainty { name, value });
            }
        }
        let (r_ra_dec, r_ra_plx, r_dec_plx) = correlations;
        for (name, value) in [
            ("ra_dec_corr", r_ra_dec),
            ("ra_parallax_corr", r_ra_plx),
            ("dec_parallax_corr", r_dec_plx),
        ] {
            if !(-1.0..=1.0).contains(&value) || value.is_nan() {
                return Err(ConfigError::CorrelationOutOfRange { name, value });
            }
        }

        let cov = Matrix3::new(
            sd_ra * sd_ra,
            r_ra_dec * sd_ra * sd_dec,
            r_ra_plx * sd_ra * sd_plx,
            r_ra_dec * sd_ra * sd_dec,
            sd_dec * sd_dec,
            r_dec_plx * sd_dec * sd_plx,
            r_ra_plx * sd_ra * sd_plx,
            r_dec_plx * sd_dec * sd_plx,
            sd_plx * sd_plx,
        );
        let chol = Cholesky::new(cov).ok_or(ConfigError::CovarianceNotPositiveDefinite)?;
        // ln det Σ = 2 Σ ln L_ii
        let ln_det: f64 = chol.l_dirty().diagonal().iter().map(|l| l.ln()).sum::<f64>() * 2.0;
        let log_norm = -0.5 * (3.0 * LN_TWO_PI + ln_det);

        Ok(Self {
            prior,
            observed: Vector3::new(observed.0, observed.1, observed.2),
            chol,
            log_norm,
        })
    }

    pub fn prior(&self) -> &Prior {
        &self.prior
    }
}

impl CpuLogpFunc for Posterior3d {
    type LogpError = PosteriorError;
    type TransformParams = ();

    fn dim(&self) -> usize {
        3
    }

    fn logp(&mut self, position: &[f64], grad: &mut [f64]) -> Result<f64, Self::LogpError> {
        let (ra, dec, d) = (position[0], position[1], position[2]);
        if d <= 0.0 {
            return Err(PosteriorError::OutOfSupport);
        }
        let prior_lp = self.prior.ln_pdf(d);
        if prior_lp == f64::NEG_INFINITY {
            return Err(PosteriorError::OutOfSupport);
        }

        let predicted = Vector3::new(ra, dec, MAS_PER_PC / d);
        let resid = self.observed - predicted;
        // g = Σ⁻¹ (y − μ)
        let g = self.chol.solve(&resid);
        let like = -0.5 * resid.dot(&g) + self.log_norm;

        let logp = like + prior_lp;
        if !logp.is_finite() {
            return Err(PosteriorError::NonFinite);
        }

        // ∂logp/∂θ = gᵀ ∂μ/∂θ; μ depends on d only through 1000/d.
        grad[0] = g[0];
        grad[1] = g[1];
        grad[2] = -g[2] * MAS_PER_PC / (d * d) + self.prior.ln_pdf_grad(d);
        if grad.iter().any(|v| !v.is_finite()) {
            return Err(PosteriorError::NonFinite);
        }
        Ok(logp)
    }
}
