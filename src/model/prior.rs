//! Prior distributions over the true distance.
//!
//! Priors are a closed, tagged enum rather than a string-keyed registry:
//! every variant carries a fully validated distribution, so an unknown name
//! or a bad hyperparameter fails at configuration time, never mid-sampling.
//!
//! Four families are supported, matching the astrometric use cases:
//!
//! - `Uniform(loc, scale)`: flat over `[loc - scale, loc + scale]`
//! - `Gaussian(loc, scale)`: normal with mean `loc`, standard deviation `scale`
//! - `Cauchy(loc, scale)`: heavy-tailed with location `loc` and scale `scale`
//! - `EFF(r0, rc, gamma)`: the radial density law of [`crate::dist`]
//!
//! Each variant supplies the log-density, its gradient with respect to the
//! distance (needed by the gradient-based sampler), a draw method for walker
//! initialization, and a reference point used to scatter initial positions.
//!
//! The string format (`"Gaussian(300, 20)"`, case-insensitive, scientific
//! notation accepted) is the configuration-file entry point via `FromStr`.

use std::str::FromStr;

use rand::Rng;
use regex::Regex;
use statrs::distribution::{Cauchy, Continuous, Normal, Uniform};
use statrs::statistics::{Distribution as _, Max, Min};

use crate::dist::diffable::EffLogDensity;
use crate::dist::error::DistError;
use crate::model::error::ConfigError;

/// A validated prior over the true distance in parsecs.
#[derive(Debug, Clone, PartialEq)]
pub enum Prior {
    /// Flat over `[loc - scale, loc + scale]`.
    Uniform(Uniform),
    /// Normal with mean `loc` and standard deviation `scale`.
    Gaussian(Normal),
    /// Cauchy with location `loc` and scale `scale`.
    Cauchy(Cauchy),
    /// The radial density law with parameters `r0`, `rc`, `gamma`.
    Eff(EffLogDensity),
}

impl Prior {
    /// Family names accepted by the string parser.
    pub const AVAILABLE_PRIORS: [&str; 4] = ["uniform", "gaussian", "cauchy", "eff"];

    /// Flat prior over `[loc - scale, loc + scale]`.
    pub fn uniform(loc: f64, scale: f64) -> Result<Self, ConfigError> {
        validate_scale(scale)?;
        let uniform = Uniform::new(loc - scale, loc + scale)
            .map_err(|e| ConfigError::PriorParam(e.to_string()))?;
        Ok(Self::Uniform(uniform))
    }

    /// Gaussian prior with mean `loc` and standard deviation `scale`.
    pub fn gaussian(loc: f64, scale: f64) -> Result<Self, ConfigError> {
        validate_scale(scale)?;
        let normal =
            Normal::new(loc, scale).map_err(|e| ConfigError::PriorParam(e.to_string()))?;
        Ok(Self::Gaussian(normal))
    }

    /// Cauchy prior with location `loc` and scale `scale`.
    pub fn cauchy(loc: f64, scale: f64) -> Result<Self, ConfigError> {
        validate_scale(scale)?;
        let cauchy =
            Cauchy::new(loc, scale).map_err(|e| ConfigError::PriorParam(e.to_string()))?;
        Ok(Self::Cauchy(cauchy))
    }

    /// Radial density-law prior.
    pub fn eff(r0: f64, rc: f64, gamma: f64) -> Result<Self, ConfigError> {
        Ok(Self::Eff(EffLogDensity::new(r0, rc, gamma)?))
    }

    /// Log-density of the prior at distance `d`.
    ///
    /// `f64::NEG_INFINITY` outside the support; the posterior turns that into
    /// a rejected proposal.
    pub fn ln_pdf(&self, d: f64) -> f64 {
        match self {
            Prior::Uniform(dist) => dist.ln_pdf(d),
            Prior::Gaussian(dist) => dist.ln_pdf(d),
            Prior::Cauchy(dist) => dist.ln_pdf(d),
            Prior::Eff(dist) => dist.ln_pdf(d),
        }
    }

    /// Gradient of the log-density with respect to `d`.
    pub fn ln_pdf_grad(&self, d: f64) -> f64 {
        match self {
            Prior::Uniform(_) => 0.0,
            Prior::Gaussian(dist) => {
                -(d - dist.mean().unwrap()) / dist.variance().unwrap()
            }
            Prior::Cauchy(dist) => {
                let offset = d - dist.location();
                let scale = dist.scale();
                -2.0 * offset / (offset * offset + scale * scale)
            }
            Prior::Eff(dist) => dist.ln_pdf_grad(d),
        }
    }

    /// Reference point used to scatter walker starting positions.
    pub fn reference(&self) -> f64 {
        match self {
            Prior::Uniform(dist) => 0.5 * (dist.min() + dist.max()),
            Prior::Gaussian(dist) => dist.mean().unwrap(),
            Prior::Cauchy(dist) => dist.location(),
            Prior::Eff(dist) => dist.r0(),
        }
    }

    /// Draws a single distance from the prior.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64, DistError> {
        self.draw_with(rng, crate::dist::eff::SamplePolicy::default())
    }

    /// Draws a single distance, threading the inverse-CDF sampling policy
    /// through to the radial-law prior. Other families ignore the policy.
    pub fn draw_with<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        policy: crate::dist::eff::SamplePolicy,
    ) -> Result<f64, DistError> {
        match self {
            Prior::Uniform(dist) => Ok(rng.random_range(dist.min()..dist.max())),
            Prior::Gaussian(dist) => {
                let (mean, sd) = (dist.mean().unwrap(), dist.std_dev().unwrap());
                let normal = rand_distr::Normal::new(mean, sd).map_err(|_| scale_domain(sd))?;
                Ok(rng.sample(normal))
            }
            Prior::Cauchy(dist) => {
                let cauchy = rand_distr::Cauchy::new(dist.location(), dist.scale())
                    .map_err(|_| scale_domain(dist.scale()))?;
                Ok(rng.sample(cauchy))
            }
            Prior::Eff(dist) => dist.draw_with(rng, policy),
        }
    }
}

fn validate_scale(scale: f64) -> Result<(), ConfigError> {
    if scale > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::PriorParam(format!(
            "scale={scale} must be positive"
        )))
    }
}

// Only reachable if a validated scale was later corrupted; kept so draw()
// propagates instead of panicking.
fn scale_domain(value: f64) -> DistError {
    DistError::Domain {
        name: "scale",
        value,
        constraint: "scale > 0",
    }
}

impl FromStr for Prior {
    type Err = ConfigError;

    /// Parses `"Family(param1, param2, ...)"` into a validated prior.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let paren = Regex::new(r"^([a-zA-Z]+)\s*\(\s*([^)]*)\s*\)$")
            .map_err(|e| ConfigError::PriorFormat {
                input: s.to_string(),
                reason: e.to_string(),
            })?;

        let captures = paren.captures(s).ok_or_else(|| ConfigError::PriorFormat {
            input: s.to_string(),
            reason: "expected 'Family(param1, param2, ...)'".to_string(),
        })?;

        let family = captures[1].to_lowercase();
        let params: Vec<f64> = captures[2]
            .split(',')
            .filter(|p| !p.trim().is_empty())
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|e| ConfigError::PriorFormat {
                input: s.to_string(),
                reason: e.to_string(),
            })?;

        match family.as_str() {
            "uniform" | "u" => {
                expect_params("Uniform", &params, 2)?;
                Self::uniform(params[0], params[1])
            }
            "gaussian" | "normal" | "g" | "n" => {
                expect_params("Gaussian", &params, 2)?;
                Self::gaussian(params[0], params[1])
            }
            "cauchy" | "c" => {
                expect_params("Cauchy", &params, 2)?;
                Self::cauchy(params[0], params[1])
            }
            "eff" => {
                expect_params("EFF", &params, 3)?;
                Self::eff(params[0], params[1], params[2])
            }
            _ => Err(ConfigError::UnknownPrior {
                family,
                available: Self::AVAILABLE_PRIORS.join(", "),
            }),
        }
    }
}

fn expect_params(family: &'static str, params: &[f64], expected: usize) -> Result<(), ConfigError> {
    if params.len() != expected {
        return Err(ConfigError::PriorParamCount {
            family,
            expected,
            got: params.len(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn parses_all_families() {
        let prior: Prior = "Uniform(300, 80)".parse().unwrap();
        match prior {
            Prior::Uniform(u) => {
                assert_eq!(u.min(), 220.0);
                assert_eq!(u.max(), 380.0);
            }
            other => panic!("expected Uniform, got {other:?}"),
        }

        let prior: Prior = "Gaussian(300, 20)".parse().unwrap();
        match prior {
            Prior::Gaussian(n) => {
                assert_eq!(n.mean().unwrap(), 300.0);
                assert_eq!(n.std_dev().unwrap(), 20.0);
            }
            other => panic!("expected Gaussian, got {other:?}"),
        }

        let prior: Prior = "cauchy(300, 20)".parse().unwrap();
        assert!(matches!(prior, Prior::Cauchy(_)));

        let prior: Prior = "EFF(300, 17, 2.5)".parse().unwrap();
        match prior {
            Prior::Eff(eff) => {
                assert_eq!(eff.r0(), 300.0);
                assert_eq!(eff.rc(), 17.0);
                assert_eq!(eff.gamma(), 2.5);
            }
            other => panic!("expected EFF, got {other:?}"),
        }
    }

    #[test]
    fn parses_aliases_and_scientific_notation() {
        assert!(matches!("N(0, 1e2)".parse::<Prior>(), Ok(Prior::Gaussian(_))));
        assert!(matches!("u(1.5e2, 50)".parse::<Prior>(), Ok(Prior::Uniform(_))));
    }

    #[test]
    fn rejects_bad_specifications() {
        match "King(300, 20)".parse::<Prior>().unwrap_err() {
            ConfigError::UnknownPrior { family, available } => {
                assert_eq!(family, "king");
                for name in Prior::AVAILABLE_PRIORS {
                    assert!(available.contains(name), "'{name}' missing from '{available}'");
                }
            }
            other => panic!("expected UnknownPrior, got {other:?}"),
        }
        assert!(matches!(
            "Gaussian(300)".parse::<Prior>(),
            Err(ConfigError::PriorParamCount { expected: 2, got: 1, .. })
        ));
        assert!(matches!(
            "Gaussian[300, 20]".parse::<Prior>(),
            Err(ConfigError::PriorFormat { .. })
        ));
        assert!(matches!(
            "Gaussian(300, -20)".parse::<Prior>(),
            Err(ConfigError::PriorParam(_))
        ));
        assert!(matches!(
            "EFF(300, 17, 0.5)".parse::<Prior>(),
            Err(ConfigError::Distribution(_))
        ));
    }

    #[test]
    fn gradients_match_finite_differences() {
        let priors = [
            Prior::gaussian(300.0, 20.0).unwrap(),
            Prior::cauchy(300.0, 20.0).unwrap(),
            Prior::eff(300.0, 17.0, 2.5).unwrap(),
        ];
        for prior in &priors {
            for d in [250.0, 300.0, 360.0] {
                let h = 1e-4;
                let numeric = (prior.ln_pdf(d + h) - prior.ln_pdf(d - h)) / (2.0 * h);
                assert_relative_eq!(prior.ln_pdf_grad(d), numeric, max_relative = 1e-5);
            }
        }
    }

    #[test]
    fn uniform_gradient_is_flat() {
        let prior = Prior::uniform(300.0, 80.0).unwrap();
        assert_eq!(prior.ln_pdf_grad(250.0), 0.0);
        assert_eq!(prior.ln_pdf_grad(350.0), 0.0);
    }

    #[test]
    fn reference_points_sit_at_the_center() {
        assert_eq!(Prior::uniform(300.0, 80.0).unwrap().reference(), 300.0);
        assert_eq!(Prior::gaussian(300.0, 20.0).unwrap().reference(), 300.0);
        assert_eq!(Prior::cauchy(300.0, 20.0).unwrap().reference(), 300.0);
        assert_eq!(Prior::eff(300.0, 17.0, 2.5).unwrap().reference(), 300.0);
    }

    #[test]
    fn draws_land_in_the_support() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let uniform = Prior::uniform(300.0, 80.0).unwrap();
        for _ in 0..100 {
            let d = uniform.draw(&mut rng).unwrap();
            assert!((220.0..380.0).contains(&d));
        }
        let eff = Prior::eff(300.0, 17.0, 2.5).unwrap();
        for _ in 0..20 {
            assert!(eff.draw(&mut rng).unwrap() >= 0.0);
        }
    }
}
