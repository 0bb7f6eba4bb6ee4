//! Special-function helpers for the radial distribution.
//!
//! The normalization constant and CDF of the radial density law are closed
//! forms built from a Gamma-function ratio and the Gauss hypergeometric
//! function ₂F₁. The hypergeometric term always appears through the integral
//!
//! ```text
//! I(s) = ∫₀ˢ (1 + t²)^(−γ/2) dt = s · ₂F₁(½, γ/2; 3/2; −s²)
//! ```
//!
//! which [`radial_integral`] evaluates for any real `s`: a power series for
//! small arguments and a tail expansion for large ones, so no numerical
//! integration is ever required.

use statrs::function::gamma::gamma;

/// Relative tolerance for hypergeometric series truncation.
const SERIES_TOL: f64 = 1e-14;
/// Hard cap on series terms; hit only for arguments far outside the
/// regimes the distribution code routes here.
const SERIES_MAX_TERMS: usize = 10_000;

/// Gauss hypergeometric series ₂F₁(a, b; c; z) for |z| < 1.
fn gauss_series(a: f64, b: f64, c: f64, z: f64) -> f64 {
    debug_assert!(z.abs() < 1.0);
    let mut term = 1.0;
    let mut sum = 1.0;
    for n in 0..SERIES_MAX_TERMS {
        let nf = n as f64;
        term *= (a + nf) * (b + nf) / (c + nf) * z / (nf + 1.0);
        sum += term;
        if term.abs() <= SERIES_TOL * sum.abs() {
            break;
        }
    }
    sum
}

/// Gauss hypergeometric function ₂F₁(a, b; c; z) on the non-positive real axis.
///
/// Uses the defining series for `z ∈ (−1, 0]` and the Pfaff transformation
/// `₂F₁(a, b; c; z) = (1−z)^(−a) ₂F₁(a, c−b; c; z/(z−1))` for `z ≤ −1`, which
/// maps the argument back into the unit disk. Convergence of the transformed
/// series requires `b − a > 0`; both call sites here satisfy that for
/// `gamma > 1`. For very large `|z|` prefer [`radial_integral`], which uses a
/// tail expansion instead.
pub(crate) fn hyp2f1(a: f64, b: f64, c: f64, z: f64) -> f64 {
    debug_assert!(z <= 0.0, "hyp2f1 is only implemented for z <= 0");
    if z > -1.0 {
        gauss_series(a, b, c, z)
    } else {
        let w = z / (z - 1.0);
        (1.0 - z).powf(-a) * gauss_series(a, c - b, c, w)
    }
}

/// Half-line integral `∫₀^∞ (1 + t²)^(−γ/2) dt = √π Γ((γ−1)/2) / (2 Γ(γ/2))`.
///
/// Finite only for `gamma > 1`; callers validate that before reaching here.
pub(crate) fn half_line_integral(gamma_slope: f64) -> f64 {
    std::f64::consts::PI.sqrt() * gamma(0.5 * (gamma_slope - 1.0)) / (2.0 * gamma(0.5 * gamma_slope))
}

/// Evaluates `I(s) = ∫₀ˢ (1 + t²)^(−γ/2) dt` in closed form.
///
/// Odd in `s`. For `|s| ≤ 1` this is the hypergeometric series directly; for
/// `|s| > 1` it is computed as the half-line integral minus the tail
///
/// ```text
/// ∫ₛ^∞ (1+t²)^(−γ/2) dt = s^(1−γ)/(γ−1) · ₂F₁(γ/2, (γ−1)/2; (γ+1)/2; −1/s²)
/// ```
///
/// whose series argument lies in `(−1, 0)` and converges rapidly, keeping the
/// evaluation stable even for the extreme offsets astrometric data produce.
pub(crate) fn radial_integral(s: f64, gamma_slope: f64) -> f64 {
    let a = s.abs();
    let value = if a <= 1.0 {
        a * hyp2f1(0.5, 0.5 * gamma_slope, 1.5, -a * a)
    } else {
        let tail = a.powf(1.0 - gamma_slope) / (gamma_slope - 1.0)
            * gauss_series(
                0.5 * gamma_slope,
                0.5 * (gamma_slope - 1.0),
                0.5 * (gamma_slope + 1.0),
                -1.0 / (a * a),
            );
        half_line_integral(gamma_slope) - tail
    };
    value.copysign(s)
}
