//! Bracketed scalar root finding for inverse-CDF sampling.
//!
//! Bisection with a secant-step acceleration: every iteration keeps a valid
//! bracket, so the search is guaranteed to terminate within the iteration
//! budget instead of looping on a pathological function.

/// Iteration budget; the bracket halves at least every other step, so this is
/// far more than enough for f64 resolution.
const MAX_ITER: usize = 200;

/// Outcome of a failed bracketed solve, with the endpoint values needed to
/// reconstruct the call.
#[derive(Debug, Clone, Copy)]
pub(crate) struct BracketFailure {
    pub lo: f64,
    pub hi: f64,
    pub f_lo: f64,
    pub f_hi: f64,
}

/// Finds `x` in `[lo, hi]` with `f(x) = 0`, assuming `f` is continuous and
/// changes sign over the bracket.
///
/// Returns a [`BracketFailure`] if the endpoints do not straddle a root, or
/// if the iteration budget runs out before the bracket shrinks below `tol`;
/// the failure carries the final bracket so the caller can report how far
/// the search got.
pub(crate) fn find_root<F>(f: F, lo: f64, hi: f64, tol: f64) -> Result<f64, BracketFailure>
where
    F: Fn(f64) -> f64,
{
    let (mut lo, mut hi) = (lo, hi);
    let mut f_lo = f(lo);
    let mut f_hi = f(hi);

    if f_lo == 0.0 {
        return Ok(lo);
    }
    if f_hi == 0.0 {
        return Ok(hi);
    }
    if f_lo.signum() == f_hi.signum() || !f_lo.is_finite() || !f_hi.is_finite() {
        return Err(BracketFailure { lo, hi, f_lo, f_hi });
    }

    let mut x = 0.5 * (lo + hi);
    for _ in 0..MAX_ITER {
        // Secant proposal, falling back to bisection whenever it leaves
        // the bracket or the slope degenerates.
        let secant = lo - f_lo * (hi - lo) / (f_hi - f_lo);
        x = if secant.is_finite() && secant > lo && secant < hi {
            secant
        } else {
            0.5 * (lo + hi)
        };

        let fx = f(x);
        if fx == 0.0 || hi - lo <= tol * (1.0 + x.abs()) {
            return Ok(x);
        }
        if fx.signum() == f_lo.signum() {
            lo = x;
            f_lo = fx;
        } else {
            hi = x;
            f_hi = fx;
        }
    }
    Err(BracketFailure { lo, hi, f_lo, f_hi })
}
