//! Convergence monitoring and posterior summaries over walker chains.
//!
//! The convergence criterion is the split rank-normalized R-hat of Vehtari
//! et al. (2021): each walker chain is split in half, all draws are replaced
//! by pooled normal scores, and the classic Gelman-Rubin statistic is
//! computed over the resulting sequences. Pooling the ranks across sequences
//! is what lets the statistic see between-chain location differences; the
//! rank transform makes it robust to the heavy-tailed posteriors that
//! low-significance parallaxes produce.
//!
//! Effective sample size uses the autocorrelation method with initial
//! positive sequence truncation, on the same rank-normalized sequences.

use statrs::function::erf::erf_inv;

/// Floor on within-sequence variance; below this the sequences are constant
/// and the statistic degenerates.
const VARIANCE_FLOOR: f64 = 1e-12;

/// Posterior summary statistics for one parameter across all walkers.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamSummary {
    pub mean: f64,
    pub median: f64,
    pub std: f64,
    pub rhat: f64,
    pub ess: f64,
    pub mcse: f64,
    /// 95% highest-density interval.
    pub hdi_low: f64,
    pub hdi_high: f64,
}

/// Split rank-normalized R-hat across walker chains.
///
/// Returns `f64::INFINITY` when the chains are too short to split (fewer
/// than four draws per walker), so early bursts always read as unconverged.
pub fn split_rank_rhat(chains: &[Vec<f64>]) -> f64 {
    let Some(sequences) = split_in_half(chains) else {
        return f64::INFINITY;
    };
    let normalized = pooled_rank_normalize(&sequences);
    classic_rhat(&normalized)
}

/// Effective sample size across walker chains.
///
/// Bounded above by the total draw count; short chains fall back to that
/// bound rather than produce a meaningless autocorrelation estimate.
pub fn effective_sample_size(chains: &[Vec<f64>]) -> f64 {
    let total: usize = chains.iter().map(Vec::len).sum();
    let Some(sequences) = split_in_half(chains) else {
        return total as f64;
    };
    let normalized = pooled_rank_normalize(&sequences);
    autocorrelation_ess(&normalized).min(total as f64)
}

/// Summarizes one parameter's draws across all walkers.
///
/// With no draws at all (a run whose iteration ceiling is zero) every
/// statistic is NaN and the R-hat reads as unconverged.
pub fn summarize(chains: &[Vec<f64>]) -> ParamSummary {
    let mut all: Vec<f64> = chains.iter().flatten().copied().collect();
    if all.is_empty() {
        return ParamSummary {
            mean: f64::NAN,
            median: f64::NAN,
            std: f64::NAN,
            rhat: f64::INFINITY,
            ess: 0.0,
            mcse: f64::NAN,
            hdi_low: f64::NAN,
            hdi_high: f64::NAN,
        };
    }
    let n = all.len() as f64;
    let mean = all.iter().sum::<f64>() / n;
    let var = all.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0).max(1.0);
    let std = var.sqrt();

    all.sort_by(|a, b| a.total_cmp(b));
    let median = if all.len() % 2 == 0 {
        0.5 * (all[all.len() / 2 - 1] + all[all.len() / 2])
    } else {
        all[all.len() / 2]
    };

    let rhat = split_rank_rhat(chains);
    let ess = effective_sample_size(chains);
    let mcse = if ess > 0.0 { std / ess.sqrt() } else { f64::NAN };
    let (hdi_low, hdi_high) = hdi(&all, 0.95);

    ParamSummary {
        mean,
        median,
        std,
        rhat,
        ess,
        mcse,
        hdi_low,
        hdi_high,
    }
}

/// Splits each chain in half; `None` when any half would be shorter than 2.
fn split_in_half(chains: &[Vec<f64>]) -> Option<Vec<Vec<f64>>> {
    let mut sequences = Vec::with_capacity(chains.len() * 2);
    for chain in chains {
        if chain.len() < 4 {
            return None;
        }
        let half = chain.len() / 2;
        // Drop the middle element of odd-length chains so halves match.
        sequences.push(chain[..half].to_vec());
        sequences.push(chain[chain.len() - half..].to_vec());
    }
    if sequences.len() < 2 {
        return None;
    }
    Some(sequences)
}

/// Replaces every draw with its pooled normal score
/// `Φ⁻¹((rank − 3/8) / (N + 1/4))`, ranking across all sequences at once.
fn pooled_rank_normalize(sequences: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let total: usize = sequences.iter().map(Vec::len).sum();
    let mut order: Vec<(usize, usize)> = sequences
        .iter()
        .enumerate()
        .flat_map(|(s, seq)| (0..seq.len()).map(move |i| (s, i)))
        .collect();
    order.sort_by(|&(sa, ia), &(sb, ib)| sequences[sa][ia].total_cmp(&sequences[sb][ib]));

    let mut normalized: Vec<Vec<f64>> = sequences.iter().map(|s| vec![0.0; s.len()]).collect();
    for (rank, &(s, i)) in order.iter().enumerate() {
        let p = ((rank + 1) as f64 - 0.375) / (total as f64 + 0.25);
        normalized[s][i] = std::f64::consts::SQRT_2 * erf_inv(2.0 * p - 1.0);
    }
    normalized
}

/// Classic Gelman-Rubin statistic over equal-length sequences.
fn classic_rhat(sequences: &[Vec<f64>]) -> f64 {
    let m = sequences.len() as f64;
    let n = sequences[0].len() as f64;

    let means: Vec<f64> = sequences
        .iter()
        .map(|s| s.iter().sum::<f64>() / n)
        .collect();
    let vars: Vec<f64> = sequences
        .iter()
        .zip(&means)
        .map(|(s, &mean)| s.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0))
        .collect();

    let overall = means.iter().sum::<f64>() / m;
    let b = means.iter().map(|mu| (mu - overall).powi(2)).sum::<f64>() * n / (m - 1.0);
    let w = vars.iter().sum::<f64>() / m;

    if w < VARIANCE_FLOOR {
        // Constant sequences: identical chains count as converged, any
        // spread between them as diverged.
        return if b < VARIANCE_FLOOR { 1.0 } else { f64::INFINITY };
    }

    let var_plus = (n - 1.0) / n * w + b / n;
    (var_plus / w).sqrt()
}

/// ESS from mean autocorrelation with initial-positive-sequence truncation.
fn autocorrelation_ess(sequences: &[Vec<f64>]) -> f64 {
    let m = sequences.len();
    let n = sequences[0].len();
    let total = (m * n) as f64;

    let variances: Vec<f64> = sequences
        .iter()
        .map(|s| {
            let mean = s.iter().sum::<f64>() / n as f64;
            (s.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0))
                .max(VARIANCE_FLOOR)
        })
        .collect();

    let mut rho_prev = 1.0;
    let mut gamma_sum = 0.0;
    for lag in 1..n {
        let rho = mean_autocorrelation(sequences, &variances, lag);
        if lag % 2 == 0 {
            let gamma = rho_prev + rho;
            if gamma <= 0.0 {
                break;
            }
            gamma_sum += gamma;
        }
        rho_prev = rho;
    }

    total / (1.0 + 2.0 * gamma_sum)
}

fn mean_autocorrelation(sequences: &[Vec<f64>], variances: &[f64], lag: usize) -> f64 {
    let n = sequences[0].len();
    let mut rho_sum = 0.0;
    for (seq, &variance) in sequences.iter().zip(variances) {
        let mean = seq.iter().sum::<f64>() / n as f64;
        let mut numerator = 0.0;
        for i in 0..(n - lag) {
            numerator += (seq[i] - mean) * (seq[i + lag] - mean);
        }
        rho_sum += numerator / ((n - lag) as f64 * variance);
    }
    rho_sum / sequences.len() as f64
}

/// Shortest interval containing `prob` of the mass; input must be sorted.
pub fn hdi(sorted: &[f64], prob: f64) -> (f64, f64) {
    let n = sorted.len();
    let exclude = ((1.0 - prob) * n as f64) as usize;
    let include = n - exclude;
    if include == 0 || n == 0 {
        return (f64::NAN, f64::NAN);
    }

    let mut best = (sorted[0], sorted[include - 1]);
    let mut best_width = best.1 - best.0;
    for low in 1..=exclude {
        let high = low + include - 1;
        let width = sorted[high] - sorted[low];
        if width < best_width {
            best_width = width;
            best = (sorted[low], sorted[high]);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rand_distr::{Distribution, Normal};

    fn noise_chain(rng: &mut ChaCha8Rng, mean: f64, n: usize) -> Vec<f64> {
        let normal = Normal::new(mean, 1.0).unwrap();
        (0..n).map(|_| normal.sample(rng)).collect()
    }

    #[test]
    fn identical_distributions_read_as_converged() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let chains: Vec<Vec<f64>> = (0..4).map(|_| noise_chain(&mut rng, 0.0, 500)).collect();
        let rhat = split_rank_rhat(&chains);
        assert!(rhat < 1.05, "rhat {rhat} should be near 1 for iid chains");
    }

    #[test]
    fn shifted_chains_read_as_diverged() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut chains: Vec<Vec<f64>> = (0..3).map(|_| noise_chain(&mut rng, 0.0, 500)).collect();
        chains.push(noise_chain(&mut rng, 5.0, 500));
        let rhat = split_rank_rhat(&chains);
        assert!(rhat > 1.2, "rhat {rhat} should flag the shifted chain");
    }

    #[test]
    fn trending_single_chains_read_as_diverged() {
        // First half and second half of a trending chain disagree, which
        // the split catches even with a single walker.
        let chain: Vec<f64> = (0..400).map(|i| i as f64 * 0.01).collect();
        let rhat = split_rank_rhat(&[chain]);
        assert!(rhat > 1.2, "rhat {rhat} should flag the trend");
    }

    #[test]
    fn heavy_tails_do_not_break_the_statistic() {
        // Cauchy-like draws via the tangent transform; the rank transform
        // keeps the statistic finite and near 1.
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let chains: Vec<Vec<f64>> = (0..4)
            .map(|_| {
                (0..400)
                    .map(|_| {
                        let u: f64 = rand::Rng::random_range(&mut rng, 0.01..0.99);
                        (std::f64::consts::PI * (u - 0.5)).tan()
                    })
                    .collect()
            })
            .collect();
        let rhat = split_rank_rhat(&chains);
        assert!(rhat.is_finite());
        assert!(rhat < 1.05, "rhat {rhat} should be near 1");
    }

    #[test]
    fn short_chains_are_never_converged() {
        assert_eq!(split_rank_rhat(&[vec![1.0, 2.0, 3.0]]), f64::INFINITY);
        assert_eq!(split_rank_rhat(&[]), f64::INFINITY);
    }

    #[test]
    fn ess_of_iid_draws_is_near_the_total() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let chains: Vec<Vec<f64>> = (0..4).map(|_| noise_chain(&mut rng, 0.0, 500)).collect();
        let ess = effective_sample_size(&chains);
        assert!(ess > 1000.0, "iid ess {ess} should be near 2000");
        assert!(ess <= 2000.0);
    }

    #[test]
    fn ess_of_autocorrelated_draws_is_small() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let normal = Normal::new(0.0, 0.05).unwrap();
        let chains: Vec<Vec<f64>> = (0..4)
            .map(|_| {
                let mut x = 0.0f64;
                (0..500)
                    .map(|_| {
                        x = 0.99 * x + normal.sample(&mut rng);
                        x
                    })
                    .collect()
            })
            .collect();
        let ess = effective_sample_size(&chains);
        assert!(ess < 500.0, "correlated ess {ess} should be far below 2000");
    }

    #[test]
    fn summary_of_no_draws_is_nan_not_a_panic() {
        let summary = summarize(&[]);
        assert!(summary.mean.is_nan());
        assert!(summary.median.is_nan());
        assert!(summary.hdi_low.is_nan());
        assert_eq!(summary.rhat, f64::INFINITY);
        assert_eq!(summary.ess, 0.0);

        let summary = summarize(&[Vec::new(), Vec::new()]);
        assert!(summary.mean.is_nan());
    }

    #[test]
    fn summary_statistics_match_known_values() {
        let chains = vec![
            (0..500).map(|i| i as f64).collect::<Vec<_>>(),
            (0..500).map(|i| i as f64).collect::<Vec<_>>(),
        ];
        let summary = summarize(&chains);
        assert!((summary.mean - 249.5).abs() < 1e-9);
        assert!((summary.median - 249.5).abs() < 1e-9);
        assert!(summary.hdi_low <= 13.0);
        assert!(summary.hdi_high >= 486.0);
    }

    #[test]
    fn hdi_prefers_the_dense_region() {
        // Mass packed near zero with a sparse tail.
        let mut values: Vec<f64> = (0..95).map(|i| i as f64 * 0.01).collect();
        values.extend((0..5).map(|i| 10.0 + i as f64));
        let (low, high) = hdi(&values, 0.95);
        assert!(low >= 0.0);
        assert!(high < 10.0, "hdi upper {high} should exclude the far tail");
    }
}
