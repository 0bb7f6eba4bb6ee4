//! The inference engine: burst-wise ensemble sampling over a catalog.
//!
//! One engine run processes a table of objects sequentially. Per object it
//! spawns an ensemble of walkers (independent NUTS chains over the same
//! posterior), each confined to its own worker thread for the chain's whole
//! life: the sampler state is not `Send`, so a chain can never migrate
//! between threads. The coordinator advances all walkers one burst at a time
//! over channels, appends every burst to the object's chain file, and checks
//! the split rank-normalized R-hat after each burst. Sampling stops early
//! once the convergence score stays under the tolerance for the configured
//! number of consecutive bursts; hitting the iteration ceiling instead is
//! reported as `Exhausted`, never as an error. A failure confined to one
//! object (a bad covariance, an unsampleable prior) skips that object with a
//! warning and the run continues.

use std::{
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use crossbeam::channel;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use nuts_rs::{Chain, CpuLogpFunc, CpuMath, DiagGradNutsSettings, Settings};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::dist::eff::SamplePolicy;
use crate::engine::convergence::{split_rank_rhat, summarize, ParamSummary};
use crate::engine::data::{load_observations, Observation, ObservableColumns};
use crate::engine::error::EngineError;
use crate::engine::output::{write_summary, ChainWriter, SummaryRow};
use crate::model::posterior::{Posterior1d, Posterior3d};
use crate::model::prior::Prior;

/// Tunable knobs for one engine run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Prior over the true distance, shared by all objects.
    pub prior: Prior,
    /// Number of walkers (parallel chains) per object.
    pub n_walkers: usize,
    /// Post-warmup draws per walker between convergence checks.
    pub burst_size: u64,
    /// Warmup (tuning) draws per walker, discarded.
    pub warmup: u64,
    /// Maximum NUTS tree depth.
    pub maxdepth: u64,
    /// Base random seed; walkers and objects derive their streams from it.
    pub seed: u64,
    /// Bursts the score must stay under tolerance before stopping early.
    pub consecutive_bursts: usize,
    /// Optional wall-clock ceiling for the whole run, checked between bursts.
    pub wall_clock_limit: Option<Duration>,
    /// Inverse-CDF policy for radial-law prior draws.
    pub sample_policy: SamplePolicy,
}

impl EngineConfig {
    /// Configuration with the standard defaults for the given prior.
    pub fn new(prior: Prior) -> Self {
        Self {
            prior,
            n_walkers: 5,
            burst_size: 100,
            warmup: 500,
            maxdepth: 8,
            seed: 0,
            consecutive_bursts: 2,
            wall_clock_limit: None,
            sample_policy: SamplePolicy::default(),
        }
    }
}

/// Engine lifecycle; operations check the state they require.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    Created,
    DataLoaded,
    Finished,
}

impl EngineState {
    fn name(self) -> &'static str {
        match self {
            EngineState::Created => "Created",
            EngineState::DataLoaded => "DataLoaded",
            EngineState::Finished => "Finished",
        }
    }
}

/// How one object's sampling ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectOutcome {
    /// Convergence score stayed under tolerance.
    Converged,
    /// Iteration or wall-clock budget ran out; draws were still persisted.
    Exhausted,
    /// A per-object failure; nothing was persisted for this object.
    Failed(String),
}

/// Result of sampling one object.
#[derive(Debug, Clone)]
pub struct ObjectReport {
    pub id: String,
    pub outcome: ObjectOutcome,
    /// Post-warmup draws per walker actually taken.
    pub iterations: u64,
    /// Final convergence score (max split R-hat minus one).
    pub score: f64,
    /// Per-parameter posterior summaries, in parameter order.
    pub summaries: Vec<(String, ParamSummary)>,
    pub chain_path: Option<PathBuf>,
}

/// Drives inference over a loaded observation table.
pub struct InferenceEngine {
    config: EngineConfig,
    columns: ObservableColumns,
    observations: Vec<Observation>,
    reports: Vec<ObjectReport>,
    state: EngineState,
}

impl InferenceEngine {
    pub fn new(config: EngineConfig, columns: ObservableColumns) -> Self {
        Self {
            config,
            columns,
            observations: Vec::new(),
            reports: Vec::new(),
            state: EngineState::Created,
        }
    }

    /// Loads the observation table; returns the number of objects.
    pub fn load_data(
        &mut self,
        path: impl AsRef<Path>,
        row_limit: Option<usize>,
    ) -> Result<usize, EngineError> {
        self.observations = load_observations(path.as_ref(), &self.columns, row_limit)?;
        self.state = EngineState::DataLoaded;
        info!(
            "loaded {} objects from {}",
            self.observations.len(),
            path.as_ref().display()
        );
        Ok(self.observations.len())
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn reports(&self) -> &[ObjectReport] {
        &self.reports
    }

    /// Samples every loaded object, persisting chains under `output_dir`.
    ///
    /// `tolerance` bounds the convergence score (max split R-hat minus one);
    /// `max_iterations` caps post-warmup draws per walker.
    pub fn run(
        &mut self,
        max_iterations: u64,
        output_dir: impl AsRef<Path>,
        tolerance: f64,
    ) -> Result<&[ObjectReport], EngineError> {
        if self.state != EngineState::DataLoaded {
            return Err(EngineError::InvalidState {
                expected: "DataLoaded",
                actual: self.state.name(),
            });
        }
        let output_dir = output_dir.as_ref();
        std::fs::create_dir_all(output_dir)?;

        let started = Instant::now();
        let deadline = self.config.wall_clock_limit.map(|limit| started + limit);

        let bar = ProgressBar::new(self.observations.len() as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("Objects: [{bar:40.cyan/blue}] {pos}/{len} | {elapsed}/{eta} | {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("█▉▊▋▌▍▎▏ "),
        );

        self.reports.clear();
        let observations = self.observations.clone();
        for (index, observation) in observations.iter().enumerate() {
            bar.set_message(observation.id.clone());

            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(
                    "wall-clock limit reached before object '{}': skipping remaining objects",
                    observation.id
                );
                self.reports.push(ObjectReport {
                    id: observation.id.clone(),
                    outcome: ObjectOutcome::Exhausted,
                    iterations: 0,
                    score: f64::INFINITY,
                    summaries: Vec::new(),
                    chain_path: None,
                });
                bar.inc(1);
                continue;
            }

            let report = match self.run_object(index, observation, output_dir, max_iterations, tolerance, deadline)
            {
                Ok(report) => report,
                Err(EngineError::Io(e)) => return Err(EngineError::Io(e)),
                Err(e) => {
                    warn!("object '{}' failed and is skipped: {e}", observation.id);
                    ObjectReport {
                        id: observation.id.clone(),
                        outcome: ObjectOutcome::Failed(e.to_string()),
                        iterations: 0,
                        score: f64::INFINITY,
                        summaries: Vec::new(),
                        chain_path: None,
                    }
                }
            };
            self.reports.push(report);
            bar.inc(1);
        }
        bar.finish_with_message("done");

        let converged = self
            .reports
            .iter()
            .filter(|r| r.outcome == ObjectOutcome::Converged)
            .count();
        info!(
            "run finished: {converged}/{} objects converged in {:.1?}",
            self.reports.len(),
            started.elapsed()
        );

        self.state = EngineState::Finished;
        Ok(&self.reports)
    }

    /// Writes the per-object summary CSV from the last run's reports.
    pub fn save_statistics(&self, path: impl AsRef<Path>) -> Result<(), EngineError> {
        if self.state != EngineState::Finished {
            return Err(EngineError::InvalidState {
                expected: "Finished",
                actual: self.state.name(),
            });
        }
        let rows: Vec<SummaryRow> = self
            .reports
            .iter()
            .flat_map(|report| {
                report.summaries.iter().map(|(parameter, summary)| SummaryRow {
                    id: report.id.clone(),
                    parameter: parameter.clone(),
                    summary: summary.clone(),
                })
            })
            .collect();
        write_summary(path, &rows)
    }

    fn run_object(
        &self,
        index: usize,
        observation: &Observation,
        output_dir: &Path,
        max_iterations: u64,
        tolerance: f64,
        deadline: Option<Instant>,
    ) -> Result<ObjectReport, EngineError> {
        // Seed stream: one lane per object, one sub-lane per walker.
        let object_seed = self.config.seed.wrapping_add((index as u64) << 16);
        let mut rng = ChaCha8Rng::seed_from_u64(object_seed);

        match &observation.sky {
            None => {
                let posterior = Posterior1d::new(
                    self.config.prior.clone(),
                    observation.parallax,
                    observation.parallax_error,
                )?;
                let inits = (0..self.config.n_walkers)
                    .map(|_| Ok(vec![self.initial_distance(&mut rng)?]))
                    .collect::<Result<Vec<_>, EngineError>>()?;
                self.sample_object(
                    observation,
                    posterior,
                    &["distance"],
                    inits,
                    object_seed,
                    output_dir,
                    max_iterations,
                    tolerance,
                    deadline,
                )
            }
            Some(sky) => {
                let posterior = Posterior3d::new(
                    self.config.prior.clone(),
                    (sky.ra, sky.dec, observation.parallax),
                    (sky.ra_error, sky.dec_error, observation.parallax_error),
                    (sky.ra_dec_corr, sky.ra_parallax_corr, sky.dec_parallax_corr),
                )?;
                let inits = (0..self.config.n_walkers)
                    .map(|_| {
                        let ra = sky.ra + rng.random_range(-1.0..1.0) * sky.ra_error;
                        let dec = sky.dec + rng.random_range(-1.0..1.0) * sky.dec_error;
                        Ok(vec![ra, dec, self.initial_distance(&mut rng)?])
                    })
                    .collect::<Result<Vec<_>, EngineError>>()?;
                self.sample_object(
                    observation,
                    posterior,
                    &["ra", "dec", "distance"],
                    inits,
                    object_seed,
                    output_dir,
                    max_iterations,
                    tolerance,
                    deadline,
                )
            }
        }
    }

    /// Draws a strictly positive starting distance near the prior mass.
    fn initial_distance(&self, rng: &mut ChaCha8Rng) -> Result<f64, EngineError> {
        for _ in 0..64 {
            let d = self.config.prior.draw_with(rng, self.config.sample_policy)?;
            if d > 0.0 && self.config.prior.ln_pdf(d).is_finite() {
                return Ok(d);
            }
        }
        // Heavy-tailed priors can keep landing outside the support; the
        // reference point is always valid.
        Ok(self.config.prior.reference().max(f64::MIN_POSITIVE))
    }

    #[allow(clippy::too_many_arguments)]
    fn sample_object<F>(
        &self,
        observation: &Observation,
        posterior: F,
        parameters: &[&str],
        inits: Vec<Vec<f64>>,
        object_seed: u64,
        output_dir: &Path,
        max_iterations: u64,
        tolerance: f64,
        deadline: Option<Instant>,
    ) -> Result<ObjectReport, EngineError>
    where
        F: CpuLogpFunc + Clone + Send,
    {
        let settings = DiagGradNutsSettings {
            num_tune: self.config.warmup,
            num_draws: max_iterations,
            maxdepth: self.config.maxdepth,
            seed: object_seed,
            num_chains: self.config.n_walkers,
            store_gradient: false,
            store_unconstrained: false,
            ..Default::default()
        };
        let n_walkers = inits.len();
        let warmup = self.config.warmup;

        thread::scope(|scope| {
            let (result_tx, results) = channel::unbounded();
            let mut commands = Vec::with_capacity(n_walkers);
            for (walker, init) in inits.into_iter().enumerate() {
                let (cmd_tx, cmd_rx) = channel::unbounded::<u64>();
                commands.push(cmd_tx);
                let posterior = posterior.clone();
                let result_tx = result_tx.clone();
                let seed = object_seed.wrapping_add(1 + walker as u64);
                scope.spawn(move || {
                    drive_walker(walker, posterior, init, settings, seed, warmup, cmd_rx, result_tx)
                });
            }
            drop(result_tx);

            // Every walker reports once after init and tuning, so a failed
            // start surfaces before the chain file exists.
            for _ in 0..n_walkers {
                let (_, message) = results.recv().map_err(|_| walker_lost())?;
                message.map_err(EngineError::Sampler)?;
            }

            let mut writer = ChainWriter::create(output_dir, &observation.id, parameters)?;

            // Post-warmup draws kept in memory per walker for the diagnostics.
            let mut kept: Vec<Vec<Vec<f64>>> = vec![Vec::new(); n_walkers];
            let mut completed: u64 = 0;
            let mut divergences: usize = 0;
            let mut under_tolerance = 0usize;
            let mut score = f64::INFINITY;
            let mut outcome = ObjectOutcome::Exhausted;

            let mut burst_loop = |writer: &mut ChainWriter,
                              kept: &mut Vec<Vec<Vec<f64>>>,
                              completed: &mut u64,
                              divergences: &mut usize,
                              score: &mut f64,
                              outcome: &mut ObjectOutcome|
             -> Result<(), EngineError> {
                while *completed < max_iterations {
                    let burst_len = self.config.burst_size.min(max_iterations - *completed);
                    for command in &commands {
                        command.send(burst_len).map_err(|_| walker_lost())?;
                    }

                    // Receiving one message per walker is the burst barrier:
                    // no walker gets the next command until every walker has
                    // finished this burst.
                    let mut burst_draws: Vec<Vec<Vec<f64>>> = vec![Vec::new(); n_walkers];
                    for _ in 0..n_walkers {
                        let (walker, message) = results.recv().map_err(|_| walker_lost())?;
                        let (draws, diverging) = message.map_err(EngineError::Sampler)?;
                        *divergences += diverging;
                        burst_draws[walker] = draws;
                    }

                    writer.append_burst(*completed as usize, &burst_draws)?;
                    for (walker, draws) in burst_draws.into_iter().enumerate() {
                        kept[walker].extend(draws);
                    }
                    *completed += burst_len;

                    *score = self.convergence_score(kept, parameters.len());
                    debug!(
                        "object '{}': {completed}/{max_iterations} draws, score {score:.4}",
                        observation.id
                    );

                    if *score < tolerance {
                        under_tolerance += 1;
                        if under_tolerance >= self.config.consecutive_bursts {
                            *outcome = ObjectOutcome::Converged;
                            return Ok(());
                        }
                    } else {
                        under_tolerance = 0;
                    }

                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        warn!(
                            "object '{}': wall-clock limit reached after {completed} draws",
                            observation.id
                        );
                        return Ok(());
                    }
                }
                Ok(())
            };

            if let Err(e) = burst_loop(
                &mut writer,
                &mut kept,
                &mut completed,
                &mut divergences,
                &mut score,
                &mut outcome,
            ) {
                // A failed object leaves nothing behind on disk.
                let path = writer.path().to_path_buf();
                drop(writer);
                let _ = std::fs::remove_file(&path);
                return Err(e);
            }

            if outcome == ObjectOutcome::Exhausted {
                warn!(
                    "object '{}' did not converge within {completed} draws (score {score:.4}); \
                     persisting draws anyway",
                    observation.id
                );
            }
            if divergences > 0 {
                debug!("object '{}': {divergences} divergent transitions", observation.id);
            }

            let summaries = parameters
                .iter()
                .enumerate()
                .map(|(p, name)| {
                    let per_walker: Vec<Vec<f64>> = kept
                        .iter()
                        .map(|draws| draws.iter().map(|d| d[p]).collect())
                        .collect();
                    (name.to_string(), summarize(&per_walker))
                })
                .collect();

            Ok(ObjectReport {
                id: observation.id.clone(),
                outcome,
                iterations: completed,
                score,
                summaries,
                chain_path: Some(writer.path().to_path_buf()),
            })
        })
    }

    /// Max split rank-normalized R-hat across parameters, minus one.
    fn convergence_score(&self, kept: &[Vec<Vec<f64>>], n_params: usize) -> f64 {
        (0..n_params)
            .map(|p| {
                let per_walker: Vec<Vec<f64>> = kept
                    .iter()
                    .map(|draws| draws.iter().map(|d| d[p]).collect())
                    .collect();
                split_rank_rhat(&per_walker) - 1.0
            })
            .fold(f64::NEG_INFINITY, f64::max)
    }
}

/// One burst of draws from one walker, or the error that ended its chain.
type WalkerMessage = Result<(Vec<Vec<f64>>, usize), String>;

fn walker_lost() -> EngineError {
    EngineError::Sampler("walker thread terminated unexpectedly".to_string())
}

/// Runs one walker's chain from init through its last burst, entirely on the
/// calling thread.
///
/// The chain's sampler state is not `Send`, so it is created here and never
/// leaves. Protocol: one message after init and tuning (empty draws on
/// success), then one message per burst command; any chain error is reported
/// once and the worker exits.
#[allow(clippy::too_many_arguments)]
fn drive_walker<F>(
    walker: usize,
    posterior: F,
    init: Vec<f64>,
    settings: DiagGradNutsSettings,
    seed: u64,
    warmup: u64,
    commands: channel::Receiver<u64>,
    results: channel::Sender<(usize, WalkerMessage)>,
) where
    F: CpuLogpFunc,
{
    let math = CpuMath::new(posterior);
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut chain = settings.new_chain(walker as u64, math, &mut rng);

    if let Err(e) = chain.set_position(&init) {
        let _ = results.send((walker, Err(format!("walker {walker} init: {e}"))));
        return;
    }
    for _ in 0..warmup {
        if let Err(e) = chain.draw() {
            let _ = results.send((walker, Err(format!("walker {walker} warmup: {e}"))));
            return;
        }
    }
    if results.send((walker, Ok((Vec::new(), 0)))).is_err() {
        return;
    }

    while let Ok(burst_len) = commands.recv() {
        let mut draws = Vec::with_capacity(burst_len as usize);
        let mut diverging = 0usize;
        for _ in 0..burst_len {
            match chain.draw() {
                Ok((position, progress)) => {
                    if progress.diverging {
                        diverging += 1;
                    }
                    draws.push(position.into_vec());
                }
                Err(e) => {
                    let _ = results.send((walker, Err(format!("walker {walker}: {e}"))));
                    return;
                }
            }
        }
        if results.send((walker, Ok((draws, diverging)))).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::EngineError;
    use std::io::Write;

    #[test]
    fn single_object_sampling_round_trip() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "ID,parallax,parallax_error").unwrap();
        writeln!(file, "star_1,4.0,0.1").unwrap();
        file.flush().unwrap();

        let mut config = EngineConfig::new(Prior::uniform(300.0, 250.0).unwrap());
        config.n_walkers = 2;
        config.warmup = 200;
        config.burst_size = 50;
        let mut engine = InferenceEngine::new(config, ObservableColumns::one_dimensional());
        engine.load_data(file.path(), None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let reports = engine.run(200, dir.path(), 0.2).unwrap();
        assert_eq!(reports.len(), 1);
        assert!(!matches!(reports[0].outcome, ObjectOutcome::Failed(_)));
        assert!(reports[0].iterations > 0);
        assert_eq!(reports[0].summaries.len(), 1);
        assert!(reports[0].summaries[0].1.mean.is_finite());
        assert!(dir.path().join("chain_star_1.csv").exists());
    }

    #[test]
    fn zero_iteration_ceiling_reports_exhausted_without_draws() {
        let mut file = tempfile::Builder::new().suffix(".csv").tempfile().unwrap();
        writeln!(file, "ID,parallax,parallax_error").unwrap();
        writeln!(file, "star_1,4.0,0.1").unwrap();
        file.flush().unwrap();

        let mut config = EngineConfig::new(Prior::uniform(300.0, 250.0).unwrap());
        config.n_walkers = 2;
        config.warmup = 50;
        let mut engine = InferenceEngine::new(config, ObservableColumns::one_dimensional());
        engine.load_data(file.path(), None).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let reports = engine.run(0, dir.path(), 0.05).unwrap();
        assert_eq!(reports[0].outcome, ObjectOutcome::Exhausted);
        assert_eq!(reports[0].iterations, 0);
        assert!(reports[0].summaries[0].1.mean.is_nan());
    }

    #[test]
    fn run_before_load_is_a_state_error() {
        let config = EngineConfig::new(Prior::gaussian(300.0, 20.0).unwrap());
        let mut engine = InferenceEngine::new(config, ObservableColumns::one_dimensional());
        let dir = tempfile::tempdir().unwrap();
        let err = engine.run(100, dir.path(), 0.05).unwrap_err();
        assert!(matches!(
            err,
            EngineError::InvalidState {
                expected: "DataLoaded",
                actual: "Created",
            }
        ));
    }

    #[test]
    fn save_statistics_requires_a_finished_run() {
        let config = EngineConfig::new(Prior::gaussian(300.0, 20.0).unwrap());
        let engine = InferenceEngine::new(config, ObservableColumns::one_dimensional());
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            engine.save_statistics(dir.path().join("statistics.csv")),
            Err(EngineError::InvalidState { .. })
        ));
    }

    #[test]
    fn config_defaults_are_sane() {
        let config = EngineConfig::new(Prior::uniform(300.0, 100.0).unwrap());
        assert_eq!(config.n_walkers, 5);
        assert!(config.burst_size > 0);
        assert!(config.warmup > 0);
        assert!(config.wall_clock_limit.is_none());
    }
}
