//! Incremental chain persistence and the per-object summary artifact.
//!
//! Chain files are plain CSV, one per object, written append-only through a
//! buffered handle that is flushed after every burst: a reader tailing the
//! file mid-run sees complete rows only, never a torn line. Row layout is
//! `iteration,walker,<param...>`, so draws from all walkers interleave in one
//! file and the analysis side can regroup them by the `walker` column.

use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
};

use itertools::Itertools;
use polars::prelude::*;

use crate::engine::convergence::ParamSummary;
use crate::engine::error::{DataError, EngineError};

/// Append-only CSV writer for one object's chains.
pub struct ChainWriter {
    path: PathBuf,
    file: BufWriter<File>,
    n_params: usize,
}

impl ChainWriter {
    /// Creates `<dir>/chain_<object_id>.csv` with a header row.
    ///
    /// The directory is created if needed. An existing file for the same
    /// object is truncated: a new run replaces, never silently extends,
    /// a previous one.
    pub fn create(
        dir: impl AsRef<Path>,
        object_id: &str,
        parameters: &[&str],
    ) -> Result<Self, EngineError> {
        std::fs::create_dir_all(dir.as_ref())?;
        let path = dir.as_ref().join(format!("chain_{object_id}.csv"));
        let mut file = BufWriter::new(File::create(&path)?);
        writeln!(file, "iteration,walker,{}", parameters.join(","))?;
        file.flush()?;
        Ok(Self {
            path,
            file,
            n_params: parameters.len(),
        })
    }

    /// Reopens an existing chain file for appending, e.g. after the writer
    /// was dropped between bursts.
    pub fn reopen(path: impl Into<PathBuf>, n_params: usize) -> Result<Self, EngineError> {
        let path = path.into();
        let file = BufWriter::new(OpenOptions::new().append(true).open(&path)?);
        Ok(Self {
            path,
            file,
            n_params,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends one burst of draws and flushes.
    ///
    /// `burst[walker]` holds that walker's draws for this burst, each of
    /// length `n_params`; `start_iteration` is the global index of the first
    /// draw in the burst.
    pub fn append_burst(
        &mut self,
        start_iteration: usize,
        burst: &[Vec<Vec<f64>>],
    ) -> Result<(), EngineError> {
        for (walker, draws) in burst.iter().enumerate() {
            for (offset, draw) in draws.iter().enumerate() {
                debug_assert_eq!(draw.len(), self.n_params);
                let values = draw.iter().join(",");
                writeln!(self.file, "{},{walker},{values}", start_iteration + offset)?;
            }
        }
        self.file.flush()?;
        Ok(())
    }
}

/// Reads a chain file back into a DataFrame.
pub fn read_chain(path: impl AsRef<Path>) -> Result<DataFrame, DataError> {
    let df = CsvReadOptions::default()
        .try_into_reader_with_file_path(Some(path.as_ref().to_path_buf()))?
        .finish()?;
    Ok(df)
}

/// One row of the per-object summary table.
#[derive(Debug, Clone)]
pub struct SummaryRow {
    pub id: String,
    pub parameter: String,
    pub summary: ParamSummary,
}

/// Writes the summary CSV: one row per object and parameter, keyed by the
/// input identifier.
pub fn write_summary(path: impl AsRef<Path>, rows: &[SummaryRow]) -> Result<(), EngineError> {
    let ids: Vec<&str> = rows.iter().map(|r| r.id.as_str()).collect();
    let parameters: Vec<&str> = rows.iter().map(|r| r.parameter.as_str()).collect();
    let mut df = DataFrame::new(vec![
        Series::new("id", ids),
        Series::new("parameter", parameters),
        Series::new("mean", rows.iter().map(|r| r.summary.mean).collect::<Vec<_>>()),
        Series::new("sd", rows.iter().map(|r| r.summary.std).collect::<Vec<_>>()),
        Series::new(
            "median",
            rows.iter().map(|r| r.summary.median).collect::<Vec<_>>(),
        ),
        Series::new("rhat", rows.iter().map(|r| r.summary.rhat).collect::<Vec<_>>()),
        Series::new("ess", rows.iter().map(|r| r.summary.ess).collect::<Vec<_>>()),
        Series::new("mcse", rows.iter().map(|r| r.summary.mcse).collect::<Vec<_>>()),
        Series::new(
            "hdi_low",
            rows.iter().map(|r| r.summary.hdi_low).collect::<Vec<_>>(),
        ),
        Series::new(
            "hdi_high",
            rows.iter().map(|r| r.summary.hdi_high).collect::<Vec<_>>(),
        ),
    ])
    .map_err(DataError::Csv)?;

    let mut file = File::create(path.as_ref()).map_err(EngineError::Io)?;
    CsvWriter::new(&mut file)
        .finish(&mut df)
        .map_err(DataError::Csv)?;
    Ok(())
}
