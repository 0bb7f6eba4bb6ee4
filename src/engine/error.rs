use thiserror::Error;

use crate::dist::error::DistError;
use crate::model::error::ConfigError;

/// Errors raised while loading observation tables.
#[derive(Debug, Error)]
pub enum DataError {
    /// A configured column is absent from the input table.
    #[error("column '{0}' not found in observation table")]
    MissingColumn(String),

    /// A numeric field was null or failed to parse as a float.
    #[error("null or non-numeric value in column '{column}' at row {row}")]
    InvalidValue { column: String, row: usize },

    /// The table parsed but contains no rows.
    #[error("observation table '{0}' is empty")]
    EmptyTable(String),

    #[error("failed to read observation table: {0}")]
    Csv(#[from] polars::error::PolarsError),

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that abort an inference run.
///
/// Non-convergence is deliberately not represented here: a run that exhausts
/// its iteration budget persists what it has and reports the outcome through
/// [`crate::engine::run::ObjectOutcome`].
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Distribution(#[from] DistError),

    #[error("sampler failure: {0}")]
    Sampler(String),

    /// An operation was requested in the wrong engine state
    /// (e.g. `run` before `load_data`).
    #[error("engine is {actual}, operation requires {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("IO operation failed: {0}")]
    Io(#[from] std::io::Error),
}
