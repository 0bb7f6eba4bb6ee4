//! Observation tables: per-object astrometry loaded from CSV.
//!
//! Input files follow the Gaia archive convention: one row per source with
//! the parallax (and optionally sky position) measurements and their formal
//! uncertainties. Column names are configurable through
//! [`ObservableColumns`]; the two defaults reproduce the standard 1D and 3D
//! column sets.

use std::path::Path;

use polars::prelude::*;

use crate::engine::error::DataError;

/// Sky-position observables for the 3D model, all angles in degrees and
/// uncertainties in the catalog units.
#[derive(Debug, Clone, PartialEq)]
pub struct SkyObservables {
    pub ra: f64,
    pub dec: f64,
    pub ra_error: f64,
    pub dec_error: f64,
    pub ra_dec_corr: f64,
    pub ra_parallax_corr: f64,
    pub dec_parallax_corr: f64,
}

/// One astrometric source: identifier, parallax in mas, and optionally the
/// sky-position block for the 3D model.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub id: String,
    pub parallax: f64,
    pub parallax_error: f64,
    pub sky: Option<SkyObservables>,
}

/// Column names for the sky-position block of a 3D table.
#[derive(Debug, Clone)]
pub struct SkyColumns {
    pub ra: String,
    pub dec: String,
    pub ra_error: String,
    pub dec_error: String,
    pub ra_dec_corr: String,
    pub ra_parallax_corr: String,
    pub dec_parallax_corr: String,
}

/// Maps the observation table's columns onto the model observables.
#[derive(Debug, Clone)]
pub struct ObservableColumns {
    pub id: String,
    pub parallax: String,
    pub parallax_error: String,
    /// Present for 3D tables, absent for parallax-only tables.
    pub sky: Option<SkyColumns>,
}

impl ObservableColumns {
    /// The standard parallax-only column set: `ID, parallax, parallax_error`.
    pub fn one_dimensional() -> Self {
        Self {
            id: "ID".to_string(),
            parallax: "parallax".to_string(),
            parallax_error: "parallax_error".to_string(),
            sky: None,
        }
    }

    /// The standard Gaia-style 3D column set keyed by `source_id`.
    pub fn three_dimensional() -> Self {
        Self {
            id: "source_id".to_string(),
            parallax: "parallax".to_string(),
            parallax_error: "parallax_error".to_string(),
            sky: Some(SkyColumns {
                ra: "ra".to_string(),
                dec: "dec".to_string(),
                ra_error: "ra_error".to_string(),
                dec_error: "dec_error".to_string(),
                ra_dec_corr: "ra_dec_corr".to_string(),
                ra_parallax_corr: "ra_parallax_corr".to_string(),
                dec_parallax_corr: "dec_parallax_corr".to_string(),
            }),
        }
    }
}

/// Loads observations from a CSV file.
///
/// `row_limit` caps the number of rows read (the whole table when `None`).
/// Missing columns, null fields, and empty tables are reported as
/// [`DataError`] with the offending column and row.
pub fn load_observations(
    path: impl AsRef<Path>,
    columns: &ObservableColumns,
    row_limit: Option<usize>,
) -> Result<Vec<Observation>, DataError> {
    let path = path.as_ref();
    let df = CsvReadOptions::default()
        .with_n_rows(row_limit)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    if df.height() == 0 {
        return Err(DataError::EmptyTable(path.display().to_string()));
    }

    let ids = string_column(&df, &columns.id)?;
    let parallax = float_column(&df, &columns.parallax)?;
    let parallax_error = float_column(&df, &columns.parallax_error)?;

    let sky_columns = match &columns.sky {
        Some(sky) => Some([
            float_column(&df, &sky.ra)?,
            float_column(&df, &sky.dec)?,
            float_column(&df, &sky.ra_error)?,
            float_column(&df, &sky.dec_error)?,
            float_column(&df, &sky.ra_dec_corr)?,
            float_column(&df, &sky.ra_parallax_corr)?,
            float_column(&df, &sky.dec_parallax_corr)?,
        ]),
        None => None,
    };

    let mut observations = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        let sky = sky_columns.as_ref().map(|cols| SkyObservables {
            ra: cols[0][row],
            dec: cols[1][row],
            ra_error: cols[2][row],
            dec_error: cols[3][row],
            ra_dec_corr: cols[4][row],
            ra_parallax_corr: cols[5][row],
            dec_parallax_corr: cols[6][row],
        });
        observations.push(Observation {
            id: ids[row].clone(),
            parallax: parallax[row],
            parallax_error: parallax_error[row],
            sky,
        });
    }
    Ok(observations)
}

/// Extracts a column as strings; integer source identifiers are cast.
fn string_column(df: &DataFrame, name: &str) -> Result<Vec<String>, DataError> {
    let series = df
        .column(name)
        .map_err(|_| DataError::MissingColumn(name.to_string()))?
        .cast(&DataType::String)?;
    series
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.map(|s| s.to_string()).ok_or(DataError::InvalidValue {
                column: name.to_string(),
                row,
            })
        })
        .collect()
}

/// Extracts a numeric column as f64, rejecting nulls.
fn float_column(df: &DataFrame, name: &str) -> Result<Vec<f64>, DataError> {
    let series = df
        .column(name)
        .map_err(|_| DataError::MissingColumn(name.to_string()))?
        .cast(&DataType::Float64)?;
    series
        .f64()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| {
            value.ok_or(DataError::InvalidValue {
                column: name.to_string(),
                row,
            })
        })
        .collect()
}
