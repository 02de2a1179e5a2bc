//! Error types for SDB

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for SDB operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A raster or sample file could not be read or decoded.
    #[error("cannot ingest {}: {reason}", path.display())]
    Ingestion { path: PathBuf, reason: String },

    /// A sample file has an inconsistent column structure.
    #[error("parse error in {} at line {line}: {reason}", path.display())]
    Parse {
        path: PathBuf,
        line: u64,
        reason: String,
    },

    /// Selected columns do not match the raster, or a column is missing.
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: String,
    },

    /// A regression backend failed while fitting or predicting.
    #[error("{stage} failed: {reason}")]
    Fit { stage: &'static str, reason: String },

    /// The output raster or report could not be written.
    #[error("cannot write {}: {reason}", path.display())]
    Output { path: PathBuf, reason: String },

    #[error("Unsupported output format: {0}")]
    UnsupportedFormat(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    #[error("Invalid raster dimensions: {width}x{height}x{bands}")]
    InvalidDimensions {
        width: usize,
        height: usize,
        bands: usize,
    },

    #[error("Index out of bounds: ({row}, {col}) in raster of size ({rows}, {cols})")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    #[error("GDAL error: {0}")]
    #[cfg(feature = "gdal")]
    Gdal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for an [`Error::Ingestion`] on `path`.
    pub fn ingestion(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Ingestion {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for an [`Error::Output`] on `path`.
    pub fn output(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Output {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Shorthand for an [`Error::InvalidParameter`].
    pub fn invalid_parameter(
        name: &'static str,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        Error::InvalidParameter {
            name,
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(feature = "gdal")]
impl From<gdal::errors::GdalError> for Error {
    fn from(e: gdal::errors::GdalError) -> Self {
        Error::Gdal(e.to_string())
    }
}

/// Result type alias for SDB operations
pub type Result<T> = std::result::Result<T, Error>;
