//! Error types for loading, reprojecting and plotting datasets.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised while converting between coordinate reference systems.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProjectionError {
    #[error("{0} CRS is undefined")]
    Undefined(&'static str),

    #[error("unsupported CRS: {0}")]
    Unsupported(String),

    #[error("CRS mismatch: {0} vs {1}")]
    CrsMismatch(String, String),

    #[error("datum shift from {0} to {1} is not supported")]
    DatumShift(String, String),

    #[error("coordinate ({x}, {y}) has no finite image in the target CRS")]
    NonFinite { x: f64, y: f64 },
}

/// Main error type for the analysis.
#[derive(Error, Debug)]
pub enum GisError {
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    #[error("failed to parse {}: {reason}", path.display())]
    Parse { path: PathBuf, reason: String },

    #[error(transparent)]
    Projection(#[from] ProjectionError),

    #[error("column '{column}' not found (available: {})", available.join(", "))]
    ColumnNotFound {
        column: String,
        available: Vec<String>,
    },

    #[error("render error: {0}")]
    Render(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl GisError {
    pub(crate) fn parse(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        GisError::Parse {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type alias for analysis operations.
pub type Result<T> = std::result::Result<T, GisError>;
