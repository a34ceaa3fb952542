// error.rs

//! Error types shared by the matrix primitive, the gradient code, the
//! training loop and the loaders.

use std::fmt;

use thiserror::Error;

/// Which axis of the original matrix an observation count refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    Row,
    Column,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => write!(f, "row"),
            Axis::Column => write!(f, "column"),
        }
    }
}

/// Errors raised while building, training or evaluating a factorization.
#[derive(Debug, Error)]
pub enum FactorizationError {
    /// Two matrices have incompatible shapes for the requested operation.
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: String, actual: String },

    /// Two vectors passed to a dot product differ in length.
    #[error("Vectors are not the same length: {left} vs {right}")]
    LengthMismatch { left: usize, right: usize },

    /// A coordinate or label index falls outside the matrix.
    #[error("Index ({row}, {col}) out of bounds for a {rows}x{cols} matrix")]
    IndexOutOfBounds {
        row: usize,
        col: usize,
        rows: usize,
        cols: usize,
    },

    /// A row or column of the original matrix has no observed entries, so its
    /// averaged gradient is undefined.
    #[error("No observed entries in {axis} {index}")]
    EmptyObservationSet { axis: Axis, index: usize },

    /// Bounds handed to a random fill are not a usable range.
    #[error("Invalid random range [{min}, {max})")]
    InvalidRange { min: f64, max: f64 },

    /// A construction parameter is outside its valid domain.
    #[error("Invalid parameter: {reason}")]
    InvalidParameter { reason: String },

    /// Failure reported by a matrix loader, passed through untouched.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// A telemetry hook failed (log file, plot output, ...).
    #[error("Telemetry hook failed: {reason}")]
    Telemetry { reason: String },
}

impl FactorizationError {
    pub fn dimension_mismatch<S1, S2>(expected: S1, actual: S2) -> Self
    where
        S1: fmt::Display,
        S2: fmt::Display,
    {
        Self::DimensionMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn invalid_parameter<S: Into<String>>(reason: S) -> Self {
        Self::InvalidParameter {
            reason: reason.into(),
        }
    }

    pub fn telemetry<S: fmt::Display>(reason: S) -> Self {
        Self::Telemetry {
            reason: reason.to_string(),
        }
    }
}

/// Errors a `MatrixLoader` may report.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record was readable but its content could not be used.
    #[error("Invalid record {record}: {reason}")]
    InvalidRecord { record: usize, reason: String },

    /// The source produced no usable entries.
    #[error("No usable entries found in {source_name}")]
    Empty { source_name: String },

    #[error("{0}")]
    Matrix(String),
}

/// Errors reading the JSON configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not parse config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type Result<T> = std::result::Result<T, FactorizationError>;
