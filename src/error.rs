use std::path::PathBuf;

use thiserror::Error;

/// Fatal failures of the ingestion and fitting stages.
#[derive(Error, Debug)]
pub enum SpotError {
    #[error("Unsupported file format: {extension}")]
    UnsupportedFormat { extension: String },

    #[error("Malformed data in {}: {reason}", .path.display())]
    MalformedData { path: PathBuf, reason: String },

    #[error("Size mismatch in {}: expected {expected} bytes, found {actual}", .path.display())]
    SizeMismatch {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error(
        "Background shape {}x{} does not match image shape {}x{}",
        .background.0, .background.1, .primary.0, .primary.1
    )]
    ShapeMismatch {
        primary: (usize, usize),
        background: (usize, usize),
    },

    #[error("Axis lengths x={x_len}, y={y_len} do not match image shape {rows}x{cols}")]
    AxisMismatch {
        rows: usize,
        cols: usize,
        x_len: usize,
        y_len: usize,
    },

    #[error("Failed to read {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Not enough valid samples to fit: {valid} valid, {varying} varying parameters")]
    InsufficientData { valid: usize, varying: usize },

    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, SpotError>;

impl SpotError {
    pub(crate) fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        SpotError::MalformedData {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SpotError::Io {
            path: path.into(),
            source,
        }
    }
}
