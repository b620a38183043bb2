use std::path::PathBuf;

use ndarray::{Array1, Array2};
use thiserror::Error;

use crate::error::{Result, SpotError};

/// Decoder family, selected from the file extension.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum FormatKind {
    /// Comma-separated numeric grid (`.csv`).
    DelimitedText,
    /// Raw sample stream with a fixed sensor geometry (`.dat`).
    RawBinary,
    /// 8-bit raster image (`.jpg`, `.tif`).
    Raster,
}

/// Non-fatal conditions. Processing continues, but the caller should surface them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Warning {
    #[error("{}: 8-bit raster input, fitted values are approximate", .path.display())]
    Precision { path: PathBuf },

    #[error("Fit did not converge within {iterations} iterations")]
    FitNonConvergence { iterations: usize },

    #[error("Background subtraction requested but no background image was selected")]
    MissingBackground,
}

/// What the reader learned about a decoded file.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    pub path: PathBuf,
    pub format: FormatKind,
    pub rows: usize,
    pub cols: usize,
    pub warnings: Vec<Warning>,
}

/// Intensity samples with their physical coordinate axes.
///
/// `x` has one entry per column and `y` one entry per row. The fields are
/// private so the lengths can never drift from the array shape.
#[derive(Clone, Debug, PartialEq)]
pub struct CalibratedImage {
    x: Array1<f64>,
    y: Array1<f64>,
    data: Array2<f64>,
}

impl CalibratedImage {
    pub fn new(x: Array1<f64>, y: Array1<f64>, data: Array2<f64>) -> Result<Self> {
        let (rows, cols) = data.dim();
        if x.len() != cols || y.len() != rows {
            return Err(SpotError::AxisMismatch {
                rows,
                cols,
                x_len: x.len(),
                y_len: y.len(),
            });
        }
        Ok(CalibratedImage { x, y, data })
    }

    /// Axes derived from the array's own shape; lengths hold by construction.
    pub(crate) fn from_shape_axes(x: Array1<f64>, y: Array1<f64>, data: Array2<f64>) -> Self {
        debug_assert_eq!((y.len(), x.len()), data.dim());
        CalibratedImage { x, y, data }
    }

    pub fn x(&self) -> &Array1<f64> {
        &self.x
    }

    pub fn y(&self) -> &Array1<f64> {
        &self.y
    }

    pub fn data(&self) -> &Array2<f64> {
        &self.data
    }

    /// (rows, cols)
    pub fn shape(&self) -> (usize, usize) {
        self.data.dim()
    }

    pub fn into_parts(self) -> (Array1<f64>, Array1<f64>, Array2<f64>) {
        (self.x, self.y, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_axis_lengths_must_match_shape() {
        let data = Array2::<f64>::zeros((2, 3));
        let ok = CalibratedImage::new(array![0.0, 1.0, 2.0], array![0.0, 1.0], data.clone());
        assert!(ok.is_ok());

        let swapped = CalibratedImage::new(array![0.0, 1.0], array![0.0, 1.0, 2.0], data);
        assert!(matches!(
            swapped,
            Err(SpotError::AxisMismatch { rows: 2, cols: 3, x_len: 2, y_len: 3 })
        ));
    }
}
