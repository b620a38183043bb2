/// Signed residuals with NaN samples omitted.

use ndarray::{Array2, Zip};

use super::model::{evaluate, MeshGrid};
use super::params::SpotParams;

/// Which samples take part in a fit. Built once per fit so every cost,
/// Jacobian and degrees-of-freedom count sees the same set.
#[derive(Clone, Debug, PartialEq)]
pub struct ValidityMask {
    valid: Array2<bool>,
    count: usize,
}

impl ValidityMask {
    pub fn new(data: &Array2<f64>) -> Self {
        let valid = data.map(|v| !v.is_nan());
        let count = valid.iter().filter(|&&v| v).count();
        ValidityMask { valid, count }
    }

    /// Number of samples that contribute.
    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_valid(&self, row: usize, col: usize) -> bool {
        self.valid[[row, col]]
    }

    pub fn as_array(&self) -> &Array2<bool> {
        &self.valid
    }
}

/// `data - model`, with omitted samples set to zero.
pub fn residual(params: &SpotParams, grid: &MeshGrid, data: &Array2<f64>) -> Array2<f64> {
    residual_masked(params, grid, data, &ValidityMask::new(data))
}

pub fn residual_masked(
    params: &SpotParams,
    grid: &MeshGrid,
    data: &Array2<f64>,
    mask: &ValidityMask,
) -> Array2<f64> {
    let model = evaluate(params, grid);
    Zip::from(data)
        .and(&model)
        .and(mask.as_array())
        .map_collect(|&d, &m, &ok| if ok { d - m } else { 0.0 })
}

/// Sum of squared residuals. Omitted samples are already zero.
pub fn sum_of_squares(residual: &Array2<f64>) -> f64 {
    residual.iter().map(|r| r * r).sum()
}
