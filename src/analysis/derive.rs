/// Physical widths and 1D projections from a fit.

use ndarray::{Array1, Array2, Axis};

use super::fitting::FitResult;
use super::params::ParamId;
use crate::types::CalibratedImage;

/// Observed and fitted marginal sums against one axis.
#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    pub axis: Array1<f64>,
    pub data: Array1<f64>,
    pub fit: Array1<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct DerivedMetrics {
    /// `2·sx`, rounded to the nearest integer (ties to even).
    pub width_x: f64,
    /// `2·sy`, rounded to the nearest integer (ties to even).
    pub width_y: f64,
    /// `2·stderr(sx)`, rounded; `None` if the stderr was not estimable.
    pub width_x_uncertainty: Option<f64>,
    pub width_y_uncertainty: Option<f64>,
    /// Unrounded `2·sx`.
    pub exact_width_x: f64,
    /// Unrounded `2·sy`.
    pub exact_width_y: f64,
    /// Sums over rows, against the x axis.
    pub projection_x: Projection,
    /// Sums over columns, against the y axis.
    pub projection_y: Projection,
}

pub fn derive(fit: &FitResult, image: &CalibratedImage) -> DerivedMetrics {
    let exact_width_x = 2.0 * fit.params.sigma_x;
    let exact_width_y = 2.0 * fit.params.sigma_y;
    let (projection_x, projection_y) = projections(image, &fit.model);

    DerivedMetrics {
        width_x: exact_width_x.round_ties_even(),
        width_y: exact_width_y.round_ties_even(),
        width_x_uncertainty: fit
            .stderr_of(ParamId::SigmaX)
            .map(|e| (2.0 * e).round_ties_even()),
        width_y_uncertainty: fit
            .stderr_of(ParamId::SigmaY)
            .map(|e| (2.0 * e).round_ties_even()),
        exact_width_x,
        exact_width_y,
        projection_x,
        projection_y,
    }
}

/// Marginal sums of the observed and fitted images. NaN samples propagate.
pub fn projections(image: &CalibratedImage, fitted: &Array2<f64>) -> (Projection, Projection) {
    let data = image.data();
    (
        Projection {
            axis: image.x().clone(),
            data: data.sum_axis(Axis(0)),
            fit: fitted.sum_axis(Axis(0)),
        },
        Projection {
            axis: image.y().clone(),
            data: data.sum_axis(Axis(1)),
            fit: fitted.sum_axis(Axis(1)),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::fitting::{fit_image, FitOptions};
    use crate::analysis::model::{evaluate, MeshGrid};
    use crate::analysis::params::{ParamSet, SpotParams};
    use crate::calibration::Calibration;
    use ndarray::array;

    #[test]
    fn test_projections_sum_the_right_axis() {
        let image = Calibration::default().calibrate(array![[1.0, 2.0, 3.0], [4.0, 5.0, f64::NAN]]);
        let fitted = array![[1.0, 1.0, 1.0], [2.0, 2.0, 2.0]];
        let (px, py) = projections(&image, &fitted);

        assert_eq!(px.axis.len(), 3);
        assert_eq!(px.data[0], 5.0);
        assert_eq!(px.data[1], 7.0);
        assert!(px.data[2].is_nan());
        assert_eq!(px.fit.to_vec(), vec![3.0, 3.0, 3.0]);

        assert_eq!(py.axis.to_vec(), vec![-2000.0, -1975.0]);
        assert_eq!(py.data[0], 6.0);
        assert!(py.data[1].is_nan());
        assert_eq!(py.fit.to_vec(), vec![3.0, 6.0]);
    }

    #[test]
    fn test_width_roundtrip_over_sigma_range() {
        let cal = Calibration::default();
        let (x, y) = cal.axes(120, 120);
        let grid = MeshGrid::new(&x, &y);

        for &sx in &[20.3, 55.5, 87.2, 140.0, 212.6, 300.0] {
            let truth = SpotParams {
                amplitude: 3000.0,
                angle: -0.3,
                sigma_x: sx,
                sigma_y: 70.0,
                x0: 0.0,
                y0: -500.0,
                offset: 10.0,
            };
            let image = cal.calibrate(evaluate(&truth, &grid));
            let result =
                fit_image(&ParamSet::from_values(truth), &image, &FitOptions::default()).unwrap();
            let metrics = derive(&result, &image);

            assert_eq!(metrics.width_x, (2.0 * sx).round_ties_even(), "sx = {}", sx);
            assert_eq!(metrics.width_y, 140.0);
            assert!((metrics.exact_width_x - 2.0 * sx).abs() < 1e-3);
        }
    }

    #[test]
    fn test_uncertainty_follows_stderr() {
        let image = Calibration::default().calibrate(array![[0.0, 1.0], [1.0, 0.0]]);
        let result = FitResult {
            params: SpotParams {
                amplitude: 1.0,
                angle: 0.0,
                sigma_x: 10.25,
                sigma_y: 3.5,
                x0: 0.0,
                y0: 0.0,
                offset: 0.0,
            },
            stderr: [None, None, Some(0.74), None, None, None, None],
            converged: true,
            iterations: 3,
            sum_squares: 0.0,
            reduced_chi_square: None,
            valid_samples: 4,
            varying: 7,
            model: Array2::zeros((2, 2)),
            residual: Array2::zeros((2, 2)),
        };

        let m = derive(&result, &image);
        assert_eq!(m.width_x, 20.0);
        assert_eq!(m.width_y, 7.0);
        assert_eq!(m.width_x_uncertainty, Some(1.0));
        assert_eq!(m.width_y_uncertainty, None);
        assert_eq!(m.exact_width_x, 20.5);
    }
}
