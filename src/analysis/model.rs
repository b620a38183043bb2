/// Rotated anisotropic 2D Gaussian with a constant offset.
///
/// x' = (x - x0) cos t - (y - y0) sin t
/// y' = (x - x0) sin t + (y - y0) cos t
/// f(x, y) = C + A exp(-(x'^2 / (2 sx^2) + y'^2 / (2 sy^2)))

use ndarray::{Array1, Array2, Zip};

use super::params::{ParamId, SpotParams, NUM_PARAMS};
use crate::types::CalibratedImage;

/// Full coordinate grids, `x[[r, c]] = x_axis[c]` and `y[[r, c]] = y_axis[r]`.
#[derive(Clone, Debug, PartialEq)]
pub struct MeshGrid {
    pub x: Array2<f64>,
    pub y: Array2<f64>,
}

impl MeshGrid {
    pub fn new(x_axis: &Array1<f64>, y_axis: &Array1<f64>) -> Self {
        let shape = (y_axis.len(), x_axis.len());
        MeshGrid {
            x: Array2::from_shape_fn(shape, |(_, c)| x_axis[c]),
            y: Array2::from_shape_fn(shape, |(r, _)| y_axis[r]),
        }
    }

    pub fn from_image(image: &CalibratedImage) -> Self {
        MeshGrid::new(image.x(), image.y())
    }

    /// (rows, cols)
    pub fn dim(&self) -> (usize, usize) {
        self.x.dim()
    }
}

/// Model with the per-evaluation trigonometry hoisted out.
pub(crate) struct SpotModel {
    amplitude: f64,
    offset: f64,
    x0: f64,
    y0: f64,
    cos_t: f64,
    sin_t: f64,
    sigma_x: f64,
    sigma_y: f64,
}

impl SpotModel {
    pub fn new(p: &SpotParams) -> Self {
        SpotModel {
            amplitude: p.amplitude,
            offset: p.offset,
            x0: p.x0,
            y0: p.y0,
            cos_t: p.angle.cos(),
            sin_t: p.angle.sin(),
            sigma_x: p.sigma_x,
            sigma_y: p.sigma_y,
        }
    }

    #[inline]
    fn rotate(&self, x: f64, y: f64) -> (f64, f64) {
        let dx = x - self.x0;
        let dy = y - self.y0;
        (
            dx * self.cos_t - dy * self.sin_t,
            dx * self.sin_t + dy * self.cos_t,
        )
    }

    // Written as u^2 / (2 s^2) rather than u^2 * inv: with s = 0 this gives
    // +inf off-centre (value = offset) and NaN at the centre, never a panic.
    #[inline]
    fn falloff(&self, u: f64, v: f64) -> f64 {
        (-(u * u / (2.0 * self.sigma_x * self.sigma_x) + v * v / (2.0 * self.sigma_y * self.sigma_y)))
            .exp()
    }

    #[inline]
    pub fn value(&self, x: f64, y: f64) -> f64 {
        let (u, v) = self.rotate(x, y);
        self.offset + self.amplitude * self.falloff(u, v)
    }

    /// Model value plus its partial derivatives, in [`ParamId`] order.
    #[inline]
    pub fn value_and_gradient(&self, x: f64, y: f64, grad: &mut [f64; NUM_PARAMS]) -> f64 {
        let (u, v) = self.rotate(x, y);
        let e = self.falloff(u, v);
        let ae = self.amplitude * e;
        let inv_sx2 = 1.0 / (self.sigma_x * self.sigma_x);
        let inv_sy2 = 1.0 / (self.sigma_y * self.sigma_y);

        grad[ParamId::Amplitude.index()] = e;
        grad[ParamId::Angle.index()] = ae * u * v * (inv_sx2 - inv_sy2);
        grad[ParamId::SigmaX.index()] = ae * u * u * inv_sx2 / self.sigma_x;
        grad[ParamId::SigmaY.index()] = ae * v * v * inv_sy2 / self.sigma_y;
        grad[ParamId::CenterX.index()] = ae * (u * self.cos_t * inv_sx2 + v * self.sin_t * inv_sy2);
        grad[ParamId::CenterY.index()] = ae * (-u * self.sin_t * inv_sx2 + v * self.cos_t * inv_sy2);
        grad[ParamId::Offset.index()] = 1.0;

        self.offset + ae
    }
}

/// Evaluate the spot model over a grid. Rows are evaluated in parallel.
pub fn evaluate(params: &SpotParams, grid: &MeshGrid) -> Array2<f64> {
    let model = SpotModel::new(params);
    Zip::from(&grid.x)
        .and(&grid.y)
        .par_map_collect(|&x, &y| model.value(x, y))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn grid() -> MeshGrid {
        let x = Array1::linspace(-300.0, 300.0, 25);
        let y = Array1::linspace(-250.0, 350.0, 21);
        MeshGrid::new(&x, &y)
    }

    fn params() -> SpotParams {
        SpotParams {
            amplitude: 900.0,
            angle: 0.7,
            sigma_x: 120.0,
            sigma_y: 60.0,
            x0: 20.0,
            y0: -35.0,
            offset: 15.0,
        }
    }

    #[test]
    fn test_meshgrid_layout() {
        let g = MeshGrid::new(&Array1::from(vec![1.0, 2.0, 3.0]), &Array1::from(vec![10.0, 20.0]));
        assert_eq!(g.dim(), (2, 3));
        assert_eq!(g.x[[1, 2]], 3.0);
        assert_eq!(g.y[[1, 2]], 20.0);
        assert_eq!(g.y[[0, 2]], 10.0);
    }

    #[test]
    fn test_isotropic_reduction() {
        let (a, c, s) = (500.0, 12.0, 80.0);
        let p = SpotParams {
            amplitude: a,
            angle: 0.0,
            sigma_x: s,
            sigma_y: s,
            x0: 0.0,
            y0: 0.0,
            offset: c,
        };
        let g = grid();
        let out = evaluate(&p, &g);
        for ((&v, &x), &y) in out.iter().zip(g.x.iter()).zip(g.y.iter()) {
            let expected = c + a * (-(x * x + y * y) / (2.0 * s * s)).exp();
            assert!((v - expected).abs() < 1e-9, "{} vs {}", v, expected);
        }
    }

    #[test]
    fn test_rotation_periodicity() {
        let g = grid();
        let base = evaluate(&params(), &g);

        let half_turn = SpotParams {
            angle: params().angle + PI,
            ..params()
        };
        let quarter_swapped = SpotParams {
            angle: params().angle + PI / 2.0,
            sigma_x: params().sigma_y,
            sigma_y: params().sigma_x,
            ..params()
        };
        let negative = SpotParams {
            angle: params().angle - 3.0 * PI,
            ..params()
        };

        for other in [half_turn, quarter_swapped, negative] {
            let out = evaluate(&other, &g);
            let max_diff = (&out - &base).iter().fold(0.0f64, |m, d| m.max(d.abs()));
            assert!(max_diff < 1e-9, "max diff {}", max_diff);
        }
    }

    #[test]
    fn test_peak_at_centre() {
        let m = SpotModel::new(&params());
        assert!((m.value(20.0, -35.0) - 915.0).abs() < 1e-12);
        assert!(m.value(500.0, 500.0) < 915.0);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let p = params();
        let m = SpotModel::new(&p);
        let mut grad = [0.0; NUM_PARAMS];

        for &(x, y) in &[(0.0, 0.0), (100.0, -60.0), (-80.0, 40.0), (150.0, 90.0)] {
            m.value_and_gradient(x, y, &mut grad);
            for id in ParamId::ALL {
                let h = 1e-5 * p.get(id).abs().max(1.0);
                let mut hi = p.to_array();
                let mut lo = p.to_array();
                hi[id.index()] += h;
                lo[id.index()] -= h;
                let numeric = (SpotModel::new(&SpotParams::from_array(hi)).value(x, y)
                    - SpotModel::new(&SpotParams::from_array(lo)).value(x, y))
                    / (2.0 * h);
                let analytic = grad[id.index()];
                assert!(
                    (numeric - analytic).abs() < 1e-5 * analytic.abs().max(1.0),
                    "{} at ({}, {}): {} vs {}",
                    id.name(),
                    x,
                    y,
                    numeric,
                    analytic
                );
            }
        }
    }

    #[test]
    fn test_degenerate_sigma_does_not_panic() {
        let p = SpotParams {
            sigma_x: 0.0,
            ..params()
        };
        let out = evaluate(&p, &grid());
        assert_eq!(out.dim(), (21, 25));
        // Off the centre line the falloff collapses to the offset.
        let m = SpotModel::new(&p);
        assert_eq!(m.value(250.0, 250.0), 15.0);
    }
}
