/// Bounded Levenberg-Marquardt fit of the rotated Gaussian spot model.
/// Bounds are handled by optimizing an unbounded internal coordinate per
/// parameter; fixed parameters never enter the normal equations.

use std::f64::consts::{FRAC_PI_2, PI};

use log::debug;
use ndarray::Array2;

use super::model::{evaluate, MeshGrid, SpotModel};
use super::params::{ParamId, ParamSet, SpotParams, NUM_PARAMS};
use super::residual::{residual_masked, sum_of_squares, ValidityMask};
use crate::error::{Result, SpotError};
use crate::types::CalibratedImage;

const MAX_ITER: usize = 200;
const XTOL: f64 = 1.5e-8;
const FTOL: f64 = 1.5e-8;
const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e16;
const DIAG_FLOOR: f64 = 1e-12;
/// Columns of JᵀJ below this fraction of the largest diagonal are treated as
/// insensitive when estimating the covariance.
const SENSITIVITY_EPS: f64 = 1e-14;

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct FitOptions {
    /// Jacobian evaluations before giving up with `converged = false`.
    pub max_iterations: usize,
    /// Relative scaled step size that counts as converged.
    pub xtol: f64,
    /// Relative cost reduction that counts as converged.
    pub ftol: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        FitOptions {
            max_iterations: MAX_ITER,
            xtol: XTOL,
            ftol: FTOL,
        }
    }
}

/// Outcome of one fit. Returned even when the iteration budget ran out.
#[derive(Clone, Debug)]
pub struct FitResult {
    pub params: SpotParams,
    /// One-sigma uncertainty per parameter, `None` when not estimable.
    pub stderr: [Option<f64>; NUM_PARAMS],
    pub converged: bool,
    pub iterations: usize,
    /// Sum of squared residuals over valid samples.
    pub sum_squares: f64,
    /// `sum_squares / (valid_samples - varying)`, if that is positive.
    pub reduced_chi_square: Option<f64>,
    pub valid_samples: usize,
    pub varying: usize,
    /// Model evaluated over the whole grid.
    pub model: Array2<f64>,
    /// `observed - model`; NaN where the observation is NaN.
    pub residual: Array2<f64>,
}

impl FitResult {
    pub fn stderr_of(&self, id: ParamId) -> Option<f64> {
        self.stderr[id.index()]
    }
}

/// Maps the internal vector of the varying parameters to model parameters.
struct Problem<'a> {
    params: &'a ParamSet,
    free: Vec<ParamId>,
    grid: &'a MeshGrid,
    data: &'a Array2<f64>,
    mask: ValidityMask,
}

impl Problem<'_> {
    fn external(&self, internal: &[f64]) -> SpotParams {
        let mut v = self.params.values().to_array();
        for (id, &int) in self.free.iter().zip(internal) {
            v[id.index()] = self.params.get(*id).to_external(int);
        }
        SpotParams::from_array(v)
    }

    fn residual(&self, internal: &[f64]) -> Array2<f64> {
        residual_masked(&self.external(internal), self.grid, self.data, &self.mask)
    }

    fn cost(&self, internal: &[f64]) -> f64 {
        sum_of_squares(&self.residual(internal))
    }

    /// Accumulate JᵀJ and Jᵀr in internal coordinates.
    fn normal_equations(&self, internal: &[f64], jtj: &mut [f64], jtr: &mut [f64]) {
        let np = self.free.len();
        jtj.fill(0.0);
        jtr.fill(0.0);

        let model = SpotModel::new(&self.external(internal));
        let residual = self.residual(internal);
        let chain: Vec<f64> = self
            .free
            .iter()
            .zip(internal)
            .map(|(id, &int)| self.params.get(*id).scale_gradient(int))
            .collect();

        let mut grad = [0.0_f64; NUM_PARAMS];
        let mut j = vec![0.0_f64; np];
        for ((row, col), &r) in residual.indexed_iter() {
            if !self.mask.is_valid(row, col) {
                continue;
            }
            model.value_and_gradient(self.grid.x[[row, col]], self.grid.y[[row, col]], &mut grad);
            for (p, id) in self.free.iter().enumerate() {
                j[p] = grad[id.index()] * chain[p];
            }
            for p in 0..np {
                jtr[p] += j[p] * r;
                for q in p..np {
                    jtj[p * np + q] += j[p] * j[q];
                }
            }
        }

        for p in 0..np {
            for q in 0..p {
                jtj[p * np + q] = jtj[q * np + p];
            }
        }
    }
}

/// Fit the spot model to a calibrated image.
pub fn fit_image(params: &ParamSet, image: &CalibratedImage, options: &FitOptions) -> Result<FitResult> {
    fit(params, &MeshGrid::from_image(image), image.data(), options)
}

/// Minimize the sum of squared residuals over the varying parameters.
///
/// NaN samples are omitted. Running out of iterations is not an error: the
/// last accepted parameters are returned with `converged = false`.
pub fn fit(
    params: &ParamSet,
    grid: &MeshGrid,
    data: &Array2<f64>,
    options: &FitOptions,
) -> Result<FitResult> {
    params.validate()?;
    let (rows, cols) = data.dim();
    if grid.dim() != (rows, cols) {
        return Err(SpotError::AxisMismatch {
            rows,
            cols,
            x_len: grid.dim().1,
            y_len: grid.dim().0,
        });
    }

    let mask = ValidityMask::new(data);
    let free: Vec<ParamId> = params
        .iter()
        .filter(|(_, p)| p.is_free())
        .map(|(id, _)| id)
        .collect();
    let np = free.len();
    let valid_samples = mask.count();
    if valid_samples == 0 || valid_samples < np {
        return Err(SpotError::InsufficientData {
            valid: valid_samples,
            varying: np,
        });
    }

    let problem = Problem {
        params,
        free,
        grid,
        data,
        mask,
    };
    let mut internal: Vec<f64> = problem
        .free
        .iter()
        .map(|id| {
            let p = params.get(*id);
            p.to_internal(p.clamped_value())
        })
        .collect();

    let (converged, iterations) = lm_solve(&problem, &mut internal, options);

    let mut best = problem.external(&internal);
    let angle = params.get(ParamId::Angle);
    if angle.is_free() && angle.min == f64::NEG_INFINITY && angle.max == f64::INFINITY {
        best.angle = normalize_angle(best.angle);
    }
    let sum_squares = problem.cost(&internal);
    let dof = valid_samples.saturating_sub(np);
    let reduced_chi_square = (dof > 0).then(|| sum_squares / dof as f64);
    let stderr = standard_errors(&problem, &internal, reduced_chi_square);

    debug!(
        "Fit finished: converged={}, iterations={}, cost={:.6e}, samples={}",
        converged, iterations, sum_squares, valid_samples
    );

    let model = evaluate(&best, grid);
    let residual = data - &model;

    Ok(FitResult {
        params: best,
        stderr,
        converged,
        iterations,
        sum_squares,
        reduced_chi_square,
        valid_samples,
        varying: np,
        model,
        residual,
    })
}

/// Fold an angle into `[-π/2, π/2)`. The model repeats every π in `t`.
fn normalize_angle(t: f64) -> f64 {
    (t + FRAC_PI_2).rem_euclid(PI) - FRAC_PI_2
}

/// LM with Nielsen damping. Returns (converged, iterations).
fn lm_solve(problem: &Problem, params: &mut [f64], options: &FitOptions) -> (bool, usize) {
    let np = params.len();
    if np == 0 {
        return (true, 0);
    }

    let mut lambda = LAMBDA_INIT;
    let mut nu = 2.0_f64;
    let mut best_cost = problem.cost(params);

    // Scratch space for normal equations
    let mut jtj = vec![0.0_f64; np * np];
    let mut jtr = vec![0.0_f64; np];
    let mut mat = vec![0.0_f64; np * np];
    let mut new_params = vec![0.0_f64; np];

    for iter in 0..options.max_iterations {
        if best_cost == 0.0 {
            return (true, iter);
        }

        problem.normal_equations(params, &mut jtj, &mut jtr);

        // Damped normal equations; a failed factorization only means more damping.
        mat.copy_from_slice(&jtj);
        for p in 0..np {
            mat[p * np + p] += lambda * jtj[p * np + p].max(DIAG_FLOOR);
        }
        let delta = match cholesky_decompose(&mat, np) {
            Some(l) => cholesky_solve(&l, &jtr, np),
            None => {
                lambda *= nu;
                nu *= 2.0;
                if lambda > LAMBDA_MAX {
                    return (false, iter + 1);
                }
                continue;
            }
        };

        for p in 0..np {
            new_params[p] = params[p] + delta[p];
        }
        let new_cost = problem.cost(&new_params);

        // Nielsen gain ratio
        let predicted: f64 = delta
            .iter()
            .enumerate()
            .map(|(i, d)| d * (lambda * jtj[i * np + i].max(DIAG_FLOOR) * d + jtr[i]))
            .sum();

        let mut cost_converged = false;
        let rho = (best_cost - new_cost) / predicted;
        if predicted > 0.0 && rho > 0.0 {
            let actual = best_cost - new_cost;
            cost_converged =
                actual <= options.ftol * best_cost && predicted <= options.ftol * best_cost;
            params.copy_from_slice(&new_params);
            best_cost = new_cost;
            lambda *= (1.0_f64 / 3.0).max(1.0 - (2.0 * rho - 1.0).powi(3));
            nu = 2.0;
        } else {
            lambda *= nu;
            nu *= 2.0;
        }

        // Step size, scaled by each column's sensitivity
        let (step_norm, param_norm) = (0..np).fold((0.0_f64, 0.0_f64), |(s, x), p| {
            let d = jtj[p * np + p].sqrt();
            (s + (d * delta[p]).powi(2), x + (d * params[p]).powi(2))
        });
        let step_converged = step_norm.sqrt() <= options.xtol * param_norm.sqrt().max(1e-12);

        if cost_converged || step_converged {
            return (true, iter + 1);
        }
        if lambda > LAMBDA_MAX {
            return (false, iter + 1);
        }
    }

    (false, options.max_iterations)
}

/// Standard errors from `inv(JᵀJ) * reduced chi-square`, mapped back to
/// external coordinates. Insensitive parameters are left out of the
/// inversion and get `None`.
fn standard_errors(
    problem: &Problem,
    internal: &[f64],
    reduced_chi_square: Option<f64>,
) -> [Option<f64>; NUM_PARAMS] {
    let mut stderr = [None; NUM_PARAMS];
    let np = internal.len();
    let redchi = match reduced_chi_square {
        Some(v) if v.is_finite() && np > 0 => v,
        _ => return stderr,
    };

    let mut jtj = vec![0.0_f64; np * np];
    let mut jtr = vec![0.0_f64; np];
    problem.normal_equations(internal, &mut jtj, &mut jtr);

    let max_diag = (0..np).map(|p| jtj[p * np + p]).fold(0.0_f64, f64::max);
    let keep: Vec<usize> = (0..np)
        .filter(|&p| jtj[p * np + p] > SENSITIVITY_EPS * max_diag)
        .collect();
    let nk = keep.len();
    if nk == 0 {
        return stderr;
    }

    let mut reduced = vec![0.0_f64; nk * nk];
    for (a, &p) in keep.iter().enumerate() {
        for (b, &q) in keep.iter().enumerate() {
            reduced[a * nk + b] = jtj[p * np + q];
        }
    }
    let l = match cholesky_decompose(&reduced, nk) {
        Some(l) => l,
        None => return stderr,
    };

    let mut unit = vec![0.0_f64; nk];
    for (a, &p) in keep.iter().enumerate() {
        unit.fill(0.0);
        unit[a] = 1.0;
        let column = cholesky_solve(&l, &unit, nk);
        let variance = column[a] * redchi;
        if variance.is_finite() && variance >= 0.0 {
            let id = problem.free[p];
            let scale = problem.params.get(id).scale_gradient(internal[p]);
            stderr[id.index()] = Some(variance.sqrt() * scale.abs());
        }
    }
    stderr
}

/// Cholesky factor `L` of a symmetric positive-definite matrix (row-major,
/// `n×n`). `None` if the matrix is not positive definite.
fn cholesky_decompose(mat: &[f64], n: usize) -> Option<Vec<f64>> {
    let mut l = vec![0.0_f64; n * n];

    for i in 0..n {
        for j in 0..=i {
            let mut sum = 0.0;
            for k in 0..j {
                sum += l[i * n + k] * l[j * n + k];
            }
            if i == j {
                let diag = mat[i * n + i] - sum;
                if !(diag > 0.0) {
                    return None;
                }
                l[i * n + j] = diag.sqrt();
            } else {
                l[i * n + j] = (mat[i * n + j] - sum) / l[j * n + j];
            }
        }
    }

    Some(l)
}

/// Solve `L Lᵀ x = rhs` given the factor from [`cholesky_decompose`].
fn cholesky_solve(l: &[f64], rhs: &[f64], n: usize) -> Vec<f64> {
    // Solve L * y = rhs (forward substitution)
    let mut y = vec![0.0_f64; n];
    for i in 0..n {
        let mut sum = 0.0;
        for j in 0..i {
            sum += l[i * n + j] * y[j];
        }
        y[i] = (rhs[i] - sum) / l[i * n + i];
    }

    // Solve L^T * x = y (back substitution)
    let mut x = vec![0.0_f64; n];
    for i in (0..n).rev() {
        let mut sum = 0.0;
        for j in (i + 1)..n {
            sum += l[j * n + i] * x[j]; // L^T[i][j] = L[j][i]
        }
        x[i] = (y[i] - sum) / l[i * n + i];
    }

    x
}
