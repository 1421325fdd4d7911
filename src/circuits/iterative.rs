//! Stationary iterative solvers: Gauss–Seidel and Jacobi.
//!
//! Both sweep until the residual satisfies [`ConvergenceCriteria`] or the
//! iteration cap is reached, recording the residual after every sweep. The
//! optional cancellation flag in [`SolverOptions`] is checked at the top of
//! each iteration.
//!
//! # References
//!
//! - Saad (2003). "Iterative Methods for Sparse Linear Systems" (2nd ed),
//!   Chapter 4. SIAM, Philadelphia.

use std::time::Instant;

use tracing::debug;

use crate::errors::SolverError;
use crate::math::{residual_norm, CMatrix, CScalar, CVector, Scalar};

use super::solver::{LinearSolver, SolveStats, Solution, SolverMethod, SolverOptions};

/// Convergence criteria for iterative solvers.
#[derive(Debug, Clone, Copy)]
pub struct ConvergenceCriteria {
    /// Maximum number of iterations.
    pub max_iterations: usize,
    /// Relative tolerance: ||r||/||b|| < rel_tol.
    pub relative_tolerance: Scalar,
    /// Absolute tolerance: ||r|| < abs_tol.
    pub absolute_tolerance: Scalar,
}

impl Default for ConvergenceCriteria {
    fn default() -> Self {
        Self::from(&SolverOptions::default())
    }
}

impl From<&SolverOptions> for ConvergenceCriteria {
    fn from(options: &SolverOptions) -> Self {
        Self {
            max_iterations: options.max_iterations,
            relative_tolerance: options.tolerance,
            absolute_tolerance: options.tolerance,
        }
    }
}

impl ConvergenceCriteria {
    /// Checks if the residual satisfies convergence criteria.
    fn is_converged(&self, residual_norm: Scalar, rhs_norm: Scalar) -> bool {
        residual_norm < self.absolute_tolerance || residual_norm < self.relative_tolerance * rhs_norm
    }
}

/// One sweep updating `x` in place.
type Sweep = fn(&CMatrix, &CVector, &mut CVector);

fn gauss_seidel_sweep(a: &CMatrix, b: &CVector, x: &mut CVector) {
    let n = b.len();
    for i in 0..n {
        let sigma: CScalar = (0..n).filter(|&j| j != i).map(|j| a[(i, j)] * x[j]).sum();
        x[i] = (b[i] - sigma) / a[(i, i)];
    }
}

fn jacobi_sweep(a: &CMatrix, b: &CVector, x: &mut CVector) {
    let n = b.len();
    let previous = x.clone();
    for i in 0..n {
        let sigma: CScalar = (0..n)
            .filter(|&j| j != i)
            .map(|j| a[(i, j)] * previous[j])
            .sum();
        x[i] = (b[i] - sigma) / a[(i, i)];
    }
}

fn iterate(
    method: SolverMethod,
    sweep: Sweep,
    matrix: &CMatrix,
    rhs: &CVector,
    options: &SolverOptions,
) -> Result<Solution, SolverError> {
    if matrix.nrows() != matrix.ncols() || matrix.nrows() != rhs.len() {
        return Err(SolverError::DimensionMismatch {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            rhs: rhs.len(),
        });
    }
    let start = Instant::now();
    let criteria = ConvergenceCriteria::from(options);
    let tol = options.pivot_tolerance(matrix);
    if let Some((row, pivot)) = (0..rhs.len())
        .map(|i| (i, matrix[(i, i)].norm()))
        .find(|&(_, d)| d <= tol || d == 0.0)
    {
        return Err(SolverError::SingularMatrix { row, pivot });
    }

    let rhs_norm = rhs.norm();
    let mut x = CVector::zeros(rhs.len());
    let mut history = Vec::new();
    let mut residual = residual_norm(matrix, &x, rhs);

    for iteration in 1..=criteria.max_iterations {
        if options.is_cancelled() {
            return Err(SolverError::Cancelled {
                iterations: iteration - 1,
            });
        }
        sweep(matrix, rhs, &mut x);
        residual = residual_norm(matrix, &x, rhs);
        history.push(residual);
        if !residual.is_finite() {
            return Err(SolverError::NonFinite);
        }
        if criteria.is_converged(residual, rhs_norm) {
            debug!(%method, iteration, residual, "iterative solve converged");
            return Ok(Solution {
                x,
                stats: SolveStats {
                    method,
                    iterations: iteration,
                    residual,
                    residual_history: history,
                    elapsed: start.elapsed(),
                },
            });
        }
    }

    Err(SolverError::ConvergenceFailure {
        iterations: criteria.max_iterations,
        residual_norm: residual,
    })
}

/// Gauss–Seidel: each sweep uses the freshest values.
#[derive(Debug, Clone, Copy, Default)]
pub struct GaussSeidel;

impl LinearSolver for GaussSeidel {
    fn method(&self) -> SolverMethod {
        SolverMethod::GaussSeidel
    }

    fn solve(&self, matrix: &CMatrix, rhs: &CVector, options: &SolverOptions) -> Result<Solution, SolverError> {
        iterate(self.method(), gauss_seidel_sweep, matrix, rhs, options)
    }
}

/// Jacobi: each sweep uses only the previous iterate.
#[derive(Debug, Clone, Copy, Default)]
pub struct Jacobi;

impl LinearSolver for Jacobi {
    fn method(&self) -> SolverMethod {
        SolverMethod::Jacobi
    }

    fn solve(&self, matrix: &CMatrix, rhs: &CVector, options: &SolverOptions) -> Result<Solution, SolverError> {
        iterate(self.method(), jacobi_sweep, matrix, rhs, options)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use approx::assert_relative_eq;
    use num_complex::Complex;

    use super::*;
    use crate::math::real;

    fn dominant() -> (CMatrix, CVector) {
        let a = CMatrix::from_row_slice(
            3,
            3,
            &[
                real(10.0),
                real(-1.0),
                real(2.0),
                real(-1.0),
                real(11.0),
                real(-1.0),
                real(2.0),
                real(-1.0),
                real(10.0),
            ],
        );
        let b = CVector::from_vec(vec![real(6.0), real(25.0), real(-11.0)]);
        (a, b)
    }

    #[test]
    fn gauss_seidel_converges_on_dominant_system() {
        let (a, b) = dominant();
        let sol = GaussSeidel.solve(&a, &b, &SolverOptions::default()).unwrap();
        let exact = a.clone().lu().solve(&b).unwrap();
        assert!((sol.x.clone() - exact).norm() < 1e-8);
        assert_eq!(sol.stats.residual_history.len(), sol.stats.iterations);
        assert!(sol.stats.iterations > 1);
    }

    #[test]
    fn jacobi_needs_more_sweeps_than_gauss_seidel() {
        let (a, b) = dominant();
        let opts = SolverOptions::default();
        let gs = GaussSeidel.solve(&a, &b, &opts).unwrap();
        let jac = Jacobi.solve(&a, &b, &opts).unwrap();
        assert!(jac.stats.iterations >= gs.stats.iterations);
        for (x, y) in jac.x.iter().zip(gs.x.iter()) {
            assert_relative_eq!(x.re, y.re, epsilon = 1e-8);
        }
    }

    #[test]
    fn complex_dominant_system() {
        let a = CMatrix::from_row_slice(
            2,
            2,
            &[Complex::new(4.0, 1.0), real(1.0), real(1.0), Complex::new(3.0, -1.0)],
        );
        let b = CVector::from_vec(vec![real(1.0), Complex::new(0.0, 2.0)]);
        let sol = GaussSeidel.solve(&a, &b, &SolverOptions::default()).unwrap();
        assert!(residual_norm(&a, &sol.x, &b) < 1e-9);
    }

    #[test]
    fn iteration_cap_fails_explicitly() {
        // Not diagonally dominant: Jacobi diverges.
        let a = CMatrix::from_row_slice(2, 2, &[real(1.0), real(3.0), real(2.0), real(1.0)]);
        let b = CVector::from_vec(vec![real(1.0), real(1.0)]);
        let opts = SolverOptions {
            max_iterations: 20,
            ..SolverOptions::default()
        };
        let err = Jacobi.solve(&a, &b, &opts).unwrap_err();
        assert!(matches!(
            err,
            SolverError::ConvergenceFailure { iterations: 20, .. } | SolverError::NonFinite
        ));
    }

    #[test]
    fn cancellation_is_observed() {
        let (a, b) = dominant();
        let flag = Arc::new(AtomicBool::new(true));
        let opts = SolverOptions::default().with_cancel(flag);
        assert_eq!(
            GaussSeidel.solve(&a, &b, &opts).unwrap_err(),
            SolverError::Cancelled { iterations: 0 }
        );
    }

    #[test]
    fn zero_diagonal_is_singular() {
        let a = CMatrix::from_row_slice(2, 2, &[real(0.0), real(1.0), real(1.0), real(1.0)]);
        let b = CVector::from_element(2, real(1.0));
        assert!(matches!(
            GaussSeidel.solve(&a, &b, &SolverOptions::default()),
            Err(SolverError::SingularMatrix { row: 0, .. })
        ));
    }
}
