//! Dense linear solvers for assembled circuit systems.
//!
//! Every solver implements [`LinearSolver`]; [`select_method`] picks one from
//! the system's size and [`Conditioning`] before anything is attempted, and
//! [`solve`] runs exactly that choice. A failed attempt is reported, never
//! retried with a different algorithm.
//!
//! # Solver Types
//!
//! - **Analytical**: diagonal closed forms produced by series/parallel layouts
//! - **Direct**: Cramer's rule (n ≤ 3), Cholesky, Gaussian elimination with
//!   partial pivoting, LU factorization
//! - **Iterative**: Gauss–Seidel and Jacobi (see [`super::iterative`])
//!
//! Pivot checks are relative: a pivot is rejected when its magnitude falls
//! below `tolerance × max|a_ij|`.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::debug;

use crate::config::AnalysisConfig;
use crate::constants::{MAX_ITERATIONS, SOLVER_TOLERANCE, VERIFY_TOLERANCE_FACTOR};
use crate::errors::SolverError;
use crate::math::{is_finite, max_abs, CMatrix, CScalar, CVector, Scalar, C_ZERO};

use super::iterative::{GaussSeidel, Jacobi};
use super::stamp::{determinant, AnalysisMethod, Conditioning, LinearSystem};

/// Algorithm used to solve `A·x = b`.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SolverMethod {
    /// Diagonal closed form.
    Analytical,
    /// Cramer's rule.
    Cramer,
    /// Cholesky factorization.
    Cholesky,
    /// Gaussian elimination with partial pivoting.
    Gaussian,
    /// LU factorization.
    Lu,
    /// Gauss–Seidel iteration.
    GaussSeidel,
    /// Jacobi iteration.
    Jacobi,
}

impl SolverMethod {
    /// Stable lowercase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Analytical => "analytical",
            Self::Cramer => "cramer",
            Self::Cholesky => "cholesky",
            Self::Gaussian => "gaussian",
            Self::Lu => "lu",
            Self::GaussSeidel => "gauss_seidel",
            Self::Jacobi => "jacobi",
        }
    }

    /// True for Gauss–Seidel and Jacobi.
    #[must_use]
    pub const fn is_iterative(self) -> bool {
        matches!(self, Self::GaussSeidel | Self::Jacobi)
    }
}

impl fmt::Display for SolverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Shared cancellation flag checked by iterative solvers once per iteration.
pub type CancelFlag = Arc<AtomicBool>;

/// Tolerances and limits for a solve.
#[derive(Debug, Clone)]
pub struct SolverOptions {
    /// Relative pivot tolerance and iterative convergence tolerance.
    pub tolerance: Scalar,
    /// Iteration cap for iterative solvers.
    pub max_iterations: usize,
    /// Optional cooperative cancellation.
    pub cancel: Option<CancelFlag>,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            tolerance: SOLVER_TOLERANCE,
            max_iterations: MAX_ITERATIONS,
            cancel: None,
        }
    }
}

impl From<&AnalysisConfig> for SolverOptions {
    fn from(cfg: &AnalysisConfig) -> Self {
        Self {
            tolerance: cfg.tolerance,
            max_iterations: cfg.max_iterations,
            cancel: None,
        }
    }
}

impl SolverOptions {
    /// Attaches a cancellation flag.
    #[must_use]
    pub fn with_cancel(mut self, flag: CancelFlag) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// True once the cancellation flag has been raised.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Absolute pivot threshold for `matrix`.
    #[must_use]
    pub fn pivot_tolerance(&self, matrix: &CMatrix) -> Scalar {
        self.tolerance * max_abs(matrix)
    }
}

/// Statistics from one solve.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct SolveStats {
    /// Algorithm that produced the solution.
    pub method: SolverMethod,
    /// Iterations used (1 for direct methods).
    pub iterations: usize,
    /// Final residual norm `‖A·x − b‖`.
    pub residual: Scalar,
    /// Residual after each iteration (iterative methods only).
    pub residual_history: Vec<Scalar>,
    /// Wall-clock time spent solving.
    pub elapsed: Duration,
}

/// Solution vector plus statistics.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Unknowns in layout order.
    pub x: CVector,
    /// How they were obtained.
    pub stats: SolveStats,
}

/// A linear solver for square complex systems.
pub trait LinearSolver {
    /// Which algorithm this is.
    fn method(&self) -> SolverMethod;

    /// Solves `matrix · x = rhs`.
    fn solve(&self, matrix: &CMatrix, rhs: &CVector, options: &SolverOptions) -> Result<Solution, SolverError>;
}

fn check_dimensions(matrix: &CMatrix, rhs: &CVector) -> Result<(), SolverError> {
    if matrix.nrows() != matrix.ncols() || matrix.nrows() != rhs.len() {
        return Err(SolverError::DimensionMismatch {
            rows: matrix.nrows(),
            cols: matrix.ncols(),
            rhs: rhs.len(),
        });
    }
    Ok(())
}

fn direct(method: SolverMethod, matrix: &CMatrix, rhs: &CVector, x: CVector, start: Instant) -> Solution {
    let residual = crate::math::residual_norm(matrix, &x, rhs);
    Solution {
        x,
        stats: SolveStats {
            method,
            iterations: 1,
            residual,
            residual_history: Vec::new(),
            elapsed: start.elapsed(),
        },
    }
}

/// Diagonal systems from series and parallel closed forms.
#[derive(Debug, Clone, Copy, Default)]
pub struct Analytical;

impl LinearSolver for Analytical {
    fn method(&self) -> SolverMethod {
        SolverMethod::Analytical
    }

    fn solve(&self, matrix: &CMatrix, rhs: &CVector, options: &SolverOptions) -> Result<Solution, SolverError> {
        check_dimensions(matrix, rhs)?;
        let start = Instant::now();
        let tol = options.pivot_tolerance(matrix);
        let mut x = CVector::zeros(rhs.len());
        for i in 0..rhs.len() {
            let pivot = matrix[(i, i)];
            if pivot.norm() <= tol || pivot.norm() == 0.0 {
                return Err(SolverError::SingularMatrix {
                    row: i,
                    pivot: pivot.norm(),
                });
            }
            x[i] = rhs[i] / pivot;
        }
        Ok(direct(self.method(), matrix, rhs, x, start))
    }
}

/// Cramer's rule for systems up to 3×3.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cramer;

impl LinearSolver for Cramer {
    fn method(&self) -> SolverMethod {
        SolverMethod::Cramer
    }

    fn solve(&self, matrix: &CMatrix, rhs: &CVector, options: &SolverOptions) -> Result<Solution, SolverError> {
        check_dimensions(matrix, rhs)?;
        let start = Instant::now();
        let n = rhs.len();
        let det = determinant(matrix);
        let scale = max_abs(matrix).powi(i32::try_from(n).unwrap_or(i32::MAX));
        if det.norm() <= options.tolerance * scale || det.norm() == 0.0 {
            return Err(SolverError::SingularMatrix {
                row: 0,
                pivot: det.norm(),
            });
        }
        let mut x = CVector::zeros(n);
        for i in 0..n {
            let mut replaced = matrix.clone();
            replaced.set_column(i, rhs);
            x[i] = determinant(&replaced) / det;
        }
        Ok(direct(self.method(), matrix, rhs, x, start))
    }
}

/// Cholesky factorization for Hermitian positive-definite systems.
#[derive(Debug, Clone, Copy, Default)]
pub struct Cholesky;

impl LinearSolver for Cholesky {
    fn method(&self) -> SolverMethod {
        SolverMethod::Cholesky
    }

    fn solve(&self, matrix: &CMatrix, rhs: &CVector, options: &SolverOptions) -> Result<Solution, SolverError> {
        check_dimensions(matrix, rhs)?;
        let start = Instant::now();
        let tol = options.pivot_tolerance(matrix);
        let chol = matrix
            .clone()
            .cholesky()
            .ok_or(SolverError::NotPositiveDefinite)?;

        // L·Lᴴ puts |L[k,k]|² where elimination would put its pivot.
        let l = chol.l_dirty();
        if let Some((row, pivot)) = (0..rhs.len())
            .map(|k| (k, l[(k, k)].norm_sqr()))
            .find(|&(_, d)| d <= tol || d == 0.0)
        {
            return Err(SolverError::SingularMatrix { row, pivot });
        }

        let x = chol.solve(rhs);
        Ok(direct(self.method(), matrix, rhs, x, start))
    }
}

/// Gaussian elimination with partial pivoting.
#[derive(Debug, Clone, Copy, Default)]
pub struct Gaussian;

impl LinearSolver for Gaussian {
    fn method(&self) -> SolverMethod {
        SolverMethod::Gaussian
    }

    fn solve(&self, matrix: &CMatrix, rhs: &CVector, options: &SolverOptions) -> Result<Solution, SolverError> {
        check_dimensions(matrix, rhs)?;
        let start = Instant::now();
        let n = rhs.len();
        let tol = options.pivot_tolerance(matrix);
        let mut a = matrix.clone();
        let mut b = rhs.clone();

        for k in 0..n {
            let (p, pivot) = (k..n)
                .map(|i| (i, a[(i, k)].norm()))
                .fold((k, -1.0), |best, cur| if cur.1 > best.1 { cur } else { best });
            if pivot <= tol || pivot == 0.0 {
                return Err(SolverError::SingularMatrix { row: k, pivot });
            }
            if p != k {
                a.swap_rows(p, k);
                b.swap_rows(p, k);
            }
            let akk = a[(k, k)];
            for i in k + 1..n {
                let factor = a[(i, k)] / akk;
                if factor == C_ZERO {
                    continue;
                }
                for j in k..n {
                    let akj = a[(k, j)];
                    a[(i, j)] -= factor * akj;
                }
                let bk = b[k];
                b[i] -= factor * bk;
            }
        }

        let mut x = CVector::zeros(n);
        for i in (0..n).rev() {
            let tail: CScalar = (i + 1..n).map(|j| a[(i, j)] * x[j]).sum();
            x[i] = (b[i] - tail) / a[(i, i)];
        }
        Ok(direct(self.method(), matrix, rhs, x, start))
    }
}

/// Dense LU factorization (nalgebra) with a U-diagonal singularity check.
#[derive(Debug, Clone, Copy, Default)]
pub struct Lu;

impl LinearSolver for Lu {
    fn method(&self) -> SolverMethod {
        SolverMethod::Lu
    }

    fn solve(&self, matrix: &CMatrix, rhs: &CVector, options: &SolverOptions) -> Result<Solution, SolverError> {
        check_dimensions(matrix, rhs)?;
        let start = Instant::now();
        let tol = options.pivot_tolerance(matrix);
        let lu = matrix.clone().lu();

        let u = lu.u();
        if let Some((row, pivot)) = (0..rhs.len())
            .map(|k| (k, u[(k, k)].norm()))
            .find(|&(_, d)| d <= tol || d == 0.0)
        {
            return Err(SolverError::SingularMatrix { row, pivot });
        }

        let x = lu.solve(rhs).ok_or(SolverError::SingularMatrix {
            row: 0,
            pivot: 0.0,
        })?;
        Ok(direct(self.method(), matrix, rhs, x, start))
    }
}

/// Chooses a solver from the system shape.
///
/// Closed forms are analytical; small well-determined systems use Cramer;
/// symmetric positive-definite systems use Cholesky; otherwise Gaussian
/// elimination (n ≤ 10) or LU (n > 10) unless the matrix is near-singular,
/// in which case a diagonally dominant matrix goes to Gauss–Seidel and
/// anything else falls back to Gaussian elimination. Jacobi is never chosen
/// automatically.
#[must_use]
pub fn select_method(
    analysis: AnalysisMethod,
    size: usize,
    conditioning: &Conditioning,
    tolerance: Scalar,
) -> SolverMethod {
    if analysis.is_closed_form() {
        SolverMethod::Analytical
    } else if size <= 3 && conditioning.relative_determinant > tolerance {
        SolverMethod::Cramer
    } else if conditioning.positive_definite {
        SolverMethod::Cholesky
    } else if !conditioning.near_singular {
        if size <= 10 {
            SolverMethod::Gaussian
        } else {
            SolverMethod::Lu
        }
    } else if conditioning.diagonally_dominant {
        SolverMethod::GaussSeidel
    } else {
        SolverMethod::Gaussian
    }
}

/// Runs `method` on `matrix · x = rhs`.
pub fn solve_with(
    method: SolverMethod,
    matrix: &CMatrix,
    rhs: &CVector,
    options: &SolverOptions,
) -> Result<Solution, SolverError> {
    let solution = match method {
        SolverMethod::Analytical => Analytical.solve(matrix, rhs, options),
        SolverMethod::Cramer => Cramer.solve(matrix, rhs, options),
        SolverMethod::Cholesky => Cholesky.solve(matrix, rhs, options),
        SolverMethod::Gaussian => Gaussian.solve(matrix, rhs, options),
        SolverMethod::Lu => Lu.solve(matrix, rhs, options),
        SolverMethod::GaussSeidel => GaussSeidel.solve(matrix, rhs, options),
        SolverMethod::Jacobi => Jacobi.solve(matrix, rhs, options),
    }?;
    if !solution.x.iter().all(|z| is_finite(*z)) {
        return Err(SolverError::NonFinite);
    }
    Ok(solution)
}

/// Selects a solver for `system` and runs it.
///
/// A raised cancellation flag stops the solve before it starts; iterative
/// methods also check it every sweep.
pub fn solve(system: &LinearSystem, options: &SolverOptions) -> Result<Solution, SolverError> {
    if options.is_cancelled() {
        return Err(SolverError::Cancelled { iterations: 0 });
    }
    let method = select_method(
        system.method,
        system.dimension(),
        &system.conditioning,
        options.tolerance,
    );
    let solution = solve_with(method, &system.matrix, &system.rhs, options)?;
    debug!(
        %method,
        iterations = solution.stats.iterations,
        residual = solution.stats.residual,
        "system solved"
    );
    Ok(solution)
}

/// Outcome of [`verify_solution`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Verification {
    /// Relative residual `‖A·x − b‖ / (‖A‖·‖x‖ + ‖b‖)`.
    pub residual: Scalar,
    /// Allowed relative residual.
    pub limit: Scalar,
    /// `residual ≤ limit`.
    pub valid: bool,
}

/// Recomputes the residual of `x` and compares it against `tolerance × 1000`.
#[must_use]
pub fn verify_solution(matrix: &CMatrix, x: &CVector, rhs: &CVector, tolerance: Scalar) -> Verification {
    let absolute = crate::math::residual_norm(matrix, x, rhs);
    let scale = matrix.norm() * x.norm() + rhs.norm();
    let residual = if scale > 0.0 { absolute / scale } else { absolute };
    let limit = tolerance * VERIFY_TOLERANCE_FACTOR;
    Verification {
        residual,
        limit,
        valid: residual.is_finite() && residual <= limit,
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use num_complex::Complex;

    use super::*;
    use crate::math::real;

    fn spd() -> (CMatrix, CVector) {
        // [4 1 0 0; 1 4 1 0; 0 1 4 1; 0 0 1 4] · 1 = [5 6 6 5]
        let mut a = CMatrix::zeros(4, 4);
        for i in 0..4 {
            a[(i, i)] = real(4.0);
            if i + 1 < 4 {
                a[(i, i + 1)] = real(1.0);
                a[(i + 1, i)] = real(1.0);
            }
        }
        let b = CVector::from_vec(vec![real(5.0), real(6.0), real(6.0), real(5.0)]);
        (a, b)
    }

    #[test]
    fn every_direct_solver_agrees() {
        let (a, b) = spd();
        let opts = SolverOptions::default();
        for method in [SolverMethod::Cholesky, SolverMethod::Gaussian, SolverMethod::Lu] {
            let sol = solve_with(method, &a, &b, &opts).unwrap();
            for xi in sol.x.iter() {
                assert_relative_eq!(xi.re, 1.0, epsilon = 1e-12);
            }
            assert_eq!(sol.stats.method, method);
            assert!(sol.stats.residual < 1e-12);
        }
    }

    #[test]
    fn cramer_solves_complex_2x2() {
        // [(1+j), -j; j, (1+j)] x = [(1+j); 1]
        let a = CMatrix::from_row_slice(
            2,
            2,
            &[
                Complex::new(1.0, 1.0),
                Complex::new(0.0, -1.0),
                Complex::new(0.0, 1.0),
                Complex::new(1.0, 1.0),
            ],
        );
        let b = CVector::from_vec(vec![Complex::new(1.0, 1.0), real(1.0)]);
        let sol = Cramer.solve(&a, &b, &SolverOptions::default()).unwrap();
        let gauss = Gaussian.solve(&a, &b, &SolverOptions::default()).unwrap();
        assert!((sol.x.clone() - gauss.x).norm() < 1e-12);
        assert!(sol.stats.residual < 1e-12);
    }

    #[test]
    fn singular_matrix_is_rejected_without_nan() {
        let a = CMatrix::from_element(2, 2, real(1.0));
        let b = CVector::from_element(2, real(1.0));
        let opts = SolverOptions::default();
        for method in [SolverMethod::Gaussian, SolverMethod::Lu, SolverMethod::Cramer] {
            let err = solve_with(method, &a, &b, &opts).unwrap_err();
            assert!(matches!(err, SolverError::SingularMatrix { .. }), "{method}: {err}");
        }
        assert_eq!(
            Cholesky.solve(&a, &b, &opts).unwrap_err(),
            SolverError::NotPositiveDefinite
        );
    }

    #[test]
    fn tiny_pivot_is_rejected_by_every_direct_solver() {
        let a = CMatrix::from_diagonal(&CVector::from_vec(vec![
            real(1.0),
            real(1.0),
            real(1.0),
            real(1.0e-14),
        ]));
        let b = CVector::from_element(4, real(1.0));
        let opts = SolverOptions::default();
        for method in [
            SolverMethod::Analytical,
            SolverMethod::Cramer,
            SolverMethod::Cholesky,
            SolverMethod::Gaussian,
            SolverMethod::Lu,
        ] {
            let err = solve_with(method, &a, &b, &opts).unwrap_err();
            assert!(matches!(err, SolverError::SingularMatrix { .. }), "{method}: {err}");
        }
    }

    #[test]
    fn partial_pivoting_handles_zero_leading_entry() {
        // MNA-style: zero on the first diagonal.
        let a = CMatrix::from_row_slice(2, 2, &[real(0.0), real(1.0), real(1.0), real(1.0)]);
        let b = CVector::from_vec(vec![real(2.0), real(3.0)]);
        let sol = Gaussian.solve(&a, &b, &SolverOptions::default()).unwrap();
        assert_relative_eq!(sol.x[0].re, 1.0, epsilon = 1e-12);
        assert_relative_eq!(sol.x[1].re, 2.0, epsilon = 1e-12);
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let a = CMatrix::identity(3, 3);
        let b = CVector::zeros(2);
        assert!(matches!(
            Lu.solve(&a, &b, &SolverOptions::default()),
            Err(SolverError::DimensionMismatch { rows: 3, cols: 3, rhs: 2 })
        ));
    }

    #[test]
    fn selection_follows_conditioning() {
        let (a, _) = spd();
        let c = Conditioning::analyze(&a, 1e-10);
        assert_eq!(select_method(AnalysisMethod::Nodal, 4, &c, 1e-10), SolverMethod::Cholesky);
        assert_eq!(select_method(AnalysisMethod::Series, 1, &c, 1e-10), SolverMethod::Analytical);

        let small = CMatrix::identity(2, 2);
        let c = Conditioning::analyze(&small, 1e-10);
        assert_eq!(select_method(AnalysisMethod::Mesh, 2, &c, 1e-10), SolverMethod::Cramer);

        let mna = CMatrix::from_row_slice(
            4,
            4,
            &[
                real(1.0), real(-1.0), real(0.0), real(1.0),
                real(-1.0), real(2.0), real(-1.0), real(0.0),
                real(0.0), real(-1.0), real(2.0), real(0.0),
                real(1.0), real(0.0), real(0.0), real(0.0),
            ],
        );
        let c = Conditioning::analyze(&mna, 1e-10);
        assert!(!c.positive_definite);
        assert_eq!(select_method(AnalysisMethod::ModifiedNodal, 4, &c, 1e-10), SolverMethod::Gaussian);

        // Unsymmetric tridiagonal, well conditioned, past the elimination cutoff.
        let n = 11;
        let mut big = CMatrix::zeros(n, n);
        for i in 0..n {
            big[(i, i)] = real(4.0);
            if i + 1 < n {
                big[(i, i + 1)] = real(1.0);
                big[(i + 1, i)] = real(-1.0);
            }
        }
        let c = Conditioning::analyze(&big, 1e-10);
        assert!(!c.positive_definite && !c.near_singular);
        assert_eq!(select_method(AnalysisMethod::ModifiedNodal, n, &c, 1e-10), SolverMethod::Lu);

        let shaky = Conditioning {
            determinant: real(1e-12),
            relative_determinant: 1e-12,
            reciprocal_condition: 1e-12,
            symmetric: false,
            positive_definite: false,
            diagonally_dominant: true,
            near_singular: true,
        };
        assert_eq!(
            select_method(AnalysisMethod::ModifiedNodal, 5, &shaky, 1e-10),
            SolverMethod::GaussSeidel
        );
        let shaky = Conditioning {
            diagonally_dominant: false,
            ..shaky
        };
        assert_eq!(
            select_method(AnalysisMethod::ModifiedNodal, 5, &shaky, 1e-10),
            SolverMethod::Gaussian
        );
    }

    #[test]
    fn verification_uses_relative_residual() {
        let (a, b) = spd();
        let good = CVector::from_element(4, real(1.0));
        let v = verify_solution(&a, &good, &b, 1e-10);
        assert!(v.valid);
        assert_relative_eq!(v.limit, 1e-7);

        let bad = CVector::from_element(4, real(2.0));
        assert!(!verify_solution(&a, &bad, &b, 1e-10).valid);
    }
}
