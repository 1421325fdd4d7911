//! Shared numerical primitives anchored on `nalgebra` and `num_complex`.

use nalgebra::{DMatrix, DVector};
use num_complex::Complex;

/// Primary scalar type used across the crate.
pub type Scalar = f64;
/// Primary complex scalar type used for phasors and impedances.
pub type CScalar = Complex<Scalar>;
/// Dense complex matrix used for every linear system in the crate.
pub type CMatrix = DMatrix<CScalar>;
/// Dense complex vector.
pub type CVector = DVector<CScalar>;

/// Complex zero.
pub const C_ZERO: CScalar = Complex::new(0.0, 0.0);
/// Complex one.
pub const C_ONE: CScalar = Complex::new(1.0, 0.0);

/// Builds a purely real complex value.
#[inline]
#[must_use]
pub const fn real(value: Scalar) -> CScalar {
    Complex::new(value, 0.0)
}

/// True when both parts are finite.
#[inline]
#[must_use]
pub fn is_finite(z: CScalar) -> bool {
    z.re.is_finite() && z.im.is_finite()
}

/// The "undefined impedance" sentinel: infinite real part.
#[inline]
#[must_use]
pub const fn undefined() -> CScalar {
    Complex::new(Scalar::INFINITY, 0.0)
}

/// Returns the admittance `conj(z)/|z|²`, or `None` when `z` is zero or undefined.
#[must_use]
pub fn admittance(z: CScalar) -> Option<CScalar> {
    if !is_finite(z) {
        return None;
    }
    let mag2 = z.norm_sqr();
    if mag2 <= Scalar::MIN_POSITIVE {
        return None;
    }
    Some(z.conj() / mag2)
}

/// Infinity norm (largest entry magnitude) of a matrix.
#[must_use]
pub fn max_abs(matrix: &CMatrix) -> Scalar {
    matrix.iter().fold(0.0, |acc, z| acc.max(z.norm()))
}

/// Infinity norm of a vector.
#[must_use]
pub fn vector_max_abs(vector: &CVector) -> Scalar {
    vector.iter().fold(0.0, |acc, z| acc.max(z.norm()))
}

/// Euclidean norm of `a·x − b`.
#[must_use]
pub fn residual_norm(a: &CMatrix, x: &CVector, b: &CVector) -> Scalar {
    (a * x - b).norm()
}
