//! Small dense helpers shared by the element state determination.
//!
//! Every inversion performed by an element goes through [`invert`] or
//! [`invert_2x2`] so that singular or non-finite operands surface as
//! [`Error::SingularMatrix`] instead of propagating NaN.

use crate::error::{Error, Result};
use nalgebra::{DMatrix, Matrix2, SMatrix};

/// Relative determinant threshold for the closed-form 2x2 inverse.
const DET_TOLERANCE: f64 = 1e-14;

/// Maximum number of Jacobi sweeps for the eigenvalue guard.
const MAX_JACOBI_SWEEPS: usize = 50;

/// Dense direct inverse of a small square matrix.
///
/// `what` names the operand in the error message.
pub fn invert<const N: usize>(m: &SMatrix<f64, N, N>, what: &str) -> Result<SMatrix<f64, N, N>> {
    if m.iter().any(|x| !x.is_finite()) {
        return Err(Error::SingularMatrix(format!("{what} has non-finite entries")));
    }
    let scale = m.amax();
    if scale == 0.0 {
        return Err(Error::SingularMatrix(format!("{what} is identically zero")));
    }

    let dense = DMatrix::from_column_slice(N, N, m.as_slice());
    let inv = dense
        .try_inverse()
        .ok_or_else(|| Error::SingularMatrix(format!("{what} could not be inverted")))?;
    if inv.iter().any(|x| !x.is_finite()) {
        return Err(Error::SingularMatrix(format!("{what} inverse is not finite")));
    }

    Ok(SMatrix::<f64, N, N>::from_column_slice(inv.as_slice()))
}

/// Closed-form inverse of a 2x2 block through its determinant.
pub fn invert_2x2(m: &Matrix2<f64>, what: &str) -> Result<Matrix2<f64>> {
    let det = m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)];
    let scale = m.amax().powi(2);
    if !det.is_finite() || scale == 0.0 || det.abs() <= DET_TOLERANCE * scale {
        return Err(Error::SingularMatrix(format!(
            "{what} has determinant {det:.3e}"
        )));
    }
    Ok(Matrix2::new(
        m[(1, 1)] / det,
        -m[(0, 1)] / det,
        -m[(1, 0)] / det,
        m[(0, 0)] / det,
    ))
}

/// Copy the upper triangle onto the lower triangle.
pub fn mirror_upper<const N: usize>(m: &mut SMatrix<f64, N, N>) {
    for i in 0..N {
        for j in 0..i {
            m[(i, j)] = m[(j, i)];
        }
    }
}

/// Smallest eigenvalue of the symmetric part of `m` by cyclic Jacobi rotations.
///
/// Only the sign and rough magnitude matter to callers, so the sweep stops as
/// soon as the off-diagonal mass is negligible relative to the diagonal.
pub fn min_eigenvalue<const N: usize>(m: &SMatrix<f64, N, N>) -> f64 {
    let mut a = (m + m.transpose()) * 0.5;

    for _ in 0..MAX_JACOBI_SWEEPS {
        let mut off = 0.0;
        for p in 0..N {
            for q in (p + 1)..N {
                off += a[(p, q)] * a[(p, q)];
            }
        }
        let diag: f64 = (0..N).map(|i| a[(i, i)] * a[(i, i)]).sum();
        if off <= 1e-24 * diag.max(f64::MIN_POSITIVE) {
            break;
        }

        for p in 0..N {
            for q in (p + 1)..N {
                let apq = a[(p, q)];
                if apq.abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[(q, q)] - a[(p, p)]) / (2.0 * apq);
                let t = theta.signum() / (theta.abs() + (theta * theta + 1.0).sqrt());
                let t = if theta == 0.0 { 1.0 } else { t };
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..N {
                    let akp = a[(k, p)];
                    let akq = a[(k, q)];
                    a[(k, p)] = c * akp - s * akq;
                    a[(k, q)] = s * akp + c * akq;
                }
                for k in 0..N {
                    let apk = a[(p, k)];
                    let aqk = a[(q, k)];
                    a[(p, k)] = c * apk - s * aqk;
                    a[(q, k)] = s * apk + c * aqk;
                }
            }
        }
    }

    (0..N).map(|i| a[(i, i)]).fold(f64::INFINITY, f64::min)
}
