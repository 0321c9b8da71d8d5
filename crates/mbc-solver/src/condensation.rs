//! Natural-system assembly and static condensation of the internal slip DOFs.
//!
//! The natural system carries the 6 basic DOFs followed by the 2 end slips of
//! an optional interface. The slips carry no external load, so they are
//! condensed out before the element reports its basic stiffness.

use crate::error::Result;
use crate::linalg::{invert_2x2, mirror_upper};
use nalgebra::{Matrix2, Matrix2x6, Matrix6, Matrix6x2, SMatrix, SVector, Vector2, Vector6};

/// Basic plus internal DOFs
pub const NATURAL_DOFS: usize = 8;
pub const INTERNAL_DOFS: usize = 2;

pub type Matrix8 = SMatrix<f64, NATURAL_DOFS, NATURAL_DOFS>;
pub type Vector8 = SVector<f64, NATURAL_DOFS>;

/// Natural stiffness split into retained (basic) and internal blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    pub rr: Matrix6<f64>,
    pub rs: Matrix6x2<f64>,
    pub sr: Matrix2x6<f64>,
    pub ss: Matrix2<f64>,
}

impl Partition {
    pub fn of(kt: &Matrix8) -> Self {
        Self {
            rr: kt.fixed_view::<6, 6>(0, 0).into_owned(),
            rs: kt.fixed_view::<6, 2>(0, 6).into_owned(),
            sr: kt.fixed_view::<2, 6>(6, 0).into_owned(),
            ss: kt.fixed_view::<2, 2>(6, 6).into_owned(),
        }
    }
}

/// Natural stiffness: flexibility-based basic block plus interface terms.
///
/// Only the upper triangle of the interface contribution is read; the
/// result is symmetric in its interface part.
pub fn assemble(basic: &Matrix6<f64>, interface: Option<&Matrix8>) -> Matrix8 {
    let mut kt = Matrix8::zeros();
    if let Some(k) = interface {
        for i in 0..NATURAL_DOFS {
            for j in i..NATURAL_DOFS {
                kt[(i, j)] = k[(i, j)];
            }
        }
        mirror_upper(&mut kt);
    }
    let mut block = kt.fixed_view_mut::<6, 6>(0, 0);
    block += basic;
    kt
}

/// Natural force: basic forces followed by the interface forces.
pub fn natural_force(basic: &Vector6<f64>, interface: Option<&Vector8>) -> Vector8 {
    let mut p = interface.copied().unwrap_or_else(Vector8::zeros);
    let mut head = p.fixed_rows_mut::<6>(0);
    head += basic;
    p
}

/// Condense the internal DOFs out of the natural stiffness and force.
///
/// ```text
/// kv = rr - rs·ss⁻¹·sr
/// pb = p_r - rs·ss⁻¹·p_s
/// ```
///
/// # Errors
/// `SingularMatrix` if the internal block is singular.
pub fn condense(kt: &Matrix8, p: &Vector8) -> Result<(Matrix6<f64>, Vector6<f64>)> {
    let part = Partition::of(kt);
    let ss_inv = invert_2x2(&part.ss, "interface slip stiffness")?;
    let correction = part.rs * ss_inv;
    let p_r: Vector6<f64> = p.fixed_rows::<6>(0).into_owned();
    let p_s: Vector2<f64> = p.fixed_rows::<2>(6).into_owned();
    Ok((part.rr - correction * part.sr, p_r - correction * p_s))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_without_interface_is_basic_block() {
        let basic = Matrix6::from_fn(|i, j| (i * 6 + j) as f64);
        let kt = assemble(&basic, None);
        assert_eq!(kt.fixed_view::<6, 6>(0, 0).into_owned(), basic);
        assert_eq!(kt.fixed_view::<2, 2>(6, 6).amax(), 0.0);
    }

    #[test]
    fn assemble_fills_lower_triangle_from_upper() {
        let mut interface = Matrix8::zeros();
        interface[(1, 6)] = 3.0;
        interface[(6, 7)] = -2.0;
        interface[(7, 7)] = 5.0;
        let kt = assemble(&Matrix6::zeros(), Some(&interface));
        assert_eq!(kt[(6, 1)], 3.0);
        assert_eq!(kt[(7, 6)], -2.0);
        assert_eq!(kt, kt.transpose());
    }

    #[test]
    fn condensation_matches_schur_complement_by_hand() {
        // Two springs in series through one internal DOF, second internal decoupled.
        let mut kt = Matrix8::zeros();
        let (k1, k2) = (3.0, 6.0);
        kt[(0, 0)] = k1;
        kt[(0, 6)] = -k1;
        kt[(6, 0)] = -k1;
        kt[(6, 6)] = k1 + k2;
        kt[(7, 7)] = 1.0;
        let (kv, pb) = condense(&kt, &Vector8::zeros()).unwrap();
        assert!((kv[(0, 0)] - k1 * k2 / (k1 + k2)).abs() < 1e-14);
        assert_eq!(pb, Vector6::zeros());
    }

    #[test]
    fn condensation_applies_static_correction() {
        let mut kt = Matrix8::identity();
        kt[(2, 6)] = 0.5;
        kt[(6, 2)] = 0.5;
        let mut p = Vector8::zeros();
        p[6] = 4.0;
        let (_, pb) = condense(&kt, &p).unwrap();
        assert!((pb[2] + 2.0).abs() < 1e-14);
    }

    #[test]
    fn singular_internal_block_is_reported() {
        let kt = Matrix8::zeros();
        let err = condense(&kt, &Vector8::zeros()).unwrap_err();
        assert!(err.is_recoverable());
    }
}
