//! Coordinate transformations between global nodal DOFs and the basic system.
//!
//! Global DOFs per node: `[ux, uy, uz, θx, θy, θz]`, 12 per element.
//! Basic deformations (rigid-body modes removed):
//!
//! ```text
//! v = [elongation, θz_I, θz_J, θy_I, θy_J, twist]
//! ```
//!
//! Every transformation tracks the basic deformation of the current trial,
//! of the previous `update()` and of the last commit, so that
//! `basic_incr_delta_disp()` is the change since the previous update and
//! repeated updates with identical nodal input do not accumulate.

use crate::error::{Error, Result};
use crate::node::Node;
use nalgebra::{Matrix3, Matrix6, SMatrix, SVector, Vector3, Vector6};
use std::fmt::Debug;

pub mod corotational;
pub mod linear;

pub use corotational::CorotationalTransformation;
pub use linear::LinearTransformation;

/// DOFs per end node
pub const NODE_DOFS: usize = 6;
/// Global DOFs per element
pub const ELEMENT_DOFS: usize = 12;
/// Basic DOFs per element
pub const BASIC_DOFS: usize = 6;

pub type Matrix12 = SMatrix<f64, ELEMENT_DOFS, ELEMENT_DOFS>;
pub type Vector12 = SVector<f64, ELEMENT_DOFS>;
pub type BasicToGlobal = SMatrix<f64, BASIC_DOFS, ELEMENT_DOFS>;

/// Contract between an element and its kinematic description.
pub trait CrdTransformation: Send + Debug {
    /// Compute the undeformed length and local axes.
    ///
    /// # Errors
    /// `Geometry` if the nodes coincide or the orientation vector is parallel
    /// to the element axis.
    fn initialize(&mut self, node_i: &Node, node_j: &Node) -> Result<()>;

    /// Recompute the kinematics from the nodes' current trial displacements.
    fn update(&mut self, node_i: &Node, node_j: &Node) -> Result<()>;

    fn initial_length(&self) -> f64;

    fn deformed_length(&self) -> f64;

    /// Rows are the local x, y, z axes expressed in global coordinates.
    fn local_axes(&self) -> Matrix3<f64>;

    fn basic_trial_disp(&self) -> Vector6<f64>;

    /// Change of the basic deformation since the previous update.
    fn basic_incr_delta_disp(&self) -> Vector6<f64>;

    /// Change of the basic deformation since the last commit.
    fn basic_incr_disp(&self) -> Vector6<f64>;

    /// Global tangent from the basic tangent `kb` and basic force `pb`.
    fn global_stiff_matrix(&self, kb: &Matrix6<f64>, pb: &Vector6<f64>) -> Matrix12;

    /// Global stiffness of the undeformed configuration.
    fn initial_global_stiff_matrix(&self, kb: &Matrix6<f64>) -> Matrix12;

    /// Global resisting force from the basic force `pb` and basic fixed-end
    /// forces `p0`.
    fn global_resisting_force(&self, pb: &Vector6<f64>, p0: &Vector6<f64>) -> Vector12;

    fn commit_state(&mut self);

    fn revert_to_last_commit(&mut self);

    fn revert_to_start(&mut self);

    fn clone_box(&self) -> Box<dyn CrdTransformation>;
}

impl Clone for Box<dyn CrdTransformation> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Rotation matrix whose rows are the local axes of the chord `xi → xj`.
///
/// Without an orientation vector the local z axis is taken perpendicular to
/// the element axis and a global reference direction not parallel to it.
pub(crate) fn local_axes(
    xi: &Vector3<f64>,
    xj: &Vector3<f64>,
    vecxz: Option<Vector3<f64>>,
) -> Result<(Matrix3<f64>, f64)> {
    let d = xj - xi;
    let length = d.norm();
    let scale = xi.norm().max(xj.norm()).max(1.0);
    if !(length > 1e-12 * scale) {
        return Err(Error::Geometry(format!(
            "element has zero length ({length:.3e})"
        )));
    }
    let ex = d / length;

    let (ey, ez) = match vecxz {
        Some(v) => {
            let ey = v.cross(&ex);
            let norm = ey.norm();
            if !(norm > 1e-8 * v.norm()) {
                return Err(Error::Geometry(
                    "orientation vector is parallel to the element axis".into(),
                ));
            }
            let ey = ey / norm;
            (ey, ex.cross(&ey))
        }
        None => {
            let reference = if ex.x.abs() < 0.9 {
                Vector3::new(1.0, 0.0, 0.0)
            } else {
                Vector3::new(0.0, 1.0, 0.0)
            };
            let ez = ex.cross(&reference).normalize();
            (ez.cross(&ex), ez)
        }
    };

    let r = Matrix3::from_rows(&[ex.transpose(), ey.transpose(), ez.transpose()]);
    Ok((r, length))
}

/// Rotate a 12-vector of global DOFs into the local frame.
pub(crate) fn to_local(r: &Matrix3<f64>, ug: &Vector12) -> Vector12 {
    let mut ul = Vector12::zeros();
    for block in 0..4 {
        let g = ug.fixed_rows::<3>(3 * block);
        ul.fixed_rows_mut::<3>(3 * block).copy_from(&(r * g));
    }
    ul
}

/// Block-diagonal local ← global rotation for all four 3-vectors.
pub(crate) fn block_rotation(r: &Matrix3<f64>) -> Matrix12 {
    let mut t = Matrix12::zeros();
    for block in 0..4 {
        t.fixed_view_mut::<3, 3>(3 * block, 3 * block).copy_from(r);
    }
    t
}

/// Stack the trial displacements of the two end nodes.
pub(crate) fn element_disp(node_i: &Node, node_j: &Node) -> Result<Vector12> {
    for node in [node_i, node_j] {
        if node.get_number_dof() != NODE_DOFS {
            return Err(Error::DimensionMismatch {
                node: node.id,
                expected: NODE_DOFS,
                found: node.get_number_dof(),
            });
        }
    }
    let mut ug = Vector12::zeros();
    ug.fixed_rows_mut::<6>(0).copy_from(&node_i.get_trial_disp().rows(0, 6));
    ug.fixed_rows_mut::<6>(6).copy_from(&node_j.get_trial_disp().rows(0, 6));
    Ok(ug)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn axes_for_member_along_x() {
        let (r, l) = local_axes(&Vector3::zeros(), &Vector3::new(2.0, 0.0, 0.0), None).unwrap();
        assert!((l - 2.0).abs() < 1e-15);
        assert!((r - Matrix3::identity()).norm() < 1e-15);
    }

    #[test]
    fn axes_are_orthonormal() {
        let (r, _) = local_axes(
            &Vector3::new(1.0, 2.0, 3.0),
            &Vector3::new(4.0, -1.0, 7.0),
            Some(Vector3::new(0.0, 0.0, 1.0)),
        )
        .unwrap();
        assert!((r * r.transpose() - Matrix3::identity()).norm() < 1e-14);
        assert!((r.determinant() - 1.0).abs() < 1e-14);
    }

    #[test]
    fn zero_length_is_a_geometry_error() {
        let p = Vector3::new(5.0, 5.0, 5.0);
        assert!(matches!(local_axes(&p, &p, None), Err(Error::Geometry(_))));
    }

    #[test]
    fn parallel_orientation_vector_is_rejected() {
        let result = local_axes(
            &Vector3::zeros(),
            &Vector3::new(0.0, 0.0, 3.0),
            Some(Vector3::new(0.0, 0.0, 1.0)),
        );
        assert!(matches!(result, Err(Error::Geometry(_))));
    }

    #[test]
    fn rejects_nodes_with_wrong_dof_count() {
        let a = Node::new(1, 0.0, 0.0, 0.0, 6);
        let b = Node::new(2, 1.0, 0.0, 0.0, 3);
        assert!(matches!(
            element_disp(&a, &b),
            Err(Error::DimensionMismatch { node: 2, expected: 6, found: 3 })
        ));
    }
}
