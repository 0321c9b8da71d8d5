//! Two-node beam-column elements exposing the state-determination contract
//! to a global Newton driver.

use crate::error::Result;
use crate::node::Node;
use crate::transformation::{ELEMENT_DOFS, Matrix12, Vector12};
use nalgebra::{DMatrix, DVector, Matrix6, Vector6};
use std::fmt::Debug;

pub mod factory;
pub mod mixed_beam;
pub mod shear_beam;

pub use factory::DynamicElement;
pub use mixed_beam::MixedBeamColumn;
pub use shear_beam::ShearFlexibleBeam;

/// Lifecycle: constructed, attached by `set_domain`, then any sequence of
/// `update` calls each closed by `commit_state` or a revert.
///
/// Accessors never iterate; they report the result of the last `update`.
pub trait BeamElement: Send + Debug {
    fn tag(&self) -> i32;

    /// Tags of end nodes I and J
    fn external_nodes(&self) -> [i32; 2];

    fn num_dof(&self) -> usize {
        ELEMENT_DOFS
    }

    /// Attach the element to its end nodes and run a first update.
    ///
    /// # Errors
    /// `DimensionMismatch` for nodes without 6 DOFs, `Geometry` for
    /// coincident nodes, `Config` for nodes that are not the element's.
    fn set_domain(&mut self, node_i: &Node, node_j: &Node) -> Result<()>;

    /// State determination for the nodes' current trial displacements.
    ///
    /// # Errors
    /// Numerical failures come back as `ConvergenceFailure` and leave the
    /// previous trial stiffness and force in place.
    fn update(&mut self, node_i: &Node, node_j: &Node) -> Result<()>;

    fn commit_state(&mut self) -> Result<()>;

    fn revert_to_last_commit(&mut self) -> Result<()>;

    fn revert_to_start(&mut self) -> Result<()>;

    fn tangent_stiff(&self) -> Result<DMatrix<f64>>;

    fn initial_stiff(&self) -> Result<DMatrix<f64>>;

    fn resisting_force(&self) -> Result<DVector<f64>>;

    fn mass(&self) -> Result<DMatrix<f64>>;

    /// Basic forces `[N, Mz_I, Mz_J, My_I, My_J, T]`
    fn basic_force(&self) -> Result<Vector6<f64>>;

    fn basic_stiffness(&self) -> Result<Matrix6<f64>>;
}

pub(crate) fn dynamic_matrix(m: &Matrix12) -> DMatrix<f64> {
    DMatrix::from_column_slice(ELEMENT_DOFS, ELEMENT_DOFS, m.as_slice())
}

pub(crate) fn dynamic_vector(v: &Vector12) -> DVector<f64> {
    DVector::from_column_slice(v.as_slice())
}

/// Lumped translational mass, half the member mass at each end.
pub(crate) fn lumped_mass(mass_per_length: f64, length: f64) -> DMatrix<f64> {
    let half = 0.5 * mass_per_length * length;
    let mut m = DMatrix::zeros(ELEMENT_DOFS, ELEMENT_DOFS);
    for dof in [0, 1, 2, 6, 7, 8] {
        m[(dof, dof)] = half;
    }
    m
}
