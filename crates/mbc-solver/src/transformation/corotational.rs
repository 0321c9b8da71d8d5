//! Chord-tracking corotational transformation for moderate rotations.
//!
//! The chord is recomputed from the current nodal positions on every
//! `update()`. Expressed in the undeformed local frame it reads
//! `c = L0·e1 + R0·(uJ - uI)`, giving
//!
//! ```text
//! v0 = |c| - L0
//! βz = atan2(c_y, c_x),   βy = -atan2(c_z, c_x)
//! v1 = θz_I - βz,  v2 = θz_J - βz,  v3 = θy_I - βy,  v4 = θy_J - βy
//! v5 = θx_J - θx_I
//! ```
//!
//! Nodal rotations are taken as additive rotation vectors, which is exact in
//! a plane and adequate for moderate rotations in space. The tangent is the
//! exact derivative of these kinematics, including the second derivatives of
//! `|c|`, `βz` and `βy` weighted by the basic forces.

use super::{
    block_rotation, element_disp, local_axes, BasicToGlobal, CrdTransformation, Matrix12,
    Vector12,
};
use crate::error::{Error, Result};
use crate::node::Node;
use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};

#[derive(Debug, Clone, Copy, PartialEq)]
struct ChordState {
    chord: Vector3<f64>,
    length: f64,
    basic: Vector6<f64>,
}

impl ChordState {
    fn undeformed(length: f64) -> Self {
        Self {
            chord: Vector3::new(length, 0.0, 0.0),
            length,
            basic: Vector6::zeros(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CorotationalTransformation {
    vecxz: Option<Vector3<f64>>,
    rotation: Matrix3<f64>,
    length: f64,
    initialized: bool,
    trial: ChordState,
    previous: ChordState,
    committed: ChordState,
}

impl CorotationalTransformation {
    pub fn new(vecxz: Option<Vector3<f64>>) -> Self {
        Self {
            vecxz,
            rotation: Matrix3::identity(),
            length: 0.0,
            initialized: false,
            trial: ChordState::undeformed(0.0),
            previous: ChordState::undeformed(0.0),
            committed: ChordState::undeformed(0.0),
        }
    }

    /// Gradients of `|c|`, `βz` and `βy` with respect to the chord.
    fn chord_gradients(c: &Vector3<f64>, length: f64) -> [Vector3<f64>; 3] {
        let rz = c.x * c.x + c.y * c.y;
        let ry = c.x * c.x + c.z * c.z;
        [
            c / length,
            Vector3::new(-c.y / rz, c.x / rz, 0.0),
            Vector3::new(c.z / ry, 0.0, -c.x / ry),
        ]
    }

    /// Local compatibility matrix ∂v/∂u_local at the trial chord.
    fn basic_from_local(&self) -> BasicToGlobal {
        let state = &self.trial;
        let [g_len, g_bz, g_by] = Self::chord_gradients(&state.chord, state.length);
        let rows = [g_len, -g_bz, -g_bz, -g_by, -g_by, Vector3::zeros()];

        let mut b = BasicToGlobal::zeros();
        for (k, g) in rows.iter().enumerate() {
            for a in 0..3 {
                b[(k, a)] = -g[a];
                b[(k, 6 + a)] = g[a];
            }
        }
        b[(1, 5)] = 1.0;
        b[(2, 11)] = 1.0;
        b[(3, 4)] = 1.0;
        b[(4, 10)] = 1.0;
        b[(5, 3)] = -1.0;
        b[(5, 9)] = 1.0;
        b
    }

    /// Σ q_k ∂²v_k/∂c² for the translational chord DOFs.
    fn chord_geometric_stiffness(&self, pb: &Vector6<f64>) -> Matrix3<f64> {
        let c = &self.trial.chord;
        let ln = self.trial.length;
        let e = c / ln;
        let hess_len = (Matrix3::identity() - e * e.transpose()) / ln;

        let rz2 = (c.x * c.x + c.y * c.y).powi(2);
        let mut hess_bz = Matrix3::zeros();
        hess_bz[(0, 0)] = 2.0 * c.x * c.y / rz2;
        hess_bz[(1, 1)] = -2.0 * c.x * c.y / rz2;
        hess_bz[(0, 1)] = (c.y * c.y - c.x * c.x) / rz2;
        hess_bz[(1, 0)] = hess_bz[(0, 1)];

        // βy = -atan2(c_z, c_x)
        let ry2 = (c.x * c.x + c.z * c.z).powi(2);
        let mut hess_by = Matrix3::zeros();
        hess_by[(0, 0)] = -2.0 * c.x * c.z / ry2;
        hess_by[(2, 2)] = 2.0 * c.x * c.z / ry2;
        hess_by[(0, 2)] = -(c.z * c.z - c.x * c.x) / ry2;
        hess_by[(2, 0)] = hess_by[(0, 2)];

        hess_len * pb[0] - hess_bz * (pb[1] + pb[2]) - hess_by * (pb[3] + pb[4])
    }
}

impl CrdTransformation for CorotationalTransformation {
    fn initialize(&mut self, node_i: &Node, node_j: &Node) -> Result<()> {
        let (rotation, length) = local_axes(node_i.get_crds(), node_j.get_crds(), self.vecxz)?;
        self.rotation = rotation;
        self.length = length;
        self.initialized = true;
        self.revert_to_start();
        Ok(())
    }

    fn update(&mut self, node_i: &Node, node_j: &Node) -> Result<()> {
        if !self.initialized {
            return Err(Error::Geometry("transformation used before initialize".into()));
        }
        let ug = element_disp(node_i, node_j)?;
        let r = &self.rotation;
        let du = ug.fixed_rows::<3>(6) - ug.fixed_rows::<3>(0);
        let chord = Vector3::new(self.length, 0.0, 0.0) + r * du;
        let ln = chord.norm();
        if !(ln > 1e-8 * self.length) {
            return Err(Error::SingularMatrix(format!(
                "deformed chord length collapsed to {ln:.3e}"
            )));
        }

        let rot_i = r * ug.fixed_rows::<3>(3);
        let rot_j = r * ug.fixed_rows::<3>(9);
        let beta_z = chord.y.atan2(chord.x);
        let beta_y = -chord.z.atan2(chord.x);

        let basic = Vector6::new(
            ln - self.length,
            rot_i.z - beta_z,
            rot_j.z - beta_z,
            rot_i.y - beta_y,
            rot_j.y - beta_y,
            rot_j.x - rot_i.x,
        );

        self.previous = self.trial;
        self.trial = ChordState {
            chord,
            length: ln,
            basic,
        };
        Ok(())
    }

    fn initial_length(&self) -> f64 {
        self.length
    }

    fn deformed_length(&self) -> f64 {
        self.trial.length
    }

    fn local_axes(&self) -> Matrix3<f64> {
        self.rotation
    }

    fn basic_trial_disp(&self) -> Vector6<f64> {
        self.trial.basic
    }

    fn basic_incr_delta_disp(&self) -> Vector6<f64> {
        self.trial.basic - self.previous.basic
    }

    fn basic_incr_disp(&self) -> Vector6<f64> {
        self.trial.basic - self.committed.basic
    }

    fn global_stiff_matrix(&self, kb: &Matrix6<f64>, pb: &Vector6<f64>) -> Matrix12 {
        let b = self.basic_from_local();
        let mut kl = b.transpose() * kb * b;

        let kc = self.chord_geometric_stiffness(pb);
        for (oi, oj, sign) in [(0, 0, 1.0), (0, 6, -1.0), (6, 0, -1.0), (6, 6, 1.0)] {
            let mut block = kl.fixed_view_mut::<3, 3>(oi, oj);
            block += kc * sign;
        }

        let t = block_rotation(&self.rotation);
        t.transpose() * kl * t
    }

    fn initial_global_stiff_matrix(&self, kb: &Matrix6<f64>) -> Matrix12 {
        let undeformed = Self {
            trial: ChordState::undeformed(self.length),
            ..self.clone()
        };
        undeformed.global_stiff_matrix(kb, &Vector6::zeros())
    }

    fn global_resisting_force(&self, pb: &Vector6<f64>, p0: &Vector6<f64>) -> Vector12 {
        let b = self.basic_from_local();
        let t = block_rotation(&self.rotation);
        t.transpose() * (b.transpose() * (pb + p0))
    }

    fn commit_state(&mut self) {
        self.committed = self.trial;
        self.previous = self.trial;
    }

    fn revert_to_last_commit(&mut self) {
        self.trial = self.committed;
        self.previous = self.committed;
    }

    fn revert_to_start(&mut self) {
        let state = ChordState::undeformed(self.length);
        self.trial = state;
        self.previous = state;
        self.committed = state;
    }

    fn clone_box(&self) -> Box<dyn CrdTransformation> {
        Box::new(self.clone())
    }
}
