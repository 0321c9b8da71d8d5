//! Small-displacement transformation with an optional P-Δ correction.

use super::{
    block_rotation, element_disp, local_axes, to_local, BasicToGlobal, CrdTransformation,
    Matrix12, Vector12,
};
use crate::error::{Error, Result};
use crate::node::Node;
use nalgebra::{Matrix3, Matrix6, Vector3, Vector6};

#[derive(Debug, Clone, Copy, PartialEq)]
struct LinearState {
    local: Vector12,
    basic: Vector6<f64>,
}

impl LinearState {
    fn zero() -> Self {
        Self {
            local: Vector12::zeros(),
            basic: Vector6::zeros(),
        }
    }
}

/// Linear (small displacement) transformation.
///
/// With `p_delta` enabled the chord rotation under axial force adds the
/// `N/L` string stiffness to the transverse translations.
#[derive(Debug, Clone)]
pub struct LinearTransformation {
    vecxz: Option<Vector3<f64>>,
    p_delta: bool,
    rotation: Matrix3<f64>,
    length: f64,
    initialized: bool,
    trial: LinearState,
    previous: LinearState,
    committed: LinearState,
}

impl LinearTransformation {
    pub fn new(vecxz: Option<Vector3<f64>>) -> Self {
        Self {
            vecxz,
            p_delta: false,
            rotation: Matrix3::identity(),
            length: 0.0,
            initialized: false,
            trial: LinearState::zero(),
            previous: LinearState::zero(),
            committed: LinearState::zero(),
        }
    }

    /// Linear transformation with the P-Δ string stiffness.
    pub fn with_p_delta(vecxz: Option<Vector3<f64>>) -> Self {
        Self {
            p_delta: true,
            ..Self::new(vecxz)
        }
    }

    /// Local → basic compatibility matrix.
    fn basic_from_local(&self) -> BasicToGlobal {
        let l = self.length;
        let mut tb = BasicToGlobal::zeros();
        tb[(0, 0)] = -1.0;
        tb[(0, 6)] = 1.0;

        tb[(1, 1)] = 1.0 / l;
        tb[(1, 5)] = 1.0;
        tb[(1, 7)] = -1.0 / l;
        tb[(2, 1)] = 1.0 / l;
        tb[(2, 11)] = 1.0;
        tb[(2, 7)] = -1.0 / l;

        tb[(3, 2)] = -1.0 / l;
        tb[(3, 4)] = 1.0;
        tb[(3, 8)] = 1.0 / l;
        tb[(4, 2)] = -1.0 / l;
        tb[(4, 10)] = 1.0;
        tb[(4, 8)] = 1.0 / l;

        tb[(5, 3)] = -1.0;
        tb[(5, 9)] = 1.0;
        tb
    }

    fn string_stiffness(&self, axial: f64) -> Matrix12 {
        let mut kl = Matrix12::zeros();
        if self.p_delta {
            let n_l = axial / self.length;
            for (a, b) in [(1, 7), (2, 8)] {
                kl[(a, a)] += n_l;
                kl[(b, b)] += n_l;
                kl[(a, b)] -= n_l;
                kl[(b, a)] -= n_l;
            }
        }
        kl
    }
}

impl CrdTransformation for LinearTransformation {
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
        let local = to_local(&self.rotation, &ug);
        let basic = self.basic_from_local() * local;
        self.previous = self.trial;
        self.trial = LinearState { local, basic };
        Ok(())
    }

    fn initial_length(&self) -> f64 {
        self.length
    }

    fn deformed_length(&self) -> f64 {
        self.length
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
        let t = block_rotation(&self.rotation);
        let tb = self.basic_from_local();
        let kl = tb.transpose() * kb * tb + self.string_stiffness(pb[0]);
        t.transpose() * kl * t
    }

    fn initial_global_stiff_matrix(&self, kb: &Matrix6<f64>) -> Matrix12 {
        let t = block_rotation(&self.rotation);
        let tb = self.basic_from_local();
        t.transpose() * (tb.transpose() * kb * tb) * t
    }

    fn global_resisting_force(&self, pb: &Vector6<f64>, p0: &Vector6<f64>) -> Vector12 {
        let tb = self.basic_from_local();
        let mut pl = tb.transpose() * (pb + p0);
        if self.p_delta {
            pl += self.string_stiffness(pb[0]) * self.trial.local;
        }
        let t = block_rotation(&self.rotation);
        t.transpose() * pl
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
        self.trial = LinearState::zero();
        self.previous = LinearState::zero();
        self.committed = LinearState::zero();
    }

    fn clone_box(&self) -> Box<dyn CrdTransformation> {
        Box::new(self.clone())
    }
}
