//! End nodes as seen by an element.
//!
//! Node registries and DOF numbering belong to the global driver; elements
//! only read coordinates and displacements through this type.

use nalgebra::{DVector, Vector3};

/// A node with its displacement history
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    /// Node ID (1-based indexing from input file)
    pub id: i32,
    crds: Vector3<f64>,
    ndof: usize,
    committed_disp: DVector<f64>,
    trial_disp: DVector<f64>,
    incr_delta_disp: DVector<f64>,
}

impl Node {
    /// Create a new node with `ndof` degrees of freedom at rest
    pub fn new(id: i32, x: f64, y: f64, z: f64, ndof: usize) -> Self {
        Self {
            id,
            crds: Vector3::new(x, y, z),
            ndof,
            committed_disp: DVector::zeros(ndof),
            trial_disp: DVector::zeros(ndof),
            incr_delta_disp: DVector::zeros(ndof),
        }
    }

    pub fn get_crds(&self) -> &Vector3<f64> {
        &self.crds
    }

    pub fn get_number_dof(&self) -> usize {
        self.ndof
    }

    /// Total trial displacement
    pub fn get_trial_disp(&self) -> &DVector<f64> {
        &self.trial_disp
    }

    /// Change of the trial displacement since the previous iteration
    pub fn get_incr_delta_disp(&self) -> &DVector<f64> {
        &self.incr_delta_disp
    }

    /// Change of the trial displacement since the last commit
    pub fn get_incr_disp(&self) -> DVector<f64> {
        &self.trial_disp - &self.committed_disp
    }

    /// Add an iteration increment to a single DOF (0-based)
    pub fn incr_trial_disp_dof(&mut self, dof: usize, delta: f64) {
        if dof < self.ndof {
            self.incr_delta_disp.fill(0.0);
            self.incr_delta_disp[dof] = delta;
            self.trial_disp[dof] += delta;
        }
    }

    /// Add an iteration increment to all DOFs
    pub fn incr_trial_disp(&mut self, delta: &DVector<f64>) {
        if delta.len() == self.ndof {
            self.incr_delta_disp.copy_from(delta);
            self.trial_disp += delta;
        }
    }

    /// Replace the trial displacement
    pub fn set_trial_disp(&mut self, disp: &DVector<f64>) {
        if disp.len() == self.ndof {
            self.incr_delta_disp = disp - &self.trial_disp;
            self.trial_disp.copy_from(disp);
        }
    }

    pub fn commit_state(&mut self) {
        self.committed_disp.copy_from(&self.trial_disp);
        self.incr_delta_disp.fill(0.0);
    }

    pub fn revert_to_last_commit(&mut self) {
        self.trial_disp.copy_from(&self.committed_disp);
        self.incr_delta_disp.fill(0.0);
    }

    pub fn revert_to_start(&mut self) {
        self.committed_disp.fill(0.0);
        self.trial_disp.fill(0.0);
        self.incr_delta_disp.fill(0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_increments() {
        let mut node = Node::new(2, 1.0, 0.0, 0.0, 6);
        node.incr_trial_disp_dof(5, 0.01);
        node.incr_trial_disp_dof(5, 0.02);
        assert!((node.get_trial_disp()[5] - 0.03).abs() < 1e-15);
        assert!((node.get_incr_delta_disp()[5] - 0.02).abs() < 1e-15);
        assert!((node.get_incr_disp()[5] - 0.03).abs() < 1e-15);

        node.commit_state();
        assert_eq!(node.get_incr_disp().norm(), 0.0);
        node.incr_trial_disp_dof(0, 1.0);
        node.revert_to_last_commit();
        assert_eq!(node.get_trial_disp()[0], 0.0);
        assert!((node.get_trial_disp()[5] - 0.03).abs() < 1e-15);
    }

    #[test]
    fn ignores_out_of_range_dof() {
        let mut node = Node::new(1, 0.0, 0.0, 0.0, 3);
        node.incr_trial_disp_dof(5, 1.0);
        assert_eq!(node.get_trial_disp().norm(), 0.0);
        assert_eq!(node.get_number_dof(), 3);
    }
}
