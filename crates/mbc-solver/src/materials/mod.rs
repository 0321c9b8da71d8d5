//! Section and material contracts consumed by the elements.
//!
//! Both contracts are stateful: a trial state is set by the element during
//! `update()`, promoted with `commit_state()` and rolled back with the revert
//! calls. Elements own deep copies (`clone_box`) so no state is shared
//! between element instances.

use crate::error::Result;
use nalgebra::{Matrix4, Vector4};
use std::fmt::Debug;

pub mod section;
pub mod uniaxial;

pub use section::{ElasticSection, Fiber, FiberSection};
pub use uniaxial::{BilinearMaterial, ElasticMaterial, RambergOsgoodMaterial};

/// Number of section response components: axial strain, curvature about z,
/// curvature about y, twist rate.
pub const SECTION_ORDER: usize = 4;

/// Section deformation or stress resultant `[ε, κz, κy, ϑ]` / `[N, Mz, My, T]`.
pub type SectionVector = Vector4<f64>;
/// Section tangent or flexibility.
pub type SectionMatrix = Matrix4<f64>;

/// One-dimensional stress-strain law (slip interfaces, shear response, fibers).
pub trait UniaxialMaterial: Send + Debug {
    /// Set the trial strain and update stress and tangent.
    fn set_trial_strain(&mut self, strain: f64) -> Result<()>;

    fn strain(&self) -> f64;

    fn stress(&self) -> f64;

    fn tangent(&self) -> f64;

    fn initial_tangent(&self) -> f64;

    fn commit_state(&mut self);

    fn revert_to_last_commit(&mut self);

    fn revert_to_start(&mut self);

    fn clone_box(&self) -> Box<dyn UniaxialMaterial>;
}

impl Clone for Box<dyn UniaxialMaterial> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Cross-section force-deformation law evaluated at an integration point.
pub trait SectionModel: Send + Debug {
    /// Set the trial section deformation.
    ///
    /// # Errors
    /// `SectionConvergence` when an internal iteration of the section does not
    /// converge within its own budget.
    fn set_trial_section_deformation(&mut self, deformation: &SectionVector) -> Result<()>;

    fn section_deformation(&self) -> SectionVector;

    fn stress_resultant(&self) -> SectionVector;

    fn section_tangent(&self) -> SectionMatrix;

    fn initial_tangent(&self) -> SectionMatrix;

    fn commit_state(&mut self);

    fn revert_to_last_commit(&mut self);

    fn revert_to_start(&mut self);

    fn clone_box(&self) -> Box<dyn SectionModel>;
}

impl Clone for Box<dyn SectionModel> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}
