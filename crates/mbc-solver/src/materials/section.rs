//! Cross-section models.
//!
//! Response vector layout: `[N, Mz, My, T]` conjugate to `[ε, κz, κy, ϑ]`.
//! A fiber at local coordinates `(y, z)` sees the strain `ε - y·κz + z·κy`.

use super::{SectionMatrix, SectionModel, SectionVector, UniaxialMaterial};
use crate::error::{Error, Result};

/// Linear elastic section with uncoupled rigidities
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticSection {
    /// Axial rigidity EA
    pub ea: f64,
    /// Flexural rigidity about local z (EIz)
    pub eiz: f64,
    /// Flexural rigidity about local y (EIy)
    pub eiy: f64,
    /// Torsional rigidity GJ
    pub gj: f64,
    deformation: SectionVector,
    committed: SectionVector,
}

impl ElasticSection {
    pub fn new(ea: f64, eiz: f64, eiy: f64, gj: f64) -> Self {
        Self {
            ea,
            eiz,
            eiy,
            gj,
            deformation: SectionVector::zeros(),
            committed: SectionVector::zeros(),
        }
    }

    fn stiffness(&self) -> SectionMatrix {
        SectionMatrix::from_diagonal(&SectionVector::new(self.ea, self.eiz, self.eiy, self.gj))
    }
}

impl SectionModel for ElasticSection {
    fn set_trial_section_deformation(&mut self, deformation: &SectionVector) -> Result<()> {
        self.deformation = *deformation;
        Ok(())
    }

    fn section_deformation(&self) -> SectionVector {
        self.deformation
    }

    fn stress_resultant(&self) -> SectionVector {
        self.stiffness() * self.deformation
    }

    fn section_tangent(&self) -> SectionMatrix {
        self.stiffness()
    }

    fn initial_tangent(&self) -> SectionMatrix {
        self.stiffness()
    }

    fn commit_state(&mut self) {
        self.committed = self.deformation;
    }

    fn revert_to_last_commit(&mut self) {
        self.deformation = self.committed;
    }

    fn revert_to_start(&mut self) {
        self.deformation = SectionVector::zeros();
        self.committed = SectionVector::zeros();
    }

    fn clone_box(&self) -> Box<dyn SectionModel> {
        Box::new(self.clone())
    }
}

/// A fiber (layer) of a discretised section
#[derive(Debug, Clone)]
pub struct Fiber {
    pub y: f64,
    pub z: f64,
    pub area: f64,
    pub material: Box<dyn UniaxialMaterial>,
}

/// Fiber section with elastic torsion.
///
/// Axial force and both bending moments come from the fibers; every fiber
/// resolves its own material law, so a non-converging fiber surfaces as a
/// `SectionConvergence` error of the whole section.
#[derive(Debug, Clone)]
pub struct FiberSection {
    fibers: Vec<Fiber>,
    gj: f64,
    deformation: SectionVector,
    committed: SectionVector,
}

impl FiberSection {
    pub fn new(fibers: Vec<Fiber>, gj: f64) -> Result<Self> {
        if fibers.is_empty() {
            return Err(Error::Config("fiber section needs at least one fiber".into()));
        }
        if let Some(bad) = fibers.iter().position(|f| !(f.area > 0.0)) {
            return Err(Error::Config(format!("fiber {bad} has non-positive area")));
        }
        Ok(Self {
            fibers,
            gj,
            deformation: SectionVector::zeros(),
            committed: SectionVector::zeros(),
        })
    }

    /// Rectangular section of `depth` (local y) by `width` (local z) split
    /// into an `ny` by `nz` grid of fibers sharing one material prototype.
    pub fn rectangular(
        depth: f64,
        width: f64,
        ny: usize,
        nz: usize,
        material: &dyn UniaxialMaterial,
        gj: f64,
    ) -> Result<Self> {
        if !(depth > 0.0 && width > 0.0) || ny == 0 || nz == 0 {
            return Err(Error::Config(format!(
                "invalid rectangular fiber grid {depth}x{width} with {ny}x{nz} fibers"
            )));
        }
        let dy = depth / ny as f64;
        let dz = width / nz as f64;
        let mut fibers = Vec::with_capacity(ny * nz);
        for i in 0..ny {
            for j in 0..nz {
                fibers.push(Fiber {
                    y: -0.5 * depth + (i as f64 + 0.5) * dy,
                    z: -0.5 * width + (j as f64 + 0.5) * dz,
                    area: dy * dz,
                    material: material.clone_box(),
                });
            }
        }
        Self::new(fibers, gj)
    }

    pub fn fibers(&self) -> &[Fiber] {
        &self.fibers
    }

    fn assemble_tangent(&self, initial: bool) -> SectionMatrix {
        let mut k = SectionMatrix::zeros();
        for fiber in &self.fibers {
            let et = if initial {
                fiber.material.initial_tangent()
            } else {
                fiber.material.tangent()
            };
            let a = [1.0, -fiber.y, fiber.z];
            let ea = et * fiber.area;
            for r in 0..3 {
                for c in 0..3 {
                    k[(r, c)] += ea * a[r] * a[c];
                }
            }
        }
        k[(3, 3)] = self.gj;
        k
    }
}

impl SectionModel for FiberSection {
    fn set_trial_section_deformation(&mut self, deformation: &SectionVector) -> Result<()> {
        self.deformation = *deformation;
        let (eps, kz, ky) = (deformation[0], deformation[1], deformation[2]);
        for (index, fiber) in self.fibers.iter_mut().enumerate() {
            let strain = eps - fiber.y * kz + fiber.z * ky;
            fiber.material.set_trial_strain(strain).map_err(|err| match err {
                Error::SectionConvergence { context, iterations } => Error::SectionConvergence {
                    context: format!("fiber {index}: {context}"),
                    iterations,
                },
                other => other,
            })?;
        }
        Ok(())
    }

    fn section_deformation(&self) -> SectionVector {
        self.deformation
    }

    fn stress_resultant(&self) -> SectionVector {
        let mut s = SectionVector::zeros();
        for fiber in &self.fibers {
            let force = fiber.material.stress() * fiber.area;
            s[0] += force;
            s[1] -= force * fiber.y;
            s[2] += force * fiber.z;
        }
        s[3] = self.gj * self.deformation[3];
        s
    }

    fn section_tangent(&self) -> SectionMatrix {
        self.assemble_tangent(false)
    }

    fn initial_tangent(&self) -> SectionMatrix {
        self.assemble_tangent(true)
    }

    fn commit_state(&mut self) {
        self.committed = self.deformation;
        for fiber in &mut self.fibers {
            fiber.material.commit_state();
        }
    }

    fn revert_to_last_commit(&mut self) {
        self.deformation = self.committed;
        for fiber in &mut self.fibers {
            fiber.material.revert_to_last_commit();
        }
    }

    fn revert_to_start(&mut self) {
        self.deformation = SectionVector::zeros();
        self.committed = SectionVector::zeros();
        for fiber in &mut self.fibers {
            fiber.material.revert_to_start();
        }
    }

    fn clone_box(&self) -> Box<dyn SectionModel> {
        Box::new(self.clone())
    }
}
