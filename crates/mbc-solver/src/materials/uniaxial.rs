//! Uniaxial material laws.

use super::UniaxialMaterial;
use crate::error::{Error, Result};

/// Linear elastic law σ = E ε
#[derive(Debug, Clone, PartialEq)]
pub struct ElasticMaterial {
    modulus: f64,
    strain: f64,
    committed_strain: f64,
}

impl ElasticMaterial {
    pub fn new(modulus: f64) -> Self {
        Self {
            modulus,
            strain: 0.0,
            committed_strain: 0.0,
        }
    }
}

impl UniaxialMaterial for ElasticMaterial {
    fn set_trial_strain(&mut self, strain: f64) -> Result<()> {
        self.strain = strain;
        Ok(())
    }

    fn strain(&self) -> f64 {
        self.strain
    }

    fn stress(&self) -> f64 {
        self.modulus * self.strain
    }

    fn tangent(&self) -> f64 {
        self.modulus
    }

    fn initial_tangent(&self) -> f64 {
        self.modulus
    }

    fn commit_state(&mut self) {
        self.committed_strain = self.strain;
    }

    fn revert_to_last_commit(&mut self) {
        self.strain = self.committed_strain;
    }

    fn revert_to_start(&mut self) {
        self.strain = 0.0;
        self.committed_strain = 0.0;
    }

    fn clone_box(&self) -> Box<dyn UniaxialMaterial> {
        Box::new(self.clone())
    }
}

/// Bilinear elasto-plastic law with linear kinematic hardening.
///
/// `hardening_ratio` is the post-yield tangent as a fraction of `modulus`
/// and must lie in `[0, 1)`.
#[derive(Debug, Clone, PartialEq)]
pub struct BilinearMaterial {
    modulus: f64,
    yield_stress: f64,
    kinematic_modulus: f64,
    // trial
    strain: f64,
    stress: f64,
    tangent: f64,
    plastic_strain: f64,
    back_stress: f64,
    // committed
    committed_strain: f64,
    committed_stress: f64,
    committed_tangent: f64,
    committed_plastic_strain: f64,
    committed_back_stress: f64,
}

impl BilinearMaterial {
    pub fn new(modulus: f64, yield_stress: f64, hardening_ratio: f64) -> Result<Self> {
        if !(modulus > 0.0 && yield_stress > 0.0) {
            return Err(Error::Config(format!(
                "bilinear material needs positive modulus and yield stress, got E={modulus}, fy={yield_stress}"
            )));
        }
        if !(0.0..1.0).contains(&hardening_ratio) {
            return Err(Error::Config(format!(
                "hardening ratio must lie in [0, 1), got {hardening_ratio}"
            )));
        }
        let kinematic_modulus = hardening_ratio * modulus / (1.0 - hardening_ratio);
        Ok(Self {
            modulus,
            yield_stress,
            kinematic_modulus,
            strain: 0.0,
            stress: 0.0,
            tangent: modulus,
            plastic_strain: 0.0,
            back_stress: 0.0,
            committed_strain: 0.0,
            committed_stress: 0.0,
            committed_tangent: modulus,
            committed_plastic_strain: 0.0,
            committed_back_stress: 0.0,
        })
    }

    pub fn plastic_strain(&self) -> f64 {
        self.plastic_strain
    }
}

impl UniaxialMaterial for BilinearMaterial {
    fn set_trial_strain(&mut self, strain: f64) -> Result<()> {
        let e = self.modulus;
        let h = self.kinematic_modulus;

        self.strain = strain;
        let trial_stress = e * (strain - self.committed_plastic_strain);
        let relative = trial_stress - self.committed_back_stress;
        let f = relative.abs() - self.yield_stress;

        if f <= 0.0 {
            self.stress = trial_stress;
            self.tangent = e;
            self.plastic_strain = self.committed_plastic_strain;
            self.back_stress = self.committed_back_stress;
        } else {
            let dg = f / (e + h);
            let sign = relative.signum();
            self.plastic_strain = self.committed_plastic_strain + dg * sign;
            self.back_stress = self.committed_back_stress + h * dg * sign;
            self.stress = e * (strain - self.plastic_strain);
            self.tangent = e * h / (e + h);
        }
        Ok(())
    }

    fn strain(&self) -> f64 {
        self.strain
    }

    fn stress(&self) -> f64 {
        self.stress
    }

    fn tangent(&self) -> f64 {
        self.tangent
    }

    fn initial_tangent(&self) -> f64 {
        self.modulus
    }

    fn commit_state(&mut self) {
        self.committed_strain = self.strain;
        self.committed_stress = self.stress;
        self.committed_tangent = self.tangent;
        self.committed_plastic_strain = self.plastic_strain;
        self.committed_back_stress = self.back_stress;
    }

    fn revert_to_last_commit(&mut self) {
        self.strain = self.committed_strain;
        self.stress = self.committed_stress;
        self.tangent = self.committed_tangent;
        self.plastic_strain = self.committed_plastic_strain;
        self.back_stress = self.committed_back_stress;
    }

    fn revert_to_start(&mut self) {
        self.strain = 0.0;
        self.stress = 0.0;
        self.tangent = self.modulus;
        self.plastic_strain = 0.0;
        self.back_stress = 0.0;
        self.commit_state();
    }

    fn clone_box(&self) -> Box<dyn UniaxialMaterial> {
        Box::new(self.clone())
    }
}

/// Nonlinear elastic Ramberg-Osgood law
///
/// ```text
/// ε = σ/E + α·(σy/E)·(|σ|/σy)^n · sign(σ)
/// ```
///
/// The law is implicit in σ, so every trial strain is resolved with a
/// bracketed Newton iteration capped at `max_iterations`.
#[derive(Debug, Clone, PartialEq)]
pub struct RambergOsgoodMaterial {
    modulus: f64,
    yield_stress: f64,
    alpha: f64,
    exponent: f64,
    max_iterations: usize,
    tolerance: f64,
    strain: f64,
    stress: f64,
    tangent: f64,
    committed_strain: f64,
    committed_stress: f64,
    committed_tangent: f64,
}

impl RambergOsgoodMaterial {
    pub fn new(modulus: f64, yield_stress: f64, alpha: f64, exponent: f64) -> Result<Self> {
        if !(modulus > 0.0 && yield_stress > 0.0 && alpha >= 0.0 && exponent >= 1.0) {
            return Err(Error::Config(format!(
                "invalid Ramberg-Osgood parameters E={modulus}, fy={yield_stress}, alpha={alpha}, n={exponent}"
            )));
        }
        Ok(Self {
            modulus,
            yield_stress,
            alpha,
            exponent,
            max_iterations: 50,
            tolerance: 1e-12,
            strain: 0.0,
            stress: 0.0,
            tangent: modulus,
            committed_strain: 0.0,
            committed_stress: 0.0,
            committed_tangent: modulus,
        })
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Strain produced by a stress, and its derivative dε/dσ.
    fn strain_of(&self, stress: f64) -> (f64, f64) {
        let e = self.modulus;
        let ratio = stress.abs() / self.yield_stress;
        let eps = stress / e + self.alpha * self.yield_stress / e * ratio.powf(self.exponent) * stress.signum();
        let deps = 1.0 / e + self.alpha * self.exponent / e * ratio.powf(self.exponent - 1.0);
        (eps, deps)
    }
}

impl UniaxialMaterial for RambergOsgoodMaterial {
    fn set_trial_strain(&mut self, strain: f64) -> Result<()> {
        let elastic = self.modulus * strain;
        let (mut lo, mut hi) = if elastic >= 0.0 { (0.0, elastic) } else { (elastic, 0.0) };
        let scale = strain.abs() + self.yield_stress / self.modulus;

        let mut sigma = self.stress.clamp(lo, hi);
        for _ in 0..self.max_iterations {
            let (eps, deps) = self.strain_of(sigma);
            let residual = eps - strain;
            if residual.abs() <= self.tolerance * scale {
                self.strain = strain;
                self.stress = sigma;
                self.tangent = 1.0 / deps;
                return Ok(());
            }
            if residual > 0.0 {
                hi = sigma;
            } else {
                lo = sigma;
            }
            let newton = sigma - residual / deps;
            sigma = if newton > lo && newton < hi {
                newton
            } else {
                0.5 * (lo + hi)
            };
        }

        Err(Error::SectionConvergence {
            context: format!("Ramberg-Osgood stress at strain {strain:.6e}"),
            iterations: self.max_iterations,
        })
    }

    fn strain(&self) -> f64 {
        self.strain
    }

    fn stress(&self) -> f64 {
        self.stress
    }

    fn tangent(&self) -> f64 {
        self.tangent
    }

    fn initial_tangent(&self) -> f64 {
        self.modulus
    }

    fn commit_state(&mut self) {
        self.committed_strain = self.strain;
        self.committed_stress = self.stress;
        self.committed_tangent = self.tangent;
    }

    fn revert_to_last_commit(&mut self) {
        self.strain = self.committed_strain;
        self.stress = self.committed_stress;
        self.tangent = self.committed_tangent;
    }

    fn revert_to_start(&mut self) {
        self.strain = 0.0;
        self.stress = 0.0;
        self.tangent = self.modulus;
        self.commit_state();
    }

    fn clone_box(&self) -> Box<dyn UniaxialMaterial> {
        Box::new(self.clone())
    }
}
