//! Per-integration-point section state and its element-level accumulation.
//!
//! The aggregator owns one section model per integration point and drives
//! them through the mixed update: it interpolates target deformations,
//! computes the weak compatibility residual and assembles the flexibility
//! `H`, compatibility `G` and geometric `Md` matrices. The optional slip
//! interface lives here as well since its strains are sampled at the same
//! points.

use crate::condensation::{Matrix8, NATURAL_DOFS, Vector8};
use crate::error::{Error, Result};
use crate::integration::IntegrationScheme;
use crate::interpolation::{Interpolation, slope_coefficients};
use crate::linalg::{invert, min_eigenvalue, mirror_upper};
use crate::materials::{SectionMatrix, SectionModel, SectionVector, UniaxialMaterial};
use nalgebra::{Matrix4x6, Matrix6, SVector, Vector2, Vector6};
use tracing::{trace, warn};

/// Response of one section.
#[derive(Debug, Clone, PartialEq)]
pub struct SectionState {
    pub deformation: SectionVector,
    pub resultant: SectionVector,
    pub tangent: SectionMatrix,
    pub flexibility: SectionMatrix,
}

impl SectionState {
    fn read(section: &dyn SectionModel, point: usize) -> Result<Self> {
        let tangent = section.section_tangent();
        let flexibility = invert(&tangent, &format!("section tangent at point {point}"))?;
        Ok(Self {
            deformation: section.section_deformation(),
            resultant: section.stress_resultant(),
            tangent,
            flexibility,
        })
    }
}

/// Increments accumulated since the last commit.
#[derive(Debug, Clone, PartialEq)]
pub struct StepIncrements {
    /// Section deformation increment
    pub duhat: SectionVector,
    /// Interpolated force increment
    pub dq: SectionVector,
    /// Stress resultant increment
    pub dsq: SectionVector,
}

impl Default for StepIncrements {
    fn default() -> Self {
        Self {
            duhat: SectionVector::zeros(),
            dq: SectionVector::zeros(),
            dsq: SectionVector::zeros(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct PointKinematics {
    nd1: Matrix4x6<f64>,
    nld_hat: Matrix4x6<f64>,
    target: SectionVector,
}

impl Default for PointKinematics {
    fn default() -> Self {
        Self {
            nd1: Matrix4x6::zeros(),
            nld_hat: Matrix4x6::zeros(),
            target: SectionVector::zeros(),
        }
    }
}

/// Flexibility-weighted element matrices of the mixed formulation.
#[derive(Debug, Clone, PartialEq)]
pub struct FlexibilityTerms {
    /// `H = Σ L·w·Nd1ᵀ·f·Nd1`
    pub flexibility: Matrix6<f64>,
    /// `G = Σ L·w·Nd1ᵀ·Nld_hat`
    pub compatibility: Matrix6<f64>,
    /// `Md = Σ L·w·Nd1ᵀ·f·Nd2`
    pub geometric: Matrix6<f64>,
}

#[derive(Debug, Clone)]
pub struct SectionAggregator {
    sections: Vec<Box<dyn SectionModel>>,
    trial: Vec<SectionState>,
    committed: Vec<SectionState>,
    initial: Vec<SectionState>,
    steps: Vec<StepIncrements>,
    committed_demand: Vec<SectionVector>,
    committed_target: Vec<SectionVector>,
    kinematics: Vec<PointKinematics>,
}

impl SectionAggregator {
    /// Clone `prototype` once per integration point.
    ///
    /// # Errors
    /// `SingularMatrix` if the initial section tangent cannot be inverted.
    pub fn new(prototype: &dyn SectionModel, num_points: usize) -> Result<Self> {
        let sections: Vec<Box<dyn SectionModel>> =
            (0..num_points).map(|_| prototype.clone_box()).collect();
        let initial = sections
            .iter()
            .enumerate()
            .map(|(i, s)| SectionState::read(s.as_ref(), i))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            sections,
            trial: initial.clone(),
            committed: initial.clone(),
            initial,
            steps: vec![StepIncrements::default(); num_points],
            committed_demand: vec![SectionVector::zeros(); num_points],
            committed_target: vec![SectionVector::zeros(); num_points],
            kinematics: vec![PointKinematics::default(); num_points],
        })
    }

    pub fn num_points(&self) -> usize {
        self.sections.len()
    }

    pub fn trial_states(&self) -> &[SectionState] {
        &self.trial
    }

    pub fn increments(&self) -> &[StepIncrements] {
        &self.steps
    }

    pub fn section(&self, point: usize) -> Option<&dyn SectionModel> {
        self.sections.get(point).map(|s| s.as_ref())
    }

    /// Section force demand `Nd1(v)·q` at each point for the given natural forces.
    pub fn force_demand(&self, force: &Vector6<f64>) -> Vec<SectionVector> {
        self.kinematics.iter().map(|k| k.nd1 * force).collect()
    }

    /// Evaluate `Nd1`, `Nld_hat` and `d̂` at every point for deformation `v`.
    pub fn interpolate(&mut self, scheme: &IntegrationScheme, interp: &Interpolation, v: &Vector6<f64>) {
        for (kin, p) in self.kinematics.iter_mut().zip(scheme.points()) {
            kin.nd1 = interp.nd1(p.xi, v);
            kin.nld_hat = interp.nld_hat(p.xi, v, 0.0, 0.0);
            kin.target = interp.target_deformation(p.xi, v, 0.0, 0.0);
        }
    }

    /// Weak compatibility residual
    /// `V = Σ L·w·Nd1ᵀ·(Δd̂ - duhat - f·(DQ - DSQ))`.
    pub fn residual(&mut self, scheme: &IntegrationScheme, force: &Vector6<f64>) -> Vector6<f64> {
        let l = scheme.length();
        let mut residual = Vector6::zeros();
        for (i, p) in scheme.points().iter().enumerate() {
            let kin = &self.kinematics[i];
            let state = &self.trial[i];
            let step = &mut self.steps[i];

            step.dq = kin.nd1 * force - self.committed_demand[i];
            step.dsq = state.resultant - self.committed[i].resultant;
            let dhat = kin.target - self.committed_target[i];
            let gap = dhat - step.duhat - state.flexibility * (step.dq - step.dsq);
            residual += l * p.weight * kin.nd1.transpose() * gap;
        }
        residual
    }

    /// Assemble `H`, `G` and `Md` from the current section flexibilities.
    pub fn flexibility_terms(
        &self,
        scheme: &IntegrationScheme,
        interp: &Interpolation,
        axial: f64,
    ) -> FlexibilityTerms {
        let l = scheme.length();
        let mut terms = FlexibilityTerms {
            flexibility: Matrix6::zeros(),
            compatibility: Matrix6::zeros(),
            geometric: Matrix6::zeros(),
        };
        for (i, p) in scheme.points().iter().enumerate() {
            let kin = &self.kinematics[i];
            let f = &self.trial[i].flexibility;
            let lw = l * p.weight;
            let nd1t_f = kin.nd1.transpose() * f;
            terms.flexibility += lw * nd1t_f * kin.nd1;
            terms.compatibility += lw * kin.nd1.transpose() * kin.nld_hat;
            if interp.second_order {
                terms.geometric += lw * nd1t_f * interp.nd2(p.xi, axial);
            }
        }
        terms
    }

    /// Newton update of every section toward the demand `Nd1·q`.
    ///
    /// A point whose new tangent has a negative eigenvalue falls back to the
    /// target deformation `d̂`. Returns the number of such points.
    ///
    /// # Errors
    /// Section failures and singular section tangents are reported as-is.
    pub fn update_sections(&mut self, force: &Vector6<f64>) -> Result<usize> {
        let mut fallbacks = 0;
        for i in 0..self.sections.len() {
            let kin = &self.kinematics[i];
            let step = &mut self.steps[i];
            step.dq = kin.nd1 * force - self.committed_demand[i];

            let correction = self.trial[i].flexibility * (step.dq - step.dsq);
            step.duhat += correction;
            let section = self.sections[i].as_mut();
            section.set_trial_section_deformation(&(self.committed[i].deformation + step.duhat))?;

            if min_eigenvalue(&section.section_tangent()) < 0.0 {
                warn!(
                    point = i,
                    "section tangent lost positive definiteness, reverting to compatible deformation"
                );
                step.duhat = kin.target - self.committed_target[i];
                section.set_trial_section_deformation(&(self.committed[i].deformation + step.duhat))?;
                fallbacks += 1;
            }

            let state = SectionState::read(section, i)?;
            step.dsq = state.resultant - self.committed[i].resultant;
            trace!(point = i, resultant = ?state.resultant.as_slice(), "section updated");
            self.trial[i] = state;
        }
        Ok(fallbacks)
    }

    /// Accept the trial state; `force` is the converged natural force.
    pub fn commit_state(&mut self, force: &Vector6<f64>) {
        for i in 0..self.sections.len() {
            self.sections[i].commit_state();
            self.committed_demand[i] = self.kinematics[i].nd1 * force;
            self.committed_target[i] = self.kinematics[i].target;
            self.steps[i] = StepIncrements::default();
        }
        self.committed.clone_from(&self.trial);
    }

    pub fn revert_to_last_commit(&mut self) {
        for section in &mut self.sections {
            section.revert_to_last_commit();
        }
        self.trial.clone_from(&self.committed);
        self.steps.fill(StepIncrements::default());
    }

    pub fn revert_to_start(&mut self) {
        for section in &mut self.sections {
            section.revert_to_start();
        }
        self.trial.clone_from(&self.initial);
        self.committed.clone_from(&self.initial);
        self.steps.fill(StepIncrements::default());
        self.committed_demand.fill(SectionVector::zeros());
        self.committed_target.fill(SectionVector::zeros());
        self.kinematics.fill(PointKinematics::default());
    }
}

/// Row of the natural system mapping `[v, α_I, α_J]` to the slip at `xi`.
pub fn slip_strain_row(xi: f64, lever_arm: f64) -> SVector<f64, NATURAL_DOFS> {
    let [a1, a2] = slope_coefficients(xi);
    let mut row = SVector::<f64, NATURAL_DOFS>::zeros();
    row[1] = lever_arm * a1;
    row[2] = lever_arm * a2;
    row[6] = 1.0 - xi;
    row[7] = xi;
    row
}

/// Deformable shear connection along the element axis.
///
/// The slip at each point is interpolated linearly from the two end slips
/// plus the contribution `h·w'` of the strong-axis rotation at lever arm `h`.
#[derive(Debug, Clone)]
pub struct SlipInterface {
    lever_arm: f64,
    materials: Vec<Box<dyn UniaxialMaterial>>,
}

impl SlipInterface {
    pub fn new(lever_arm: f64, prototype: &dyn UniaxialMaterial, num_points: usize) -> Result<Self> {
        if !lever_arm.is_finite() {
            return Err(Error::Config(format!("invalid slip lever arm {lever_arm}")));
        }
        Ok(Self {
            lever_arm,
            materials: (0..num_points).map(|_| prototype.clone_box()).collect(),
        })
    }

    pub fn lever_arm(&self) -> f64 {
        self.lever_arm
    }

    pub fn slips(&self) -> Vec<f64> {
        self.materials.iter().map(|m| m.strain()).collect()
    }

    /// Drive every interface material to the slip implied by `v` and `alpha`.
    pub fn set_trial(&mut self, scheme: &IntegrationScheme, v: &Vector6<f64>, alpha: &Vector2<f64>) -> Result<()> {
        let mut natural = SVector::<f64, NATURAL_DOFS>::zeros();
        natural.fixed_rows_mut::<6>(0).copy_from(v);
        natural.fixed_rows_mut::<2>(6).copy_from(alpha);
        for (i, (m, p)) in self.materials.iter_mut().zip(scheme.points()).enumerate() {
            let slip = slip_strain_row(p.xi, self.lever_arm).dot(&natural);
            m.set_trial_strain(slip).map_err(|e| match e {
                Error::SectionConvergence { context, iterations } => Error::SectionConvergence {
                    context: format!("slip point {i}: {context}"),
                    iterations,
                },
                other => other,
            })?;
        }
        Ok(())
    }

    fn accumulate(&self, scheme: &IntegrationScheme, tangent: impl Fn(&dyn UniaxialMaterial) -> f64) -> Matrix8 {
        let l = scheme.length();
        let mut k = Matrix8::zeros();
        for (m, p) in self.materials.iter().zip(scheme.points()) {
            let row = slip_strain_row(p.xi, self.lever_arm);
            let ks = l * p.weight * tangent(m.as_ref());
            for a in 0..NATURAL_DOFS {
                for b in a..NATURAL_DOFS {
                    k[(a, b)] += ks * row[a] * row[b];
                }
            }
        }
        mirror_upper(&mut k);
        k
    }

    /// `Σ L·w·k_s·Gscᵀ·Gsc`
    pub fn stiffness(&self, scheme: &IntegrationScheme) -> Matrix8 {
        self.accumulate(scheme, |m| m.tangent())
    }

    pub fn initial_stiffness(&self, scheme: &IntegrationScheme) -> Matrix8 {
        self.accumulate(scheme, |m| m.initial_tangent())
    }

    /// `Σ L·w·τ·Gscᵀ`
    pub fn force(&self, scheme: &IntegrationScheme) -> Vector8 {
        let l = scheme.length();
        self.materials
            .iter()
            .zip(scheme.points())
            .fold(Vector8::zeros(), |acc, (m, p)| {
                acc + slip_strain_row(p.xi, self.lever_arm) * (l * p.weight * m.stress())
            })
    }

    pub fn commit_state(&mut self) {
        self.materials.iter_mut().for_each(|m| m.commit_state());
    }

    pub fn revert_to_last_commit(&mut self) {
        self.materials.iter_mut().for_each(|m| m.revert_to_last_commit());
    }

    pub fn revert_to_start(&mut self) {
        self.materials.iter_mut().for_each(|m| m.revert_to_start());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::IntegrationRule;
    use crate::materials::{ElasticMaterial, ElasticSection};

    fn scheme(l: f64) -> IntegrationScheme {
        IntegrationScheme::new(IntegrationRule::GaussLobatto, 5, l).unwrap()
    }

    #[test]
    fn elastic_flexibility_matches_closed_form() {
        let (ea, ei, l) = (1.0e6, 1.0e5, 100.0);
        let section = ElasticSection::new(ea, ei, ei, 5.0e4);
        let scheme = scheme(l);
        let interp = Interpolation::new(l, false);
        let mut agg = SectionAggregator::new(&section, scheme.num_points()).unwrap();
        agg.interpolate(&scheme, &interp, &Vector6::zeros());
        let terms = agg.flexibility_terms(&scheme, &interp, 0.0);

        let h = terms.flexibility;
        assert!((h[(0, 0)] - l / ea).abs() < 1e-15);
        assert!((h[(1, 1)] - l / (3.0 * ei)).abs() < 1e-12);
        assert!((h[(1, 2)] + l / (6.0 * ei)).abs() < 1e-12);
        assert!((terms.compatibility - Matrix6::identity()).amax() < 1e-12);
        assert_eq!(terms.geometric, Matrix6::zeros());
    }

    #[test]
    fn residual_vanishes_for_compatible_elastic_state() {
        let l = 10.0;
        let section = ElasticSection::new(100.0, 50.0, 50.0, 20.0);
        let scheme = scheme(l);
        let interp = Interpolation::new(l, false);
        let mut agg = SectionAggregator::new(&section, scheme.num_points()).unwrap();
        agg.interpolate(&scheme, &interp, &Vector6::zeros());
        let r = agg.residual(&scheme, &Vector6::zeros());
        assert_eq!(r, Vector6::zeros());
    }

    #[test]
    fn update_and_commit_reset_increments() {
        let l = 2.0;
        let section = ElasticSection::new(100.0, 50.0, 50.0, 20.0);
        let scheme = scheme(l);
        let interp = Interpolation::new(l, false);
        let mut agg = SectionAggregator::new(&section, scheme.num_points()).unwrap();
        let v = Vector6::new(0.01, 0.0, 0.0, 0.0, 0.0, 0.0);
        agg.interpolate(&scheme, &interp, &v);
        let q = Vector6::new(0.5, 0.0, 0.0, 0.0, 0.0, 0.0);
        agg.update_sections(&q).unwrap();
        for state in agg.trial_states() {
            assert!((state.deformation[0] - 0.005).abs() < 1e-15);
        }
        agg.commit_state(&q);
        assert!(agg.increments().iter().all(|s| *s == StepIncrements::default()));
        agg.revert_to_start();
        assert!(agg.trial_states().iter().all(|s| s.deformation == SectionVector::zeros()));
    }

    #[test]
    fn slip_row_interpolates_end_slips() {
        let row = slip_strain_row(0.25, 0.3);
        assert_eq!(row[6], 0.75);
        assert_eq!(row[7], 0.25);
        assert!((row[1] - 0.3 * slope_coefficients(0.25)[0]).abs() < 1e-15);
    }

    #[test]
    fn slip_stiffness_is_symmetric_and_consistent_with_force() {
        let scheme = scheme(4.0);
        let mut slip = SlipInterface::new(0.2, &ElasticMaterial::new(300.0), scheme.num_points()).unwrap();
        let v = Vector6::new(0.0, 0.01, -0.02, 0.0, 0.0, 0.0);
        let alpha = Vector2::new(0.001, -0.002);
        slip.set_trial(&scheme, &v, &alpha).unwrap();
        let k = slip.stiffness(&scheme);
        assert_eq!(k, k.transpose());

        let mut natural = Vector8::zeros();
        natural.fixed_rows_mut::<6>(0).copy_from(&v);
        natural.fixed_rows_mut::<2>(6).copy_from(&alpha);
        assert!((k * natural - slip.force(&scheme)).amax() < 1e-12);
    }
}
