//! Iterative state determination of the mixed formulation.
//!
//! One call to [`MixedEngine::run`] walks the stages
//!
//! ```text
//! AwaitTransform → Interpolate → ComputeResidual → SolveFlexibility
//!                → UpdateSections → Condense → Done
//! ```
//!
//! The natural forces are corrected once per call from the weak
//! compatibility residual; convergence of the outer problem is left to the
//! global Newton loop that keeps calling `update()`. The internal slip DOFs,
//! when present, are equilibrated by a capped Newton loop inside the call
//! and condensed out before the basic stiffness is reported.
//!
//! All working storage is owned by the engine instance.

use crate::aggregator::{SectionAggregator, SectionState, SlipInterface};
use crate::condensation::{self, Matrix8};
use crate::config::Tolerances;
use crate::error::{Error, Result};
use crate::integration::IntegrationScheme;
use crate::interpolation::Interpolation;
use crate::linalg::{invert, invert_2x2};
use crate::materials::SectionModel;
use nalgebra::{Matrix6, Vector2, Vector6};
use tracing::{debug, trace};

/// Stage reached by the last state determination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    AwaitTransform,
    Interpolate,
    ComputeResidual,
    SolveFlexibility,
    UpdateSections,
    Condense,
    Done,
}

/// Element-level state in the natural system.
#[derive(Debug, Clone, PartialEq)]
pub struct NaturalState {
    /// Basic deformation `v`
    pub deformation: Vector6<f64>,
    /// Natural forces `fnat`
    pub force: Vector6<f64>,
    /// End slips of the interface
    pub slip: Vector2<f64>,
    /// Condensed basic stiffness `kv`
    pub stiffness: Matrix6<f64>,
    /// Condensed basic force `pb`
    pub basic_force: Vector6<f64>,
}

impl NaturalState {
    fn at_rest(stiffness: Matrix6<f64>) -> Self {
        Self {
            deformation: Vector6::zeros(),
            force: Vector6::zeros(),
            slip: Vector2::zeros(),
            stiffness,
            basic_force: Vector6::zeros(),
        }
    }
}

/// Diagnostics of one state determination.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct UpdateReport {
    pub residual_norm: f64,
    pub force_increment_norm: f64,
    pub fallback_points: usize,
    pub slip_iterations: usize,
}

#[derive(Debug, Clone)]
pub struct MixedEngine {
    element: i32,
    scheme: IntegrationScheme,
    interp: Interpolation,
    aggregator: SectionAggregator,
    slip: Option<SlipInterface>,
    tolerances: Tolerances,
    trial: NaturalState,
    committed: NaturalState,
    initial_stiffness: Matrix6<f64>,
    stage: Stage,
}

impl MixedEngine {
    /// Build the per-point state and the initial condensed stiffness.
    pub fn new(
        element: i32,
        scheme: IntegrationScheme,
        second_order: bool,
        section: &dyn SectionModel,
        slip: Option<SlipInterface>,
        tolerances: Tolerances,
    ) -> Result<Self> {
        let interp = Interpolation::new(scheme.length(), second_order);
        let mut aggregator = SectionAggregator::new(section, scheme.num_points())?;
        aggregator.interpolate(&scheme, &interp, &Vector6::zeros());

        let terms = aggregator.flexibility_terms(&scheme, &interp, 0.0);
        let h_inv = invert(&terms.flexibility, "initial element flexibility")?;
        let g = terms.compatibility;
        let rr = g.transpose() * h_inv * g;
        let initial_stiffness = match &slip {
            Some(interface) => {
                let kt = condensation::assemble(&rr, Some(&interface.initial_stiffness(&scheme)));
                condensation::condense(&kt, &condensation::Vector8::zeros())?.0
            }
            None => rr,
        };

        Ok(Self {
            element,
            scheme,
            interp,
            aggregator,
            slip,
            tolerances,
            trial: NaturalState::at_rest(initial_stiffness),
            committed: NaturalState::at_rest(initial_stiffness),
            initial_stiffness,
            stage: Stage::AwaitTransform,
        })
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn trial(&self) -> &NaturalState {
        &self.trial
    }

    pub fn committed(&self) -> &NaturalState {
        &self.committed
    }

    pub fn initial_stiffness(&self) -> &Matrix6<f64> {
        &self.initial_stiffness
    }

    pub fn scheme(&self) -> &IntegrationScheme {
        &self.scheme
    }

    pub fn section_states(&self) -> &[SectionState] {
        self.aggregator.trial_states()
    }

    pub fn aggregator(&self) -> &SectionAggregator {
        &self.aggregator
    }

    pub fn slip_interface(&self) -> Option<&SlipInterface> {
        self.slip.as_ref()
    }

    /// Run one state determination for the basic deformation increment
    /// `dv` measured from the current trial deformation.
    ///
    /// The trial stiffness and force are replaced only when every stage
    /// succeeds. On failure the section and interface states are put back as
    /// they were on entry, so the same increment can be retried. The
    /// interpolation is written on the undeformed length L0; large rotations
    /// enter through the transformation.
    pub fn run(&mut self, dv: &Vector6<f64>) -> Result<UpdateReport> {
        let aggregator = self.aggregator.clone();
        let slip = self.slip.clone();
        let result = self.determine(dv);
        if result.is_err() {
            self.aggregator = aggregator;
            self.slip = slip;
        }
        result
    }

    fn determine(&mut self, dv: &Vector6<f64>) -> Result<UpdateReport> {
        let v = self.trial.deformation + dv;
        let mut report = UpdateReport::default();

        self.enter(Stage::Interpolate);
        self.aggregator.interpolate(&self.scheme, &self.interp, &v);

        self.enter(Stage::ComputeResidual);
        let residual = self.aggregator.residual(&self.scheme, &self.trial.force);
        report.residual_norm = residual.norm();

        self.enter(Stage::SolveFlexibility);
        let terms = self
            .aggregator
            .flexibility_terms(&self.scheme, &self.interp, self.trial.force[0]);
        let h_inv = invert(&terms.flexibility, "element flexibility H")?;
        let dfnat = h_inv * residual;
        let force = self.trial.force + dfnat;
        report.force_increment_norm = dfnat.norm();

        self.enter(Stage::UpdateSections);
        report.fallback_points = self.aggregator.update_sections(&force)?;

        self.enter(Stage::Condense);
        let terms = self.aggregator.flexibility_terms(&self.scheme, &self.interp, force[0]);
        let h_inv = invert(&terms.flexibility, "element flexibility H")?;
        let g = terms.compatibility;
        let rr = g.transpose() * h_inv * (g - terms.geometric);
        let pr = g.transpose() * force;

        let (stiffness, basic_force, slip) = match self.slip.as_mut() {
            Some(interface) => {
                let (kt, p, alpha, iterations) = equilibrate_slip(
                    interface,
                    &self.scheme,
                    &self.tolerances,
                    &v,
                    self.trial.slip,
                    &rr,
                    &pr,
                )?;
                report.slip_iterations = iterations;
                let (kv, pb) = condensation::condense(&kt, &p)?;
                (kv, pb, alpha)
            }
            None => (rr, pr, self.trial.slip),
        };

        self.trial = NaturalState {
            deformation: v,
            force,
            slip,
            stiffness,
            basic_force,
        };
        self.enter(Stage::Done);
        debug!(
            element = self.element,
            residual = report.residual_norm,
            dfnat = report.force_increment_norm,
            fallbacks = report.fallback_points,
            "mixed state determination"
        );
        Ok(report)
    }

    pub(crate) fn enter(&mut self, stage: Stage) {
        trace!(element = self.element, ?stage, "engine stage");
        self.stage = stage;
    }

    pub fn commit_state(&mut self) {
        self.aggregator.commit_state(&self.trial.force);
        if let Some(slip) = self.slip.as_mut() {
            slip.commit_state();
        }
        self.committed = self.trial.clone();
    }

    pub fn revert_to_last_commit(&mut self) {
        self.aggregator.revert_to_last_commit();
        self.aggregator
            .interpolate(&self.scheme, &self.interp, &self.committed.deformation);
        if let Some(slip) = self.slip.as_mut() {
            slip.revert_to_last_commit();
        }
        self.trial = self.committed.clone();
        self.stage = Stage::AwaitTransform;
    }

    pub fn revert_to_start(&mut self) {
        self.aggregator.revert_to_start();
        if let Some(slip) = self.slip.as_mut() {
            slip.revert_to_start();
        }
        self.trial = NaturalState::at_rest(self.initial_stiffness);
        self.committed = self.trial.clone();
        self.stage = Stage::AwaitTransform;
    }
}

/// Newton iteration on the end slips until the interface carries no
/// unbalanced internal force. Returns the natural stiffness and force at
/// equilibrium together with the slips and the iteration count.
fn equilibrate_slip(
    interface: &mut SlipInterface,
    scheme: &IntegrationScheme,
    tolerances: &Tolerances,
    v: &Vector6<f64>,
    start: Vector2<f64>,
    rr: &Matrix6<f64>,
    pr: &Vector6<f64>,
) -> Result<(Matrix8, condensation::Vector8, Vector2<f64>, usize)> {
    let mut alpha = start;
    let limit = tolerances.slip_residual * (1.0 + pr.norm());
    for iteration in 0..=tolerances.max_slip_iterations {
        interface.set_trial(scheme, v, &alpha)?;
        let kt = condensation::assemble(rr, Some(&interface.stiffness(scheme)));
        let p = condensation::natural_force(pr, Some(&interface.force(scheme)));
        let r_s: Vector2<f64> = p.fixed_rows::<2>(6).into_owned();
        trace!(iteration, residual = r_s.norm(), "slip equilibrium");
        if r_s.norm() <= limit {
            return Ok((kt, p, alpha, iteration));
        }
        if iteration == tolerances.max_slip_iterations {
            break;
        }
        let ss = kt.fixed_view::<2, 2>(6, 6).into_owned();
        alpha -= invert_2x2(&ss, "interface slip stiffness")? * r_s;
    }
    Err(Error::SectionConvergence {
        context: "interface slip equilibrium".into(),
        iterations: tolerances.max_slip_iterations,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::integration::IntegrationRule;
    use crate::materials::{ElasticMaterial, ElasticSection};

    fn engine(second_order: bool, slip: Option<SlipInterface>) -> MixedEngine {
        let scheme = IntegrationScheme::new(IntegrationRule::GaussLobatto, 5, 100.0).unwrap();
        let section = ElasticSection::new(1.0e6, 1.0e5, 2.0e5, 5.0e4);
        MixedEngine::new(7, scheme, second_order, &section, slip, Tolerances::default()).unwrap()
    }

    #[test]
    fn initial_stiffness_is_classical_beam_stiffness() {
        let e = engine(false, None);
        let k = e.initial_stiffness();
        let l = 100.0;
        assert!((k[(0, 0)] - 1.0e6 / l).abs() / (1.0e6 / l) < 1e-12);
        assert!((k[(1, 1)] - 4.0e5 / l).abs() / (4.0e5 / l) < 1e-12);
        assert!((k[(1, 2)] - 2.0e5 / l).abs() / (2.0e5 / l) < 1e-12);
        assert!((k[(3, 3)] - 8.0e5 / l).abs() / (8.0e5 / l) < 1e-12);
        assert!((k[(5, 5)] - 5.0e4 / l).abs() / (5.0e4 / l) < 1e-12);
        assert_eq!(e.stage(), Stage::AwaitTransform);
    }

    #[test]
    fn one_call_converges_for_elastic_section() {
        let mut e = engine(false, None);
        let dv = Vector6::new(0.01, 0.001, -0.002, 0.0005, 0.0, 0.003);
        e.run(&dv).unwrap();
        assert_eq!(e.stage(), Stage::Done);
        let expected = e.initial_stiffness() * dv;
        let pb = e.trial().basic_force;
        assert!((pb - expected).norm() / expected.norm() < 1e-10);

        // A second call without increment finds nothing left to correct.
        let report = e.run(&Vector6::zeros()).unwrap();
        assert!(report.force_increment_norm < 1e-9 * expected.norm());
        assert!((e.trial().basic_force - pb).norm() < 1e-9 * pb.norm());
    }

    #[test]
    fn axial_compression_softens_bending_with_second_order() {
        let mut e = engine(true, None);
        e.run(&Vector6::new(-0.01, 0.0, 0.0, 0.0, 0.0, 0.0)).unwrap();
        let n = e.trial().force[0];
        assert!(n < 0.0);
        let k = e.trial().stiffness;
        let l = 100.0;
        let expected = 4.0e5 / l + 2.0 / 15.0 * n * l;
        assert!((k[(1, 1)] - expected).abs() / expected < 1e-6);
        let coupling = 2.0e5 / l - n * l / 30.0;
        assert!((k[(1, 2)] - coupling).abs() / coupling < 1e-6);
    }

    #[test]
    fn slip_interface_condenses_to_softer_bending() {
        let scheme = IntegrationScheme::new(IntegrationRule::GaussLobatto, 5, 100.0).unwrap();
        let slip = SlipInterface::new(5.0, &ElasticMaterial::new(50.0), 5).unwrap();
        let mut e = MixedEngine::new(
            1,
            scheme,
            false,
            &ElasticSection::new(1.0e6, 1.0e5, 1.0e5, 5.0e4),
            Some(slip),
            Tolerances::default(),
        )
        .unwrap();
        let rigid = engine(false, None);
        assert!(e.initial_stiffness()[(1, 1)] > rigid.initial_stiffness()[(1, 1)]);

        let dv = Vector6::new(0.0, 0.001, 0.001, 0.0, 0.0, 0.0);
        let report = e.run(&dv).unwrap();
        assert!(report.slip_iterations <= 1);
        let expected = e.initial_stiffness() * dv;
        assert!((e.trial().basic_force - expected).norm() / expected.norm() < 1e-9);
    }

    #[test]
    fn revert_to_start_restores_initial_stiffness() {
        let mut e = engine(true, None);
        e.run(&Vector6::new(-0.02, 0.01, 0.0, 0.0, 0.0, 0.0)).unwrap();
        e.commit_state();
        assert!(e.committed().stiffness != *e.initial_stiffness());
        e.revert_to_start();
        assert_eq!(e.trial().stiffness, *e.initial_stiffness());
        assert_eq!(e.committed().force, Vector6::zeros());
    }
}
