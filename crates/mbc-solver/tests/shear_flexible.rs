//! Integration tests for the shear-flexible (Timoshenko) beam element
//! Checks the interdependent interpolation against the closed-form
//! stiffness and the iteration cap of the softening-factor loop

use mbc_solver::{
    BeamElement, BilinearMaterial, ElasticMaterial, ElasticSection, ElementConfig, Error,
    LinearTransformation, Node, Result, ShearFlexibleBeam, Tolerances, UniaxialMaterial,
    status_code,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const EIZ: f64 = 200.0;
const EIY: f64 = 100.0;
const GA: f64 = 1000.0;
const LENGTH: f64 = 2.0;

fn beam(shear: [Box<dyn UniaxialMaterial>; 2], config: ElementConfig) -> ShearFlexibleBeam {
    ShearFlexibleBeam::new(
        2,
        [1, 2],
        Box::new(ElasticSection::new(1.0e5, EIZ, EIY, 80.0)),
        shear,
        Box::new(LinearTransformation::new(None)),
        config,
    )
}

fn nodes() -> (Node, Node) {
    (Node::new(1, 0.0, 0.0, 0.0, 6), Node::new(2, LENGTH, 0.0, 0.0, 6))
}

#[test]
fn test_elastic_stiffness_matches_closed_form() {
    // Timoshenko beam, φ = 12EI/(GA·L²):
    //   k = EI/(L(1+φ)) · [4+φ, 2-φ; 2-φ, 4+φ]
    let mut element = beam(
        [Box::new(ElasticMaterial::new(GA)), Box::new(ElasticMaterial::new(GA))],
        ElementConfig::default(),
    );
    let (mut a, mut b) = nodes();
    element.set_domain(&a, &b).unwrap();

    a.incr_trial_disp_dof(5, 0.001);
    b.incr_trial_disp_dof(5, 0.001);
    element.update(&a, &b).unwrap();

    let phi_z = 12.0 * EIZ / (GA * LENGTH * LENGTH);
    let phi_y = 12.0 * EIY / (GA * LENGTH * LENGTH);
    let scale = EIZ / (LENGTH * (1.0 + phi_z));
    let k11 = scale * (4.0 + phi_z);
    let k12 = scale * (2.0 - phi_z);

    let k = element.basic_stiffness().unwrap();
    println!("φz = {phi_z}, k11 = {} (expected {k11}), k12 = {} (expected {k12})", k[(1, 1)], k[(1, 2)]);
    assert!((k[(1, 1)] - k11).abs() / k11 < 1e-10);
    assert!((k[(1, 2)] - k12).abs() / k12 < 1e-10);
    let k33 = EIY / (LENGTH * (1.0 + phi_y)) * (4.0 + phi_y);
    assert!((k[(3, 3)] - k33).abs() / k33 < 1e-10);

    let response = element.trial_response().unwrap();
    assert!((response.omega[0] - phi_z).abs() < 1e-12);
    assert_eq!(response.omega_iterations, 1);

    let pb = element.basic_force().unwrap();
    let expected = (k11 + k12) * 0.001;
    assert!((pb[1] - expected).abs() / expected < 1e-10);
    assert!((pb[2] - expected).abs() / expected < 1e-10);
}

#[test]
fn test_omega_loop_cap_reports_convergence_failure() {
    let yielding = || -> Box<dyn UniaxialMaterial> {
        Box::new(BilinearMaterial::new(GA, 0.05, 0.01).unwrap())
    };
    let config = ElementConfig {
        tolerances: Tolerances {
            max_omega_iterations: 1,
            ..Tolerances::default()
        },
        ..ElementConfig::default()
    };
    let mut element = beam([yielding(), yielding()], config);
    let (mut a, mut b) = nodes();
    element.set_domain(&a, &b).unwrap();
    let before = element.trial_response().unwrap().clone();

    // Shear strain well past yield moves Ω away from its elastic value.
    a.incr_trial_disp_dof(5, 0.001);
    b.incr_trial_disp_dof(5, 0.001);
    let result = element.update(&a, &b);
    match &result {
        Err(err @ Error::ConvergenceFailure { element: 2, .. }) => {
            assert!(matches!(
                err.root_cause(),
                Error::SectionConvergence { iterations: 1, .. }
            ));
        }
        other => panic!("expected convergence failure, got {other:?}"),
    }
    assert_eq!(status_code(&result), -1);

    // The failed update left the trial response alone.
    assert_eq!(element.trial_response().unwrap(), &before);
    assert!(element.tangent_stiff().unwrap().iter().all(|x| x.is_finite()));
}

#[test]
fn test_yielding_shear_increases_omega() {
    let yielding = || -> Box<dyn UniaxialMaterial> {
        Box::new(BilinearMaterial::new(GA, 0.05, 0.01).unwrap())
    };
    let mut element = beam([yielding(), yielding()], ElementConfig::default());
    let (mut a, mut b) = nodes();
    element.set_domain(&a, &b).unwrap();

    a.incr_trial_disp_dof(5, 0.001);
    b.incr_trial_disp_dof(5, 0.001);
    element.update(&a, &b).unwrap();
    element.commit_state().unwrap();

    let elastic = 12.0 * EIZ / (GA * LENGTH * LENGTH);
    let response = element.committed_response().unwrap();
    println!("Ω = {:?} after {} iterations", response.omega, response.omega_iterations);
    assert!(response.omega[0] > elastic);
    assert!(response.omega_iterations > 1);

    element.revert_to_start().unwrap();
    assert_eq!(element.trial_response().unwrap().omega, [0.0, 0.0]);
}

/// Elastic shear law that refuses trial strains while the shared switch is on.
#[derive(Debug, Clone)]
struct SwitchedShear {
    inner: ElasticMaterial,
    broken: Arc<AtomicBool>,
}

impl UniaxialMaterial for SwitchedShear {
    fn set_trial_strain(&mut self, strain: f64) -> Result<()> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(Error::SectionConvergence {
                context: "shear law".into(),
                iterations: 0,
            });
        }
        self.inner.set_trial_strain(strain)
    }

    fn strain(&self) -> f64 {
        self.inner.strain()
    }

    fn stress(&self) -> f64 {
        self.inner.stress()
    }

    fn tangent(&self) -> f64 {
        self.inner.tangent()
    }

    fn initial_tangent(&self) -> f64 {
        self.inner.initial_tangent()
    }

    fn commit_state(&mut self) {
        self.inner.commit_state();
    }

    fn revert_to_last_commit(&mut self) {
        self.inner.revert_to_last_commit();
    }

    fn revert_to_start(&mut self) {
        self.inner.revert_to_start();
    }

    fn clone_box(&self) -> Box<dyn UniaxialMaterial> {
        Box::new(self.clone())
    }
}

#[test]
fn test_failed_update_is_retried_at_same_displacement() {
    let broken = Arc::new(AtomicBool::new(false));
    let switched = || -> Box<dyn UniaxialMaterial> {
        Box::new(SwitchedShear {
            inner: ElasticMaterial::new(GA),
            broken: Arc::clone(&broken),
        })
    };
    let mut element = beam([switched(), switched()], ElementConfig::default());
    let (mut a, mut b) = nodes();
    element.set_domain(&a, &b).unwrap();

    a.incr_trial_disp_dof(5, 0.001);
    b.incr_trial_disp_dof(5, 0.001);
    broken.store(true, Ordering::SeqCst);
    let result = element.update(&a, &b);
    assert!(matches!(result, Err(Error::ConvergenceFailure { element: 2, .. })));
    broken.store(false, Ordering::SeqCst);

    element.update(&a, &b).unwrap();
    let response = element.trial_response().unwrap();
    assert!((response.deformation[1] - 0.001).abs() < 1e-15);
    assert!((response.deformation[2] - 0.001).abs() < 1e-15);

    let phi_z = 12.0 * EIZ / (GA * LENGTH * LENGTH);
    let scale = EIZ / (LENGTH * (1.0 + phi_z));
    let expected = scale * 6.0 * 0.001;
    let pb = element.basic_force().unwrap();
    println!("M_I = {}, M_J = {} (expected {expected})", pb[1], pb[2]);
    assert!((pb[1] - expected).abs() / expected < 1e-10);
    assert!((pb[2] - expected).abs() / expected < 1e-10);
}
