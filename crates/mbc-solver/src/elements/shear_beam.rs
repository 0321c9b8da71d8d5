//! Displacement-based Timoshenko beam with interdependent shear-bending
//! interpolation.
//!
//! Bending curvature and shear strain share the end rotations through the
//! softening factor Ω of each bending plane (Ω = 12·EI/(GA·L²)). For
//! inelastic response the secant rigidities change with the state, so Ω is
//! refined by a fixed-point loop inside every update.

use super::mixed_beam::check_nodes;
use super::{BeamElement, dynamic_matrix, dynamic_vector, lumped_mass};
use crate::config::{ElementConfig, Tolerances};
use crate::error::{Error, Result};
use crate::integration::IntegrationScheme;
use crate::interpolation::{Interpolation, OmegaProducts, slope_coefficients, softening_factor};
use crate::materials::{SectionModel, UniaxialMaterial};
use crate::node::Node;
use crate::transformation::CrdTransformation;
use nalgebra::{DMatrix, DVector, Matrix2, Matrix2x6, Matrix6, RowVector6, Vector2, Vector6};
use tracing::{debug, trace, warn};

/// Response at the end of an update. Ω is stored as `[Ωz, Ωy]`, the factors
/// of bending about local z and local y.
#[derive(Debug, Clone, PartialEq)]
pub struct ShearResponse {
    pub deformation: Vector6<f64>,
    pub omega: [f64; 2],
    pub stiffness: Matrix6<f64>,
    pub basic_force: Vector6<f64>,
    pub omega_iterations: usize,
}

#[derive(Debug, Clone)]
struct ShearPoint {
    section: Box<dyn SectionModel>,
    /// Shear along local y, then local z
    shear: [Box<dyn UniaxialMaterial>; 2],
}

#[derive(Debug, Clone)]
struct AttachedState {
    scheme: IntegrationScheme,
    interp: Interpolation,
    points: Vec<ShearPoint>,
    initial_omega: [f64; 2],
    initial: ShearResponse,
    trial: ShearResponse,
    committed: ShearResponse,
}

/// Two-node 3D shear-flexible beam-column.
#[derive(Debug, Clone)]
pub struct ShearFlexibleBeam {
    tag: i32,
    nodes: [i32; 2],
    section: Box<dyn SectionModel>,
    shear: [Box<dyn UniaxialMaterial>; 2],
    transform: Box<dyn CrdTransformation>,
    config: ElementConfig,
    state: Option<AttachedState>,
}

impl ShearFlexibleBeam {
    pub fn new(
        tag: i32,
        nodes: [i32; 2],
        section: Box<dyn SectionModel>,
        shear: [Box<dyn UniaxialMaterial>; 2],
        transform: Box<dyn CrdTransformation>,
        config: ElementConfig,
    ) -> Self {
        Self {
            tag,
            nodes,
            section,
            shear,
            transform,
            config,
            state: None,
        }
    }

    pub fn config(&self) -> &ElementConfig {
        &self.config
    }

    /// Committed-state response, if attached.
    pub fn committed_response(&self) -> Option<&ShearResponse> {
        self.state.as_ref().map(|s| &s.committed)
    }

    pub fn trial_response(&self) -> Option<&ShearResponse> {
        self.state.as_ref().map(|s| &s.trial)
    }

    /// Ω from the initial rigidities of the prototypes.
    fn initial_omega(&self, length: f64) -> [f64; 2] {
        let k = self.section.initial_tangent();
        let factor = |ei: f64, ga: f64| {
            let omega = 12.0 * ei / (ga * length * length);
            if omega.is_finite() && omega > 0.0 { omega } else { 0.0 }
        };
        [
            factor(k[(1, 1)], self.shear[0].initial_tangent()),
            factor(k[(2, 2)], self.shear[1].initial_tangent()),
        ]
    }

    fn attached(&self) -> Result<&AttachedState> {
        self.state.as_ref().ok_or(Error::NotAttached(self.tag))
    }
}

/// Drive every point to the strains implied by `v` at the given Ω.
fn drive_points(
    points: &mut [ShearPoint],
    scheme: &IntegrationScheme,
    interp: &Interpolation,
    v: &Vector6<f64>,
    omega: [f64; 2],
) -> Result<()> {
    let gamma = interp.shear_strains(v, omega[0], omega[1]);
    for (point, p) in points.iter_mut().zip(scheme.points()) {
        let d = interp.target_deformation(p.xi, v, omega[0], omega[1]);
        point.section.set_trial_section_deformation(&d)?;
        point.shear[0].set_trial_strain(gamma[0])?;
        point.shear[1].set_trial_strain(gamma[1])?;
    }
    Ok(())
}

fn strain_products(points: &[ShearPoint], scheme: &IntegrationScheme) -> [OmegaProducts; 2] {
    let mut products = [OmegaProducts::default(); 2];
    for (point, p) in points.iter().zip(scheme.points()) {
        let d = point.section.section_deformation();
        let s = point.section.stress_resultant();
        for (plane, acc) in products.iter_mut().enumerate() {
            let shear = &point.shear[plane];
            acc.add(p.weight, s[plane + 1], d[plane + 1], shear.stress(), shear.strain());
        }
    }
    products
}

/// Basic stiffness and force of the current point states at Ω.
fn assemble(
    points: &[ShearPoint],
    scheme: &IntegrationScheme,
    interp: &Interpolation,
    v: &Vector6<f64>,
    omega: [f64; 2],
    initial: bool,
) -> (Matrix6<f64>, Vector6<f64>) {
    let l = scheme.length();
    let shear_b: Matrix2x6<f64> = interp.shear_interpolation(omega[0], omega[1]);
    let mut k = Matrix6::zeros();
    let mut q = Vector6::zeros();
    for (point, p) in points.iter().zip(scheme.points()) {
        let lw = l * p.weight;
        let b = interp.nld_hat(p.xi, v, omega[0], omega[1]);
        let (ks, kg) = if initial {
            (
                point.section.initial_tangent(),
                Vector2::new(point.shear[0].initial_tangent(), point.shear[1].initial_tangent()),
            )
        } else {
            (
                point.section.section_tangent(),
                Vector2::new(point.shear[0].tangent(), point.shear[1].tangent()),
            )
        };
        let s = point.section.stress_resultant();
        let tau = Vector2::new(point.shear[0].stress(), point.shear[1].stress());

        k += lw * (b.transpose() * ks * b + shear_b.transpose() * Matrix2::from_diagonal(&kg) * shear_b);
        q += lw * (b.transpose() * s + shear_b.transpose() * tau);

        if interp.second_order && !initial {
            // Bowing strain curvature times the axial force.
            let [a1, a2] = slope_coefficients(p.xi);
            let wy = RowVector6::new(0.0, a1, a2, 0.0, 0.0, 0.0);
            let wz = RowVector6::new(0.0, 0.0, 0.0, a1, a2, 0.0);
            k += lw * s[0] * (wy.transpose() * wy + wz.transpose() * wz);
        }
    }
    (k, q)
}

/// Refine Ω at the basic deformation `v` until the fixed point settles,
/// then assemble the response.
fn determine(state: &mut AttachedState, v: &Vector6<f64>, tolerances: &Tolerances, tag: i32) -> Result<ShearResponse> {
    let length = state.scheme.length();
    let mut omega = [0.0; 2];
    for plane in 0..2 {
        omega[plane] = match state.committed.omega[plane] {
            w if w > 0.0 => w,
            _ => state.initial_omega[plane],
        };
    }

    let mut converged = None;
    for iteration in 1..=tolerances.max_omega_iterations {
        drive_points(&mut state.points, &state.scheme, &state.interp, v, omega)?;
        let products = strain_products(&state.points, &state.scheme);
        let mut next = [0.0; 2];
        for plane in 0..2 {
            // An unbent plane carries no secant information.
            if v[2 * plane + 1] == 0.0 && v[2 * plane + 2] == 0.0 {
                next[plane] = omega[plane];
                continue;
            }
            let (w, zeroed) = softening_factor(&products[plane], length, tolerances.omega_zero_product);
            if zeroed && omega[plane] > 0.0 {
                warn!(element = tag, plane, "softening factor zeroed by vanishing strain products");
            }
            next[plane] = w;
        }
        trace!(element = tag, iteration, ?omega, ?next, "softening factor");
        if (0..2).all(|p| (next[p] - omega[p]).abs() < tolerances.omega) {
            converged = Some(iteration);
            break;
        }
        omega = next;
    }

    let iterations = converged.ok_or_else(|| Error::SectionConvergence {
        context: "shear softening factor".into(),
        iterations: tolerances.max_omega_iterations,
    })?;

    let (stiffness, basic_force) = assemble(&state.points, &state.scheme, &state.interp, v, omega, false);
    if stiffness.iter().chain(basic_force.iter()).any(|x| !x.is_finite()) {
        return Err(Error::SingularMatrix("non-finite basic stiffness".into()));
    }
    Ok(ShearResponse {
        deformation: *v,
        omega,
        stiffness,
        basic_force,
        omega_iterations: iterations,
    })
}

impl BeamElement for ShearFlexibleBeam {
    fn tag(&self) -> i32 {
        self.tag
    }

    fn external_nodes(&self) -> [i32; 2] {
        self.nodes
    }

    fn set_domain(&mut self, node_i: &Node, node_j: &Node) -> Result<()> {
        check_nodes(self.tag, self.nodes, node_i, node_j)?;
        self.config.validate()?;
        self.transform.initialize(node_i, node_j)?;

        let length = self.transform.initial_length();
        let scheme = self.config.scheme(length)?;
        let interp = Interpolation::new(length, self.config.second_order);
        let points: Vec<ShearPoint> = (0..scheme.num_points())
            .map(|_| ShearPoint {
                section: self.section.clone_box(),
                shear: self.shear.clone(),
            })
            .collect();
        let initial_omega = self.initial_omega(length);
        let (stiffness, _) = assemble(&points, &scheme, &interp, &Vector6::zeros(), initial_omega, true);
        let initial = ShearResponse {
            deformation: Vector6::zeros(),
            omega: [0.0; 2],
            stiffness,
            basic_force: Vector6::zeros(),
            omega_iterations: 0,
        };
        debug!(element = self.tag, length, omega = ?initial_omega, "shear-flexible element attached");
        self.state = Some(AttachedState {
            scheme,
            interp,
            points,
            initial_omega,
            trial: initial.clone(),
            committed: initial.clone(),
            initial,
        });
        self.update(node_i, node_j)
    }

    fn update(&mut self, node_i: &Node, node_j: &Node) -> Result<()> {
        let tag = self.tag;
        let tolerances = self.config.tolerances;
        let state = self.state.as_mut().ok_or(Error::NotAttached(tag))?;
        self.transform
            .update(node_i, node_j)
            .map_err(|e| e.within(tag))?;
        let v = self.transform.basic_trial_disp();

        let points = state.points.clone();
        match determine(state, &v, &tolerances, tag) {
            Ok(response) => {
                debug!(
                    element = tag,
                    iterations = response.omega_iterations,
                    omega = ?response.omega,
                    "shear-flexible state determination"
                );
                state.trial = response;
                Ok(())
            }
            Err(err) => {
                state.points = points;
                warn!(element = tag, error = %err, "state determination failed");
                Err(err.within(tag))
            }
        }
    }

    fn commit_state(&mut self) -> Result<()> {
        let state = self.state.as_mut().ok_or(Error::NotAttached(self.tag))?;
        for point in &mut state.points {
            point.section.commit_state();
            point.shear.iter_mut().for_each(|m| m.commit_state());
        }
        state.committed = state.trial.clone();
        self.transform.commit_state();
        Ok(())
    }

    fn revert_to_last_commit(&mut self) -> Result<()> {
        let state = self.state.as_mut().ok_or(Error::NotAttached(self.tag))?;
        for point in &mut state.points {
            point.section.revert_to_last_commit();
            point.shear.iter_mut().for_each(|m| m.revert_to_last_commit());
        }
        state.trial = state.committed.clone();
        self.transform.revert_to_last_commit();
        Ok(())
    }

    fn revert_to_start(&mut self) -> Result<()> {
        let state = self.state.as_mut().ok_or(Error::NotAttached(self.tag))?;
        for point in &mut state.points {
            point.section.revert_to_start();
            point.shear.iter_mut().for_each(|m| m.revert_to_start());
        }
        state.trial = state.initial.clone();
        state.committed = state.initial.clone();
        self.transform.revert_to_start();
        Ok(())
    }

    fn tangent_stiff(&self) -> Result<DMatrix<f64>> {
        let trial = &self.attached()?.trial;
        let k = self
            .transform
            .global_stiff_matrix(&trial.stiffness, &trial.basic_force);
        Ok(dynamic_matrix(&k))
    }

    fn initial_stiff(&self) -> Result<DMatrix<f64>> {
        let initial = &self.attached()?.initial;
        Ok(dynamic_matrix(
            &self.transform.initial_global_stiff_matrix(&initial.stiffness),
        ))
    }

    fn resisting_force(&self) -> Result<DVector<f64>> {
        let trial = &self.attached()?.trial;
        let p = self
            .transform
            .global_resisting_force(&trial.basic_force, &Vector6::zeros());
        Ok(dynamic_vector(&p))
    }

    fn mass(&self) -> Result<DMatrix<f64>> {
        self.attached()?;
        Ok(lumped_mass(
            self.config.mass_per_length,
            self.transform.initial_length(),
        ))
    }

    fn basic_force(&self) -> Result<Vector6<f64>> {
        Ok(self.attached()?.trial.basic_force)
    }

    fn basic_stiffness(&self) -> Result<Matrix6<f64>> {
        Ok(self.attached()?.trial.stiffness)
    }
}
