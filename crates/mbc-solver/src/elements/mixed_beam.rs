//! Mixed beam-column element hosting the natural-force state determination.

use super::{BeamElement, dynamic_matrix, dynamic_vector, lumped_mass};
use crate::aggregator::SlipInterface;
use crate::config::ElementConfig;
use crate::engine::{MixedEngine, Stage, UpdateReport};
use crate::error::{Error, Result};
use crate::materials::{SectionModel, UniaxialMaterial};
use crate::node::Node;
use crate::transformation::{CrdTransformation, NODE_DOFS};
use nalgebra::{DMatrix, DVector, Matrix6, Vector6};
use tracing::{debug, warn};

/// Two-node 3D mixed beam-column with an optional slip interface.
///
/// Section forces are interpolated from natural forces and section
/// deformations are enforced in a weak sense, so a single element captures
/// spread of plasticity without mesh refinement. The interface adds two end
/// slips that are condensed out of the reported stiffness.
#[derive(Debug, Clone)]
pub struct MixedBeamColumn {
    tag: i32,
    nodes: [i32; 2],
    section: Box<dyn SectionModel>,
    slip: Option<(f64, Box<dyn UniaxialMaterial>)>,
    transform: Box<dyn CrdTransformation>,
    config: ElementConfig,
    engine: Option<MixedEngine>,
    last_report: UpdateReport,
}

impl MixedBeamColumn {
    pub fn new(
        tag: i32,
        nodes: [i32; 2],
        section: Box<dyn SectionModel>,
        transform: Box<dyn CrdTransformation>,
        config: ElementConfig,
    ) -> Self {
        Self {
            tag,
            nodes,
            section,
            slip: None,
            transform,
            config,
            engine: None,
            last_report: UpdateReport::default(),
        }
    }

    /// Add a slip interface at `lever_arm` with the given shear-slip law.
    pub fn with_slip(mut self, lever_arm: f64, material: Box<dyn UniaxialMaterial>) -> Self {
        self.slip = Some((lever_arm, material));
        self
    }

    pub fn config(&self) -> &ElementConfig {
        &self.config
    }

    pub fn engine(&self) -> Option<&MixedEngine> {
        self.engine.as_ref()
    }

    pub fn last_report(&self) -> &UpdateReport {
        &self.last_report
    }

    pub fn transformation(&self) -> &dyn CrdTransformation {
        self.transform.as_ref()
    }

    fn attached(&self) -> Result<&MixedEngine> {
        self.engine.as_ref().ok_or(Error::NotAttached(self.tag))
    }
}

/// Reject nodes that are not the element's or lack the expected DOFs.
pub(crate) fn check_nodes(tag: i32, expected: [i32; 2], node_i: &Node, node_j: &Node) -> Result<()> {
    if [node_i.id, node_j.id] != expected {
        return Err(Error::Config(format!(
            "element {tag} connects nodes {expected:?}, got [{}, {}]",
            node_i.id, node_j.id
        )));
    }
    for node in [node_i, node_j] {
        if node.get_number_dof() != NODE_DOFS {
            return Err(Error::DimensionMismatch {
                node: node.id,
                expected: NODE_DOFS,
                found: node.get_number_dof(),
            });
        }
    }
    Ok(())
}

impl BeamElement for MixedBeamColumn {
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
        let slip = self
            .slip
            .as_ref()
            .map(|(h, m)| SlipInterface::new(*h, m.as_ref(), scheme.num_points()))
            .transpose()?;
        let engine = MixedEngine::new(
            self.tag,
            scheme,
            self.config.second_order,
            self.section.as_ref(),
            slip,
            self.config.tolerances,
        )
        .map_err(|e| e.within(self.tag))?;
        debug!(element = self.tag, length, points = self.config.num_points, "mixed element attached");
        self.engine = Some(engine);
        self.update(node_i, node_j)
    }

    fn update(&mut self, node_i: &Node, node_j: &Node) -> Result<()> {
        let tag = self.tag;
        let engine = self.engine.as_mut().ok_or(Error::NotAttached(tag))?;
        engine.enter(Stage::AwaitTransform);
        self.transform
            .update(node_i, node_j)
            .map_err(|e| e.within(tag))?;
        let dv = self.transform.basic_trial_disp() - engine.trial().deformation;
        match engine.run(&dv) {
            Ok(report) => {
                self.last_report = report;
                Ok(())
            }
            Err(err) => {
                warn!(element = tag, error = %err, "state determination failed");
                Err(err.within(tag))
            }
        }
    }

    fn commit_state(&mut self) -> Result<()> {
        let engine = self.engine.as_mut().ok_or(Error::NotAttached(self.tag))?;
        engine.commit_state();
        self.transform.commit_state();
        Ok(())
    }

    fn revert_to_last_commit(&mut self) -> Result<()> {
        let engine = self.engine.as_mut().ok_or(Error::NotAttached(self.tag))?;
        engine.revert_to_last_commit();
        self.transform.revert_to_last_commit();
        Ok(())
    }

    fn revert_to_start(&mut self) -> Result<()> {
        let engine = self.engine.as_mut().ok_or(Error::NotAttached(self.tag))?;
        engine.revert_to_start();
        self.transform.revert_to_start();
        Ok(())
    }

    fn tangent_stiff(&self) -> Result<DMatrix<f64>> {
        let trial = self.attached()?.trial();
        let k = self
            .transform
            .global_stiff_matrix(&trial.stiffness, &trial.basic_force);
        Ok(dynamic_matrix(&k))
    }

    fn initial_stiff(&self) -> Result<DMatrix<f64>> {
        let engine = self.attached()?;
        let k = self
            .transform
            .initial_global_stiff_matrix(engine.initial_stiffness());
        Ok(dynamic_matrix(&k))
    }

    fn resisting_force(&self) -> Result<DVector<f64>> {
        let trial = self.attached()?.trial();
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
        Ok(self.attached()?.trial().basic_force)
    }

    fn basic_stiffness(&self) -> Result<Matrix6<f64>> {
        Ok(self.attached()?.trial().stiffness)
    }
}
