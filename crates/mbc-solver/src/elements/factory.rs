//! Element wrapper selecting a formulation at run time.
//!
//! Built from an [`ElementSpec`](crate::config::ElementSpec); lets a driver
//! hold mixed and shear-flexible elements in one collection without boxing.

use crate::elements::{BeamElement, MixedBeamColumn, ShearFlexibleBeam};
use crate::error::Result;
use crate::node::Node;
use nalgebra::{DMatrix, DVector, Matrix6, Vector6};

#[derive(Debug, Clone)]
pub enum DynamicElement {
    Mixed(MixedBeamColumn),
    ShearFlexible(ShearFlexibleBeam),
}

impl DynamicElement {
    fn inner(&self) -> &dyn BeamElement {
        match self {
            DynamicElement::Mixed(e) => e,
            DynamicElement::ShearFlexible(e) => e,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn BeamElement {
        match self {
            DynamicElement::Mixed(e) => e,
            DynamicElement::ShearFlexible(e) => e,
        }
    }

    /// Formulation name used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            DynamicElement::Mixed(_) => "mixed",
            DynamicElement::ShearFlexible(_) => "shear_flexible",
        }
    }
}

impl BeamElement for DynamicElement {
    fn tag(&self) -> i32 {
        self.inner().tag()
    }

    fn external_nodes(&self) -> [i32; 2] {
        self.inner().external_nodes()
    }

    fn set_domain(&mut self, node_i: &Node, node_j: &Node) -> Result<()> {
        self.inner_mut().set_domain(node_i, node_j)
    }

    fn update(&mut self, node_i: &Node, node_j: &Node) -> Result<()> {
        self.inner_mut().update(node_i, node_j)
    }

    fn commit_state(&mut self) -> Result<()> {
        self.inner_mut().commit_state()
    }

    fn revert_to_last_commit(&mut self) -> Result<()> {
        self.inner_mut().revert_to_last_commit()
    }

    fn revert_to_start(&mut self) -> Result<()> {
        self.inner_mut().revert_to_start()
    }

    fn tangent_stiff(&self) -> Result<DMatrix<f64>> {
        self.inner().tangent_stiff()
    }

    fn initial_stiff(&self) -> Result<DMatrix<f64>> {
        self.inner().initial_stiff()
    }

    fn resisting_force(&self) -> Result<DVector<f64>> {
        self.inner().resisting_force()
    }

    fn mass(&self) -> Result<DMatrix<f64>> {
        self.inner().mass()
    }

    fn basic_force(&self) -> Result<Vector6<f64>> {
        self.inner().basic_force()
    }

    fn basic_stiffness(&self) -> Result<Matrix6<f64>> {
        self.inner().basic_stiffness()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ElementSpec;

    #[test]
    fn builds_shear_flexible_from_json() {
        let spec = ElementSpec::from_json_str(
            r#"{
                "type": "shear_flexible",
                "tag": 8,
                "nodes": [3, 4],
                "section": { "type": "elastic", "ea": 1e6, "eiz": 1e5, "eiy": 1e5, "gj": 5e4 },
                "shear": [
                    { "type": "elastic", "modulus": 4e5 },
                    { "type": "elastic", "modulus": 4e5 }
                ]
            }"#,
        )
        .unwrap();
        let e = spec.build().unwrap();
        assert_eq!(e.kind(), "shear_flexible");
        assert_eq!(e.tag(), 8);
        assert_eq!(e.external_nodes(), [3, 4]);
        assert_eq!(e.num_dof(), 12);
    }
}
