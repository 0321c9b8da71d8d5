//! Element configuration and tagged-variant model descriptions.
//!
//! Everything an element needs can be described in JSON:
//!
//! ```json
//! {
//!   "type": "mixed",
//!   "tag": 1,
//!   "nodes": [1, 2],
//!   "section": { "type": "elastic", "ea": 1e6, "eiz": 1e5, "eiy": 1e5, "gj": 5e4 },
//!   "transformation": { "type": "linear" },
//!   "config": { "num_points": 5 }
//! }
//! ```

use crate::elements::{DynamicElement, MixedBeamColumn, ShearFlexibleBeam};
use crate::error::{Error, Result};
use crate::integration::{IntegrationRule, IntegrationScheme, MAX_INTEGRATION_POINTS};
use crate::materials::{
    BilinearMaterial, ElasticMaterial, ElasticSection, Fiber, FiberSection, RambergOsgoodMaterial,
    SectionModel, UniaxialMaterial,
};
use crate::transformation::{CorotationalTransformation, CrdTransformation, LinearTransformation};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Iteration controls of the element-internal loops.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tolerances {
    /// Residual norm of the internal slip equilibrium, relative to `1 + |pb|`
    pub slip_residual: f64,
    pub max_slip_iterations: usize,
    /// Convergence of the softening factor fixed point, `|Ω_new - Ω_old|`
    pub omega: f64,
    pub max_omega_iterations: usize,
    /// Strain/resultant products at or below this magnitude zero Ω
    pub omega_zero_product: f64,
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            slip_residual: 1e-10,
            max_slip_iterations: 25,
            omega: 1e-3,
            max_omega_iterations: 50,
            omega_zero_product: 1e-30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ElementConfig {
    pub integration: IntegrationRule,
    pub num_points: usize,
    /// P-Δ force interpolation and bowing strain inside the element
    pub second_order: bool,
    pub mass_per_length: f64,
    /// Vector in the local x-z plane
    pub vecxz: Option<[f64; 3]>,
    pub tolerances: Tolerances,
}

impl Default for ElementConfig {
    fn default() -> Self {
        Self {
            integration: IntegrationRule::GaussLobatto,
            num_points: 5,
            second_order: false,
            mass_per_length: 0.0,
            vecxz: None,
            tolerances: Tolerances::default(),
        }
    }
}

impl ElementConfig {
    pub fn validate(&self) -> Result<()> {
        if !(2..=MAX_INTEGRATION_POINTS).contains(&self.num_points) {
            return Err(Error::Config(format!(
                "number of integration points must be within 2..={MAX_INTEGRATION_POINTS}, got {}",
                self.num_points
            )));
        }
        if !(self.mass_per_length >= 0.0) {
            return Err(Error::Config(format!(
                "mass per length must be non-negative, got {}",
                self.mass_per_length
            )));
        }
        let t = &self.tolerances;
        if !(t.slip_residual > 0.0 && t.omega > 0.0 && t.omega_zero_product >= 0.0) {
            return Err(Error::Config("tolerances must be positive".into()));
        }
        if t.max_slip_iterations == 0 || t.max_omega_iterations == 0 {
            return Err(Error::Config("iteration caps must be at least 1".into()));
        }
        Ok(())
    }

    pub fn scheme(&self, length: f64) -> Result<IntegrationScheme> {
        IntegrationScheme::new(self.integration, self.num_points, length)
    }

    pub fn orientation(&self) -> Option<Vector3<f64>> {
        self.vecxz.map(Vector3::from)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UniaxialSpec {
    Elastic {
        modulus: f64,
    },
    Bilinear {
        modulus: f64,
        yield_stress: f64,
        hardening_ratio: f64,
    },
    RambergOsgood {
        modulus: f64,
        yield_stress: f64,
        alpha: f64,
        exponent: f64,
        #[serde(default)]
        max_iterations: Option<usize>,
    },
}

impl UniaxialSpec {
    pub fn build(&self) -> Result<Box<dyn UniaxialMaterial>> {
        Ok(match *self {
            UniaxialSpec::Elastic { modulus } => {
                if !(modulus > 0.0) {
                    return Err(Error::Config(format!("elastic modulus must be positive, got {modulus}")));
                }
                Box::new(ElasticMaterial::new(modulus))
            }
            UniaxialSpec::Bilinear {
                modulus,
                yield_stress,
                hardening_ratio,
            } => Box::new(BilinearMaterial::new(modulus, yield_stress, hardening_ratio)?),
            UniaxialSpec::RambergOsgood {
                modulus,
                yield_stress,
                alpha,
                exponent,
                max_iterations,
            } => {
                let mut m = RambergOsgoodMaterial::new(modulus, yield_stress, alpha, exponent)?;
                if let Some(n) = max_iterations {
                    m = m.with_max_iterations(n);
                }
                Box::new(m)
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiberSpec {
    pub y: f64,
    pub z: f64,
    pub area: f64,
    pub material: UniaxialSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SectionSpec {
    Elastic {
        ea: f64,
        eiz: f64,
        eiy: f64,
        gj: f64,
    },
    Fiber {
        fibers: Vec<FiberSpec>,
        gj: f64,
    },
    Rectangular {
        depth: f64,
        width: f64,
        ny: usize,
        nz: usize,
        material: UniaxialSpec,
        gj: f64,
    },
}

impl SectionSpec {
    pub fn build(&self) -> Result<Box<dyn SectionModel>> {
        Ok(match self {
            SectionSpec::Elastic { ea, eiz, eiy, gj } => {
                Box::new(ElasticSection::new(*ea, *eiz, *eiy, *gj))
            }
            SectionSpec::Fiber { fibers, gj } => {
                let fibers = fibers
                    .iter()
                    .map(|f| {
                        Ok(Fiber {
                            y: f.y,
                            z: f.z,
                            area: f.area,
                            material: f.material.build()?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?;
                Box::new(FiberSection::new(fibers, *gj)?)
            }
            SectionSpec::Rectangular {
                depth,
                width,
                ny,
                nz,
                material,
                gj,
            } => {
                let material = material.build()?;
                Box::new(FiberSection::rectangular(*depth, *width, *ny, *nz, material.as_ref(), *gj)?)
            }
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformationSpec {
    #[default]
    Linear,
    PDelta,
    Corotational,
}

impl TransformationSpec {
    pub fn build(&self, vecxz: Option<Vector3<f64>>) -> Box<dyn CrdTransformation> {
        match self {
            TransformationSpec::Linear => Box::new(LinearTransformation::new(vecxz)),
            TransformationSpec::PDelta => Box::new(LinearTransformation::with_p_delta(vecxz)),
            TransformationSpec::Corotational => Box::new(CorotationalTransformation::new(vecxz)),
        }
    }
}

/// Deformable interface between two components of a composite member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlipSpec {
    /// Distance between the component centroids
    pub lever_arm: f64,
    pub material: UniaxialSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ElementSpec {
    Mixed {
        tag: i32,
        nodes: [i32; 2],
        section: SectionSpec,
        #[serde(default)]
        transformation: TransformationSpec,
        #[serde(default)]
        slip: Option<SlipSpec>,
        #[serde(default)]
        config: ElementConfig,
    },
    ShearFlexible {
        tag: i32,
        nodes: [i32; 2],
        section: SectionSpec,
        /// Shear response along local y, then local z
        shear: [UniaxialSpec; 2],
        #[serde(default)]
        transformation: TransformationSpec,
        #[serde(default)]
        config: ElementConfig,
    },
}

impl ElementSpec {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn tag(&self) -> i32 {
        match self {
            ElementSpec::Mixed { tag, .. } | ElementSpec::ShearFlexible { tag, .. } => *tag,
        }
    }

    pub fn build(&self) -> Result<DynamicElement> {
        match self {
            ElementSpec::Mixed {
                tag,
                nodes,
                section,
                transformation,
                slip,
                config,
            } => {
                config.validate()?;
                let mut element = MixedBeamColumn::new(
                    *tag,
                    *nodes,
                    section.build()?,
                    transformation.build(config.orientation()),
                    config.clone(),
                );
                if let Some(slip) = slip {
                    element = element.with_slip(slip.lever_arm, slip.material.build()?);
                }
                Ok(DynamicElement::Mixed(element))
            }
            ElementSpec::ShearFlexible {
                tag,
                nodes,
                section,
                shear,
                transformation,
                config,
            } => {
                config.validate()?;
                let element = ShearFlexibleBeam::new(
                    *tag,
                    *nodes,
                    section.build()?,
                    [shear[0].build()?, shear[1].build()?],
                    transformation.build(config.orientation()),
                    config.clone(),
                );
                Ok(DynamicElement::ShearFlexible(element))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: ElementConfig = serde_json::from_str(r#"{"second_order": true}"#).unwrap();
        assert!(config.second_order);
        assert_eq!(config.num_points, 5);
        assert_eq!(config.integration, IntegrationRule::GaussLobatto);
        assert_eq!(config.tolerances.omega, 1e-3);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_too_many_points() {
        let config = ElementConfig {
            num_points: MAX_INTEGRATION_POINTS + 1,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn parses_mixed_element_with_slip() {
        let spec = ElementSpec::from_json_str(
            r#"{
                "type": "mixed",
                "tag": 3,
                "nodes": [1, 2],
                "section": { "type": "elastic", "ea": 1e6, "eiz": 1e5, "eiy": 1e5, "gj": 5e4 },
                "transformation": { "type": "corotational" },
                "slip": { "lever_arm": 0.25, "material": { "type": "elastic", "modulus": 1e3 } },
                "config": { "integration": "gauss_legendre", "num_points": 4 }
            }"#,
        )
        .unwrap();
        assert_eq!(spec.tag(), 3);
        match &spec {
            ElementSpec::Mixed {
                transformation,
                slip,
                config,
                ..
            } => {
                assert_eq!(*transformation, TransformationSpec::Corotational);
                assert_eq!(slip.as_ref().map(|s| s.lever_arm), Some(0.25));
                assert_eq!(config.integration, IntegrationRule::GaussLegendre);
            }
            other => panic!("unexpected spec {other:?}"),
        }
        assert!(spec.build().is_ok());
    }

    #[test]
    fn invalid_material_is_a_config_error() {
        let spec = UniaxialSpec::Bilinear {
            modulus: 200e3,
            yield_stress: 250.0,
            hardening_ratio: 1.5,
        };
        assert!(matches!(spec.build(), Err(Error::Config(_))));
    }

    #[test]
    fn rectangular_section_builds_fiber_grid() {
        let spec = SectionSpec::Rectangular {
            depth: 0.4,
            width: 0.2,
            ny: 8,
            nz: 2,
            material: UniaxialSpec::Elastic { modulus: 30e9 },
            gj: 1e6,
        };
        let section = spec.build().unwrap();
        let k = section.initial_tangent();
        assert!((k[(0, 0)] - 30e9 * 0.08).abs() / (30e9 * 0.08) < 1e-12);
    }
}
