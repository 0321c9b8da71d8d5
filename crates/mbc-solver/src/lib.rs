//! Nonlinear state determination for mixed and shear-flexible beam-columns.
//!
//! An element receives trial nodal displacements from a global Newton
//! driver, runs its internal state determination against the section
//! models at its integration points, and reports a consistent tangent
//! stiffness and resisting force. Internal slip DOFs of composite members
//! are condensed statically before anything leaves the element.

pub mod aggregator;
pub mod condensation;
pub mod config;
pub mod elements;
pub mod engine;
pub mod error;
pub mod integration;
pub mod interpolation;
pub mod linalg;
pub mod materials;
pub mod node;
pub mod transformation;

pub use config::{ElementConfig, ElementSpec, SectionSpec, SlipSpec, Tolerances, TransformationSpec, UniaxialSpec};
pub use elements::{BeamElement, DynamicElement, MixedBeamColumn, ShearFlexibleBeam};
pub use engine::{MixedEngine, NaturalState, Stage, UpdateReport};
pub use error::{Error, Result, ReturnCode, status_code};
pub use integration::{IntegrationRule, IntegrationScheme, MAX_INTEGRATION_POINTS};
pub use materials::{
    BilinearMaterial, ElasticMaterial, ElasticSection, Fiber, FiberSection, RambergOsgoodMaterial,
    SectionModel, UniaxialMaterial,
};
pub use node::Node;
pub use transformation::{CorotationalTransformation, CrdTransformation, LinearTransformation};
