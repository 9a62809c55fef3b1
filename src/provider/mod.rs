//! Capability interface to the host geometry kernel.
//!
//! The engine never talks to the planning system directly: every solid it
//! creates, fills, tests and releases goes through a [`StructureProvider`].
//! [`MeshStructureProvider`] implements it in-process over triangle meshes.

pub mod mesh;

pub use mesh::MeshStructureProvider;

use crate::geometry::{AffineTransform, BoundingBox};
use crate::mesh::{MeshError, MeshUnit};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("Unknown solid: {0}")]
    UnknownSolid(String),

    #[error("Solid '{0}' has no geometry")]
    EmptyGeometry(String),

    #[error("Failed to import geometry into '{solid}': {reason}")]
    Import { solid: String, reason: String },

    #[error("Host operation failed: {0}")]
    Operation(String),

    #[error("Mesh error: {0}")]
    Mesh(#[from] MeshError),
}

/// Reference to a host solid. Host solids are identified by their unique
/// name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SolidHandle(String);

impl SolidHandle {
    pub fn new(name: impl Into<String>) -> Self {
        SolidHandle(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SolidHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Structure type under which a solid is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SolidType {
    /// Bolus-typed solids are cheap for the host to hold in memory.
    #[default]
    Bolus,
    Control,
    Undefined,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolidOptions {
    pub color: String,
    #[serde(rename = "type")]
    pub solid_type: SolidType,
}

impl SolidOptions {
    pub fn new(color: &str, solid_type: SolidType) -> Self {
        Self {
            color: color.to_string(),
            solid_type,
        }
    }

    /// Options for generated gantry proxies.
    pub fn proxy() -> Self {
        Self::new("White", SolidType::Bolus)
    }

    /// Options for the engine's scratch solids.
    pub fn scratch() -> Self {
        Self::new("Red", SolidType::Bolus)
    }
}

/// Operations the collision engine needs from a geometry kernel.
///
/// Calls are synchronous. Solids named by `&str` may be any solid the host
/// knows, including patient structures the engine did not create.
pub trait StructureProvider {
    /// Create an empty solid. The host may alter `desired_name` to keep
    /// names unique; the returned handle carries the final name.
    fn create_solid(&mut self, desired_name: &str, options: &SolidOptions) -> Result<SolidHandle, HostError>;

    /// Handle of an existing solid with exactly this name.
    fn find_solid(&self, name: &str) -> Option<SolidHandle>;

    /// Re-apply creation options (color, type) to an existing solid.
    fn set_options(&mut self, solid: &SolidHandle, options: &SolidOptions) -> Result<(), HostError>;

    /// Drop the geometry of a solid, keeping the solid itself.
    fn clear_geometry(&mut self, solid: &SolidHandle) -> Result<(), HostError>;

    /// Replace the geometry of `solid` with the mesh in `file`, placed by
    /// `transform`. `unit` is the unit of the file's coordinates.
    fn import_oriented_mesh(
        &mut self,
        solid: &SolidHandle,
        file: &Path,
        transform: &AffineTransform,
        unit: MeshUnit,
    ) -> Result<(), HostError>;

    /// Replace the geometry of `target` with `source` expanded uniformly by
    /// `margin` cm in all six directions.
    fn expand_margin(&mut self, target: &SolidHandle, source: &str, margin: f64) -> Result<(), HostError>;

    /// Replace the geometry of `target` with the intersection of the union
    /// of `sources_a` and the union of `sources_b`.
    fn compute_boolean_intersection(
        &mut self,
        target: &SolidHandle,
        sources_a: &[&str],
        sources_b: &[&str],
    ) -> Result<(), HostError>;

    fn has_contours(&self, solid: &SolidHandle) -> Result<bool, HostError>;

    fn bounding_box(&self, solid: &SolidHandle) -> Result<BoundingBox, HostError>;

    fn delete_solid(&mut self, solid: SolidHandle) -> Result<(), HostError>;
}
