use super::{HostError, SolidHandle, SolidOptions, StructureProvider};
use crate::geometry::{AffineTransform, BoundingBox};
use crate::mesh::{Mesh, MeshUnit};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
struct SolidRecord {
    options: SolidOptions,
    geometry: Option<Mesh>,
}

/// In-process geometry kernel over closed triangle meshes.
///
/// Intersections are approximated by the touching surface patches of the
/// two operands (see [`Mesh::common_surface`]), which is enough to answer
/// "do these overlap" and to bound the overlap region.
#[derive(Debug, Default)]
pub struct MeshStructureProvider {
    solids: BTreeMap<String, SolidRecord>,
    reference_meshes: HashMap<(PathBuf, MeshUnit), Mesh>,
}

impl MeshStructureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing structure, replacing any solid of that name.
    pub fn add_structure(&mut self, name: &str, mesh: Mesh, options: SolidOptions) {
        self.solids.insert(
            name.to_string(),
            SolidRecord {
                options,
                geometry: Some(mesh),
            },
        );
    }

    pub fn load_structure_stl<P: AsRef<Path>>(
        &mut self,
        name: &str,
        path: P,
        unit: MeshUnit,
        options: SolidOptions,
    ) -> Result<(), HostError> {
        let mesh = Mesh::from_stl(path, unit)?;
        log::info!("Loaded structure '{}' ({} triangles)", name, mesh.num_triangles());
        self.add_structure(name, mesh, options);
        Ok(())
    }

    pub fn solid_names(&self) -> Vec<String> {
        self.solids.keys().cloned().collect()
    }

    pub fn geometry(&self, name: &str) -> Option<&Mesh> {
        self.solids.get(name).and_then(|s| s.geometry.as_ref())
    }

    pub fn options(&self, name: &str) -> Option<&SolidOptions> {
        self.solids.get(name).map(|s| &s.options)
    }

    pub fn len(&self) -> usize {
        self.solids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.solids.is_empty()
    }

    fn record_mut(&mut self, solid: &SolidHandle) -> Result<&mut SolidRecord, HostError> {
        self.solids
            .get_mut(solid.name())
            .ok_or_else(|| HostError::UnknownSolid(solid.name().to_string()))
    }

    fn record(&self, name: &str) -> Result<&SolidRecord, HostError> {
        self.solids
            .get(name)
            .ok_or_else(|| HostError::UnknownSolid(name.to_string()))
    }

    fn union(&self, names: &[&str]) -> Result<Option<Mesh>, HostError> {
        let mut parts = Vec::with_capacity(names.len());
        for name in names {
            if let Some(mesh) = &self.record(name)?.geometry {
                parts.push(mesh);
            }
        }
        if parts.is_empty() {
            return Ok(None);
        }
        Ok(Some(Mesh::union_of(&parts)?))
    }

    fn reference_mesh(&mut self, file: &Path, unit: MeshUnit) -> Result<&Mesh, HostError> {
        let key = (file.to_path_buf(), unit);
        if !self.reference_meshes.contains_key(&key) {
            let mesh = Mesh::from_stl(file, unit)?;
            log::debug!("Cached reference mesh {} ({} triangles)", file.display(), mesh.num_triangles());
            self.reference_meshes.insert(key.clone(), mesh);
        }
        self.reference_meshes
            .get(&key)
            .ok_or_else(|| HostError::Operation(format!("reference mesh {} not cached", file.display())))
    }
}

impl StructureProvider for MeshStructureProvider {
    fn create_solid(&mut self, desired_name: &str, options: &SolidOptions) -> Result<SolidHandle, HostError> {
        let mut name = desired_name.to_string();
        let mut suffix = 1;
        while self.solids.contains_key(&name) {
            name = format!("{} ({})", desired_name, suffix);
            suffix += 1;
        }

        self.solids.insert(
            name.clone(),
            SolidRecord {
                options: options.clone(),
                geometry: None,
            },
        );
        Ok(SolidHandle::new(name))
    }

    fn find_solid(&self, name: &str) -> Option<SolidHandle> {
        self.solids.contains_key(name).then(|| SolidHandle::new(name))
    }

    fn set_options(&mut self, solid: &SolidHandle, options: &SolidOptions) -> Result<(), HostError> {
        self.record_mut(solid)?.options = options.clone();
        Ok(())
    }

    fn clear_geometry(&mut self, solid: &SolidHandle) -> Result<(), HostError> {
        self.record_mut(solid)?.geometry = None;
        Ok(())
    }

    fn import_oriented_mesh(
        &mut self,
        solid: &SolidHandle,
        file: &Path,
        transform: &AffineTransform,
        unit: MeshUnit,
    ) -> Result<(), HostError> {
        // Fail before touching the cache if the target is unknown
        self.record_mut(solid)?;

        let placed = self
            .reference_mesh(file, unit)
            .map_err(|e| HostError::Import {
                solid: solid.name().to_string(),
                reason: e.to_string(),
            })?
            .transformed(transform);

        self.record_mut(solid)?.geometry = Some(placed);
        Ok(())
    }

    fn expand_margin(&mut self, target: &SolidHandle, source: &str, margin: f64) -> Result<(), HostError> {
        let expanded = self
            .record(source)?
            .geometry
            .as_ref()
            .ok_or_else(|| HostError::EmptyGeometry(source.to_string()))?
            .expanded(margin);

        self.record_mut(target)?.geometry = Some(expanded);
        Ok(())
    }

    fn compute_boolean_intersection(
        &mut self,
        target: &SolidHandle,
        sources_a: &[&str],
        sources_b: &[&str],
    ) -> Result<(), HostError> {
        let a = self.union(sources_a)?;
        let b = self.union(sources_b)?;

        let result = match (a, b) {
            (Some(a), Some(b)) => Mesh::new(a.common_surface(&b)).ok(),
            _ => None,
        };

        self.record_mut(target)?.geometry = result;
        Ok(())
    }

    fn has_contours(&self, solid: &SolidHandle) -> Result<bool, HostError> {
        Ok(self.record(solid.name())?.geometry.is_some())
    }

    fn bounding_box(&self, solid: &SolidHandle) -> Result<BoundingBox, HostError> {
        self.record(solid.name())?
            .geometry
            .as_ref()
            .map(Mesh::bounding_box)
            .ok_or_else(|| HostError::EmptyGeometry(solid.name().to_string()))
    }

    fn delete_solid(&mut self, solid: SolidHandle) -> Result<(), HostError> {
        self.solids
            .remove(solid.name())
            .map(|_| ())
            .ok_or_else(|| HostError::UnknownSolid(solid.name().to_string()))
    }
}
