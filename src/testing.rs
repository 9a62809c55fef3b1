// Recording stub provider for unit tests

use crate::geometry::{AffineTransform, BoundingBox, Point3};
use crate::mesh::MeshUnit;
use crate::provider::{HostError, SolidHandle, SolidOptions, StructureProvider};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

#[derive(Debug, Clone, Default)]
struct StubSolid {
    contours: bool,
    options: Option<SolidOptions>,
    /// Set on margin solids: the structure and margin they were expanded from.
    expanded_from: Option<(String, f64)>,
}

/// Answers overlap tests from a table instead of geometry.
///
/// An overlap between a candidate and a proxy is declared with the smallest
/// margin at which it appears; tests through a margin solid compare against
/// the margin it was last expanded with.
#[derive(Debug, Default)]
pub struct StubProvider {
    solids: BTreeMap<String, StubSolid>,
    overlaps: HashMap<(String, String), f64>,
    failing_pairs: BTreeSet<(String, String)>,
    calls: HashMap<&'static str, usize>,
    pub fail_imports: bool,
    pub fail_create: BTreeSet<String>,
}

impl StubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_structure(&mut self, name: &str) {
        self.solids.insert(
            name.to_string(),
            StubSolid {
                contours: true,
                ..StubSolid::default()
            },
        );
    }

    pub fn set_overlap(&mut self, candidate: &str, proxy: &str) {
        self.set_overlap_from_margin(candidate, proxy, 0.0);
    }

    pub fn set_overlap_from_margin(&mut self, candidate: &str, proxy: &str, margin: f64) {
        self.overlaps
            .insert((candidate.to_string(), proxy.to_string()), margin);
    }

    /// Make the intersection of this pair fail with a host error.
    pub fn fail_pair(&mut self, candidate: &str, proxy: &str) {
        self.failing_pairs
            .insert((candidate.to_string(), proxy.to_string()));
    }

    pub fn calls(&self, operation: &str) -> usize {
        self.calls.get(operation).copied().unwrap_or(0)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.solids.contains_key(name)
    }

    pub fn options(&self, name: &str) -> Option<&SolidOptions> {
        self.solids.get(name)?.options.as_ref()
    }

    pub fn solid_names(&self) -> Vec<String> {
        self.solids.keys().cloned().collect()
    }

    fn record(&mut self, operation: &'static str) {
        *self.calls.entry(operation).or_insert(0) += 1;
    }

    fn solid_mut(&mut self, name: &str) -> Result<&mut StubSolid, HostError> {
        self.solids
            .get_mut(name)
            .ok_or_else(|| HostError::UnknownSolid(name.to_string()))
    }

    fn solid(&self, name: &str) -> Result<&StubSolid, HostError> {
        self.solids
            .get(name)
            .ok_or_else(|| HostError::UnknownSolid(name.to_string()))
    }

    fn overlaps(&self, source: &str, proxy: &str) -> Result<bool, HostError> {
        let (candidate, margin) = match &self.solid(source)?.expanded_from {
            Some((candidate, margin)) => (candidate.clone(), *margin),
            None => (source.to_string(), 0.0),
        };
        if self.failing_pairs.contains(&(candidate.clone(), proxy.to_string())) {
            return Err(HostError::Operation(format!("{} x {}", candidate, proxy)));
        }
        Ok(self
            .overlaps
            .get(&(candidate, proxy.to_string()))
            .is_some_and(|&from| margin >= from))
    }
}

impl StructureProvider for StubProvider {
    fn create_solid(&mut self, desired_name: &str, options: &SolidOptions) -> Result<SolidHandle, HostError> {
        self.record("create_solid");
        if self.fail_create.contains(desired_name) {
            return Err(HostError::Operation(format!("cannot create {}", desired_name)));
        }
        let mut name = desired_name.to_string();
        let mut suffix = 1;
        while self.solids.contains_key(&name) {
            name = format!("{} ({})", desired_name, suffix);
            suffix += 1;
        }
        self.solids.insert(
            name.clone(),
            StubSolid {
                options: Some(options.clone()),
                ..StubSolid::default()
            },
        );
        Ok(SolidHandle::new(name))
    }

    fn find_solid(&self, name: &str) -> Option<SolidHandle> {
        self.solids.contains_key(name).then(|| SolidHandle::new(name))
    }

    fn set_options(&mut self, solid: &SolidHandle, options: &SolidOptions) -> Result<(), HostError> {
        self.record("set_options");
        self.solid_mut(solid.name())?.options = Some(options.clone());
        Ok(())
    }

    fn clear_geometry(&mut self, solid: &SolidHandle) -> Result<(), HostError> {
        self.record("clear_geometry");
        self.solid_mut(solid.name())?.contours = false;
        Ok(())
    }

    fn import_oriented_mesh(
        &mut self,
        solid: &SolidHandle,
        file: &Path,
        _transform: &AffineTransform,
        _unit: MeshUnit,
    ) -> Result<(), HostError> {
        self.record("import_oriented_mesh");
        if self.fail_imports {
            return Err(HostError::Import {
                solid: solid.name().to_string(),
                reason: format!("{} unreadable", file.display()),
            });
        }
        self.solid_mut(solid.name())?.contours = true;
        Ok(())
    }

    fn expand_margin(&mut self, target: &SolidHandle, source: &str, margin: f64) -> Result<(), HostError> {
        self.record("expand_margin");
        self.solid(source)?;
        let solid = self.solid_mut(target.name())?;
        solid.contours = true;
        solid.expanded_from = Some((source.to_string(), margin));
        Ok(())
    }

    fn compute_boolean_intersection(
        &mut self,
        target: &SolidHandle,
        sources_a: &[&str],
        sources_b: &[&str],
    ) -> Result<(), HostError> {
        self.record("compute_boolean_intersection");
        let mut any = false;
        for a in sources_a {
            for b in sources_b {
                any |= self.overlaps(a, b)?;
            }
        }
        self.solid_mut(target.name())?.contours = any;
        Ok(())
    }

    fn has_contours(&self, solid: &SolidHandle) -> Result<bool, HostError> {
        Ok(self.solid(solid.name())?.contours)
    }

    fn bounding_box(&self, solid: &SolidHandle) -> Result<BoundingBox, HostError> {
        if self.solid(solid.name())?.contours {
            Ok(BoundingBox::new(Point3::new(-1.0, -1.0, -1.0), Point3::new(1.0, 1.0, 1.0)))
        } else {
            Err(HostError::EmptyGeometry(solid.name().to_string()))
        }
    }

    fn delete_solid(&mut self, solid: SolidHandle) -> Result<(), HostError> {
        self.record("delete_solid");
        self.solids
            .remove(solid.name())
            .map(|_| ())
            .ok_or_else(|| HostError::UnknownSolid(solid.name().to_string()))
    }
}
