use crate::candidates::CandidateFilter;
use crate::mesh::MeshUnit;
use crate::provider::SolidOptions;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where the unit reference meshes for gantry proxies live.
///
/// There is one mesh per whole-degree arc span (`0` for a static field),
/// modelled at gantry angle zero about an isocenter at the origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeshLibrary {
    pub directory: PathBuf,
    /// File name pattern; `{arc}` is replaced by the arc span in degrees.
    pub file_pattern: String,
    pub unit: MeshUnit,
}

impl Default for MeshLibrary {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("CD"),
            file_pattern: "{arc}.stl".to_string(),
            unit: MeshUnit::Centimeter,
        }
    }
}

impl MeshLibrary {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            ..Self::default()
        }
    }

    /// Reference mesh for an arc spanning `arc_degrees` (sign ignored).
    pub fn file_for_arc(&self, arc_degrees: f64) -> PathBuf {
        let span = arc_degrees.abs().round() as u32;
        self.directory
            .join(self.file_pattern.replace("{arc}", &span.to_string()))
    }
}

/// Configuration for a collision check session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollisionConfig {
    pub mesh_library: MeshLibrary,

    /// Creation options for gantry proxies
    pub proxy_options: SolidOptions,

    /// Creation options for the test and margin scratch solids
    pub scratch_options: SolidOptions,

    /// Add a synthetic full-arc beam at couch 0
    pub full_arc_check: bool,

    /// Uniform margin applied to candidates, in cm
    pub margin_cm: f64,

    pub filter: CandidateFilter,

    /// Keep generated proxies after an unattended check
    pub retain: bool,

    /// Keep generated proxies after an unattended check that found a collision
    pub retain_on_fail: bool,
}

impl Default for CollisionConfig {
    fn default() -> Self {
        Self {
            mesh_library: MeshLibrary::default(),
            proxy_options: SolidOptions::proxy(),
            scratch_options: SolidOptions::scratch(),
            full_arc_check: false,
            margin_cm: 0.0,
            filter: CandidateFilter::default(),
            retain: false,
            retain_on_fail: true,
        }
    }
}

impl CollisionConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path.as_ref())?;
        let config: CollisionConfig = serde_json::from_str(&json)?;
        log::debug!("Loaded collision config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_for_arc() {
        let lib = MeshLibrary::new("meshes");
        assert_eq!(lib.file_for_arc(0.0), PathBuf::from("meshes").join("0.stl"));
        assert_eq!(lib.file_for_arc(-358.0), PathBuf::from("meshes").join("358.stl"));
        assert_eq!(lib.file_for_arc(179.6), PathBuf::from("meshes").join("180.stl"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: CollisionConfig =
            serde_json::from_str(r#"{"full_arc_check": true, "margin_cm": 1.5}"#).unwrap();
        assert!(config.full_arc_check);
        assert_eq!(config.margin_cm, 1.5);
        assert_eq!(config.proxy_options, SolidOptions::proxy());
        assert!(config.retain_on_fail);
        assert_eq!(config.mesh_library.file_pattern, "{arc}.stl");
    }

    #[test]
    fn test_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collision.json");
        let mut config = CollisionConfig::default();
        config.mesh_library = MeshLibrary::new(dir.path());
        config.to_file(&path).unwrap();

        let loaded = CollisionConfig::from_file(&path).unwrap();
        assert_eq!(loaded.mesh_library, config.mesh_library);
    }
}
