// Candidate structure selection

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

pub const EXTERNAL_TYPE: &str = "External";
pub const SUPPORT_TYPE: &str = "Support";

/// Structures of the patient model, grouped by structure type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StructureCatalog {
    by_type: BTreeMap<String, BTreeSet<String>>,
}

impl StructureCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, structure_type: &str) {
        self.by_type
            .entry(structure_type.to_string())
            .or_default()
            .insert(name.to_string());
    }

    pub fn of_type(&self, structure_type: &str) -> BTreeSet<String> {
        self.by_type.get(structure_type).cloned().unwrap_or_default()
    }

    pub fn all(&self) -> BTreeSet<String> {
        self.by_type.values().flatten().cloned().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.by_type.values().all(BTreeSet::is_empty)
    }
}

impl<'a> FromIterator<(&'a str, &'a str)> for StructureCatalog {
    fn from_iter<I: IntoIterator<Item = (&'a str, &'a str)>>(iter: I) -> Self {
        let mut catalog = StructureCatalog::new();
        for (name, structure_type) in iter {
            catalog.insert(name, structure_type);
        }
        catalog
    }
}

/// Which structure types take part in a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateFilter {
    pub external: bool,
    /// Support structures such as the couch top.
    pub support: bool,
    /// Every structure except generated ones. Overrides the other two.
    pub others: bool,
}

impl Default for CandidateFilter {
    fn default() -> Self {
        Self {
            external: true,
            support: true,
            others: false,
        }
    }
}

impl CandidateFilter {
    /// Candidate names from `catalog`, never including `generated` solids.
    pub fn select(&self, catalog: &StructureCatalog, generated: &BTreeSet<String>) -> BTreeSet<String> {
        let mut selected = if self.others {
            catalog.all()
        } else {
            let mut set = BTreeSet::new();
            if self.external {
                set.extend(catalog.of_type(EXTERNAL_TYPE));
            }
            if self.support {
                set.extend(catalog.of_type(SUPPORT_TYPE));
            }
            set
        };
        selected.retain(|name| !generated.contains(name));
        log::debug!("Selected candidates {:?} with {:?}", selected, self);
        selected
    }
}
