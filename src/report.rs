// Status lights, grouped beam rows and the validation record

use crate::beam::{Beam, FULL_ARC_BEAM};
use crate::overlaps::Overlaps;
use crate::provider::StructureProvider;
use crate::proxy::{nominal_beam_name, nominal_iso_name};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub const VALIDATION_HEADING: &str = "Collision";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatusLed {
    Ok,
    Collision,
    Unknown,
}

impl StatusLed {
    pub fn color(&self) -> &'static str {
        match self {
            StatusLed::Ok => "Lime",
            StatusLed::Collision => "Red",
            StatusLed::Unknown => "Yellow",
        }
    }

    fn from_colliders(colliders: &[String]) -> Self {
        if colliders.is_empty() {
            StatusLed::Ok
        } else {
            StatusLed::Collision
        }
    }
}

impl fmt::Display for StatusLed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusLed::Ok => "OK",
            StatusLed::Collision => "Collision",
            StatusLed::Unknown => "Unknown",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamStatus {
    pub beam: String,
    /// Beam name with its gantry description, e.g. `1 (G181-179)`.
    pub label: String,
    pub proxy: Option<String>,
    pub colliders: Vec<String>,
    pub status: StatusLed,
}

impl BeamStatus {
    fn new(beam: &Beam, proxy: Option<&String>, by_proxy: Option<&BTreeMap<String, Vec<String>>>) -> Self {
        let colliders = match (proxy, by_proxy) {
            (Some(proxy), Some(by_proxy)) => by_proxy.get(proxy).cloned(),
            _ => None,
        };
        let status = colliders
            .as_deref()
            .map_or(StatusLed::Unknown, StatusLed::from_colliders);

        Self {
            beam: beam.name.clone(),
            label: format!("{} ({})", beam.name, nominal_beam_name(beam)),
            proxy: proxy.cloned(),
            colliders: colliders.unwrap_or_default(),
            status,
        }
    }

    pub fn tooltip(&self) -> String {
        match self.status {
            StatusLed::Collision => format!("Collisions with: {}", self.colliders.join(", ")),
            StatusLed::Ok => "No collisions".to_string(),
            StatusLed::Unknown => "Not checked".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsocenterGroup {
    pub isocenter: String,
    pub beams: Vec<BeamStatus>,
}

/// Overall light, one row per planned beam, and the full-arc indicator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollisionReport {
    pub overall: StatusLed,
    pub groups: Vec<IsocenterGroup>,
    pub full_arc: Option<BeamStatus>,
}

impl CollisionReport {
    /// Everything is `Unknown` while the session is not valid.
    pub fn from_overlaps<P: StructureProvider + ?Sized>(overlaps: &Overlaps<'_, P>) -> Self {
        let by_proxy = overlaps.is_valid().then(|| overlaps.colliders_by_proxy());
        let beam_map = overlaps.beam_map();

        let mut groups: Vec<IsocenterGroup> = Vec::new();
        let mut full_arc = None;
        for beam in overlaps.beams() {
            let status = BeamStatus::new(beam, beam_map.get(&beam.name), by_proxy.as_ref());
            if beam.name == FULL_ARC_BEAM {
                full_arc = Some(status);
                continue;
            }

            let iso = nominal_iso_name(&beam.isocenter);
            match groups.iter_mut().find(|g| g.isocenter == iso) {
                Some(group) => group.beams.push(status),
                None => groups.push(IsocenterGroup {
                    isocenter: iso,
                    beams: vec![status],
                }),
            }
        }

        let overall = if !overlaps.is_valid() {
            StatusLed::Unknown
        } else if overlaps.has_collision() {
            StatusLed::Collision
        } else {
            StatusLed::Ok
        };

        Self {
            overall,
            groups,
            full_arc,
        }
    }

    pub fn beam(&self, name: &str) -> Option<&BeamStatus> {
        self.groups
            .iter()
            .flat_map(|g| g.beams.iter())
            .find(|b| b.beam == name)
    }
}

impl fmt::Display for CollisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Collision status: {} ({})", self.overall, self.overall.color())?;
        for group in &self.groups {
            writeln!(f, "{}", group.isocenter)?;
            for beam in &group.beams {
                writeln!(f, "  [{}] {}: {}", beam.status.color(), beam.label, beam.tooltip())?;
            }
        }
        if let Some(full_arc) = &self.full_arc {
            writeln!(f, "CBCT/Full Arc")?;
            writeln!(f, "  [{}] {}", full_arc.status.color(), full_arc.tooltip())?;
        }
        Ok(())
    }
}

/// Result line persisted on the plan after a check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRecord {
    pub heading: String,
    pub passed: bool,
    pub margin_cm: f64,
    /// Colliders per failing planned beam.
    pub failing_by_beam: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub full_arc_colliders: Vec<String>,
}

impl ValidationRecord {
    /// A session that is not valid never passes: its matrix says nothing.
    pub fn from_overlaps<P: StructureProvider + ?Sized>(overlaps: &Overlaps<'_, P>) -> Self {
        Self {
            heading: VALIDATION_HEADING.to_string(),
            passed: overlaps.is_valid() && !overlaps.has_collision(),
            margin_cm: overlaps.margin(),
            failing_by_beam: overlaps.failing_by_beam(),
            full_arc_colliders: overlaps.full_arc_colliders(),
        }
    }
}
