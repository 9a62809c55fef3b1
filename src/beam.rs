// Beam set description as the planning system reports it

use crate::geometry::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name given to the synthetic beam added for a full-arc check.
pub const FULL_ARC_BEAM: &str = "FULL ARC BEAM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ArcDirection {
    Clockwise,
    CounterClockwise,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Isocenter {
    /// Annotation name, when the isocenter has one.
    #[serde(default)]
    pub name: Option<String>,
    pub position: Point3,
}

impl Isocenter {
    pub fn new(name: Option<&str>, position: Point3) -> Self {
        Self {
            name: name.map(str::to_string),
            position,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beam {
    pub name: String,
    /// Static gantry angle, or the start angle of an arc.
    pub gantry_angle: f64,
    #[serde(default)]
    pub arc_stop_gantry_angle: Option<f64>,
    #[serde(default)]
    pub arc_rotation_direction: Option<ArcDirection>,
    #[serde(default)]
    pub couch_rotation_angle: Option<f64>,
    /// Older planning-system versions report the couch angle under this name.
    #[serde(default)]
    pub couch_angle: Option<f64>,
    pub isocenter: Isocenter,
}

impl Beam {
    pub fn fixed(name: &str, gantry_angle: f64, isocenter: Isocenter) -> Self {
        Self {
            name: name.to_string(),
            gantry_angle,
            arc_stop_gantry_angle: None,
            arc_rotation_direction: None,
            couch_rotation_angle: Some(0.0),
            couch_angle: None,
            isocenter,
        }
    }

    pub fn arc(name: &str, start: f64, stop: f64, isocenter: Isocenter) -> Self {
        Self {
            arc_stop_gantry_angle: Some(stop),
            ..Self::fixed(name, start, isocenter)
        }
    }

    pub fn with_couch(mut self, couch: f64) -> Self {
        self.couch_rotation_angle = Some(couch);
        self
    }

    /// Clockwise 181 → 179 arc at couch 0 about `isocenter`, used to show
    /// whether a full rotation (e.g. for cone-beam imaging) would clear.
    pub fn full_arc(isocenter: Isocenter) -> Self {
        Self {
            arc_rotation_direction: Some(ArcDirection::Clockwise),
            ..Self::arc(FULL_ARC_BEAM, 181.0, 179.0, isocenter)
        }
    }

    pub fn is_arc(&self) -> bool {
        self.arc_stop_gantry_angle.is_some()
    }

    /// Couch angle from whichever of the two attributes is present.
    pub fn couch(&self) -> f64 {
        self.couch_rotation_angle
            .or(self.couch_angle)
            .unwrap_or(0.0)
    }
}

/// Head-first or feet-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Entry {
    HeadFirst,
    FeetFirst,
}

/// Supine or prone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Lying {
    Supine,
    Prone,
}

/// One of the four standard patient positions (HFS, FFS, HFP, FFP).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatientPosition {
    pub entry: Entry,
    pub lying: Lying,
}

impl PatientPosition {
    pub const HFS: PatientPosition = PatientPosition {
        entry: Entry::HeadFirst,
        lying: Lying::Supine,
    };

    /// Parse either the short code (`"HFS"`) or the long form
    /// (`"HeadFirstSupine"`), which reduces to its capitals.
    ///
    /// Decubitus and any other non-standard positions return `None`; the
    /// 180° corrections are only defined for the four standard ones.
    pub fn parse(text: &str) -> Option<Self> {
        let code: String = if text.chars().any(|c| c.is_ascii_lowercase()) {
            text.chars().filter(|c| c.is_ascii_uppercase()).collect()
        } else {
            text.trim().to_string()
        };

        let entry = match code.get(0..2)? {
            "HF" => Entry::HeadFirst,
            "FF" => Entry::FeetFirst,
            _ => return None,
        };
        let lying = match code.get(2..)? {
            "S" => Lying::Supine,
            "P" => Lying::Prone,
            _ => return None,
        };
        Some(Self { entry, lying })
    }
}

impl fmt::Display for PatientPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = match self.entry {
            Entry::HeadFirst => "HF",
            Entry::FeetFirst => "FF",
        };
        let lying = match self.lying {
            Lying::Supine => "S",
            Lying::Prone => "P",
        };
        write!(f, "{}{}", entry, lying)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeamSet {
    pub name: String,
    /// Treatment position of the beam set, e.g. `"HeadFirstSupine"`.
    pub patient_position: String,
    /// Position recorded on the examination the structures live on, e.g. `"HFS"`.
    pub examination_patient_position: String,
    pub beams: Vec<Beam>,
}

impl BeamSet {
    pub fn new(name: &str, beams: Vec<Beam>) -> Self {
        Self {
            name: name.to_string(),
            patient_position: "HeadFirstSupine".to_string(),
            examination_patient_position: "HFS".to_string(),
            beams,
        }
    }

    pub fn with_positions(mut self, beam_set_position: &str, examination_position: &str) -> Self {
        self.patient_position = beam_set_position.to_string();
        self.examination_patient_position = examination_position.to_string();
        self
    }
}
