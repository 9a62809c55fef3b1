//! Gantry proxies: one placed reference solid per distinct
//! (isocenter, arc, couch) configuration of a beam set.

use crate::beam::{Beam, BeamSet, Isocenter, PatientPosition};
use crate::config::MeshLibrary;
use crate::geometry::{wrap_degrees, wrap_degrees_positive, AffineTransform, BoundingBox};
use crate::provider::{HostError, SolidHandle, SolidOptions, StructureProvider};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Display name of an isocenter: its annotation, else its coordinates.
pub fn nominal_iso_name(isocenter: &Isocenter) -> String {
    match &isocenter.name {
        Some(name) if !name.is_empty() => name.clone(),
        _ => {
            let p = isocenter.position;
            format!("{:.2}, {:.2}, {:.2}", p.x(), p.y(), p.z())
        }
    }
}

/// Signed arc span in degrees, 0 for static beams.
///
/// Both angles are wrapped into [-180, 180) before subtracting, so spans
/// are measured the way the gantry travels, never through 180°.
pub fn arc_span(beam: &Beam) -> f64 {
    match beam.arc_stop_gantry_angle {
        None => 0.0,
        Some(stop) => wrap_degrees(beam.gantry_angle) - wrap_degrees(stop),
    }
}

/// The gantry angle at which the reference mesh is anchored: the start of
/// the arc when the span is negative (or zero), otherwise the stop.
pub fn leading_angle(beam: &Beam, span: f64) -> f64 {
    match beam.arc_stop_gantry_angle {
        Some(stop) if span > 0.0 => stop,
        _ => beam.gantry_angle,
    }
}

/// Short gantry description: `G90`, `G181-179`, with ` T10` appended for a
/// non-zero couch angle.
pub fn nominal_beam_name(beam: &Beam) -> String {
    let mut text = match beam.arc_stop_gantry_angle {
        None => format!("G{:.0}", beam.gantry_angle),
        Some(stop) => format!("G{:.0}-{:.0}", beam.gantry_angle, stop),
    };

    let couch = beam.couch();
    if couch != 0.0 {
        text.push_str(&format!(" T{:.0}", couch));
    }
    text
}

/// Name shared by every beam that maps onto the same proxy.
pub fn proxy_name(beam: &Beam) -> String {
    format!("{}: {}", nominal_iso_name(&beam.isocenter), nominal_beam_name(beam))
}

/// 180° corrections for couch and gantry when the examination was not
/// acquired head-first supine or disagrees with the beam set's position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationCorrection {
    pub couch: f64,
    pub gantry: f64,
}

impl OrientationCorrection {
    pub fn new(examination: PatientPosition, beam_set: PatientPosition) -> Self {
        use crate::beam::{Entry, Lying};

        let mut correction = Self::default();
        if examination.entry == Entry::FeetFirst {
            correction.couch += 180.0;
        }
        if examination.lying == Lying::Prone {
            correction.gantry += 180.0;
        }
        if examination.entry != beam_set.entry {
            correction.couch += 180.0;
        }
        if examination.lying != beam_set.lying {
            correction.gantry += 180.0;
        }
        correction
    }

    /// Correction for a beam set. Non-standard position codes are rejected.
    pub fn for_beam_set(beam_set: &BeamSet) -> Result<Self> {
        let examination = PatientPosition::parse(&beam_set.examination_patient_position)
            .ok_or_else(|| Error::UnsupportedPatientPosition(beam_set.examination_patient_position.clone()))?;
        let treatment = PatientPosition::parse(&beam_set.patient_position)
            .ok_or_else(|| Error::UnsupportedPatientPosition(beam_set.patient_position.clone()))?;

        let correction = Self::new(examination, treatment);
        log::debug!(
            "Orientation exam={} beam set={} -> {:?}",
            examination,
            treatment,
            correction
        );
        Ok(correction)
    }
}

/// Everything needed to place one proxy.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxySpec {
    pub name: String,
    pub arc_span: f64,
    /// Corrected leading gantry angle, in [0, 360).
    pub gantry_angle: f64,
    /// Corrected couch angle, in [0, 360).
    pub couch_angle: f64,
    pub transform: AffineTransform,
    pub mesh_file: PathBuf,
}

/// A proxy solid built (or attempted) during this session.
#[derive(Debug, Clone)]
pub struct GantryProxy {
    pub spec: ProxySpec,
    /// Host solid, if one was created or found.
    pub handle: Option<SolidHandle>,
    /// Whether the reference mesh was placed successfully.
    pub imported: bool,
    pub bounds: Option<BoundingBox>,
}

impl GantryProxy {
    pub fn name(&self) -> &str {
        &self.spec.name
    }

    /// Usable as one side of an overlap test.
    pub fn is_ready(&self) -> bool {
        self.imported && self.handle.is_some()
    }
}

/// Builds and deduplicates gantry proxies by name.
#[derive(Debug)]
pub struct GantryProxyBuilder {
    library: MeshLibrary,
    options: SolidOptions,
    correction: OrientationCorrection,
    proxies: BTreeMap<String, GantryProxy>,
    beam_map: BTreeMap<String, String>,
}

impl GantryProxyBuilder {
    pub fn new(library: MeshLibrary, options: SolidOptions, correction: OrientationCorrection) -> Self {
        Self {
            library,
            options,
            correction,
            proxies: BTreeMap::new(),
            beam_map: BTreeMap::new(),
        }
    }

    pub fn for_beam_set(beam_set: &BeamSet, library: MeshLibrary, options: SolidOptions) -> Result<Self> {
        Ok(Self::new(library, options, OrientationCorrection::for_beam_set(beam_set)?))
    }

    /// Placement of the proxy a beam maps onto.
    pub fn spec_for(&self, beam: &Beam) -> ProxySpec {
        let span = arc_span(beam);
        let gantry_angle = wrap_degrees_positive(leading_angle(beam, span) + self.correction.gantry);
        let couch_angle = wrap_degrees_positive(beam.couch() + self.correction.couch);

        ProxySpec {
            name: proxy_name(beam),
            arc_span: span,
            gantry_angle,
            couch_angle,
            transform: AffineTransform::gantry(beam.isocenter.position, gantry_angle, couch_angle),
            mesh_file: self.library.file_for_arc(span),
        }
    }

    /// Map `beam` onto its proxy, creating the solid on first use.
    ///
    /// Returns the proxy name. Host failures while creating or importing are
    /// logged and leave the proxy not ready; they never fail the call.
    pub fn build<P: StructureProvider + ?Sized>(&mut self, provider: &mut P, beam: &Beam) -> String {
        let spec = self.spec_for(beam);
        let name = spec.name.clone();
        self.beam_map.insert(beam.name.clone(), name.clone());

        if self.proxies.contains_key(&name) {
            log::debug!("Beam '{}' reuses proxy '{}'", beam.name, name);
            return name;
        }

        log::debug!(
            "Beam '{}': arc {:.0} gantry {:.1} couch {:.1} -> '{}'",
            beam.name,
            spec.arc_span,
            spec.gantry_angle,
            spec.couch_angle,
            name
        );
        let proxy = self.create(provider, spec);
        self.proxies.insert(name.clone(), proxy);
        name
    }

    fn create<P: StructureProvider + ?Sized>(&self, provider: &mut P, spec: ProxySpec) -> GantryProxy {
        let mut proxy = GantryProxy {
            spec,
            handle: None,
            imported: false,
            bounds: None,
        };

        let handle = match self.acquire_solid(provider, &proxy.spec.name) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("Failed to create gantry '{}': {}", proxy.spec.name, e);
                return proxy;
            }
        };

        match provider.import_oriented_mesh(
            &handle,
            &proxy.spec.mesh_file,
            &proxy.spec.transform,
            self.library.unit,
        ) {
            Ok(()) => {
                proxy.imported = true;
                proxy.bounds = provider.bounding_box(&handle).ok();
                if let Some(bounds) = &proxy.bounds {
                    log::debug!("Gantry '{}' spans {}", proxy.spec.name, bounds);
                }
            }
            Err(e) => log::error!("Failed to add gantry '{}': {}", proxy.spec.name, e),
        }

        proxy.handle = Some(handle);
        proxy
    }

    /// Reuse a host solid of the same name (left from an earlier session),
    /// emptied and given the proxy options, or create a new one.
    fn acquire_solid<P: StructureProvider + ?Sized>(
        &self,
        provider: &mut P,
        name: &str,
    ) -> std::result::Result<SolidHandle, HostError> {
        match provider.find_solid(name) {
            Some(handle) => {
                log::info!("Reusing existing solid '{}'", name);
                provider.set_options(&handle, &self.options)?;
                provider.clear_geometry(&handle)?;
                Ok(handle)
            }
            None => provider.create_solid(name, &self.options),
        }
    }

    pub fn proxies(&self) -> &BTreeMap<String, GantryProxy> {
        &self.proxies
    }

    pub fn proxy(&self, name: &str) -> Option<&GantryProxy> {
        self.proxies.get(name)
    }

    /// Beam name → proxy name.
    pub fn beam_map(&self) -> &BTreeMap<String, String> {
        &self.beam_map
    }

    /// Hand over every proxy that holds a host solid, emptying the builder.
    pub fn take_handles(&mut self) -> Vec<SolidHandle> {
        std::mem::take(&mut self.proxies)
            .into_values()
            .filter_map(|p| p.handle)
            .collect()
    }
}
