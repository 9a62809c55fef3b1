// Driver entry point with guaranteed release

use crate::beam::BeamSet;
use crate::candidates::StructureCatalog;
use crate::config::CollisionConfig;
use crate::overlaps::{Callbacks, CleanupReport, Overlaps};
use crate::provider::StructureProvider;
use crate::report::{CollisionReport, ValidationRecord};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// What the reviewer chose to do with the generated proxies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    /// Keep the proxies for inspection in the host.
    Kept,
    /// Remove everything the session created.
    Cancelled,
}

/// Decides the disposition once the initial check has run.
///
/// Interactive drivers may re-run [`Overlaps::check_structures`] with a new
/// selection or margin before answering.
pub trait Reviewer<P: StructureProvider + ?Sized> {
    fn review(&mut self, overlaps: &mut Overlaps<'_, P>) -> Result<Disposition>;
}

/// Unattended policy: keep when `retain`, or when a collision was found
/// and `retain_on_fail`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AutoReviewer {
    pub retain: bool,
    pub retain_on_fail: bool,
}

impl AutoReviewer {
    pub fn from_config(config: &CollisionConfig) -> Self {
        Self {
            retain: config.retain,
            retain_on_fail: config.retain_on_fail,
        }
    }

    pub fn disposition(&self, has_collision: bool) -> Disposition {
        if self.retain || (has_collision && self.retain_on_fail) {
            Disposition::Kept
        } else {
            Disposition::Cancelled
        }
    }
}

impl<P: StructureProvider + ?Sized> Reviewer<P> for AutoReviewer {
    fn review(&mut self, overlaps: &mut Overlaps<'_, P>) -> Result<Disposition> {
        let disposition = self.disposition(overlaps.has_collision());
        if overlaps.has_collision() {
            log::warn!("Found potential collision. Overlaps identified:\n{}", overlaps);
        }
        log::info!("Unattended review: {:?}", disposition);
        Ok(disposition)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckOutcome {
    pub disposition: Disposition,
    pub report: CollisionReport,
    pub record: ValidationRecord,
    pub cleanup: CleanupReport,
}

/// Build proxies for `beam_set`, test the candidates `config.filter` picks
/// from `catalog` at `config.margin_cm`, and hand the session to `reviewer`.
///
/// The session's solids are released on every path: per the disposition on
/// success, and entirely when construction, the check or the review fails.
pub fn run_check<P, R>(
    provider: &mut P,
    beam_set: &BeamSet,
    catalog: &StructureCatalog,
    config: &CollisionConfig,
    callbacks: Callbacks<'_>,
    reviewer: &mut R,
) -> Result<CheckOutcome>
where
    P: StructureProvider + ?Sized,
    R: Reviewer<P> + ?Sized,
{
    log::info!("Collision check for beam set '{}'", beam_set.name);
    let mut overlaps = Overlaps::new(provider, beam_set, config, callbacks)?;

    let candidates = config.filter.select(catalog, &overlaps.generated_names());
    if candidates.is_empty() {
        return Err(Error::NoCandidates);
    }
    log::info!("  Candidates: {:?}", candidates);
    overlaps.check_structures(&candidates, config.margin_cm)?;

    let disposition = reviewer.review(&mut overlaps)?;

    let report = CollisionReport::from_overlaps(&overlaps);
    let record = ValidationRecord::from_overlaps(&overlaps);
    let cleanup = overlaps.cleanup(disposition == Disposition::Kept);

    log::info!(
        "Beam set '{}': {} ({:?})",
        beam_set.name,
        report.overall,
        disposition
    );
    Ok(CheckOutcome {
        disposition,
        report,
        record,
        cleanup,
    })
}
