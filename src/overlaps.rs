//! Collider × gantry overlap matrix and the engine that fills it.
//!
//! An [`Overlaps`] session builds one proxy per distinct gantry
//! configuration, then tests candidate structures against every proxy on
//! request. Results are memoized per (candidate, proxy) pair and trusted
//! only while the session's validity flag is set.

use crate::beam::{Beam, BeamSet, FULL_ARC_BEAM};
use crate::config::CollisionConfig;
use crate::geometry::round_to_precision;
use crate::provider::{HostError, SolidHandle, StructureProvider};
use crate::proxy::{GantryProxy, GantryProxyBuilder};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// `matrix[collider][proxy] = overlaps`. A missing entry means the pair
/// has not been evaluated, which is different from `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlapMatrix {
    entries: BTreeMap<String, BTreeMap<String, bool>>,
}

impl OverlapMatrix {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, collider: &str, proxy: &str) -> Option<bool> {
        self.entries.get(collider)?.get(proxy).copied()
    }

    pub fn insert(&mut self, collider: &str, proxy: &str, overlaps: bool) {
        self.entries
            .entry(collider.to_string())
            .or_default()
            .insert(proxy.to_string(), overlaps);
    }

    pub fn row(&self, collider: &str) -> Option<&BTreeMap<String, bool>> {
        self.entries.get(collider)
    }

    pub fn colliders(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Number of evaluated pairs.
    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// `collider` has an entry for every proxy in `proxies`.
    pub fn is_fully_tested<'p>(&self, collider: &str, mut proxies: impl Iterator<Item = &'p str>) -> bool {
        match self.entries.get(collider) {
            Some(row) => proxies.all(|p| row.contains_key(p)),
            None => proxies.next().is_none(),
        }
    }

    /// All (collider, proxy) pairs that overlap.
    pub fn failing_pairs(&self) -> Vec<(String, String)> {
        self.entries
            .iter()
            .flat_map(|(collider, row)| {
                row.iter()
                    .filter(|(_, &hit)| hit)
                    .map(move |(proxy, _)| (collider.clone(), proxy.clone()))
            })
            .collect()
    }

    /// Colliders overlapping `proxy`.
    pub fn collider_ids_by_proxy(&self, proxy: &str) -> Vec<String> {
        self.entries
            .iter()
            .filter(|(_, row)| row.get(proxy).copied().unwrap_or(false))
            .map(|(collider, _)| collider.clone())
            .collect()
    }

    /// Every evaluated proxy with its overlapping colliders (possibly none).
    pub fn colliders_by_proxy(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (collider, row) in &self.entries {
            for (proxy, &hit) in row {
                let colliders = out.entry(proxy.clone()).or_default();
                if hit {
                    colliders.push(collider.clone());
                }
            }
        }
        out
    }

    /// Like [`colliders_by_proxy`](Self::colliders_by_proxy), failing proxies only.
    pub fn failing_by_proxy(&self) -> BTreeMap<String, Vec<String>> {
        let mut out = self.colliders_by_proxy();
        out.retain(|_, colliders| !colliders.is_empty());
        out
    }

    /// Overlapping proxies per collider.
    pub fn failing_by_collider(&self) -> BTreeMap<String, Vec<String>> {
        let mut out: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (collider, proxy) in self.failing_pairs() {
            out.entry(collider).or_default().push(proxy);
        }
        out
    }

    /// Any collider overlaps any of `proxies`.
    pub fn any_overlap(&self, proxies: &BTreeSet<&str>) -> bool {
        self.entries
            .values()
            .flat_map(|row| row.iter())
            .any(|(proxy, &hit)| hit && proxies.contains(proxy.as_str()))
    }
}

pub type ProgressFn<'a> = Box<dyn FnMut(f64, &str) + 'a>;
pub type InvalidationFn<'a> = Box<dyn FnMut() + 'a>;

/// Driver hooks. Missing progress hooks log at debug level instead.
///
/// Hooks run synchronously on the engine's thread and receive a fraction in
/// [0, 1] plus a short message.
#[derive(Default)]
pub struct Callbacks<'a> {
    pub invalidation: Option<InvalidationFn<'a>>,
    pub gantry_progress: Option<ProgressFn<'a>>,
    pub test_progress: Option<ProgressFn<'a>>,
}

impl<'a> Callbacks<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_invalidation(mut self, f: impl FnMut() + 'a) -> Self {
        self.invalidation = Some(Box::new(f));
        self
    }

    pub fn on_gantry_progress(mut self, f: impl FnMut(f64, &str) + 'a) -> Self {
        self.gantry_progress = Some(Box::new(f));
        self
    }

    pub fn on_test_progress(mut self, f: impl FnMut(f64, &str) + 'a) -> Self {
        self.test_progress = Some(Box::new(f));
        self
    }

    fn invalidated(&mut self) {
        if let Some(f) = self.invalidation.as_mut() {
            log::debug!("Calling invalidation callback");
            f();
        }
    }

    fn gantry(&mut self, progress: f64, message: &str) {
        match self.gantry_progress.as_mut() {
            Some(f) => f(progress, message),
            None => log::debug!("Gantry {:.0}%: {}", progress * 100.0, message),
        }
    }

    fn test(&mut self, progress: f64, message: &str) {
        match self.test_progress.as_mut() {
            Some(f) => f(progress, message),
            None => log::debug!("Overlap {:.0}%: {}", progress * 100.0, message),
        }
    }
}

impl fmt::Debug for Callbacks<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Callbacks")
            .field("invalidation", &self.invalidation.is_some())
            .field("gantry_progress", &self.gantry_progress.is_some())
            .field("test_progress", &self.test_progress.is_some())
            .finish()
    }
}

/// What happened to the session's solids at release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupReport {
    pub deleted: Vec<String>,
    pub kept: Vec<String>,
    /// Solids the host refused to delete.
    pub failed: Vec<String>,
}

/// One overlap-check session over a beam set.
///
/// The session owns two scratch solids (the intersection target and the
/// margin expansion) and every proxy it built. They are released by
/// [`cleanup`](Self::cleanup), or when the session is dropped without it,
/// in which case proxies are deleted too.
pub struct Overlaps<'a, P: StructureProvider + ?Sized> {
    provider: &'a mut P,
    callbacks: Callbacks<'a>,
    builder: GantryProxyBuilder,
    beams: Vec<Beam>,
    matrix: OverlapMatrix,
    valid: bool,
    margin: f64,
    selection: BTreeSet<String>,
    test_solid: Option<SolidHandle>,
    margin_solid: Option<SolidHandle>,
    released: bool,
}

impl<'a, P: StructureProvider + ?Sized> Overlaps<'a, P> {
    /// Create the scratch solids and build every gantry proxy.
    ///
    /// Fails on unsupported patient positions, on a full-arc request for a
    /// beam set without beams, and when a scratch solid cannot be created.
    /// Whatever was created before a failure is released again.
    pub fn new(
        provider: &'a mut P,
        beam_set: &BeamSet,
        config: &CollisionConfig,
        callbacks: Callbacks<'a>,
    ) -> Result<Self> {
        let builder = GantryProxyBuilder::for_beam_set(
            beam_set,
            config.mesh_library.clone(),
            config.proxy_options.clone(),
        )?;

        let mut beams = beam_set.beams.clone();
        if config.full_arc_check {
            let isocenter = beams
                .first()
                .map(|b| b.isocenter.clone())
                .ok_or(Error::MissingIsocenter)?;
            beams.push(Beam::full_arc(isocenter));
        }

        let mut overlaps = Self {
            provider,
            callbacks,
            builder,
            beams,
            matrix: OverlapMatrix::new(),
            valid: false,
            margin: 0.0,
            selection: BTreeSet::new(),
            test_solid: None,
            margin_solid: None,
            released: false,
        };

        overlaps.test_solid = Some(
            overlaps
                .provider
                .create_solid("collision", &config.scratch_options)
                .map_err(Error::Setup)?,
        );
        overlaps.margin_solid = Some(
            overlaps
                .provider
                .create_solid("margin", &config.scratch_options)
                .map_err(Error::Setup)?,
        );

        overlaps.add_gantries();
        Ok(overlaps)
    }

    fn add_gantries(&mut self) {
        log::info!("Building gantry proxies for {} beams", self.beams.len());
        let count = self.beams.len() as f64;
        for (i, beam) in self.beams.iter().enumerate() {
            self.builder.build(&mut *self.provider, beam);
            self.callbacks.gantry(i as f64 / count, &beam.name);
        }

        let ready = self.builder.proxies().values().filter(|p| p.is_ready()).count();
        log::info!(
            "  {} gantry proxies ({} usable) for {} beams",
            self.builder.proxies().len(),
            ready,
            self.beams.len()
        );
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Setting `false` on a valid session clears the matrix and fires the
    /// invalidation callback. Setting the current value does nothing.
    pub fn set_validity(&mut self, valid: bool) {
        if self.valid == valid {
            return;
        }
        self.valid = valid;
        if !valid {
            log::debug!("Overlap matrix invalidated");
            self.callbacks.invalidated();
            self.matrix.clear();
        }
    }

    /// Margin the current matrix was computed with, in cm.
    pub fn margin(&self) -> f64 {
        self.margin
    }

    /// Candidates the current matrix was computed for.
    pub fn selection(&self) -> &BTreeSet<String> {
        &self.selection
    }

    /// Test every candidate against every usable proxy, skipping pairs
    /// already in the matrix, then mark the matrix valid.
    ///
    /// With `margin > 0` each candidate is expanded into the margin solid
    /// once and the expansion is tested. A margin (compared to 2 dp) or
    /// candidate set different from the one the matrix holds invalidates
    /// it first. Host failures for a single pair are logged and leave that
    /// entry absent.
    pub fn check_structures<I, S>(&mut self, candidates: I, margin: f64) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let candidates: BTreeSet<String> = candidates
            .into_iter()
            .map(|s| s.as_ref().to_string())
            .collect();

        if candidates.is_empty() {
            return Err(Error::NoCandidates);
        }
        if !margin.is_finite() || margin < 0.0 {
            return Err(Error::InvalidMargin(margin));
        }
        let generated = self.generated_names();
        if let Some(name) = candidates.iter().find(|c| generated.contains(*c)) {
            return Err(Error::GeneratedCandidate(name.clone()));
        }

        let margin = round_to_precision(margin);
        if margin != self.margin {
            log::info!("Margin changed from {} to {} cm", self.margin, margin);
            self.set_validity(false);
            self.matrix.clear();
            self.margin = margin;
        }
        if candidates != self.selection {
            log::info!("Selection changed to {:?}", candidates);
            self.set_validity(false);
            self.matrix.clear();
            self.selection = candidates.clone();
        }

        let proxies: Vec<(String, String)> = self
            .builder
            .proxies()
            .values()
            .filter(|p| p.is_ready())
            .filter_map(|p| Some((p.name().to_string(), p.handle.as_ref()?.name().to_string())))
            .collect();

        let total = (candidates.len() * proxies.len()).max(1) as f64;
        let mut i = 1;
        let mut tested = 0;

        for candidate in &candidates {
            if self
                .matrix
                .is_fully_tested(candidate, proxies.iter().map(|(name, _)| name.as_str()))
            {
                log::debug!("'{}' already tested against every gantry", candidate);
                continue;
            }

            let source = if margin > 0.0 {
                match self.expand_into_margin(candidate, margin) {
                    Ok(name) => name,
                    Err(e) => {
                        log::warn!("Skipping '{}': margin expansion failed: {}", candidate, e);
                        continue;
                    }
                }
            } else {
                candidate.clone()
            };

            for (proxy, handle) in &proxies {
                if self.matrix.get(candidate, proxy).is_some() {
                    continue;
                }
                match self.test_pair(&source, handle) {
                    Ok(hit) => {
                        self.matrix.insert(candidate, proxy, hit);
                        tested += 1;
                    }
                    Err(e) => log::warn!("Overlap test '{}' x '{}' failed: {}", candidate, proxy, e),
                }
                self.callbacks
                    .test(i as f64 / total, &format!("{}: {}", candidate, proxy));
                i += 1;
            }
        }

        self.set_validity(true);
        log::info!(
            "Checked {} structures against {} gantries ({} new tests, margin {} cm)",
            candidates.len(),
            proxies.len(),
            tested,
            margin
        );
        Ok(())
    }

    fn expand_into_margin(&mut self, candidate: &str, margin: f64) -> std::result::Result<String, HostError> {
        let target = self
            .margin_solid
            .clone()
            .ok_or_else(|| HostError::Operation("margin solid released".to_string()))?;
        self.provider.expand_margin(&target, candidate, margin)?;
        Ok(target.name().to_string())
    }

    fn test_pair(&mut self, source: &str, proxy: &str) -> std::result::Result<bool, HostError> {
        let target = self
            .test_solid
            .clone()
            .ok_or_else(|| HostError::Operation("test solid released".to_string()))?;
        self.provider
            .compute_boolean_intersection(&target, &[source], &[proxy])?;
        self.provider.has_contours(&target)
    }

    /// Names of every solid this session created; never valid candidates.
    pub fn generated_names(&self) -> BTreeSet<String> {
        let mut names: BTreeSet<String> = BTreeSet::new();
        for proxy in self.builder.proxies().values() {
            names.insert(proxy.name().to_string());
            if let Some(handle) = &proxy.handle {
                names.insert(handle.name().to_string());
            }
        }
        for handle in [&self.test_solid, &self.margin_solid].into_iter().flatten() {
            names.insert(handle.name().to_string());
        }
        names
    }

    pub fn matrix(&self) -> &OverlapMatrix {
        &self.matrix
    }

    pub fn provider(&self) -> &P {
        &*self.provider
    }

    /// Beams the session checks, including the synthetic full-arc beam.
    pub fn beams(&self) -> &[Beam] {
        &self.beams
    }

    pub fn proxies(&self) -> &BTreeMap<String, GantryProxy> {
        self.builder.proxies()
    }

    pub fn proxy_names(&self) -> Vec<String> {
        self.builder.proxies().keys().cloned().collect()
    }

    /// Beam name → proxy name.
    pub fn beam_map(&self) -> &BTreeMap<String, String> {
        self.builder.beam_map()
    }

    fn real_beam_proxies(&self) -> BTreeSet<&str> {
        self.beam_map()
            .iter()
            .filter(|(beam, _)| beam.as_str() != FULL_ARC_BEAM)
            .map(|(_, proxy)| proxy.as_str())
            .collect()
    }

    /// Any candidate overlaps a proxy of a planned beam. Proxies reached
    /// only through the full-arc beam do not count.
    pub fn has_collision(&self) -> bool {
        self.matrix.any_overlap(&self.real_beam_proxies())
    }

    pub fn collider_ids_by_proxy(&self, proxy: &str) -> Vec<String> {
        self.matrix.collider_ids_by_proxy(proxy)
    }

    pub fn colliders_by_proxy(&self) -> BTreeMap<String, Vec<String>> {
        self.matrix.colliders_by_proxy()
    }

    pub fn failing_pairs(&self) -> Vec<(String, String)> {
        self.matrix.failing_pairs()
    }

    pub fn failing_by_proxy(&self) -> BTreeMap<String, Vec<String>> {
        self.matrix.failing_by_proxy()
    }

    pub fn failing_by_collider(&self) -> BTreeMap<String, Vec<String>> {
        self.matrix.failing_by_collider()
    }

    /// Planned beams with at least one collider, by beam name.
    pub fn failing_by_beam(&self) -> BTreeMap<String, Vec<String>> {
        self.beam_map()
            .iter()
            .filter(|(beam, _)| beam.as_str() != FULL_ARC_BEAM)
            .filter_map(|(beam, proxy)| {
                let colliders = self.matrix.collider_ids_by_proxy(proxy);
                (!colliders.is_empty()).then(|| (beam.clone(), colliders))
            })
            .collect()
    }

    /// Colliders of the synthetic full-arc beam, if one was added.
    pub fn full_arc_colliders(&self) -> Vec<String> {
        self.beam_map()
            .get(FULL_ARC_BEAM)
            .map(|proxy| self.matrix.collider_ids_by_proxy(proxy))
            .unwrap_or_default()
    }

    /// Release the scratch solids, and the proxies unless `keep_proxies`.
    pub fn cleanup(mut self, keep_proxies: bool) -> CleanupReport {
        self.release(keep_proxies)
    }

    fn release(&mut self, keep_proxies: bool) -> CleanupReport {
        let mut report = CleanupReport::default();
        if self.released {
            return report;
        }
        self.released = true;

        let scratch = [self.margin_solid.take(), self.test_solid.take()];
        for handle in scratch.into_iter().flatten() {
            self.delete(handle, &mut report);
        }

        if keep_proxies {
            report.kept = self
                .builder
                .proxies()
                .values()
                .filter_map(|p| p.handle.as_ref().map(|h| h.name().to_string()))
                .collect();
        } else {
            for handle in self.builder.take_handles() {
                self.delete(handle, &mut report);
            }
        }

        log::info!(
            "Released session solids: {} deleted, {} kept, {} failed",
            report.deleted.len(),
            report.kept.len(),
            report.failed.len()
        );
        report
    }

    fn delete(&mut self, handle: SolidHandle, report: &mut CleanupReport) {
        let name = handle.name().to_string();
        match self.provider.delete_solid(handle) {
            Ok(()) => report.deleted.push(name),
            Err(e) => {
                log::error!("Failed to delete '{}': {}", name, e);
                report.failed.push(name);
            }
        }
    }
}

impl<P: StructureProvider + ?Sized> Drop for Overlaps<'_, P> {
    fn drop(&mut self) {
        if !self.released {
            log::debug!("Overlap session dropped without cleanup, releasing all solids");
            self.release(false);
        }
    }
}

impl<P: StructureProvider + ?Sized> fmt::Display for Overlaps<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .failing_by_beam()
            .into_iter()
            .map(|(beam, colliders)| format!("{}: {}", beam, colliders.join(", ")))
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

impl<P: StructureProvider + ?Sized> fmt::Debug for Overlaps<'_, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Overlaps")
            .field("valid", &self.valid)
            .field("margin", &self.margin)
            .field("selection", &self.selection)
            .field("beams", &self.beams.len())
            .field("proxies", &self.builder.proxies().len())
            .field("matrix", &self.matrix)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beam::Isocenter;
    use crate::geometry::Point3;
    use crate::testing::StubProvider;
    use std::cell::{Cell, RefCell};

    const G90: &str = "Iso 1: G90";
    const FULL: &str = "Iso 1: G181-179";

    fn iso() -> Isocenter {
        Isocenter::new(Some("Iso 1"), Point3::new(0.0, 0.0, 0.0))
    }

    fn two_g90_beams() -> BeamSet {
        BeamSet::new(
            "BS",
            vec![Beam::fixed("A", 90.0, iso()), Beam::fixed("B", 90.0, iso())],
        )
    }

    fn host() -> StubProvider {
        let mut host = StubProvider::new();
        host.add_structure("External");
        host.add_structure("Couch");
        host
    }

    #[test]
    fn test_matrix_queries() {
        let mut m = OverlapMatrix::new();
        m.insert("External", "G0", true);
        m.insert("External", "G90", false);
        m.insert("Couch", "G0", true);

        assert_eq!(m.len(), 3);
        assert_eq!(m.get("External", "G90"), Some(false));
        assert_eq!(m.get("Couch", "G90"), None);
        assert_eq!(m.collider_ids_by_proxy("G0"), vec!["Couch", "External"]);
        assert_eq!(m.colliders_by_proxy()["G90"], Vec::<String>::new());
        assert!(!m.failing_by_proxy().contains_key("G90"));
        assert_eq!(m.failing_by_collider()["External"], vec!["G0"]);
        assert!(m.is_fully_tested("External", ["G0", "G90"].into_iter()));
        assert!(!m.is_fully_tested("Couch", ["G0", "G90"].into_iter()));
        assert!(m.any_overlap(&["G0"].into_iter().collect()));
        assert!(!m.any_overlap(&["G90"].into_iter().collect()));
    }

    #[test]
    fn test_shared_gantry_collides_for_both_beams() {
        let mut host = host();
        host.set_overlap("External", G90);

        let mut overlaps =
            Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), Callbacks::new()).unwrap();
        assert_eq!(overlaps.proxy_names(), vec![G90]);

        overlaps.check_structures(["External"], 0.0).unwrap();
        assert!(overlaps.is_valid());
        assert!(overlaps.has_collision());

        let by_beam = overlaps.failing_by_beam();
        assert_eq!(by_beam.len(), 2);
        assert_eq!(by_beam["A"], vec!["External"]);
        assert_eq!(by_beam["B"], vec!["External"]);
        assert_eq!(overlaps.to_string(), "A: External\nB: External");
    }

    #[test]
    fn test_check_is_idempotent() {
        let mut host = host();
        let mut overlaps =
            Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), Callbacks::new()).unwrap();

        overlaps.check_structures(["External", "Couch"], 0.0).unwrap();
        let tests = overlaps.provider().calls("compute_boolean_intersection");
        assert_eq!(tests, 2);

        overlaps.check_structures(["Couch", "External"], 0.0).unwrap();
        assert_eq!(overlaps.provider().calls("compute_boolean_intersection"), tests);
        assert!(!overlaps.has_collision());
    }

    #[test]
    fn test_empty_selection_is_rejected_without_state_change() {
        let mut host = host();
        let mut overlaps =
            Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), Callbacks::new()).unwrap();

        assert!(matches!(
            overlaps.check_structures(Vec::<String>::new(), 0.0),
            Err(Error::NoCandidates)
        ));
        assert!(!overlaps.is_valid());

        overlaps.check_structures(["External"], 0.0).unwrap();
        assert!(matches!(
            overlaps.check_structures(Vec::<String>::new(), 0.0),
            Err(Error::NoCandidates)
        ));
        assert!(overlaps.is_valid());
        assert_eq!(overlaps.matrix().len(), 1);
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        let mut host = host();
        let mut overlaps =
            Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), Callbacks::new()).unwrap();

        assert!(matches!(
            overlaps.check_structures(["External"], -1.0),
            Err(Error::InvalidMargin(_))
        ));
        assert!(matches!(
            overlaps.check_structures(["External"], f64::NAN),
            Err(Error::InvalidMargin(_))
        ));
        assert!(matches!(
            overlaps.check_structures(["External", G90], 0.0),
            Err(Error::GeneratedCandidate(name)) if name == G90
        ));
        assert!(matches!(
            overlaps.check_structures(["collision"], 0.0),
            Err(Error::GeneratedCandidate(_))
        ));
        assert_eq!(overlaps.provider().calls("compute_boolean_intersection"), 0);
    }

    #[test]
    fn test_invalidation_fires_once_per_transition() {
        let fired = Cell::new(0);
        let mut host = host();
        {
            let callbacks = Callbacks::new().on_invalidation(|| fired.set(fired.get() + 1));
            let mut overlaps =
                Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), callbacks).unwrap();

            overlaps.set_validity(false);
            assert_eq!(fired.get(), 0);

            overlaps.check_structures(["External"], 0.0).unwrap();
            overlaps.set_validity(false);
            overlaps.set_validity(false);
            assert!(overlaps.matrix().is_empty());
            assert!(!overlaps.has_collision());
        }
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_margin_change_invalidates_and_expands() {
        let fired = Cell::new(0);
        let mut host = host();
        host.set_overlap_from_margin("External", G90, 1.0);
        {
            let callbacks = Callbacks::new().on_invalidation(|| fired.set(fired.get() + 1));
            let mut overlaps =
                Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), callbacks).unwrap();

            overlaps.check_structures(["External"], 0.0).unwrap();
            assert!(!overlaps.has_collision());
            assert_eq!(overlaps.provider().calls("expand_margin"), 0);

            overlaps.check_structures(["External"], 0.5).unwrap();
            assert!(!overlaps.has_collision());
            overlaps.check_structures(["External"], 1.5).unwrap();
            assert!(overlaps.has_collision());
            assert_eq!(overlaps.margin(), 1.5);
            assert_eq!(overlaps.provider().calls("expand_margin"), 2);
            assert_eq!(overlaps.provider().calls("compute_boolean_intersection"), 3);
        }
        assert_eq!(fired.get(), 2);
    }

    #[test]
    fn test_selection_change_invalidates() {
        let fired = Cell::new(0);
        let mut host = host();
        host.set_overlap("Couch", G90);
        {
            let callbacks = Callbacks::new().on_invalidation(|| fired.set(fired.get() + 1));
            let mut overlaps =
                Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), callbacks).unwrap();

            overlaps.check_structures(["External", "Couch"], 0.0).unwrap();
            assert!(overlaps.has_collision());

            overlaps.check_structures(["External"], 0.0).unwrap();
            assert!(overlaps.is_valid());
            assert!(!overlaps.has_collision());
            assert!(overlaps.failing_by_beam().is_empty());
            assert_eq!(overlaps.matrix().get("Couch", G90), None);
            assert_eq!(overlaps.selection().len(), 1);
            assert_eq!(overlaps.provider().calls("compute_boolean_intersection"), 3);
        }
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_margin_noise_keeps_matrix() {
        let fired = Cell::new(0);
        let mut host = host();
        {
            let callbacks = Callbacks::new().on_invalidation(|| fired.set(fired.get() + 1));
            let mut overlaps =
                Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), callbacks).unwrap();

            overlaps.check_structures(["External"], 0.3).unwrap();
            overlaps.check_structures(["External"], 0.1 + 0.2).unwrap();
            assert!(overlaps.is_valid());
            assert_eq!(overlaps.margin(), 0.3);
            assert_eq!(overlaps.provider().calls("expand_margin"), 1);
            assert_eq!(overlaps.provider().calls("compute_boolean_intersection"), 1);
        }
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn test_full_arc_is_informational() {
        let mut host = host();
        host.set_overlap("Couch", FULL);
        let config = CollisionConfig {
            full_arc_check: true,
            ..CollisionConfig::default()
        };

        let mut overlaps = Overlaps::new(&mut host, &two_g90_beams(), &config, Callbacks::new()).unwrap();
        assert_eq!(overlaps.beams().len(), 3);
        assert_eq!(overlaps.beam_map()[FULL_ARC_BEAM], FULL);

        overlaps.check_structures(["External", "Couch"], 0.0).unwrap();
        assert_eq!(overlaps.failing_pairs(), vec![("Couch".to_string(), FULL.to_string())]);
        assert!(!overlaps.has_collision());
        assert!(overlaps.failing_by_beam().is_empty());
        assert_eq!(overlaps.full_arc_colliders(), vec!["Couch"]);
    }

    #[test]
    fn test_full_arc_without_beams_is_rejected() {
        let mut host = host();
        let config = CollisionConfig {
            full_arc_check: true,
            ..CollisionConfig::default()
        };
        let result = Overlaps::new(&mut host, &BeamSet::new("Empty", vec![]), &config, Callbacks::new());
        assert!(matches!(result, Err(Error::MissingIsocenter)));
        drop(result);
        assert_eq!(host.calls("create_solid"), 0);
    }

    #[test]
    fn test_failed_pair_is_left_absent() {
        let mut host = host();
        host.fail_pair("Couch", G90);
        host.set_overlap("External", G90);

        let mut overlaps =
            Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), Callbacks::new()).unwrap();
        overlaps.check_structures(["External", "Couch"], 0.0).unwrap();

        assert!(overlaps.is_valid());
        assert_eq!(overlaps.matrix().get("Couch", G90), None);
        assert_eq!(overlaps.matrix().get("External", G90), Some(true));
    }

    #[test]
    fn test_unimported_proxies_are_not_tested() {
        let mut host = host();
        host.fail_imports = true;
        let mut overlaps =
            Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), Callbacks::new()).unwrap();

        overlaps.check_structures(["External"], 0.0).unwrap();
        assert!(overlaps.is_valid());
        assert!(overlaps.matrix().is_empty());
        assert_eq!(overlaps.provider().calls("compute_boolean_intersection"), 0);
        assert_eq!(overlaps.proxy_names(), vec![G90]);
    }

    #[test]
    fn test_progress_reporting() {
        let gantries = RefCell::new(Vec::new());
        let tests = RefCell::new(Vec::new());
        let mut host = host();
        {
            let callbacks = Callbacks::new()
                .on_gantry_progress(|p, m| gantries.borrow_mut().push((p, m.to_string())))
                .on_test_progress(|p, m| tests.borrow_mut().push((p, m.to_string())));
            let mut overlaps =
                Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), callbacks).unwrap();
            overlaps.check_structures(["External", "Couch"], 0.0).unwrap();
        }

        assert_eq!(
            *gantries.borrow(),
            vec![(0.0, "A".to_string()), (0.5, "B".to_string())]
        );
        assert_eq!(
            *tests.borrow(),
            vec![
                (0.5, format!("Couch: {}", G90)),
                (1.0, format!("External: {}", G90)),
            ]
        );
    }

    #[test]
    fn test_cleanup_keeps_or_deletes_proxies() {
        let mut host = host();
        let overlaps =
            Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), Callbacks::new()).unwrap();
        let report = overlaps.cleanup(true);
        assert_eq!(report.deleted, vec!["margin", "collision"]);
        assert_eq!(report.kept, vec![G90]);
        assert!(host.contains(G90));
        assert!(!host.contains("collision"));

        // A later session reuses the kept proxy and removes it
        let overlaps =
            Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), Callbacks::new()).unwrap();
        let report = overlaps.cleanup(false);
        assert_eq!(report.deleted.len(), 3);
        assert_eq!(host.solid_names(), vec!["Couch", "External"]);
    }

    #[test]
    fn test_drop_releases_everything() {
        let mut host = host();
        {
            let mut overlaps =
                Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), Callbacks::new()).unwrap();
            overlaps.check_structures(["External"], 0.0).unwrap();
        }
        assert_eq!(host.solid_names(), vec!["Couch", "External"]);
        assert_eq!(host.calls("delete_solid"), 3);
    }

    #[test]
    fn test_scratch_failure_is_fatal_and_releases() {
        let mut host = host();
        host.fail_create.insert("margin".to_string());
        let result = Overlaps::new(&mut host, &two_g90_beams(), &CollisionConfig::default(), Callbacks::new());
        assert!(matches!(result, Err(Error::Setup(_))));
        drop(result);
        assert!(!host.contains("collision"));
        assert_eq!(host.solid_names(), vec!["Couch", "External"]);
    }
}
