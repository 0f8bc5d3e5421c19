//! Keyed reconciliation of domain entities against a [`DrawingSurface`].
//!
//! The synchronizer owns one [`RenderedMarker`] per live entity, keyed by the
//! entity identifier. Every pass diffs the incoming snapshot against those
//! maps and issues only the mutations needed: markers are created once, moved
//! or relabelled in place, and removed as soon as their source disappears.
//! Running a pass twice on the same input issues nothing the second time.

use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::{debug, warn};

use crate::{
    geo::GeoPoint,
    model::{Facility, TransitPlan},
    surface::{DrawingSurface, IconKind, MarkerHandle, MarkerSpec},
};

#[derive(Clone, Debug, PartialEq)]
/// Surface handle plus the state last pushed through it.
pub struct RenderedMarker {
    pub handle: MarkerHandle,
    pub at: GeoPoint,
    pub label: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
/// Outcome of a single reconciliation pass.
pub struct ReconcileReport {
    pub added: usize,
    pub moved: usize,
    pub relabelled: usize,
    pub removed: usize,
    pub skipped_invalid: usize,
    /// Vehicle keys with a marker after the pass.
    pub rendered_vehicles: BTreeSet<String>,
}

impl ReconcileReport {
    pub fn mutations(&self) -> usize {
        self.added + self.moved + self.relabelled + self.removed
    }
}

#[derive(Debug, Default)]
pub struct EntitySynchronizer {
    facilities: HashMap<String, RenderedMarker>,
    vehicles: HashMap<String, RenderedMarker>,
}

impl EntitySynchronizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn vehicle_marker(&self, key: &str) -> Option<&RenderedMarker> {
        self.vehicles.get(key)
    }

    pub fn facility_marker(&self, key: &str) -> Option<&RenderedMarker> {
        self.facilities.get(key)
    }

    pub fn rendered_vehicle_keys(&self) -> BTreeSet<String> {
        self.vehicles.keys().cloned().collect()
    }

    /// Bring the surface in line with `facilities` and `vehicles`.
    pub fn reconcile<S: DrawingSurface>(
        &mut self,
        surface: &mut S,
        facilities: &[Facility],
        vehicles: &[TransitPlan],
    ) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        self.reconcile_facilities(surface, facilities, &mut report);
        self.reconcile_vehicles(surface, vehicles, &mut report);
        report.rendered_vehicles = self.rendered_vehicle_keys();

        metrics::gauge!("fleet_rendered_vehicles").set(self.vehicles.len() as f64);
        if report.mutations() > 0 {
            debug!(
                added = report.added,
                moved = report.moved,
                relabelled = report.relabelled,
                removed = report.removed,
                "reconciled map entities"
            );
        }
        report
    }

    fn reconcile_facilities<S: DrawingSurface>(
        &mut self,
        surface: &mut S,
        facilities: &[Facility],
        report: &mut ReconcileReport,
    ) {
        let mut live: HashSet<&str> = HashSet::with_capacity(facilities.len());
        let mut seen: HashSet<&str> = HashSet::with_capacity(facilities.len());
        for facility in facilities {
            if !seen.insert(facility.id.as_str()) {
                warn!(facility = %facility.id, "duplicate facility id in snapshot; keeping first");
                continue;
            }
            if !facility.location.is_valid() {
                warn!(
                    facility = %facility.id,
                    lat = facility.location.lat,
                    lon = facility.location.lon,
                    "skipping facility with invalid coordinate"
                );
                report.skipped_invalid += 1;
                continue;
            }
            live.insert(facility.id.as_str());

            let label = facility.label();
            match self.facilities.get_mut(&facility.id) {
                Some(rendered) => {
                    // Facilities never move; only the label is refreshed.
                    if rendered.label.as_deref() != Some(label.as_str()) {
                        surface.update_marker_label(rendered.handle, &label);
                        rendered.label = Some(label);
                        report.relabelled += 1;
                    }
                }
                None => {
                    let handle = surface.add_marker(MarkerSpec {
                        at: facility.location,
                        icon: IconKind::Facility,
                        label: Some(label.clone()),
                        click_key: None,
                    });
                    self.facilities.insert(
                        facility.id.clone(),
                        RenderedMarker {
                            handle,
                            at: facility.location,
                            label: Some(label),
                        },
                    );
                    report.added += 1;
                }
            }
        }

        let stale: Vec<String> = self
            .facilities
            .keys()
            .filter(|key| !live.contains(key.as_str()))
            .cloned()
            .collect();
        for key in stale {
            if let Some(rendered) = self.facilities.remove(&key) {
                surface.remove_marker(rendered.handle);
                report.removed += 1;
            }
        }
    }

    fn reconcile_vehicles<S: DrawingSurface>(
        &mut self,
        surface: &mut S,
        vehicles: &[TransitPlan],
        report: &mut ReconcileReport,
    ) {
        let mut visible: HashSet<&str> = HashSet::with_capacity(vehicles.len());
        let mut seen: HashSet<&str> = HashSet::with_capacity(vehicles.len());
        for plan in vehicles {
            if !seen.insert(plan.id.as_str()) {
                warn!(plan = %plan.id, "duplicate plan id in snapshot; keeping first");
                continue;
            }
            if !plan.is_in_transit() {
                continue;
            }
            let Some(raw) = plan.position else {
                // Not dispatched far enough to have a fix yet.
                continue;
            };
            if !raw.is_valid() {
                warn!(
                    plan = %plan.id,
                    lat = raw.lat,
                    lon = raw.lon,
                    "skipping vehicle with invalid coordinate"
                );
                report.skipped_invalid += 1;
                continue;
            }

            visible.insert(plan.id.as_str());
            match self.vehicles.get_mut(&plan.id) {
                Some(rendered) => {
                    if rendered.at != raw {
                        surface.update_marker_position(rendered.handle, raw);
                        rendered.at = raw;
                        report.moved += 1;
                    }
                }
                None => {
                    let handle = surface.add_marker(MarkerSpec {
                        at: raw,
                        icon: IconKind::Vehicle,
                        label: None,
                        click_key: Some(plan.id.clone()),
                    });
                    self.vehicles.insert(
                        plan.id.clone(),
                        RenderedMarker {
                            handle,
                            at: raw,
                            label: None,
                        },
                    );
                    report.added += 1;
                }
            }
        }

        let stale: Vec<String> = self
            .vehicles
            .keys()
            .filter(|key| !visible.contains(key.as_str()))
            .cloned()
            .collect();
        for key in stale {
            if let Some(rendered) = self.vehicles.remove(&key) {
                debug!(plan = %key, "removing vehicle marker");
                surface.remove_marker(rendered.handle);
                report.removed += 1;
            }
        }
    }
}
