//! Domain records delivered by the upstream feed.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// Fixed logistics origin point.
pub struct Facility {
    pub id: String,
    pub name: String,
    #[serde(flatten)]
    pub location: GeoPoint,
    #[serde(default)]
    pub available_units: u32,
}

impl Facility {
    /// Text shown on the facility marker; refreshed in place when it changes.
    pub fn label(&self) -> String {
        format!("{}\nAvailable units: {}", self.name, self.available_units)
    }

    /// Plans reference their origin by identifier or by display name.
    pub fn matches_reference(&self, reference: &str) -> bool {
        self.id == reference || self.name == reference
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Planned,
    #[serde(alias = "dispatched")]
    InTransit,
    Delivered,
    Cancelled,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
/// A vehicle or shipment moving from a facility toward a named destination.
pub struct TransitPlan {
    pub id: String,
    /// Weak reference to a [`Facility`] (identifier or name).
    pub origin: String,
    /// Key into the [`DestinationTable`].
    pub destination: String,
    #[serde(default)]
    pub position: Option<GeoPoint>,
    #[serde(default)]
    pub progress: f64,
    pub status: PlanStatus,
}

impl TransitPlan {
    pub fn is_in_transit(&self) -> bool {
        self.status == PlanStatus::InTransit
    }

    /// Current position when the plan is in transit and the coordinate is usable.
    pub fn visible_position(&self) -> Option<GeoPoint> {
        if !self.is_in_transit() {
            return None;
        }
        self.position.filter(GeoPoint::is_valid)
    }

    /// Progress clamped to `[0, 1]`; non-finite values read as zero.
    pub fn clamped_progress(&self) -> f64 {
        if self.progress.is_finite() {
            self.progress.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
/// Static destination-name to coordinate lookup.
pub struct DestinationTable(HashMap<String, GeoPoint>);

impl DestinationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, at: GeoPoint) {
        self.0.insert(name.into(), at);
    }

    pub fn get(&self, name: &str) -> Option<GeoPoint> {
        self.0.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, GeoPoint)> for DestinationTable {
    fn from_iter<I: IntoIterator<Item = (K, GeoPoint)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
/// Complete current state of both collections; the feed never sends deltas.
pub struct FleetSnapshot {
    #[serde(default)]
    pub facilities: Vec<Facility>,
    #[serde(default)]
    pub plans: Vec<TransitPlan>,
}

impl FleetSnapshot {
    /// In-transit plan with the given identifier, position or not.
    ///
    /// Only the first record with `id` counts, matching how markers are
    /// reconciled; a later in-transit duplicate does not revive it.
    pub fn in_transit(&self, id: &str) -> Option<&TransitPlan> {
        self.plan(id).filter(|plan| plan.is_in_transit())
    }

    pub fn plan(&self, id: &str) -> Option<&TransitPlan> {
        self.plans.iter().find(|plan| plan.id == id)
    }

    /// Facility referenced by the plan's origin.
    pub fn origin_of(&self, plan: &TransitPlan) -> Option<&Facility> {
        self.facilities
            .iter()
            .find(|facility| facility.matches_reference(&plan.origin))
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
/// Replayable feed: a destination table plus ordered snapshots.
pub struct FleetDataset {
    #[serde(default)]
    pub destinations: DestinationTable,
    pub snapshots: Vec<FleetSnapshot>,
}
