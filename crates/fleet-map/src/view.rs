//! Composition root for one live fleet map.

use tracing::{error, warn};

use crate::{
    model::{DestinationTable, FleetSnapshot},
    route::ResolvedRoute,
    selection::{RouteOutcome, RouteRequest, RouteTicket, SelectionMachine, SelectionState},
    surface::{DrawingSurface, SURFACE_UNAVAILABLE_MESSAGE, SurfaceError},
    sync::{EntitySynchronizer, ReconcileReport},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MapStatus {
    Ready,
    /// The surface failed to start; the reason is for logs, not for users.
    Unavailable { reason: String },
}

impl MapStatus {
    /// Text shown in place of the map, if any.
    pub fn user_message(&self) -> Option<&'static str> {
        match self {
            MapStatus::Ready => None,
            MapStatus::Unavailable { .. } => Some(SURFACE_UNAVAILABLE_MESSAGE),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// User input reported by the surface.
pub enum MapEvent {
    MarkerClicked(String),
    BackgroundClicked,
}

/// Owns the surface and drives the synchronizer and the selection machine.
///
/// A view whose surface failed to initialise stays degraded for its whole
/// lifetime and never issues surface operations.
pub struct FleetMapView<S> {
    surface: Option<S>,
    status: MapStatus,
    sync: EntitySynchronizer,
    selection: SelectionMachine,
    destinations: DestinationTable,
    snapshot: FleetSnapshot,
}

impl<S: DrawingSurface> FleetMapView<S> {
    pub fn new(surface: Result<S, SurfaceError>, destinations: DestinationTable) -> Self {
        let (surface, status) = match surface {
            Ok(surface) => (Some(surface), MapStatus::Ready),
            Err(err) => {
                error!("Map initialization failed: {err}");
                (
                    None,
                    MapStatus::Unavailable {
                        reason: err.to_string(),
                    },
                )
            }
        };
        Self {
            surface,
            status,
            sync: EntitySynchronizer::new(),
            selection: SelectionMachine::new(),
            destinations,
            snapshot: FleetSnapshot::default(),
        }
    }

    pub fn status(&self) -> &MapStatus {
        &self.status
    }

    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> Option<&mut S> {
        self.surface.as_mut()
    }

    pub fn selection(&self) -> &SelectionState {
        self.selection.state()
    }

    pub fn snapshot(&self) -> &FleetSnapshot {
        &self.snapshot
    }

    pub fn destinations(&self) -> &DestinationTable {
        &self.destinations
    }

    /// Reconcile a complete snapshot, then re-check the selection against it.
    pub fn apply_snapshot(
        &mut self,
        snapshot: FleetSnapshot,
    ) -> (ReconcileReport, Option<RouteRequest>) {
        self.snapshot = snapshot;
        let Some(surface) = self.surface.as_mut() else {
            return (ReconcileReport::default(), None);
        };
        let report = self
            .sync
            .reconcile(surface, &self.snapshot.facilities, &self.snapshot.plans);
        let request = self
            .selection
            .refresh(&self.snapshot, &self.destinations, surface);
        (report, request)
    }

    pub fn handle_event(&mut self, event: MapEvent) -> Option<RouteRequest> {
        let surface = self.surface.as_mut()?;
        match event {
            MapEvent::MarkerClicked(key) => {
                if self.sync.vehicle_marker(&key).is_none() {
                    warn!(plan = %key, "click on a vehicle without a marker; ignoring");
                    return None;
                }
                self.selection
                    .click_marker(&key, &self.snapshot, &self.destinations, surface)
            }
            MapEvent::BackgroundClicked => {
                self.selection.click_background(surface);
                None
            }
        }
    }

    pub fn route_settled(&mut self, ticket: &RouteTicket, route: &ResolvedRoute) -> RouteOutcome {
        match self.surface.as_mut() {
            Some(surface) => self.selection.complete_route(ticket, route, surface),
            None => RouteOutcome::Stale,
        }
    }
}
