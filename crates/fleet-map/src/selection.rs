//! Single-selection state machine for vehicle markers.
//!
//! Every transition bumps a generation counter. Route requests carry the
//! generation they were issued under, and a completion whose ticket is not
//! current is dropped without touching the surface.

use tracing::{debug, info, warn};

use crate::{
    geo::GeoPoint,
    model::{DestinationTable, FleetSnapshot},
    route::ResolvedRoute,
    surface::{DrawingSurface, PolylineHandle, PolylineStyle, PopupContent},
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SelectionState {
    #[default]
    Unselected,
    Selected(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
/// Identifies the selection a route request belongs to.
pub struct RouteTicket {
    generation: u64,
    plan_id: String,
}

impl RouteTicket {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn plan_id(&self) -> &str {
        &self.plan_id
    }
}

#[derive(Clone, Debug, PartialEq)]
/// Route the caller should resolve and hand back through
/// [`SelectionMachine::complete_route`].
pub struct RouteRequest {
    pub ticket: RouteTicket,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteOutcome {
    Drawn,
    Stale,
}

#[derive(Debug, Default)]
pub struct SelectionMachine {
    state: SelectionState,
    generation: u64,
    highlight: Option<PolylineHandle>,
    popup: Option<(GeoPoint, PopupContent)>,
    route_pending: bool,
}

impl SelectionMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &SelectionState {
        &self.state
    }

    pub fn selected(&self) -> Option<&str> {
        match &self.state {
            SelectionState::Selected(key) => Some(key),
            SelectionState::Unselected => None,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn highlight(&self) -> Option<PolylineHandle> {
        self.highlight
    }

    /// A vehicle marker was clicked. Clicking the current selection again is a no-op.
    pub fn click_marker<S: DrawingSurface>(
        &mut self,
        key: &str,
        snapshot: &FleetSnapshot,
        destinations: &DestinationTable,
        surface: &mut S,
    ) -> Option<RouteRequest> {
        if self.selected() == Some(key) {
            debug!(plan = key, "marker already selected");
            return None;
        }
        self.clear_overlays(surface);
        self.generation += 1;
        self.state = SelectionState::Selected(key.to_string());
        self.route_pending = true;
        debug!(plan = key, generation = self.generation, "selected vehicle");
        self.sync_selected(snapshot, destinations, surface)
    }

    /// The map background was clicked.
    pub fn click_background<S: DrawingSurface>(&mut self, surface: &mut S) {
        if self.selected().is_some() {
            self.deselect(surface);
        }
    }

    /// Re-check the selection against a freshly reconciled snapshot.
    ///
    /// Drops the selection when the plan left the in-transit set, refreshes the
    /// popup when its content or position changed, and issues the route request
    /// deferred while the vehicle had no coordinate.
    pub fn refresh<S: DrawingSurface>(
        &mut self,
        snapshot: &FleetSnapshot,
        destinations: &DestinationTable,
        surface: &mut S,
    ) -> Option<RouteRequest> {
        let key = self.selected()?;
        if snapshot.in_transit(key).is_none() {
            info!(plan = key, "selected vehicle left the map; clearing selection");
            self.deselect(surface);
            return None;
        }
        self.sync_selected(snapshot, destinations, surface)
    }

    /// Draw a settled route if it still belongs to the current selection.
    pub fn complete_route<S: DrawingSurface>(
        &mut self,
        ticket: &RouteTicket,
        route: &ResolvedRoute,
        surface: &mut S,
    ) -> RouteOutcome {
        if ticket.generation != self.generation || self.selected() != Some(ticket.plan_id.as_str()) {
            debug!(
                plan = %ticket.plan_id,
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale route"
            );
            metrics::counter!("fleet_route_stale_total").increment(1);
            return RouteOutcome::Stale;
        }
        let style = if route.is_fallback() {
            &PolylineStyle::HIGHLIGHT_FALLBACK
        } else {
            &PolylineStyle::HIGHLIGHT
        };
        self.highlight = Some(surface.add_or_replace_polyline(self.highlight, &route.points, style));
        RouteOutcome::Drawn
    }

    fn deselect<S: DrawingSurface>(&mut self, surface: &mut S) {
        self.clear_overlays(surface);
        self.generation += 1;
        self.state = SelectionState::Unselected;
        self.route_pending = false;
    }

    fn clear_overlays<S: DrawingSurface>(&mut self, surface: &mut S) {
        if let Some(handle) = self.highlight.take() {
            surface.remove_polyline(handle);
        }
        if self.popup.take().is_some() {
            surface.close_popup();
        }
    }

    fn sync_selected<S: DrawingSurface>(
        &mut self,
        snapshot: &FleetSnapshot,
        destinations: &DestinationTable,
        surface: &mut S,
    ) -> Option<RouteRequest> {
        let key = self.selected()?.to_string();
        let plan = snapshot.in_transit(&key)?;
        let Some(at) = plan.visible_position() else {
            // Selected but not drawable yet: nothing rendered until a fix arrives.
            if self.popup.take().is_some() {
                surface.close_popup();
            }
            return None;
        };

        let origin = snapshot.origin_of(plan);
        let origin_name = origin.map_or(plan.origin.as_str(), |facility| facility.name.as_str());
        let content = PopupContent::new(
            &plan.id,
            origin_name,
            &plan.destination,
            plan.clamped_progress(),
        );
        if self.popup.as_ref() != Some(&(at, content.clone())) {
            surface.open_popup(at, &content);
            self.popup = Some((at, content));
        }

        if !self.route_pending {
            return None;
        }
        self.route_pending = false;

        let origin = origin.map(|facility| facility.location).filter(GeoPoint::is_valid);
        let destination = destinations
            .get(&plan.destination)
            .filter(GeoPoint::is_valid);
        match (origin, destination) {
            (Some(origin), Some(destination)) => Some(RouteRequest {
                ticket: RouteTicket {
                    generation: self.generation,
                    plan_id: key,
                },
                origin,
                destination,
            }),
            _ => {
                warn!(
                    plan = %key,
                    origin = %plan.origin,
                    destination = %plan.destination,
                    "origin facility or destination unknown; not resolving a route"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::{Facility, PlanStatus, TransitPlan},
        route::RouteProvenance,
        scene::{SceneSurface, SurfaceOp},
    };

    fn snapshot(position: Option<(f64, f64)>, progress: f64, status: PlanStatus) -> FleetSnapshot {
        FleetSnapshot {
            facilities: vec![Facility {
                id: "F1".into(),
                name: "Bokaro".into(),
                location: GeoPoint::new(23.0, 85.0),
                available_units: 2,
            }],
            plans: vec![
                TransitPlan {
                    id: "P1".into(),
                    origin: "Bokaro".into(),
                    destination: "D1".into(),
                    position: position.map(GeoPoint::from),
                    progress,
                    status,
                },
                TransitPlan {
                    id: "P2".into(),
                    origin: "F1".into(),
                    destination: "NOWHERE".into(),
                    position: Some(GeoPoint::new(21.0, 84.0)),
                    progress: 0.9,
                    status: PlanStatus::InTransit,
                },
            ],
        }
    }

    fn destinations() -> DestinationTable {
        [("D1", GeoPoint::new(22.5, 88.3))].into_iter().collect()
    }

    fn road(points: &[(f64, f64)]) -> ResolvedRoute {
        ResolvedRoute {
            points: points.iter().copied().map(GeoPoint::from).collect(),
            provenance: RouteProvenance::ServiceResolved,
        }
    }

    #[test]
    fn clicking_the_same_marker_twice_requests_one_route() {
        let mut surface = SceneSurface::default();
        let mut machine = SelectionMachine::new();
        let snap = snapshot(Some((22.8, 86.5)), 0.4, PlanStatus::InTransit);

        let request = machine
            .click_marker("P1", &snap, &destinations(), &mut surface)
            .expect("route request");
        assert_eq!(request.origin, GeoPoint::new(23.0, 85.0));
        assert_eq!(request.destination, GeoPoint::new(22.5, 88.3));
        assert_eq!(surface.popup().unwrap().content.caption, "40% Complete");
        surface.take_ops();

        assert!(machine.click_marker("P1", &snap, &destinations(), &mut surface).is_none());
        assert!(surface.ops().is_empty());
        assert_eq!(machine.state(), &SelectionState::Selected("P1".into()));
    }

    #[test]
    fn background_click_clears_route_and_popup() {
        let mut surface = SceneSurface::default();
        let mut machine = SelectionMachine::new();
        let snap = snapshot(Some((22.8, 86.5)), 0.4, PlanStatus::InTransit);
        let request = machine
            .click_marker("P1", &snap, &destinations(), &mut surface)
            .unwrap();
        let route = road(&[(23.0, 85.0), (22.9, 86.0), (22.5, 88.3)]);
        assert_eq!(
            machine.complete_route(&request.ticket, &route, &mut surface),
            RouteOutcome::Drawn
        );
        assert_eq!(surface.polylines().count(), 1);

        machine.click_background(&mut surface);
        assert_eq!(machine.state(), &SelectionState::Unselected);
        assert_eq!(surface.polylines().count(), 0);
        assert!(surface.popup().is_none());

        surface.take_ops();
        machine.click_background(&mut surface);
        assert!(surface.ops().is_empty());
    }

    #[test]
    fn completion_for_a_superseded_selection_is_discarded() {
        let mut surface = SceneSurface::default();
        let mut machine = SelectionMachine::new();
        let snap = snapshot(Some((22.8, 86.5)), 0.4, PlanStatus::InTransit);
        let mut dests = destinations();
        dests.insert("NOWHERE", GeoPoint::new(20.0, 80.0));

        let first = machine.click_marker("P1", &snap, &dests, &mut surface).unwrap();
        let second = machine.click_marker("P2", &snap, &dests, &mut surface).unwrap();
        assert_ne!(first.ticket, second.ticket);

        let route = road(&[(23.0, 85.0), (22.5, 88.3)]);
        assert_eq!(
            machine.complete_route(&first.ticket, &route, &mut surface),
            RouteOutcome::Stale
        );
        assert_eq!(surface.polylines().count(), 0);

        // Reselecting P1 starts a new generation; the old ticket stays stale.
        machine.click_marker("P1", &snap, &dests, &mut surface).unwrap();
        assert_eq!(
            machine.complete_route(&first.ticket, &route, &mut surface),
            RouteOutcome::Stale
        );
    }

    #[test]
    fn fallback_route_is_drawn_dashed_and_replaces_previous_highlight() {
        let mut surface = SceneSurface::default();
        let mut machine = SelectionMachine::new();
        let snap = snapshot(Some((22.8, 86.5)), 0.4, PlanStatus::InTransit);
        let request = machine
            .click_marker("P1", &snap, &destinations(), &mut surface)
            .unwrap();

        machine.complete_route(&request.ticket, &road(&[(23.0, 85.0), (22.5, 88.3)]), &mut surface);
        let fallback = ResolvedRoute::straight_line(request.origin, request.destination);
        machine.complete_route(&request.ticket, &fallback, &mut surface);

        let lines: Vec<_> = surface.polylines().collect();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].style, PolylineStyle::HIGHLIGHT_FALLBACK);
        assert_eq!(Some(lines[0].handle), machine.highlight());
    }

    #[test]
    fn vanished_plan_reverts_to_unselected() {
        let mut surface = SceneSurface::default();
        let mut machine = SelectionMachine::new();
        let snap = snapshot(Some((22.8, 86.5)), 0.4, PlanStatus::InTransit);
        let request = machine
            .click_marker("P1", &snap, &destinations(), &mut surface)
            .unwrap();

        let delivered = snapshot(Some((22.5, 88.3)), 1.0, PlanStatus::Delivered);
        assert!(machine.refresh(&delivered, &destinations(), &mut surface).is_none());
        assert_eq!(machine.state(), &SelectionState::Unselected);
        assert!(surface.popup().is_none());

        let route = road(&[(23.0, 85.0), (22.5, 88.3)]);
        assert_eq!(
            machine.complete_route(&request.ticket, &route, &mut surface),
            RouteOutcome::Stale
        );
        assert_eq!(surface.polylines().count(), 0);
    }

    #[test]
    fn missing_coordinate_keeps_selection_and_defers_route() {
        let mut surface = SceneSurface::default();
        let mut machine = SelectionMachine::new();
        let no_fix = snapshot(None, 0.0, PlanStatus::InTransit);

        assert!(machine.click_marker("P1", &no_fix, &destinations(), &mut surface).is_none());
        assert_eq!(machine.state(), &SelectionState::Selected("P1".into()));
        assert!(surface.ops().is_empty());

        assert!(machine.refresh(&no_fix, &destinations(), &mut surface).is_none());
        assert_eq!(machine.selected(), Some("P1"));

        let with_fix = snapshot(Some((22.8, 86.5)), 0.1, PlanStatus::InTransit);
        let request = machine.refresh(&with_fix, &destinations(), &mut surface);
        assert!(request.is_some());
        assert_eq!(surface.popup().unwrap().content.caption, "10% Complete");

        assert!(machine.refresh(&with_fix, &destinations(), &mut surface).is_none());
    }

    #[test]
    fn popup_follows_progress_while_selected() {
        let mut surface = SceneSurface::default();
        let mut machine = SelectionMachine::new();
        let snap = snapshot(Some((22.8, 86.5)), 0.4, PlanStatus::InTransit);
        machine.click_marker("P1", &snap, &destinations(), &mut surface);
        surface.take_ops();

        assert!(machine.refresh(&snap, &destinations(), &mut surface).is_none());
        assert!(surface.ops().is_empty());

        let later = snapshot(Some((22.7, 87.0)), 0.55, PlanStatus::InTransit);
        assert!(machine.refresh(&later, &destinations(), &mut surface).is_none());
        assert_eq!(surface.take_ops(), vec![SurfaceOp::OpenPopup]);
        let popup = surface.popup().unwrap();
        assert_eq!(popup.at, GeoPoint::new(22.7, 87.0));
        assert_eq!(popup.content.caption, "55% Complete");
        assert_eq!(popup.content.origin, "Bokaro");
    }

    #[test]
    fn unknown_destination_shows_popup_without_route() {
        let mut surface = SceneSurface::default();
        let mut machine = SelectionMachine::new();
        let snap = snapshot(Some((22.8, 86.5)), 0.4, PlanStatus::InTransit);

        assert!(machine.click_marker("P2", &snap, &destinations(), &mut surface).is_none());
        assert_eq!(surface.popup().unwrap().content.caption, "90% Complete");
        assert_eq!(surface.polylines().count(), 0);
    }
}
