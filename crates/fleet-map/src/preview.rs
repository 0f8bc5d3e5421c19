//! Origin-to-destination route preview for a single plan.

use serde::Serialize;
use thiserror::Error;

use crate::{
    geo::{GeoPoint, distance_km, estimate_travel_hours},
    model::{DestinationTable, Facility, TransitPlan},
    route::{ResolvedRoute, RouteResolver, RoutingBackend},
    surface::{DrawingSurface, IconKind, MarkerSpec, PolylineStyle},
};

#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("destination {0:?} is not in the destination table")]
    UnknownDestination(String),
    #[error("facility {0:?} has an invalid coordinate")]
    InvalidOrigin(String),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Straight-line distance and ETA between a plan's origin and destination.
pub struct RouteSummary {
    pub plan_id: String,
    pub origin_name: String,
    pub destination_name: String,
    pub origin: GeoPoint,
    pub destination: GeoPoint,
    pub distance_km: f64,
    pub estimated_hours: f64,
}

impl RouteSummary {
    pub fn for_plan(
        plan: &TransitPlan,
        origin: &Facility,
        destinations: &DestinationTable,
    ) -> Result<Self, PreviewError> {
        if !origin.location.is_valid() {
            return Err(PreviewError::InvalidOrigin(origin.id.clone()));
        }
        let destination = destinations
            .get(&plan.destination)
            .filter(GeoPoint::is_valid)
            .ok_or_else(|| PreviewError::UnknownDestination(plan.destination.clone()))?;
        let distance_km = distance_km(origin.location, destination);
        Ok(Self {
            plan_id: plan.id.clone(),
            origin_name: origin.name.clone(),
            destination_name: plan.destination.clone(),
            origin: origin.location,
            destination,
            distance_km,
            estimated_hours: estimate_travel_hours(distance_km),
        })
    }
}

/// Renders a summary onto its own surface.
pub struct RoutePreview<S> {
    surface: S,
    summary: RouteSummary,
}

impl<S: DrawingSurface> RoutePreview<S> {
    /// Place origin and destination markers, resolve the road route and draw it.
    pub async fn open<B: RoutingBackend>(
        mut surface: S,
        summary: RouteSummary,
        resolver: &RouteResolver<B>,
    ) -> (Self, ResolvedRoute) {
        surface.add_marker(MarkerSpec {
            at: summary.origin,
            icon: IconKind::RouteOrigin,
            label: Some(format!("{}\nOrigin", summary.origin_name)),
            click_key: None,
        });
        surface.add_marker(MarkerSpec {
            at: summary.destination,
            icon: IconKind::RouteDestination,
            label: Some(format!("{}\nDestination", summary.destination_name)),
            click_key: None,
        });

        let route = resolver.resolve(summary.origin, summary.destination).await;
        let style = if route.is_fallback() {
            &PolylineStyle::PREVIEW_FALLBACK
        } else {
            &PolylineStyle::PREVIEW
        };
        surface.add_or_replace_polyline(None, &route.points, style);
        surface.fit_bounds(&route.points);

        (Self { surface, summary }, route)
    }

    pub fn summary(&self) -> &RouteSummary {
        &self.summary
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }
}
