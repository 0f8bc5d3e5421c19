//! Drawing primitives the core needs from a map renderer.
//!
//! The renderer is injected as a [`DrawingSurface`] so the synchronizer and the
//! selection machine never touch a concrete map library. Handles are opaque
//! ids minted by the surface; whoever created a handle owns it.

use serde::Serialize;
use thiserror::Error;

use crate::geo::GeoPoint;

/// Shown to the user when the map view cannot start.
pub const SURFACE_UNAVAILABLE_MESSAGE: &str =
    "Could not load map services. Please check your network connection and refresh the page.";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MarkerHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct PolylineHandle(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IconKind {
    Facility,
    Vehicle,
    RouteOrigin,
    RouteDestination,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Everything needed to place a marker.
pub struct MarkerSpec {
    pub at: GeoPoint,
    pub icon: IconKind,
    pub label: Option<String>,
    /// Key reported back as a click event; `None` for passive markers.
    pub click_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PolylineStyle {
    pub color: &'static str,
    pub weight: f32,
    pub opacity: f32,
    /// Leaflet-style dash pattern; `None` draws a solid line.
    pub dash: Option<&'static str>,
}

impl PolylineStyle {
    /// Highlight for the selected vehicle's road route.
    pub const HIGHLIGHT: Self = Self {
        color: "#FF6600",
        weight: 3.0,
        opacity: 0.8,
        dash: None,
    };
    pub const HIGHLIGHT_FALLBACK: Self = Self {
        dash: Some("10, 10"),
        ..Self::HIGHLIGHT
    };
    /// Route preview drawn between a plan's origin and destination.
    pub const PREVIEW: Self = Self {
        color: "#0077B6",
        weight: 4.0,
        opacity: 0.8,
        dash: None,
    };
    pub const PREVIEW_FALLBACK: Self = Self {
        opacity: 0.7,
        dash: Some("10, 10"),
        ..Self::PREVIEW
    };
}

#[derive(Clone, Debug, PartialEq, Serialize)]
/// Popup body for the selected vehicle.
pub struct PopupContent {
    pub plan_id: String,
    pub origin: String,
    pub destination: String,
    /// Progress in percent, unrounded; drives the progress bar width.
    pub progress_percent: f64,
    /// Rounded text such as `"40% Complete"`.
    pub caption: String,
}

impl PopupContent {
    pub fn new(plan_id: &str, origin: &str, destination: &str, progress: f64) -> Self {
        let progress_percent = progress * 100.0;
        // f64::round: halves go away from zero, so 0.125 reads "13% Complete".
        let caption = format!("{}% Complete", progress_percent.round() as i64);
        Self {
            plan_id: plan_id.to_string(),
            origin: origin.to_string(),
            destination: destination.to_string(),
            progress_percent,
            caption,
        }
    }
}

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("tile source {template:?} is missing {{z}}, {{x}} or {{y}} placeholders")]
    InvalidTileTemplate { template: String },
    #[error("map surface backend unavailable: {0}")]
    Unavailable(String),
}

/// Rendering capability consumed by the core.
pub trait DrawingSurface {
    fn add_marker(&mut self, marker: MarkerSpec) -> MarkerHandle;

    fn update_marker_position(&mut self, handle: MarkerHandle, at: GeoPoint);

    fn update_marker_label(&mut self, handle: MarkerHandle, label: &str);

    fn remove_marker(&mut self, handle: MarkerHandle);

    /// Draw `points`, replacing the polyline behind `replace` when given.
    fn add_or_replace_polyline(
        &mut self,
        replace: Option<PolylineHandle>,
        points: &[GeoPoint],
        style: &PolylineStyle,
    ) -> PolylineHandle;

    fn remove_polyline(&mut self, handle: PolylineHandle);

    fn open_popup(&mut self, at: GeoPoint, content: &PopupContent);

    fn close_popup(&mut self);

    /// Frame the viewport around `points`. Surfaces without a viewport ignore it.
    fn fit_bounds(&mut self, _points: &[GeoPoint]) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn popup_caption_rounds_to_nearest_percent() {
        assert_eq!(PopupContent::new("P1", "F1", "D1", 0.4).caption, "40% Complete");
        assert_eq!(PopupContent::new("P1", "F1", "D1", 0.994).caption, "99% Complete");
        assert_eq!(PopupContent::new("P1", "F1", "D1", 0.125).caption, "13% Complete");
        assert_eq!(PopupContent::new("P1", "F1", "D1", 0.996).caption, "100% Complete");
        assert_eq!(PopupContent::new("P1", "F1", "D1", 0.0).caption, "0% Complete");
    }

    #[test]
    fn fallback_styles_are_dashed() {
        assert!(PolylineStyle::HIGHLIGHT.dash.is_none());
        assert_eq!(PolylineStyle::HIGHLIGHT_FALLBACK.dash, Some("10, 10"));
        assert_eq!(PolylineStyle::HIGHLIGHT_FALLBACK.color, "#FF6600");
        assert_eq!(PolylineStyle::PREVIEW_FALLBACK.opacity, 0.7);
    }
}
