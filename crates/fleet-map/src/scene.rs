//! Retained in-memory [`DrawingSurface`].
//!
//! `SceneSurface` keeps the markers, polylines and popup that a renderer would
//! show, plus a log of every effective mutation. The app publishes
//! [`SceneSnapshot`]s to the browser; tests read the mutation log.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::{
    geo::{GeoBounds, GeoPoint},
    surface::{
        DrawingSurface, IconKind, MarkerHandle, MarkerSpec, PolylineHandle, PolylineStyle,
        PopupContent, SurfaceError,
    },
};

pub const DEFAULT_TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";

#[derive(Clone, Debug, PartialEq)]
/// One effective surface mutation.
pub enum SurfaceOp {
    AddMarker {
        handle: MarkerHandle,
        icon: IconKind,
    },
    MoveMarker {
        handle: MarkerHandle,
    },
    RelabelMarker {
        handle: MarkerHandle,
    },
    RemoveMarker {
        handle: MarkerHandle,
    },
    DrawPolyline {
        handle: PolylineHandle,
        replaced: Option<PolylineHandle>,
    },
    RemovePolyline {
        handle: PolylineHandle,
    },
    OpenPopup,
    ClosePopup,
    FitBounds,
}

impl SurfaceOp {
    pub fn label(&self) -> &'static str {
        match self {
            SurfaceOp::AddMarker { .. } => "add_marker",
            SurfaceOp::MoveMarker { .. } => "move_marker",
            SurfaceOp::RelabelMarker { .. } => "relabel_marker",
            SurfaceOp::RemoveMarker { .. } => "remove_marker",
            SurfaceOp::DrawPolyline { .. } => "draw_polyline",
            SurfaceOp::RemovePolyline { .. } => "remove_polyline",
            SurfaceOp::OpenPopup => "open_popup",
            SurfaceOp::ClosePopup => "close_popup",
            SurfaceOp::FitBounds => "fit_bounds",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SceneMarker {
    pub handle: MarkerHandle,
    pub at: GeoPoint,
    pub icon: IconKind,
    pub label: Option<String>,
    pub click_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScenePolyline {
    pub handle: PolylineHandle,
    pub points: Vec<GeoPoint>,
    pub style: PolylineStyle,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ScenePopup {
    pub at: GeoPoint,
    pub content: PopupContent,
}

#[derive(Clone, Debug, Default, Serialize)]
/// Immutable copy of the scene handed to readers outside the map view.
pub struct SceneSnapshot {
    pub revision: u64,
    pub tile_url: String,
    pub markers: Vec<SceneMarker>,
    pub polylines: Vec<ScenePolyline>,
    pub popup: Option<ScenePopup>,
    pub viewport: Option<GeoBounds>,
}

#[derive(Debug)]
pub struct SceneSurface {
    tile_url: String,
    next_handle: u64,
    revision: u64,
    markers: BTreeMap<MarkerHandle, SceneMarker>,
    polylines: BTreeMap<PolylineHandle, ScenePolyline>,
    popup: Option<ScenePopup>,
    viewport: Option<GeoBounds>,
    ops: Vec<SurfaceOp>,
}

impl Default for SceneSurface {
    fn default() -> Self {
        Self::with_tile_url(DEFAULT_TILE_URL.to_string())
    }
}

impl SceneSurface {
    /// Open a surface backed by the given slippy-map tile template.
    pub fn open(tile_url: &str) -> Result<Self, SurfaceError> {
        let has_placeholders = ["{z}", "{x}", "{y}"]
            .iter()
            .all(|placeholder| tile_url.contains(placeholder));
        if !has_placeholders {
            return Err(SurfaceError::InvalidTileTemplate {
                template: tile_url.to_string(),
            });
        }
        Ok(Self::with_tile_url(tile_url.to_string()))
    }

    fn with_tile_url(tile_url: String) -> Self {
        Self {
            tile_url,
            next_handle: 0,
            revision: 0,
            markers: BTreeMap::new(),
            polylines: BTreeMap::new(),
            popup: None,
            viewport: None,
            ops: Vec::new(),
        }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Mutations recorded since the last [`take_ops`](Self::take_ops).
    pub fn ops(&self) -> &[SurfaceOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<SurfaceOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn markers(&self) -> impl Iterator<Item = &SceneMarker> {
        self.markers.values()
    }

    pub fn markers_with_icon(&self, icon: IconKind) -> impl Iterator<Item = &SceneMarker> {
        self.markers.values().filter(move |marker| marker.icon == icon)
    }

    /// Clickable marker reporting `key`.
    pub fn marker_for_key(&self, key: &str) -> Option<&SceneMarker> {
        self.markers
            .values()
            .find(|marker| marker.click_key.as_deref() == Some(key))
    }

    pub fn polylines(&self) -> impl Iterator<Item = &ScenePolyline> {
        self.polylines.values()
    }

    pub fn popup(&self) -> Option<&ScenePopup> {
        self.popup.as_ref()
    }

    pub fn viewport(&self) -> Option<GeoBounds> {
        self.viewport
    }

    pub fn snapshot(&self) -> SceneSnapshot {
        SceneSnapshot {
            revision: self.revision,
            tile_url: self.tile_url.clone(),
            markers: self.markers.values().cloned().collect(),
            polylines: self.polylines.values().cloned().collect(),
            popup: self.popup.clone(),
            viewport: self.viewport,
        }
    }

    fn mint(&mut self) -> u64 {
        self.next_handle += 1;
        self.next_handle
    }

    fn record(&mut self, op: SurfaceOp) {
        metrics::counter!("fleet_surface_mutations_total", "op" => op.label()).increment(1);
        self.revision += 1;
        self.ops.push(op);
    }
}

impl DrawingSurface for SceneSurface {
    fn add_marker(&mut self, marker: MarkerSpec) -> MarkerHandle {
        let handle = MarkerHandle(self.mint());
        let icon = marker.icon;
        self.markers.insert(
            handle,
            SceneMarker {
                handle,
                at: marker.at,
                icon,
                label: marker.label,
                click_key: marker.click_key,
            },
        );
        self.record(SurfaceOp::AddMarker { handle, icon });
        handle
    }

    fn update_marker_position(&mut self, handle: MarkerHandle, at: GeoPoint) {
        match self.markers.get_mut(&handle) {
            Some(marker) => {
                marker.at = at;
                self.record(SurfaceOp::MoveMarker { handle });
            }
            None => debug!(?handle, "ignoring move of unknown marker"),
        }
    }

    fn update_marker_label(&mut self, handle: MarkerHandle, label: &str) {
        match self.markers.get_mut(&handle) {
            Some(marker) => {
                marker.label = Some(label.to_string());
                self.record(SurfaceOp::RelabelMarker { handle });
            }
            None => debug!(?handle, "ignoring relabel of unknown marker"),
        }
    }

    fn remove_marker(&mut self, handle: MarkerHandle) {
        if self.markers.remove(&handle).is_some() {
            self.record(SurfaceOp::RemoveMarker { handle });
        } else {
            debug!(?handle, "ignoring removal of unknown marker");
        }
    }

    fn add_or_replace_polyline(
        &mut self,
        replace: Option<PolylineHandle>,
        points: &[GeoPoint],
        style: &PolylineStyle,
    ) -> PolylineHandle {
        let replaced = replace.filter(|old| self.polylines.remove(old).is_some());
        let handle = PolylineHandle(self.mint());
        self.polylines.insert(
            handle,
            ScenePolyline {
                handle,
                points: points.to_vec(),
                style: style.clone(),
            },
        );
        self.record(SurfaceOp::DrawPolyline { handle, replaced });
        handle
    }

    fn remove_polyline(&mut self, handle: PolylineHandle) {
        if self.polylines.remove(&handle).is_some() {
            self.record(SurfaceOp::RemovePolyline { handle });
        } else {
            debug!(?handle, "ignoring removal of unknown polyline");
        }
    }

    fn open_popup(&mut self, at: GeoPoint, content: &PopupContent) {
        self.popup = Some(ScenePopup {
            at,
            content: content.clone(),
        });
        self.record(SurfaceOp::OpenPopup);
    }

    fn close_popup(&mut self) {
        if self.popup.take().is_some() {
            self.record(SurfaceOp::ClosePopup);
        }
    }

    fn fit_bounds(&mut self, points: &[GeoPoint]) {
        if let Some(bounds) = GeoBounds::enclosing(points) {
            self.viewport = Some(bounds);
            self.record(SurfaceOp::FitBounds);
        }
    }
}
