//! Live fleet map core: keyed marker reconciliation, road-route resolution
//! with straight-line fallback, and single-vehicle selection.
//!
//! - `geo`: haversine distance, ETA and coordinate validity.
//! - `model`: facilities, transit plans and feed snapshots.
//! - `surface`: the drawing primitives consumed from a map renderer.
//! - `scene`: retained in-memory surface used by the app and by tests.
//! - `route`: routing backends and the fallback-guarded resolver.
//! - `sync`: entity synchronizer.
//! - `selection`: selection state machine and route tickets.
//! - `view`: composition root applying snapshots and user events.
//! - `preview`: origin/destination route preview for one plan.

pub mod geo;
pub mod model;
pub mod preview;
pub mod route;
pub mod scene;
pub mod selection;
pub mod surface;
pub mod sync;
pub mod view;

pub use geo::{GeoPoint, distance_km, estimate_travel_hours};
pub use model::{DestinationTable, Facility, FleetDataset, FleetSnapshot, PlanStatus, TransitPlan};
pub use route::{OsrmBackend, ResolvedRoute, RouteProvenance, RouteResolver, RoutingBackend, RoutingConfig};
pub use scene::{SceneSnapshot, SceneSurface};
pub use selection::{RouteOutcome, RouteRequest, RouteTicket, SelectionState};
pub use surface::{DrawingSurface, SurfaceError};
pub use view::{FleetMapView, MapEvent, MapStatus};
