//! Actix Web server exposing the live map page, scene JSON/SSE, selection
//! input, route previews, and Prometheus metrics.
//!
//! The server runs on a dedicated thread with its own Actix system. It never
//! touches the map view: scenes arrive through a watch channel and clicks are
//! forwarded to the controller as [`MapEvent`]s.

use std::{net::SocketAddr, sync::Arc};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use anyhow::{Context, Result};
use async_stream::stream;
use fleet_map::{
    DestinationTable, MapEvent, OsrmBackend, RouteResolver, SceneSnapshot, SceneSurface,
    preview::{RoutePreview, RouteSummary},
    surface::SURFACE_UNAVAILABLE_MESSAGE,
};
use serde::Serialize;
use serde_json::to_string;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{error, warn};

use crate::{
    controller::{LiveState, ScenePayload},
    html, telemetry,
};

/// Shared state backing HTTP handlers.
#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) live: watch::Receiver<LiveState>,
    pub(crate) events: mpsc::Sender<MapEvent>,
    pub(crate) destinations: Arc<DestinationTable>,
    pub(crate) resolver: Arc<RouteResolver<OsrmBackend>>,
    pub(crate) tile_url: String,
}

#[derive(Default)]
/// Handle for the map server thread.
pub(crate) struct MapServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl MapServer {
    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(self) {
        if let Some(tx) = self.shutdown {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle {
            let _ = handle.join();
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Serialize)]
struct RoutePreviewResponse<'a> {
    summary: &'a RouteSummary,
    provenance: &'static str,
    scene: SceneSnapshot,
}

/// Spawn the map server thread and return a handle that can stop it.
pub(crate) fn spawn_map_server(bind: SocketAddr, state: ServerState) -> Result<MapServer> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let handle = telemetry::spawn_thread("fleetmap-server", move || {
        if let Err(err) = actix_web::rt::System::new().block_on(async move {
            let server = HttpServer::new(move || {
                App::new()
                    .app_data(web::Data::new(state.clone()))
                    .configure(routes)
            })
            .bind(bind)?
            .run();

            let srv_handle = server.handle();
            actix_web::rt::spawn(async move {
                let _ = shutdown_rx.await;
                srv_handle.stop(true).await;
            });

            server.await
        }) {
            error!("HTTP server error: {err}");
        }
    })
    .context("Failed to spawn map server thread")?;
    Ok(MapServer {
        shutdown: Some(shutdown_tx),
        handle: Some(handle),
    })
}

fn routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/scene", web::get().to(scene_handler))
        .route("/stream_scene", web::get().to(stream_scene_handler))
        .route("/select/{plan_id}", web::post().to(select_handler))
        .route("/deselect", web::post().to(deselect_handler))
        .route("/route/{plan_id}", web::get().to(route_preview_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

fn error_response(mut builder: actix_web::HttpResponseBuilder, error: String) -> HttpResponse {
    builder.json(ErrorBody { error })
}

/// Render one scene payload as an SSE message keyed by scene revision.
fn scene_event(payload: &ScenePayload) -> Bytes {
    match to_string(payload) {
        Ok(json) => {
            let mut chunk = String::with_capacity(json.len() + 32);
            chunk.push_str("id: ");
            chunk.push_str(&payload.scene.revision.to_string());
            chunk.push('\n');
            chunk.push_str("data: ");
            chunk.push_str(&json);
            chunk.push_str("\n\n");
            Bytes::from(chunk)
        }
        Err(err) => Bytes::from(format!("event: error\ndata: {err}\n\n")),
    }
}

/// Serve the live map page.
async fn index_route() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(html::map::MAP_INDEX_HTML)
}

/// Return the latest published scene as JSON.
async fn scene_handler(state: web::Data<ServerState>) -> HttpResponse {
    let payload = state.live.borrow().payload.clone();
    HttpResponse::Ok().json(payload)
}

/// Stream scene revisions as Server-Sent Events.
async fn stream_scene_handler(state: web::Data<ServerState>) -> HttpResponse {
    let mut live = state.live.clone();
    let stream = stream! {
        yield Ok::<Bytes, actix_web::Error>(Bytes::from_static(b"retry: 500\n\n"));
        loop {
            let chunk = scene_event(&live.borrow_and_update().payload);
            yield Ok::<Bytes, actix_web::Error>(chunk);
            if live.changed().await.is_err() {
                break;
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_HEADERS, "*"))
        .insert_header((header::ACCESS_CONTROL_ALLOW_METHODS, "GET"))
        .insert_header((header::ACCESS_CONTROL_EXPOSE_HEADERS, "Content-Type"))
        .append_header(("Cache-Control", "no-cache"))
        .append_header(("Content-Type", "text/event-stream"))
        .append_header(("Connection", "keep-alive"))
        .streaming(stream)
}

async fn forward_event(state: &ServerState, event: MapEvent) -> HttpResponse {
    match state.events.send(event).await {
        Ok(()) => HttpResponse::Accepted().finish(),
        Err(_) => error_response(
            HttpResponse::ServiceUnavailable(),
            "map controller is not running".into(),
        ),
    }
}

/// A vehicle marker was clicked in the browser.
async fn select_handler(path: web::Path<String>, state: web::Data<ServerState>) -> HttpResponse {
    forward_event(&state, MapEvent::MarkerClicked(path.into_inner())).await
}

/// The map background was clicked in the browser.
async fn deselect_handler(state: web::Data<ServerState>) -> HttpResponse {
    forward_event(&state, MapEvent::BackgroundClicked).await
}

/// Resolve and render the origin-to-destination preview for one plan.
async fn route_preview_handler(
    path: web::Path<String>,
    state: web::Data<ServerState>,
) -> HttpResponse {
    let plan_id = path.into_inner();
    let fleet = Arc::clone(&state.live.borrow().fleet);

    let Some(plan) = fleet.plan(&plan_id) else {
        return error_response(HttpResponse::NotFound(), format!("unknown plan {plan_id:?}"));
    };
    let Some(origin) = fleet.origin_of(plan) else {
        return error_response(
            HttpResponse::NotFound(),
            format!("origin facility {:?} not found", plan.origin),
        );
    };
    let summary = match RouteSummary::for_plan(plan, origin, &state.destinations) {
        Ok(summary) => summary,
        Err(err) => return error_response(HttpResponse::UnprocessableEntity(), err.to_string()),
    };
    let surface = match SceneSurface::open(&state.tile_url) {
        Ok(surface) => surface,
        Err(err) => {
            warn!("Route preview map initialization failed: {err}");
            return error_response(
                HttpResponse::ServiceUnavailable(),
                SURFACE_UNAVAILABLE_MESSAGE.into(),
            );
        }
    };

    let (preview, route) = RoutePreview::open(surface, summary, &state.resolver).await;
    HttpResponse::Ok().json(RoutePreviewResponse {
        summary: preview.summary(),
        provenance: route.provenance.label(),
        scene: preview.surface().snapshot(),
    })
}

/// Prometheus text exposition.
async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

#[cfg(test)]
mod tests {
    use actix_web::{http::StatusCode, test as actix_test};
    use fleet_map::{
        Facility, FleetMapView, FleetSnapshot, GeoPoint, PlanStatus, RoutingConfig,
        TransitPlan,
    };
    use serde_json::Value;

    use super::*;

    fn fleet() -> FleetSnapshot {
        FleetSnapshot {
            facilities: vec![Facility {
                id: "F1".into(),
                name: "Bokaro".into(),
                location: GeoPoint::new(23.0, 85.0),
                available_units: 3,
            }],
            plans: vec![
                TransitPlan {
                    id: "P1".into(),
                    origin: "F1".into(),
                    destination: "D1".into(),
                    position: Some(GeoPoint::new(22.8, 86.5)),
                    progress: 0.4,
                    status: PlanStatus::InTransit,
                },
                TransitPlan {
                    id: "P2".into(),
                    origin: "F1".into(),
                    destination: "D9".into(),
                    position: None,
                    progress: 0.0,
                    status: PlanStatus::Planned,
                },
            ],
        }
    }

    fn state() -> (ServerState, mpsc::Receiver<MapEvent>) {
        let destinations: DestinationTable =
            [("D1", GeoPoint::new(22.5, 88.3))].into_iter().collect();
        let mut view = FleetMapView::new(Ok(SceneSurface::default()), destinations.clone());
        view.apply_snapshot(fleet());
        let live = LiveState {
            payload: ScenePayload {
                available: true,
                message: None,
                selected: None,
                scene: view.surface().unwrap().snapshot(),
                updated_at: chrono::Utc::now(),
            },
            fleet: Arc::new(fleet()),
        };
        let (_live_tx, live_rx) = watch::channel(live);
        let (events, events_rx) = mpsc::channel(4);
        // Nothing listens on the discard port: every route falls back.
        let backend = OsrmBackend::new(RoutingConfig {
            base_url: "http://127.0.0.1:9".into(),
            ..RoutingConfig::default()
        })
        .unwrap();
        let state = ServerState {
            live: live_rx,
            events,
            destinations: Arc::new(destinations),
            resolver: Arc::new(RouteResolver::new(backend)),
            tile_url: fleet_map::scene::DEFAULT_TILE_URL.into(),
        };
        (state, events_rx)
    }

    #[actix_web::test]
    async fn scene_endpoint_returns_published_markers() {
        let (state, _events) = state();
        let app = actix_test::init_service(
            App::new().app_data(web::Data::new(state)).configure(routes),
        )
        .await;

        let body: Value =
            actix_test::call_and_read_body_json(&app, actix_test::TestRequest::get().uri("/scene").to_request())
                .await;
        assert_eq!(body["available"], true);
        assert_eq!(body["scene"]["markers"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn clicks_are_forwarded_to_the_controller() {
        let (state, mut events) = state();
        let app = actix_test::init_service(
            App::new().app_data(web::Data::new(state)).configure(routes),
        )
        .await;

        let resp = actix_test::call_service(
            &app,
            actix_test::TestRequest::post().uri("/select/P1").to_request(),
        )
        .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let resp =
            actix_test::call_service(&app, actix_test::TestRequest::post().uri("/deselect").to_request())
                .await;
        assert_eq!(resp.status(), StatusCode::ACCEPTED);

        assert_eq!(events.recv().await, Some(MapEvent::MarkerClicked("P1".into())));
        assert_eq!(events.recv().await, Some(MapEvent::BackgroundClicked));
    }

    #[actix_web::test]
    async fn route_preview_reports_lookup_failures() {
        let (state, _events) = state();
        let app = actix_test::init_service(
            App::new().app_data(web::Data::new(state)).configure(routes),
        )
        .await;

        let resp =
            actix_test::call_service(&app, actix_test::TestRequest::get().uri("/route/P404").to_request())
                .await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let resp =
            actix_test::call_service(&app, actix_test::TestRequest::get().uri("/route/P2").to_request()).await;
        assert_eq!(resp.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[actix_web::test]
    async fn route_preview_falls_back_when_routing_is_down() {
        let (state, _events) = state();
        let app = actix_test::init_service(
            App::new().app_data(web::Data::new(state)).configure(routes),
        )
        .await;

        let body: Value = actix_test::call_and_read_body_json(
            &app,
            actix_test::TestRequest::get().uri("/route/P1").to_request(),
        )
        .await;
        assert_eq!(body["provenance"], "fallback");
        assert_eq!(body["summary"]["origin_name"], "Bokaro");
        assert_eq!(body["summary"]["estimated_hours"], 7.0);
        assert_eq!(body["scene"]["markers"].as_array().unwrap().len(), 2);
        assert_eq!(body["scene"]["polylines"][0]["points"].as_array().unwrap().len(), 2);
    }

    #[actix_web::test]
    async fn index_page_relabels_markers_only_on_label_change() {
        let (state, _events) = state();
        let app = actix_test::init_service(
            App::new().app_data(web::Data::new(state)).configure(routes),
        )
        .await;

        let body = actix_test::call_and_read_body(&app, actix_test::TestRequest::get().uri("/").to_request())
            .await;
        let page = std::str::from_utf8(&body).unwrap();
        assert!(page.contains("this.relabel(marker.handle, layer, marker.label)"));
        assert!(page.contains("if (previous === next) return;"));
        assert_eq!(page.matches("bindTooltip(html)").count(), 1);
    }

    #[test]
    fn scene_events_carry_the_revision_as_id() {
        let payload = ScenePayload {
            available: false,
            message: Some(SURFACE_UNAVAILABLE_MESSAGE),
            selected: None,
            scene: SceneSnapshot {
                revision: 42,
                ..SceneSnapshot::default()
            },
            updated_at: chrono::Utc::now(),
        };
        let event = scene_event(&payload);
        let text = std::str::from_utf8(&event).unwrap();
        assert!(text.starts_with("id: 42\ndata: {"));
        assert!(text.ends_with("\n\n"));
        assert!(text.contains("Could not load map services"));
    }
}
