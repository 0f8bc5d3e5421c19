//! Live map controller.
//!
//! One task owns the [`FleetMapView`] and multiplexes feed snapshots, UI
//! events and settled route resolutions with `tokio::select!`. After every
//! change it publishes an immutable [`LiveState`] on a watch channel; the HTTP
//! server only ever reads those.

use std::{future::Future, sync::Arc};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fleet_map::{
    FleetDataset, FleetMapView, FleetSnapshot, MapEvent, OsrmBackend, ResolvedRoute,
    RouteOutcome, RouteRequest, RouteResolver, RouteTicket, RoutingBackend, SceneSnapshot,
    SceneSurface, SelectionState,
};
use serde::Serialize;
use tokio::{
    sync::{mpsc, watch},
    task::JoinSet,
};
use tracing::{debug, info, warn};

use crate::{
    config::ServeConfig,
    feed,
    server::{self, ServerState},
    telemetry,
};

const EVENT_QUEUE: usize = 64;

#[derive(Clone, Debug, Serialize)]
/// Scene document pushed to the browser.
pub(crate) struct ScenePayload {
    pub(crate) available: bool,
    pub(crate) message: Option<&'static str>,
    pub(crate) selected: Option<String>,
    pub(crate) scene: SceneSnapshot,
    pub(crate) updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug)]
pub(crate) struct LiveState {
    pub(crate) payload: ScenePayload,
    /// Snapshot the scene was reconciled against.
    pub(crate) fleet: Arc<FleetSnapshot>,
}

impl LiveState {
    fn capture(view: &FleetMapView<SceneSurface>, fleet: Arc<FleetSnapshot>) -> Self {
        let selected = match view.selection() {
            SelectionState::Selected(key) => Some(key.clone()),
            SelectionState::Unselected => None,
        };
        Self {
            payload: ScenePayload {
                available: view.surface().is_some(),
                message: view.status().user_message(),
                selected,
                scene: view.surface().map(SceneSurface::snapshot).unwrap_or_default(),
                updated_at: Utc::now(),
            },
            fleet,
        }
    }
}

pub(crate) struct Controller<B> {
    view: FleetMapView<SceneSurface>,
    resolver: Arc<RouteResolver<B>>,
    routes: JoinSet<(RouteTicket, ResolvedRoute)>,
    live: watch::Sender<LiveState>,
}

impl<B> Controller<B>
where
    B: RoutingBackend + Send + Sync + 'static,
{
    pub(crate) fn new(
        view: FleetMapView<SceneSurface>,
        resolver: Arc<RouteResolver<B>>,
    ) -> (Self, watch::Receiver<LiveState>) {
        let initial = LiveState::capture(&view, Arc::new(FleetSnapshot::default()));
        let (live, rx) = watch::channel(initial);
        let controller = Self {
            view,
            resolver,
            routes: JoinSet::new(),
            live,
        };
        (controller, rx)
    }

    /// Run until `shutdown` resolves. The feed may end earlier; the last
    /// snapshot then stays on the map.
    pub(crate) async fn run(
        mut self,
        mut snapshots: mpsc::Receiver<FleetSnapshot>,
        mut events: mpsc::Receiver<MapEvent>,
        shutdown: impl Future<Output = ()>,
    ) {
        tokio::pin!(shutdown);
        let mut feed_open = true;

        loop {
            tokio::select! {
                snapshot = snapshots.recv(), if feed_open => match snapshot {
                    Some(snapshot) => self.apply_snapshot(snapshot),
                    None => {
                        info!("snapshot feed ended; holding last snapshot");
                        feed_open = false;
                    }
                },
                Some(event) = events.recv() => self.handle_event(event),
                Some(joined) = self.routes.join_next(), if !self.routes.is_empty() => match joined {
                    Ok((ticket, route)) => self.settle(ticket, route),
                    Err(err) => warn!("route resolution task failed: {err}"),
                },
                _ = &mut shutdown => break,
            }
        }

        self.routes.abort_all();
        info!("map controller stopped");
    }

    fn apply_snapshot(&mut self, snapshot: FleetSnapshot) {
        let fleet = Arc::new(snapshot.clone());
        let (report, request) = self.view.apply_snapshot(snapshot);
        if report.skipped_invalid > 0 {
            debug!(skipped = report.skipped_invalid, "snapshot had entities without a usable coordinate");
        }
        if let Some(request) = request {
            self.spawn_route(request);
        }
        self.publish(Some(fleet));
    }

    fn handle_event(&mut self, event: MapEvent) {
        debug!(?event, "map event");
        if let Some(request) = self.view.handle_event(event) {
            self.spawn_route(request);
        }
        self.publish(None);
    }

    fn spawn_route(&mut self, request: RouteRequest) {
        debug!(
            plan = request.ticket.plan_id(),
            generation = request.ticket.generation(),
            "resolving route"
        );
        let resolver = Arc::clone(&self.resolver);
        self.routes.spawn(async move {
            let route = resolver.resolve(request.origin, request.destination).await;
            (request.ticket, route)
        });
    }

    fn settle(&mut self, ticket: RouteTicket, route: ResolvedRoute) {
        match self.view.route_settled(&ticket, &route) {
            RouteOutcome::Drawn => info!(
                plan = ticket.plan_id(),
                provenance = route.provenance.label(),
                points = route.points.len(),
                "route drawn"
            ),
            RouteOutcome::Stale => {
                debug!(plan = ticket.plan_id(), "route settled after selection changed")
            }
        }
        self.publish(None);
    }

    /// Publish when the surface changed or a new snapshot arrived.
    fn publish(&mut self, fleet: Option<Arc<FleetSnapshot>>) {
        let ops = self
            .view
            .surface_mut()
            .map(SceneSurface::take_ops)
            .unwrap_or_default();
        if ops.is_empty() && fleet.is_none() {
            return;
        }
        let fleet = match fleet {
            Some(fleet) => fleet,
            None => Arc::clone(&self.live.borrow().fleet),
        };
        self.live.send_replace(LiveState::capture(&self.view, fleet));
    }
}

/// Replay the dataset onto the live map until Ctrl-C.
pub(crate) fn serve(config: ServeConfig) -> Result<()> {
    let _telemetry_guard = telemetry::enter_runtime(&config.telemetry);
    telemetry::init_metrics_recorder()?;

    let FleetDataset {
        destinations,
        snapshots,
    } = feed::load_dataset(&config.data_path)?;
    info!(
        snapshots = snapshots.len(),
        destinations = destinations.len(),
        "loaded fleet dataset from {}",
        config.data_path.display()
    );

    let backend =
        OsrmBackend::new(config.routing.clone()).context("Failed to build routing client")?;
    let resolver = Arc::new(RouteResolver::new(backend));

    let view = FleetMapView::new(SceneSurface::open(&config.tile_url), destinations.clone());
    if let Some(message) = view.status().user_message() {
        warn!("{message}");
    }
    let (controller, live) = Controller::new(view, Arc::clone(&resolver));

    let (event_tx, event_rx) = mpsc::channel(EVENT_QUEUE);
    let (snapshot_tx, snapshot_rx) = mpsc::channel(1);

    let map_server = server::spawn_map_server(
        config.bind,
        ServerState {
            live,
            events: event_tx,
            destinations: Arc::new(destinations),
            resolver,
            tile_url: config.tile_url.clone(),
        },
    )?;
    info!("serving live map on http://{}", config.bind);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build controller runtime")?;
    runtime.block_on(async {
        let replay = tokio::spawn(feed::replay(
            snapshots,
            config.replay_interval,
            config.looping,
            snapshot_tx,
        ));
        let shutdown = async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("failed to listen for Ctrl-C: {err}");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
        };
        controller.run(snapshot_rx, event_rx, shutdown).await;
        replay.abort();
    });

    map_server.stop();
    Ok(())
}
