//! Road-route resolution with a straight-line fallback.
//!
//! A [`RouteResolver`] makes exactly one attempt against its
//! [`RoutingBackend`] and never fails: any backend error degrades to the
//! two-point path `[origin, destination]`. Callers that may issue overlapping
//! requests guard the result with a [`RouteTicket`](crate::selection::RouteTicket).

use std::{future::Future, time::Duration};

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::geo::GeoPoint;

pub const DEFAULT_ROUTING_URL: &str = "https://router.project-osrm.org";
pub const DEFAULT_ROUTING_PROFILE: &str = "driving";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RouteProvenance {
    ServiceResolved,
    FallbackStraightLine,
}

impl RouteProvenance {
    pub fn label(self) -> &'static str {
        match self {
            RouteProvenance::ServiceResolved => "service",
            RouteProvenance::FallbackStraightLine => "fallback",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
/// Ordered latitude-first path plus where it came from.
pub struct ResolvedRoute {
    pub points: Vec<GeoPoint>,
    pub provenance: RouteProvenance,
}

impl ResolvedRoute {
    pub fn straight_line(origin: GeoPoint, destination: GeoPoint) -> Self {
        Self {
            points: vec![origin, destination],
            provenance: RouteProvenance::FallbackStraightLine,
        }
    }

    pub fn is_fallback(&self) -> bool {
        self.provenance == RouteProvenance::FallbackStraightLine
    }
}

#[derive(Debug, Error)]
pub enum RoutingError {
    #[error("routing request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("routing service responded with status {0}")]
    Status(u16),
    #[error("routing service returned no candidate routes")]
    NoRoute,
    #[error("malformed routing response: {0}")]
    Malformed(String),
}

/// Source of candidate road paths.
pub trait RoutingBackend {
    /// First candidate path between the two points, latitude-first.
    fn fetch_path(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> impl Future<Output = Result<Vec<GeoPoint>, RoutingError>> + Send;
}

#[derive(Clone, Debug)]
/// Connection settings for an OSRM-compatible routing service.
pub struct RoutingConfig {
    pub base_url: String,
    pub profile: String,
    pub timeout: Option<Duration>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ROUTING_URL.to_string(),
            profile: DEFAULT_ROUTING_PROFILE.to_string(),
            timeout: None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OsrmBackend {
    client: Client,
    config: RoutingConfig,
}

#[derive(Deserialize)]
struct OsrmResponse {
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

impl OsrmBackend {
    pub fn new(config: RoutingConfig) -> Result<Self, RoutingError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
            config,
        })
    }

    /// Request URL; the wire format is longitude-first.
    pub fn route_url(&self, origin: GeoPoint, destination: GeoPoint) -> String {
        format!(
            "{}/route/v1/{}/{},{};{},{}?overview=full&geometries=geojson",
            self.config.base_url.trim_end_matches('/'),
            self.config.profile,
            origin.lon,
            origin.lat,
            destination.lon,
            destination.lat
        )
    }
}

impl RoutingBackend for OsrmBackend {
    async fn fetch_path(
        &self,
        origin: GeoPoint,
        destination: GeoPoint,
    ) -> Result<Vec<GeoPoint>, RoutingError> {
        let url = self.route_url(origin, destination);
        debug!(%url, "requesting road route");

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(RoutingError::Status(response.status().as_u16()));
        }
        let body: OsrmResponse = response
            .json()
            .await
            .map_err(|err| RoutingError::Malformed(err.to_string()))?;

        let route = body.routes.into_iter().next().ok_or(RoutingError::NoRoute)?;
        let points: Vec<GeoPoint> = route
            .geometry
            .coordinates
            .into_iter()
            .map(|[lon, lat]| GeoPoint::new(lat, lon))
            .collect();
        if points.is_empty() {
            return Err(RoutingError::Malformed("empty route geometry".into()));
        }
        if let Some(bad) = points.iter().find(|point| !point.is_valid()) {
            return Err(RoutingError::Malformed(format!(
                "invalid coordinate ({}, {}) in route geometry",
                bad.lat, bad.lon
            )));
        }
        Ok(points)
    }
}

#[derive(Clone, Debug)]
pub struct RouteResolver<B> {
    backend: B,
}

impl<B: RoutingBackend> RouteResolver<B> {
    pub fn new(backend: B) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// One attempt; falls back to a straight line on any failure.
    pub async fn resolve(&self, origin: GeoPoint, destination: GeoPoint) -> ResolvedRoute {
        let route = match self.backend.fetch_path(origin, destination).await {
            Ok(points) => ResolvedRoute {
                points,
                provenance: RouteProvenance::ServiceResolved,
            },
            Err(err) => {
                warn!("Failed to fetch route, using direct line: {err}");
                ResolvedRoute::straight_line(origin, destination)
            }
        };
        metrics::counter!(
            "fleet_route_resolutions_total",
            "provenance" => route.provenance.label()
        )
        .increment(1);
        route
    }
}
