//! Command-line arguments and the validated configuration built from them.
//!
//! Argument structs are parsed by `clap`; `TryFrom` conversions enforce the
//! cross-field rules so the rest of the binary never re-checks flags.

use std::{net::SocketAddr, path::PathBuf, time::Duration};

use anyhow::{Context, Result, anyhow, bail};
use clap::Args;
use fleet_map::{
    RoutingConfig,
    route::{DEFAULT_ROUTING_PROFILE, DEFAULT_ROUTING_URL},
    scene::DEFAULT_TILE_URL,
};

/// Tracing output controls shared by every subcommand.
#[derive(Clone, Debug, Default)]
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing spans.
    pub chrome_trace_path: Option<PathBuf>,
    /// Default to `debug` when `RUST_LOG` is unset.
    pub verbose: bool,
}

#[derive(Args, Clone, Debug)]
pub struct RoutingArgs {
    /// Base URL of an OSRM-compatible routing service.
    #[arg(long = "routing-url", value_name = "URL", default_value = DEFAULT_ROUTING_URL)]
    pub routing_url: String,
    /// Routing profile segment of the request path.
    #[arg(long = "routing-profile", value_name = "PROFILE", default_value = DEFAULT_ROUTING_PROFILE)]
    pub routing_profile: String,
    /// Abort a routing request after this many milliseconds.
    #[arg(long = "routing-timeout-ms", value_name = "MS")]
    pub routing_timeout_ms: Option<u64>,
}

impl TryFrom<RoutingArgs> for RoutingConfig {
    type Error = anyhow::Error;

    fn try_from(args: RoutingArgs) -> Result<Self> {
        let base_url = args.routing_url.trim().to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            bail!("--routing-url must be an http:// or https:// URL, got {base_url:?}");
        }
        let profile = args.routing_profile.trim().to_string();
        if profile.is_empty() || profile.contains('/') {
            bail!("--routing-profile must be a single path segment");
        }
        let timeout = match args.routing_timeout_ms {
            Some(0) => bail!("--routing-timeout-ms must be at least 1"),
            Some(ms) => Some(Duration::from_millis(ms)),
            None => None,
        };
        Ok(RoutingConfig {
            base_url,
            profile,
            timeout,
        })
    }
}

#[derive(Args, Clone, Debug)]
pub struct ServeArgs {
    /// Fleet dataset (JSON) to replay.
    #[arg(long = "data", value_name = "PATH")]
    pub data: PathBuf,
    /// Address the HTTP preview server listens on.
    #[arg(long = "bind", value_name = "ADDR", default_value = "0.0.0.0:8080")]
    pub bind: String,
    #[command(flatten)]
    pub routing: RoutingArgs,
    /// Delay between replayed snapshots.
    #[arg(long = "replay-interval-ms", value_name = "MS", default_value_t = 2000)]
    pub replay_interval_ms: u64,
    /// Start over from the first snapshot after the last one.
    #[arg(long = "loop", action = clap::ArgAction::SetTrue)]
    pub looping: bool,
    /// Slippy-map tile template used by the browser map.
    #[arg(long = "tile-url", value_name = "TEMPLATE", default_value = DEFAULT_TILE_URL)]
    pub tile_url: String,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
    /// Enable debug logging (per-marker diffs, route requests).
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

#[derive(Clone, Debug)]
pub struct ServeConfig {
    /// Dataset replayed into the live map.
    pub data_path: PathBuf,
    /// Listen address of the map server.
    pub bind: SocketAddr,
    /// Routing service used for highlight routes and previews.
    pub routing: RoutingConfig,
    /// Delay between two replayed snapshots.
    pub replay_interval: Duration,
    /// Restart the replay after the last snapshot.
    pub looping: bool,
    /// Tile template handed to the map surface.
    pub tile_url: String,
    /// Logging and tracing output.
    pub telemetry: TelemetryOptions,
}

impl TryFrom<ServeArgs> for ServeConfig {
    type Error = anyhow::Error;

    fn try_from(args: ServeArgs) -> Result<Self> {
        let bind: SocketAddr = args
            .bind
            .parse()
            .with_context(|| format!("--bind must be a socket address, got {:?}", args.bind))?;
        if args.replay_interval_ms == 0 {
            bail!("--replay-interval-ms must be at least 1");
        }
        let routing = RoutingConfig::try_from(args.routing)?;

        Ok(Self {
            data_path: args.data,
            bind,
            routing,
            replay_interval: Duration::from_millis(args.replay_interval_ms),
            looping: args.looping,
            tile_url: args.tile_url,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
                verbose: args.verbose,
            },
        })
    }
}

#[derive(Args, Clone, Debug)]
pub struct RouteArgs {
    /// Fleet dataset (JSON) holding the plan.
    #[arg(long = "data", value_name = "PATH")]
    pub data: PathBuf,
    /// Identifier of the plan to preview.
    #[arg(long = "plan", value_name = "ID")]
    pub plan: String,
    /// Snapshot index to read the plan from (defaults to the last one).
    #[arg(long = "snapshot", value_name = "INDEX")]
    pub snapshot: Option<usize>,
    #[command(flatten)]
    pub routing: RoutingArgs,
    /// Enable debug logging.
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
}

#[derive(Clone, Debug)]
pub struct RouteConfig {
    /// Dataset the plan is read from.
    pub data_path: PathBuf,
    /// Plan to preview, trimmed and non-empty.
    pub plan_id: String,
    /// Snapshot index; `None` reads the last snapshot.
    pub snapshot: Option<usize>,
    /// Routing service for the preview route.
    pub routing: RoutingConfig,
    /// Logging and tracing output.
    pub telemetry: TelemetryOptions,
}

impl TryFrom<RouteArgs> for RouteConfig {
    type Error = anyhow::Error;

    fn try_from(args: RouteArgs) -> Result<Self> {
        let plan_id = args.plan.trim().to_string();
        if plan_id.is_empty() {
            return Err(anyhow!("--plan must not be empty"));
        }
        Ok(Self {
            data_path: args.data,
            plan_id,
            snapshot: args.snapshot,
            routing: RoutingConfig::try_from(args.routing)?,
            telemetry: TelemetryOptions {
                chrome_trace_path: None,
                verbose: args.verbose,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;
    use crate::cli::{Cli, Command};

    fn serve_args(extra: &[&str]) -> ServeArgs {
        let argv = ["fleetmap", "serve", "--data", "fleet.json"]
            .into_iter()
            .chain(extra.iter().copied());
        match Cli::try_parse_from(argv).unwrap().command {
            Command::Serve(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn serve_defaults_are_valid() {
        let config = ServeConfig::try_from(serve_args(&[])).unwrap();
        assert_eq!(config.bind, "0.0.0.0:8080".parse().unwrap());
        assert_eq!(config.routing.base_url, DEFAULT_ROUTING_URL);
        assert_eq!(config.routing.profile, "driving");
        assert_eq!(config.routing.timeout, None);
        assert_eq!(config.replay_interval, Duration::from_secs(2));
        assert_eq!(config.tile_url, DEFAULT_TILE_URL);
        assert!(!config.looping);
    }

    #[test]
    fn serve_flags_override_defaults() {
        let config = ServeConfig::try_from(serve_args(&[
            "--bind",
            "127.0.0.1:9000",
            "--routing-url",
            "http://localhost:5000/",
            "--routing-timeout-ms",
            "1500",
            "--replay-interval-ms",
            "250",
            "--loop",
            "--verbose",
        ]))
        .unwrap();
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.routing.base_url, "http://localhost:5000/");
        assert_eq!(config.routing.timeout, Some(Duration::from_millis(1500)));
        assert_eq!(config.replay_interval, Duration::from_millis(250));
        assert!(config.looping);
        assert!(config.telemetry.verbose);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(ServeConfig::try_from(serve_args(&["--bind", "localhost"])).is_err());
        assert!(ServeConfig::try_from(serve_args(&["--replay-interval-ms", "0"])).is_err());
        assert!(ServeConfig::try_from(serve_args(&["--routing-url", "ftp://osrm"])).is_err());
        assert!(ServeConfig::try_from(serve_args(&["--routing-timeout-ms", "0"])).is_err());
        assert!(ServeConfig::try_from(serve_args(&["--routing-profile", "a/b"])).is_err());
    }

    #[test]
    fn route_command_requires_a_plan() {
        assert!(Cli::try_parse_from(["fleetmap", "route", "--data", "fleet.json"]).is_err());

        let cli = Cli::try_parse_from([
            "fleetmap", "route", "--data", "fleet.json", "--plan", "P1", "--snapshot", "2",
        ])
        .unwrap();
        let Command::Route(args) = cli.command else {
            panic!("expected route command");
        };
        let config = RouteConfig::try_from(args).unwrap();
        assert_eq!(config.plan_id, "P1");
        assert_eq!(config.snapshot, Some(2));
    }
}
