use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::{
    config::{RouteArgs, RouteConfig, ServeArgs, ServeConfig},
    controller, preview,
};

#[derive(Debug, Parser)]
#[command(name = "fleetmap", version, about = "Live fleet map with road-route previews")]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Replay a fleet dataset onto the live map and serve it over HTTP.
    Serve(ServeArgs),
    /// Resolve and print the route preview for one plan.
    Route(RouteArgs),
}

pub(crate) fn handle_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve(args) => controller::serve(ServeConfig::try_from(args)?),
        Command::Route(args) => preview::run(RouteConfig::try_from(args)?),
    }
}
