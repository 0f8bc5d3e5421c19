//! `fleetmap route`: one-shot route preview printed to stdout.

use anyhow::{Context, Result, anyhow};
use fleet_map::{
    FleetDataset, FleetSnapshot, OsrmBackend, RouteResolver, SceneSurface, TransitPlan,
    preview::{RoutePreview, RouteSummary},
};
use tracing::info;

use crate::{config::RouteConfig, feed, telemetry};

pub(crate) fn run(config: RouteConfig) -> Result<()> {
    let _telemetry_guard = telemetry::enter_runtime(&config.telemetry);

    let FleetDataset {
        destinations,
        snapshots,
    } = feed::load_dataset(&config.data_path)?;
    let snapshot = pick_snapshot(&snapshots, config.snapshot)?;
    let plan = find_plan(snapshot, &config.plan_id)?;
    let origin = snapshot
        .origin_of(plan)
        .ok_or_else(|| anyhow!("origin facility {:?} of plan {} not found", plan.origin, plan.id))?;
    let summary = RouteSummary::for_plan(plan, origin, &destinations)
        .with_context(|| format!("Cannot preview plan {}", plan.id))?;

    let backend = OsrmBackend::new(config.routing).context("Failed to build routing client")?;
    let resolver = RouteResolver::new(backend);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build runtime")?;
    let (preview, route) =
        runtime.block_on(RoutePreview::open(SceneSurface::default(), summary, &resolver));
    info!(points = route.points.len(), "route resolved");

    let summary = preview.summary();
    println!("Plan:        {}", summary.plan_id);
    println!("Origin:      {} ({:.4}, {:.4})", summary.origin_name, summary.origin.lat, summary.origin.lon);
    println!(
        "Destination: {} ({:.4}, {:.4})",
        summary.destination_name, summary.destination.lat, summary.destination.lon
    );
    println!("Distance:    {:.1} km", summary.distance_km);
    println!("Est. time:   {} hours", summary.estimated_hours);
    println!(
        "Route:       {} points ({})",
        route.points.len(),
        if route.is_fallback() { "direct line" } else { "road route" }
    );
    Ok(())
}

/// Snapshot at `index`, or the most recent one.
fn pick_snapshot(snapshots: &[FleetSnapshot], index: Option<usize>) -> Result<&FleetSnapshot> {
    match index {
        Some(index) => snapshots.get(index).ok_or_else(|| {
            anyhow!(
                "--snapshot {index} is out of range; dataset has {} snapshots",
                snapshots.len()
            )
        }),
        None => snapshots
            .last()
            .ok_or_else(|| anyhow!("dataset contains no snapshots")),
    }
}

fn find_plan<'a>(snapshot: &'a FleetSnapshot, plan_id: &str) -> Result<&'a TransitPlan> {
    snapshot
        .plan(plan_id)
        .ok_or_else(|| anyhow!("plan {plan_id:?} is not in the selected snapshot"))
}

#[cfg(test)]
mod tests {
    use fleet_map::PlanStatus;

    use super::*;

    fn snapshot_with(plan_ids: &[&str]) -> FleetSnapshot {
        FleetSnapshot {
            facilities: Vec::new(),
            plans: plan_ids
                .iter()
                .map(|id| TransitPlan {
                    id: (*id).into(),
                    origin: "F1".into(),
                    destination: "D1".into(),
                    position: None,
                    progress: 0.0,
                    status: PlanStatus::Planned,
                })
                .collect(),
        }
    }

    #[test]
    fn defaults_to_the_last_snapshot() {
        let snapshots = vec![snapshot_with(&["P1"]), snapshot_with(&["P1", "P2"])];
        assert_eq!(pick_snapshot(&snapshots, None).unwrap().plans.len(), 2);
        assert_eq!(pick_snapshot(&snapshots, Some(0)).unwrap().plans.len(), 1);
        assert!(pick_snapshot(&snapshots, Some(2)).is_err());
    }

    #[test]
    fn missing_plan_is_an_error() {
        let snapshot = snapshot_with(&["P1"]);
        assert_eq!(find_plan(&snapshot, "P1").unwrap().id, "P1");
        let err = find_plan(&snapshot, "P7").unwrap_err();
        assert!(err.to_string().contains("P7"));
    }
}
