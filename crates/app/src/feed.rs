//! Snapshot feed replayed from a dataset file.

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, bail};
use fleet_map::{FleetDataset, FleetSnapshot};
use tokio::{sync::mpsc, time::MissedTickBehavior};
use tracing::{debug, info, warn};

/// Load and sanity-check a replay dataset.
pub(crate) fn load_dataset(path: &Path) -> Result<FleetDataset> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("Failed to read fleet dataset {}", path.display()))?;
    parse_dataset(&raw).with_context(|| format!("Invalid fleet dataset {}", path.display()))
}

pub(crate) fn parse_dataset(raw: &str) -> Result<FleetDataset> {
    let dataset: FleetDataset = serde_json::from_str(raw)?;
    if dataset.snapshots.is_empty() {
        bail!("dataset contains no snapshots");
    }
    if dataset.destinations.is_empty() {
        warn!("dataset has no destinations; routes cannot be resolved");
    }
    Ok(dataset)
}

/// Send each snapshot on `tx`, one per `interval`, until the receiver goes away.
///
/// Without `looping` the task returns after the last snapshot.
pub(crate) async fn replay(
    snapshots: Vec<FleetSnapshot>,
    interval: Duration,
    looping: bool,
    tx: mpsc::Sender<FleetSnapshot>,
) {
    if snapshots.is_empty() {
        return;
    }
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut pass = 0u64;
    loop {
        for (index, snapshot) in snapshots.iter().enumerate() {
            ticker.tick().await;
            debug!(pass, index, plans = snapshot.plans.len(), "replaying snapshot");
            if tx.send(snapshot.clone()).await.is_err() {
                debug!("snapshot consumer closed; stopping replay");
                return;
            }
        }
        if !looping {
            info!(snapshots = snapshots.len(), "replay finished");
            return;
        }
        pass += 1;
    }
}

#[cfg(test)]
mod tests {
    use fleet_map::PlanStatus;

    use super::*;

    const DATASET: &str = r#"{
        "destinations": { "D1": { "lat": 22.5, "lon": 88.3 } },
        "snapshots": [
            {
                "facilities": [{ "id": "F1", "name": "F1", "lat": 23.0, "lon": 85.0 }],
                "plans": [{
                    "id": "P1", "origin": "F1", "destination": "D1",
                    "position": { "lat": 22.8, "lon": 86.5 },
                    "progress": 0.4, "status": "in_transit"
                }]
            },
            {
                "facilities": [{ "id": "F1", "name": "F1", "lat": 23.0, "lon": 85.0 }],
                "plans": [{
                    "id": "P1", "origin": "F1", "destination": "D1",
                    "progress": 1.0, "status": "delivered"
                }]
            }
        ]
    }"#;

    #[test]
    fn parses_destinations_and_snapshots() {
        let dataset = parse_dataset(DATASET).unwrap();
        assert_eq!(dataset.destinations.len(), 1);
        assert_eq!(dataset.snapshots.len(), 2);
        assert_eq!(dataset.snapshots[1].plans[0].status, PlanStatus::Delivered);
    }

    #[test]
    fn bundled_demo_dataset_parses() {
        let dataset = parse_dataset(include_str!("../../../demos/fleet.json")).unwrap();
        assert_eq!(dataset.snapshots.len(), 4);
        assert!(dataset.destinations.get("Kolkata").is_some());
    }

    #[test]
    fn empty_dataset_is_rejected() {
        let err = parse_dataset(r#"{ "snapshots": [] }"#).unwrap_err();
        assert!(err.to_string().contains("no snapshots"));
        assert!(parse_dataset("not json").is_err());
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_dataset(Path::new("/nonexistent/fleet.json")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/fleet.json"));
    }

    #[tokio::test]
    async fn replay_sends_each_snapshot_once_without_looping() {
        let dataset = parse_dataset(DATASET).unwrap();
        let (tx, mut rx) = mpsc::channel(4);
        replay(dataset.snapshots.clone(), Duration::from_millis(1), false, tx).await;

        assert_eq!(rx.recv().await, Some(dataset.snapshots[0].clone()));
        assert_eq!(rx.recv().await, Some(dataset.snapshots[1].clone()));
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn looping_replay_stops_when_consumer_leaves() {
        let dataset = parse_dataset(DATASET).unwrap();
        let (tx, mut rx) = mpsc::channel(1);
        let task = tokio::spawn(replay(dataset.snapshots, Duration::from_millis(1), true, tx));

        for _ in 0..5 {
            assert!(rx.recv().await.is_some());
        }
        drop(rx);
        task.await.unwrap();
    }
}
