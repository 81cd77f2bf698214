//! Latest-position snapshot export
//!
//! Merges the newest stored row of each vessel into a JSON file and then
//! empties the store, so the next capture round starts fresh.

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::{info, warn};

use crate::{
    errors::AisStreamerError,
    models::Mmsi,
    storage::{StorageGateway, StoredPosition},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnapshotSummary {
    /// Entries in the snapshot file
    pub vessels: usize,
    /// Entries replaced by a stored row
    pub updated: usize,
    /// Rows deleted from the store
    pub purged: u64,
}

/// MMSI of a snapshot entry, given as number or string
fn vessel_mmsi(vessel: &Value) -> Option<Mmsi> {
    match vessel.get("mmsi")? {
        Value::Number(n) => n.as_u64().and_then(|v| Mmsi::try_from(v).ok()),
        Value::String(s) => Mmsi::try_from(s.as_str()).ok(),
        _ => None,
    }
}

/// Update the snapshot file at `path` and purge the store
///
/// The store is only purged after the file has been written.
pub async fn update_latest(
    storage: &dyn StorageGateway,
    path: &Path,
) -> Result<SnapshotSummary, AisStreamerError> {
    info!("Loading MMSI list from {}", path.display());
    let contents = tokio::fs::read_to_string(path).await?;
    let vessels: Vec<Value> = serde_json::from_str(&contents)?;

    let mmsis: Vec<Mmsi> = vessels
        .iter()
        .filter_map(|vessel| {
            let mmsi = vessel_mmsi(vessel);
            if mmsi.is_none() {
                warn!("Snapshot entry without valid MMSI: {}", vessel);
            }
            mmsi
        })
        .collect();

    let mut latest: HashMap<i32, StoredPosition> = HashMap::new();
    for row in storage.latest_for(&mmsis).await? {
        latest.entry(row.mmsi).or_insert(row);
    }

    let mut updated = 0;
    let merged = vessels
        .into_iter()
        .map(|vessel| {
            let row = vessel_mmsi(&vessel).and_then(|mmsi| latest.get(&(mmsi.value() as i32)));
            match row {
                Some(row) => {
                    updated += 1;
                    serde_json::to_value(row)
                }
                None => Ok(vessel),
            }
        })
        .collect::<Result<Vec<Value>, _>>()?;

    info!("Merged {} records, writing snapshot", merged.len());
    tokio::fs::write(path, serde_json::to_string_pretty(&merged)?).await?;

    let purged = storage.purge().await?;
    info!("Deleted {} records from store", purged);

    Ok(SnapshotSummary {
        vessels: merged.len(),
        updated,
        purged,
    })
}
