//! At most one stored position per vessel

use std::sync::Arc;

use tracing::{error, info};

use crate::{
    models::{Mmsi, PositionReport},
    storage::StorageGateway,
};

/// Result of offering a report to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    Inserted,
    /// A row for the vessel already exists, or the lookup failed
    Skipped,
    /// Insert failed; the report is dropped
    Failed,
}

/// Decides per MMSI whether a report is stored
///
/// Keys on the MMSI alone, so only the first report of each vessel is ever
/// kept. The lookup and insert are separate statements; this is only
/// correct with a single sequential consumer.
#[derive(Clone)]
pub struct DedupGate {
    storage: Arc<dyn StorageGateway>,
}

impl DedupGate {
    pub fn new(storage: Arc<dyn StorageGateway>) -> Self {
        Self { storage }
    }

    /// True when no row exists for the vessel
    ///
    /// Lookup failures are logged and count as "do not persist".
    pub async fn should_persist(&self, mmsi: Mmsi) -> bool {
        match self.storage.find_by_mmsi(mmsi).await {
            Ok(Some(_)) => {
                info!(%mmsi, "MMSI already exists in store, skipping insert");
                false
            }
            Ok(None) => true,
            Err(e) => {
                error!(%mmsi, "Store lookup failed: {}", e);
                false
            }
        }
    }

    /// Store the report unless the vessel already has a row
    pub async fn process(&self, report: &PositionReport) -> PersistOutcome {
        if !self.should_persist(report.mmsi).await {
            return PersistOutcome::Skipped;
        }

        match self.storage.insert(report).await {
            Ok(()) => {
                info!(
                    mmsi = %report.mmsi,
                    name = %report.name,
                    lat = report.lat,
                    lon = report.lon,
                    cog = ?report.cog,
                    sog = ?report.sog,
                    timestamp = ?report.timestamp_string(),
                    "Stored position report"
                );
                PersistOutcome::Inserted
            }
            Err(e) => {
                error!(mmsi = %report.mmsi, "Insert failed: {}", e);
                PersistOutcome::Failed
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::errors::AisStreamerError;
    use crate::storage::{MemoryStorage, StoredPosition};
    use async_trait::async_trait;

    /// Store whose every call fails
    pub(crate) struct UnreachableStorage;

    #[async_trait]
    impl StorageGateway for UnreachableStorage {
        async fn find_by_mmsi(&self, _: Mmsi) -> Result<Option<StoredPosition>, AisStreamerError> {
            Err(AisStreamerError::DatabaseError(sqlx::Error::PoolTimedOut))
        }

        async fn insert(&self, _: &PositionReport) -> Result<(), AisStreamerError> {
            Err(AisStreamerError::DatabaseError(sqlx::Error::PoolTimedOut))
        }

        async fn latest_for(&self, _: &[Mmsi]) -> Result<Vec<StoredPosition>, AisStreamerError> {
            Err(AisStreamerError::DatabaseError(sqlx::Error::PoolTimedOut))
        }

        async fn purge(&self) -> Result<u64, AisStreamerError> {
            Err(AisStreamerError::DatabaseError(sqlx::Error::PoolTimedOut))
        }
    }

    /// Store that finds nothing and rejects inserts
    struct ReadOnlyStorage;

    #[async_trait]
    impl StorageGateway for ReadOnlyStorage {
        async fn find_by_mmsi(&self, _: Mmsi) -> Result<Option<StoredPosition>, AisStreamerError> {
            Ok(None)
        }

        async fn insert(&self, _: &PositionReport) -> Result<(), AisStreamerError> {
            Err(AisStreamerError::DatabaseError(sqlx::Error::PoolClosed))
        }

        async fn latest_for(&self, _: &[Mmsi]) -> Result<Vec<StoredPosition>, AisStreamerError> {
            Ok(vec![])
        }

        async fn purge(&self) -> Result<u64, AisStreamerError> {
            Ok(0)
        }
    }

    fn report(lat: f64) -> PositionReport {
        PositionReport {
            mmsi: Mmsi::try_from(563242500u32).unwrap(),
            lat,
            lon: 20.0,
            cog: None,
            sog: Some(3.2),
            timestamp: None,
            name: "Vessel A".to_string(),
        }
    }

    #[tokio::test]
    async fn first_report_is_stored() {
        let storage = Arc::new(MemoryStorage::new());
        let gate = DedupGate::new(storage.clone());

        assert!(gate.should_persist(report(10.0).mmsi).await);
        assert_eq!(gate.process(&report(10.0)).await, PersistOutcome::Inserted);
        assert!(!gate.should_persist(report(10.0).mmsi).await);
    }

    #[tokio::test]
    async fn repeated_reports_never_add_rows() {
        let storage = Arc::new(MemoryStorage::new());
        let gate = DedupGate::new(storage.clone());

        gate.process(&report(10.0)).await;
        for i in 0..10 {
            assert_eq!(
                gate.process(&report(11.0 + i as f64)).await,
                PersistOutcome::Skipped
            );
        }

        let rows = storage.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].lat, 10.0);
    }

    #[tokio::test]
    async fn lookup_failure_blocks_insert() {
        let gate = DedupGate::new(Arc::new(UnreachableStorage));

        assert!(!gate.should_persist(report(10.0).mmsi).await);
        assert_eq!(gate.process(&report(10.0)).await, PersistOutcome::Skipped);
    }

    #[tokio::test]
    async fn insert_failure_is_contained() {
        let gate = DedupGate::new(Arc::new(ReadOnlyStorage));

        assert_eq!(gate.process(&report(10.0)).await, PersistOutcome::Failed);
    }
}
