//! Backing store for captured positions

use async_trait::async_trait;
use serde::Serialize;
use sqlx::{postgres::PgPoolOptions, PgPool};
use tokio::sync::Mutex;
use tracing::info;

use crate::{
    config::DatabaseConfig,
    errors::AisStreamerError,
    models::{Mmsi, PositionReport},
};

/// One row of `ais_logs`
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoredPosition {
    pub id: i64,
    pub mmsi: i32,
    pub lat: f64,
    pub lon: f64,
    pub timestamp: Option<String>,
    pub cog: Option<f64>,
    pub sog: Option<f64>,
    pub name: String,
}

/// Storage operations the ingest pipeline and snapshot export depend on
///
/// Implementations need not make `find_by_mmsi` followed by `insert` atomic;
/// callers run them from a single sequential consumer.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    /// Any stored row for the vessel
    async fn find_by_mmsi(&self, mmsi: Mmsi) -> Result<Option<StoredPosition>, AisStreamerError>;

    async fn insert(&self, report: &PositionReport) -> Result<(), AisStreamerError>;

    /// All rows of the given vessels, newest timestamp first
    async fn latest_for(&self, mmsis: &[Mmsi]) -> Result<Vec<StoredPosition>, AisStreamerError>;

    /// Delete every row, returning the number deleted
    async fn purge(&self) -> Result<u64, AisStreamerError>;
}

fn to_db_mmsi(mmsi: Mmsi) -> i32 {
    // MMSIs have at most nine digits
    mmsi.value() as i32
}

/// PostgreSQL store
#[derive(Debug, Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create a lazily connecting pool
    ///
    /// The process starts even if the database is down; lookups and inserts
    /// fail per message until it comes back.
    pub fn connect_lazy(config: &DatabaseConfig) -> Result<Self, AisStreamerError> {
        info!(
            "Initializing database pool: max_connections={}",
            config.max_connections
        );
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect_lazy(&config.url)?;
        Ok(Self::new(pool))
    }

    /// Create the `ais_logs` table if it does not exist
    pub async fn migrate(&self) -> Result<(), AisStreamerError> {
        info!("Running database migrations");
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl StorageGateway for PgStorage {
    async fn find_by_mmsi(&self, mmsi: Mmsi) -> Result<Option<StoredPosition>, AisStreamerError> {
        let row = sqlx::query_as::<_, StoredPosition>(
            r#"SELECT id, mmsi, lat, lon, "timestamp", cog, sog, name
               FROM ais_logs WHERE mmsi = $1 LIMIT 1"#,
        )
        .bind(to_db_mmsi(mmsi))
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    async fn insert(&self, report: &PositionReport) -> Result<(), AisStreamerError> {
        sqlx::query(
            r#"INSERT INTO ais_logs (mmsi, lat, lon, "timestamp", cog, sog, name)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(to_db_mmsi(report.mmsi))
        .bind(report.lat)
        .bind(report.lon)
        .bind(report.timestamp_string())
        .bind(report.cog)
        .bind(report.sog)
        .bind(&report.name)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn latest_for(&self, mmsis: &[Mmsi]) -> Result<Vec<StoredPosition>, AisStreamerError> {
        let ids: Vec<i32> = mmsis.iter().copied().map(to_db_mmsi).collect();
        let rows = sqlx::query_as::<_, StoredPosition>(
            r#"SELECT id, mmsi, lat, lon, "timestamp", cog, sog, name
               FROM ais_logs WHERE mmsi = ANY($1)
               ORDER BY "timestamp" DESC NULLS LAST"#,
        )
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn purge(&self) -> Result<u64, AisStreamerError> {
        let result = sqlx::query("DELETE FROM ais_logs")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// In-process store, used by the test suites
#[derive(Debug, Default)]
pub struct MemoryStorage {
    rows: Mutex<Vec<StoredPosition>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn rows(&self) -> Vec<StoredPosition> {
        self.rows.lock().await.clone()
    }
}

#[async_trait]
impl StorageGateway for MemoryStorage {
    async fn find_by_mmsi(&self, mmsi: Mmsi) -> Result<Option<StoredPosition>, AisStreamerError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .find(|row| row.mmsi == to_db_mmsi(mmsi))
            .cloned())
    }

    async fn insert(&self, report: &PositionReport) -> Result<(), AisStreamerError> {
        let mut rows = self.rows.lock().await;
        let id = rows.len() as i64 + 1;
        rows.push(StoredPosition {
            id,
            mmsi: to_db_mmsi(report.mmsi),
            lat: report.lat,
            lon: report.lon,
            timestamp: report.timestamp_string(),
            cog: report.cog,
            sog: report.sog,
            name: report.name.clone(),
        });
        Ok(())
    }

    async fn latest_for(&self, mmsis: &[Mmsi]) -> Result<Vec<StoredPosition>, AisStreamerError> {
        let wanted: Vec<i32> = mmsis.iter().copied().map(to_db_mmsi).collect();
        let mut rows: Vec<StoredPosition> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|row| wanted.contains(&row.mmsi))
            .cloned()
            .collect();
        // Same order as the SQL query: newest first, missing timestamps last
        rows.sort_by(|a, b| match (&a.timestamp, &b.timestamp) {
            (Some(a), Some(b)) => b.cmp(a),
            (a, b) => b.is_some().cmp(&a.is_some()),
        });
        Ok(rows)
    }

    async fn purge(&self) -> Result<u64, AisStreamerError> {
        let mut rows = self.rows.lock().await;
        let deleted = rows.len() as u64;
        rows.clear();
        Ok(deleted)
    }
}
