use std::env;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use sqlx::postgres::PgPoolOptions;

use ais_streamer::{
    dedup::{DedupGate, PersistOutcome},
    models::{Mmsi, PositionReport},
    storage::{PgStorage, StorageGateway},
};

async fn setup_test_db() -> PgStorage {
    dotenvy::dotenv().ok();
    let database_url =
        env::var("DATABASE_URL").expect("Environment variable DATABASE_URL required");

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to connect to database");

    let storage = PgStorage::new(pool);
    storage.migrate().await.expect("Failed to run migrations");
    storage.purge().await.expect("Failed to clear ais_logs");
    storage
}

fn report(mmsi: u32) -> PositionReport {
    PositionReport {
        mmsi: Mmsi::try_from(mmsi).unwrap(),
        lat: 60.192059,
        lon: 24.945831,
        cog: Some(123.4),
        sog: None,
        timestamp: Some(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()),
        name: "TEST VESSEL".to_string(),
    }
}

// These share one table, run them with --test-threads=1
#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_insert_position() {
    let storage = setup_test_db().await;
    let mmsi = Mmsi::try_from(230_123_456u32).unwrap();

    storage
        .insert(&report(230_123_456))
        .await
        .expect("Failed to insert position");

    let stored: (f64, f64, Option<String>, Option<f64>) =
        sqlx::query_as("SELECT lat, lon, \"timestamp\", sog FROM ais_logs WHERE mmsi = $1")
            .bind(mmsi.value() as i32)
            .fetch_one(storage.pool())
            .await
            .expect("Failed to retrieve position");

    assert_eq!(stored.0, 60.192059);
    assert_eq!(stored.1, 24.945831);
    assert_eq!(stored.2.as_deref(), Some("2024-06-01T00:00:00Z"));
    assert_eq!(stored.3, None);

    let found = storage.find_by_mmsi(mmsi).await.unwrap().unwrap();
    assert_eq!(found.name, "TEST VESSEL");
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_dedup_against_postgres() {
    let storage = Arc::new(setup_test_db().await);
    let gate = DedupGate::new(storage.clone());

    assert_eq!(gate.process(&report(563_242_500)).await, PersistOutcome::Inserted);
    assert_eq!(gate.process(&report(563_242_500)).await, PersistOutcome::Skipped);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM ais_logs WHERE mmsi = $1")
        .bind(563_242_500i32)
        .fetch_one(storage.pool())
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
#[ignore = "requires DATABASE_URL"]
async fn test_latest_and_purge() {
    let storage = setup_test_db().await;
    let mut later = report(563_242_500);
    later.timestamp = Some(Utc.with_ymd_and_hms(2024, 6, 2, 0, 0, 0).unwrap());

    storage.insert(&report(563_242_500)).await.unwrap();
    storage.insert(&later).await.unwrap();

    let rows = storage
        .latest_for(&[Mmsi::try_from(563_242_500u32).unwrap()])
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].timestamp.as_deref(), Some("2024-06-02T00:00:00Z"));

    assert_eq!(storage.purge().await.unwrap(), 2);
}
