use anyhow::Result;
use uuid::Uuid;

use hrs_db::bookkeeping::{self, ProcessedEvent};

#[tokio::test]
async fn processed_event_insert_dedupes_on_event_id() -> Result<()> {
    // Skip if no DB configured (local + CI friendly).
    let url = match std::env::var(hrs_db::ENV_REPLICA_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: HRS_REPLICA_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    hrs_db::migrate_replica(&pool).await?;

    let ev = ProcessedEvent {
        event_id: Uuid::new_v4().to_string(),
        event_type: "department.created".to_string(),
        stream_id: "hr_events".to_string(),
        aggregate_id: "1".to_string(),
        aggregate_type: "department".to_string(),
    };

    let inserted_1 = bookkeeping::insert_processed_event(&pool, &ev).await?;
    assert!(inserted_1, "expected first ledger insert to create row");

    let inserted_2 = bookkeeping::insert_processed_event(&pool, &ev).await?;
    assert!(
        !inserted_2,
        "expected second ledger insert to be deduped (no second row created)"
    );

    assert!(bookkeeping::processed_event_exists(&pool, &ev.event_id).await?);

    Ok(())
}

#[tokio::test]
async fn sync_offset_upsert_keeps_latest_id() -> Result<()> {
    let url = match std::env::var(hrs_db::ENV_REPLICA_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: HRS_REPLICA_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    hrs_db::migrate_replica(&pool).await?;

    let stream = format!("hr_events_{}", Uuid::new_v4().simple());

    assert_eq!(bookkeeping::last_sync_offset(&pool, &stream).await?, None);

    bookkeeping::upsert_sync_offset(&pool, &stream, "100-0").await?;
    bookkeeping::upsert_sync_offset(&pool, &stream, "105-0").await?;

    let last = bookkeeping::last_sync_offset(&pool, &stream).await?;
    assert_eq!(last.as_deref(), Some("105-0"));

    Ok(())
}
