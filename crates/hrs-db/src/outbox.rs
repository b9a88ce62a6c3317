//! Origin-side outbox access.
//!
//! The CRUD layer enqueues rows in the same transaction as its domain
//! mutation; the relay is the only component that reads and mutates them
//! afterwards. `is_processed` transitions false→true exactly once and rows
//! are never deleted here.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct OutboxRow {
    pub id: i64,
    pub event_id: String,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: i64,
    pub version: i32,
    pub payload: Value,
    pub created_at: Option<DateTime<Utc>>,
}

/// Fetch one page of unprocessed rows, keyset-paginated by primary id.
pub async fn fetch_unprocessed_page(
    pool: &PgPool,
    after_id: i64,
    limit: i64,
) -> Result<Vec<OutboxRow>> {
    let rows = sqlx::query(
        r#"
        select id, event_id, event_type, aggregate_type, aggregate_id,
               version, payload, created_at
        from outbox
        where is_processed = false
          and id > $1
        order by id
        limit $2
        "#,
    )
    .bind(after_id)
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("fetch_unprocessed_page failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        out.push(OutboxRow {
            id: row.try_get("id")?,
            event_id: row.try_get("event_id")?,
            event_type: row.try_get("event_type")?,
            aggregate_type: row.try_get("aggregate_type")?,
            aggregate_id: row.try_get("aggregate_id")?,
            version: row.try_get("version")?,
            payload: row.try_get("payload")?,
            created_at: row.try_get("created_at")?,
        });
    }
    Ok(out)
}

/// Flip a row to processed inside the caller's page transaction.
pub async fn mark_processed(ex: impl sqlx::PgExecutor<'_>, id: i64) -> Result<()> {
    sqlx::query(
        r#"
        update outbox
        set is_processed = true,
            processed_at = now()
        where id = $1
        "#,
    )
    .bind(id)
    .execute(ex)
    .await
    .context("mark_processed failed")?;

    Ok(())
}

/// A new outbox record as the CRUD layer writes it. This is the only
/// contract between the origin domain layer and the relay.
#[derive(Debug, Clone)]
pub struct NewOutboxEvent {
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: i64,
    pub version: i32,
    pub payload: Value,
}

/// Enqueue an outbox record. Intended for the origin domain layer (and for
/// tests seeding a pipeline); generates the event_id at write time.
pub async fn enqueue(ex: impl sqlx::PgExecutor<'_>, ev: &NewOutboxEvent) -> Result<String> {
    let event_id = Uuid::new_v4().to_string();

    sqlx::query(
        r#"
        insert into outbox (
          event_id, event_type, aggregate_type, aggregate_id, version,
          payload, is_processed, created_at
        ) values (
          $1, $2, $3, $4, $5, $6, false, now()
        )
        "#,
    )
    .bind(&event_id)
    .bind(&ev.event_type)
    .bind(&ev.aggregate_type)
    .bind(ev.aggregate_id)
    .bind(ev.version)
    .bind(&ev.payload)
    .execute(ex)
    .await
    .context("outbox enqueue failed")?;

    Ok(event_id)
}

/// Count rows still waiting for the relay.
pub async fn count_unprocessed(pool: &PgPool) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as::<_, (i64,)>(
        "select count(*)::bigint from outbox where is_processed = false",
    )
    .fetch_one(pool)
    .await
    .context("count_unprocessed failed")?;

    Ok(n)
}
