//! Consumer bookkeeping: idempotency ledger, offset hints, diagnostics.
//!
//! processed_events is the sole dedup boundary for the pipeline. sync_logs
//! and event_errors are append-only diagnostics and are never read back by
//! the pipeline itself.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::is_unique_violation;

/// Maximum error-message length recorded to sync_logs.
pub const SYNC_LOG_MESSAGE_MAX: usize = 1000;

/// Prefix of the message kept inside the sync_logs action column.
const ACTION_MESSAGE_MAX: usize = 150;

#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    pub event_id: String,
    pub event_type: String,
    pub stream_id: String,
    pub aggregate_id: String,
    pub aggregate_type: String,
}

/// Insert a ledger row for an event id. Returns false (without error) when
/// the id is already recorded, so callers can treat re-insertion as a
/// no-op.
pub async fn insert_processed_event(
    ex: impl sqlx::PgExecutor<'_>,
    ev: &ProcessedEvent,
) -> Result<bool> {
    let res = sqlx::query(
        r#"
        insert into processed_events (
          event_id, event_type, stream_id, aggregate_id, aggregate_type,
          processed_at, created_at
        ) values (
          $1, $2, $3, $4, $5, now(), now()
        )
        "#,
    )
    .bind(&ev.event_id)
    .bind(&ev.event_type)
    .bind(&ev.stream_id)
    .bind(&ev.aggregate_id)
    .bind(&ev.aggregate_type)
    .execute(ex)
    .await;

    match res {
        Ok(_) => Ok(true),
        Err(e) if is_unique_violation(&e) => Ok(false),
        Err(e) => Err(anyhow::Error::new(e).context("insert_processed_event failed")),
    }
}

pub async fn processed_event_exists(
    ex: impl sqlx::PgExecutor<'_>,
    event_id: &str,
) -> Result<bool> {
    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        "select exists (select 1 from processed_events where event_id = $1)",
    )
    .bind(event_id)
    .fetch_one(ex)
    .await
    .context("processed_event_exists failed")?;

    Ok(exists)
}

/// Upsert the per-stream offset hint with the last acknowledged entry id.
pub async fn upsert_sync_offset(
    ex: impl sqlx::PgExecutor<'_>,
    stream_name: &str,
    last_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into sync_offsets (stream_name, last_id, updated_at)
        values ($1, $2, now())
        on conflict (stream_name)
        do update set last_id = excluded.last_id, updated_at = now()
        "#,
    )
    .bind(stream_name)
    .bind(last_id)
    .execute(ex)
    .await
    .context("upsert_sync_offset failed")?;

    Ok(())
}

pub async fn last_sync_offset(
    ex: impl sqlx::PgExecutor<'_>,
    stream_name: &str,
) -> Result<Option<String>> {
    let row: Option<(String,)> = sqlx::query_as::<_, (String,)>(
        "select last_id from sync_offsets where stream_name = $1",
    )
    .bind(stream_name)
    .fetch_optional(ex)
    .await
    .context("last_sync_offset failed")?;

    Ok(row.map(|(id,)| id))
}

/// Format the sync_logs action column: `<event_type>|<status>|<message prefix>`.
pub fn sync_log_action(event_type: Option<&str>, status: &str, message: &str) -> String {
    let prefix: String = message.chars().take(ACTION_MESSAGE_MAX).collect();
    format!("{}|{}|{}", event_type.unwrap_or("unknown"), status, prefix)
}

pub async fn insert_sync_log(
    ex: impl sqlx::PgExecutor<'_>,
    event_id: &str,
    event_type: Option<&str>,
    status: &str,
    message: &str,
) -> Result<()> {
    let action = sync_log_action(event_type, status, message);

    sqlx::query("insert into sync_logs (event_id, action, created_at) values ($1, $2, now())")
        .bind(event_id)
        .bind(&action)
        .execute(ex)
        .await
        .context("insert_sync_log failed")?;

    Ok(())
}

pub async fn insert_event_error(
    ex: impl sqlx::PgExecutor<'_>,
    event_id: &str,
    payload: &Value,
    error_message: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into event_errors (event_id, payload, error_message, retries, resolved, created_at)
        values ($1, $2, $3, 0, false, now())
        "#,
    )
    .bind(event_id)
    .bind(payload)
    .bind(error_message)
    .execute(ex)
    .await
    .context("insert_event_error failed")?;

    Ok(())
}
