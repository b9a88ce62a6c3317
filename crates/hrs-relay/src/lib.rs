//! Outbox relay: drains unpublished outbox rows into the broker stream.
//!
//! One storage transaction per page. Within a page, each row is appended
//! to the stream first and flipped to processed second; a failure anywhere
//! rolls the whole page back and aborts the publish call. Entries already
//! appended for the failed page stay in the broker; the next invocation
//! re-appends them, and the consumer's idempotency ledger absorbs the
//! duplicates. That is the intended at-least-once contract, not a defect
//! to repair broker-side.

use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sqlx::PgPool;
use tracing::{debug, error, info};

use hrs_db::outbox::{self, OutboxRow};
use hrs_stream::{Broker, EntryFields};

/// Timestamp format stamped onto stream entries at publish time.
const ENTRY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone)]
pub struct PublishSummary {
    pub processed: u64,
    pub elapsed: Duration,
}

pub struct OutboxRelay {
    origin: PgPool,
    stream_name: String,
}

impl OutboxRelay {
    pub fn new(origin: PgPool, stream_name: impl Into<String>) -> Self {
        Self {
            origin,
            stream_name: stream_name.into(),
        }
    }

    /// Drain every unprocessed outbox row in id order, `chunk_size` rows
    /// per page transaction. An error aborts the whole call without
    /// touching further pages; the caller retries the entire publish on
    /// its own schedule. An empty outbox is a success with zero processed.
    pub async fn publish(&self, broker: &mut dyn Broker, chunk_size: i64) -> Result<PublishSummary> {
        let started = Instant::now();
        let mut processed: u64 = 0;
        let mut after_id: i64 = 0;

        loop {
            let page = outbox::fetch_unprocessed_page(&self.origin, after_id, chunk_size)
                .await
                .context("outbox page fetch failed")?;

            if page.is_empty() {
                break;
            }

            self.publish_page(broker, &page).await.map_err(|e| {
                error!(error = %e, after_id, "outbox page aborted; page transaction rolled back");
                e
            })?;

            processed += page.len() as u64;
            after_id = page.last().map(|row| row.id).unwrap_or(after_id);
        }

        let summary = PublishSummary {
            processed,
            elapsed: started.elapsed(),
        };
        info!(
            processed = summary.processed,
            elapsed_secs = summary.elapsed.as_secs_f64(),
            "outbox publish complete"
        );

        Ok(summary)
    }

    /// Publish one page under one origin transaction. Dropping the
    /// transaction on the error path rolls back every processed-flag flip
    /// of the page, including rows whose append already succeeded.
    async fn publish_page(&self, broker: &mut dyn Broker, page: &[OutboxRow]) -> Result<()> {
        let mut tx = self
            .origin
            .begin()
            .await
            .context("begin outbox page transaction failed")?;

        for row in page {
            let entry_id = broker
                .append(&self.stream_name, &entry_fields(row).into_vec())
                .await
                .with_context(|| format!("stream append failed for event {}", row.event_id))?;

            if entry_id.is_empty() {
                bail!("broker returned empty entry id for event {}", row.event_id);
            }

            outbox::mark_processed(&mut *tx, row.id).await?;

            debug!(
                event_id = %row.event_id,
                event_type = %row.event_type,
                entry_id = %entry_id,
                "outbox row published"
            );
        }

        tx.commit()
            .await
            .context("commit outbox page transaction failed")?;

        Ok(())
    }
}

fn entry_fields(row: &OutboxRow) -> EntryFields {
    EntryFields {
        event_id: row.event_id.clone(),
        event_type: row.event_type.clone(),
        aggregate_type: row.aggregate_type.clone(),
        aggregate_id: row.aggregate_id.to_string(),
        version: row.version.to_string(),
        payload: row.payload.to_string(),
        created_at: Utc::now().format(ENTRY_TIMESTAMP_FORMAT).to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn entry_fields_mirror_outbox_row() {
        let row = OutboxRow {
            id: 42,
            event_id: "evt-1".to_string(),
            event_type: "department.created".to_string(),
            aggregate_type: "department".to_string(),
            aggregate_id: 7,
            version: 3,
            payload: json!({"id": 7, "name": "Payroll"}),
            created_at: None,
        };

        let fields = entry_fields(&row);
        assert_eq!(fields.event_id, "evt-1");
        assert_eq!(fields.aggregate_id, "7");
        assert_eq!(fields.version, "3");
        assert!(fields.payload.contains("Payroll"));
        // Stamped at publish time, wire format without sub-second noise.
        assert_eq!(fields.created_at.len(), "2026-01-01 00:00:00".len());
    }
}
