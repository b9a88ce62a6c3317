//! Idempotent per-message dispatch.
//!
//! Each delivered entry moves through a fixed set of dispositions. Poison
//! shapes (missing type, bad JSON, unknown type) are acknowledged and
//! dropped so they can never wedge the group; stale or dangling business
//! state is acknowledged and tombstoned; only handler failures leave the
//! entry pending for redelivery. The ledger check runs before every
//! handler invocation; it is the single mechanism that makes broker
//! redelivery and relay-induced duplication safe.

use anyhow::{Context, Result};
use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use hrs_db::bookkeeping::{self, ProcessedEvent, SYNC_LOG_MESSAGE_MAX};
use hrs_stream::{Broker, EventEnvelope, StreamMessage};

use crate::handlers::{self, ApplyOutcome};
use crate::payload;
use crate::route::EventKind;

/// Terminal state of one dispatched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    /// No event-type field: framing noise, acknowledged without a ledger
    /// entry.
    Malformed,
    /// Payload was not valid JSON: acknowledged, tombstoned.
    Unparsable,
    /// Event id already in the ledger: acknowledged, handler never runs.
    Duplicate,
    /// No handler for the event type: acknowledged, tombstoned.
    Unrouted,
    Applied,
    Skipped(&'static str),
    /// Handler failed; entry stays pending for redelivery.
    Failed(String),
}

pub struct Dispatcher {
    replica: PgPool,
    stream_name: String,
    group: String,
}

impl Dispatcher {
    pub fn new(replica: PgPool, stream_name: impl Into<String>, group: impl Into<String>) -> Self {
        Self {
            replica,
            stream_name: stream_name.into(),
            group: group.into(),
        }
    }

    pub async fn dispatch(
        &self,
        broker: &mut dyn Broker,
        msg: &StreamMessage,
    ) -> Result<Disposition> {
        let envelope = EventEnvelope::from_message(msg);

        let Some(event_type) = envelope.event_type.clone() else {
            warn!(entry_id = %msg.id, "entry has no event_type; acknowledging to avoid reprocessing");
            self.ack(broker, &msg.id).await?;
            return Ok(Disposition::Malformed);
        };

        // The outbox event id is the dedup key; relay-induced duplicates
        // share it across distinct broker entry ids. Fall back to the
        // entry id only when an outside producer omitted the field.
        let ledger_key = envelope
            .event_id
            .clone()
            .unwrap_or_else(|| msg.id.clone());

        let raw_payload = envelope.payload.as_deref().unwrap_or("");
        let parsed: Value = match serde_json::from_str(raw_payload) {
            Ok(v) => v,
            Err(e) => {
                warn!(entry_id = %msg.id, error = %e, "payload is not valid JSON; dropping");
                self.ack(broker, &msg.id).await?;
                self.record_tombstone(&ledger_key, &event_type, &envelope, "0").await;
                return Ok(Disposition::Unparsable);
            }
        };

        let aggregate_id = payload::aggregate_id_of(&parsed);

        if bookkeeping::processed_event_exists(&self.replica, &ledger_key).await? {
            debug!(event_id = %ledger_key, entry_id = %msg.id, "event already processed; acknowledging");
            self.ack(broker, &msg.id).await?;
            return Ok(Disposition::Duplicate);
        }

        let Some(kind) = EventKind::parse(&event_type) else {
            info!(event_type = %event_type, entry_id = %msg.id, "no handler for event type; dropping");
            self.ack(broker, &msg.id).await?;
            self.record_tombstone(&ledger_key, &event_type, &envelope, &aggregate_id)
                .await;
            return Ok(Disposition::Unrouted);
        };

        let mut tx = self
            .replica
            .begin()
            .await
            .context("begin replica transaction failed")?;

        match handlers::apply(&mut tx, kind, &parsed).await {
            Ok(ApplyOutcome::Applied) => {
                let ev = ProcessedEvent {
                    event_id: ledger_key.clone(),
                    event_type: event_type.clone(),
                    stream_id: self.stream_name.clone(),
                    aggregate_id,
                    aggregate_type: envelope
                        .aggregate_type
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                };
                bookkeeping::insert_processed_event(&mut *tx, &ev).await?;
                tx.commit().await.context("commit replica transaction failed")?;

                if let Err(e) = bookkeeping::insert_sync_log(
                    &self.replica,
                    &ledger_key,
                    Some(&event_type),
                    "processed",
                    "event processed successfully",
                )
                .await
                {
                    // Diagnostics only; the event itself succeeded.
                    error!(error = %e, event_id = %ledger_key, "failed to write sync log");
                }

                self.ack(broker, &msg.id).await?;
                self.advance_offset(&msg.id).await;

                debug!(event_id = %ledger_key, event_type = %event_type, "event applied");
                Ok(Disposition::Applied)
            }

            Ok(ApplyOutcome::Skip(reason)) => {
                tx.rollback().await.context("rollback after skip failed")?;

                info!(event_id = %ledger_key, event_type = %event_type, reason, "event skipped");

                self.ack(broker, &msg.id).await?;
                self.advance_offset(&msg.id).await;
                // Tombstone so the same stale message is never reconsidered.
                self.record_tombstone(&ledger_key, &event_type, &envelope, &aggregate_id)
                    .await;

                Ok(Disposition::Skipped(reason))
            }

            Err(e) => {
                if let Err(rb) = tx.rollback().await {
                    error!(error = %rb, "rollback after handler failure also failed");
                }

                let message = format!("{e:#}");
                error!(
                    event_id = %ledger_key,
                    event_type = %event_type,
                    error = %message,
                    "handler failed; entry stays pending for retry"
                );

                let snapshot = json!({
                    "event_id": ledger_key,
                    "event_type": event_type,
                    "stream_id": self.stream_name,
                    "aggregate_id": aggregate_id,
                    "aggregate_type": envelope.aggregate_type,
                    "data": parsed,
                });
                if let Err(log_err) =
                    bookkeeping::insert_event_error(&self.replica, &ledger_key, &snapshot, &message)
                        .await
                {
                    error!(error = %log_err, "failed to record event error");
                }

                let truncated: String = message.chars().take(SYNC_LOG_MESSAGE_MAX).collect();
                if let Err(log_err) = bookkeeping::insert_sync_log(
                    &self.replica,
                    &ledger_key,
                    Some(&event_type),
                    "error",
                    &truncated,
                )
                .await
                {
                    error!(error = %log_err, "failed to write error sync log");
                }

                // Deliberately not acknowledged: the own-pending phase or a
                // restart will redeliver it.
                Ok(Disposition::Failed(message))
            }
        }
    }

    async fn ack(&self, broker: &mut dyn Broker, entry_id: &str) -> Result<()> {
        broker
            .ack(&self.stream_name, &self.group, entry_id)
            .await
            .with_context(|| format!("ack failed for entry {entry_id}"))?;
        Ok(())
    }

    async fn advance_offset(&self, entry_id: &str) {
        if let Err(e) =
            bookkeeping::upsert_sync_offset(&self.replica, &self.stream_name, entry_id).await
        {
            error!(error = %e, entry_id = %entry_id, "failed to advance sync offset");
        }
    }

    async fn record_tombstone(
        &self,
        ledger_key: &str,
        event_type: &str,
        envelope: &EventEnvelope,
        aggregate_id: &str,
    ) {
        let ev = ProcessedEvent {
            event_id: ledger_key.to_string(),
            event_type: event_type.to_string(),
            stream_id: self.stream_name.clone(),
            aggregate_id: aggregate_id.to_string(),
            aggregate_type: envelope
                .aggregate_type
                .clone()
                .unwrap_or_else(|| "unknown".to_string()),
        };

        match bookkeeping::insert_processed_event(&self.replica, &ev).await {
            Ok(true) => {}
            Ok(false) => debug!(event_id = %ledger_key, "event already in processed ledger"),
            Err(e) => error!(error = %e, event_id = %ledger_key, "failed to record tombstone"),
        }
    }
}
