//! Consumer-group bootstrap and recovery.
//!
//! On startup the group is created at id 0 (auto-creating the stream). If
//! it already exists the stream and pending counts decide between a
//! healthy resume and the orphaned case: a cursor pointing past existing
//! history with nothing claimed, which happens after external group
//! deletion or recreation. Recovery repositions the group at the last
//! acknowledged offset hint, falling back to the stream tail when even the
//! hint is unavailable. Only the initial creation can fail fatally; every
//! recovery misstep degrades to a healthy steady-state resume.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{debug, error, info, warn};

use hrs_db::bookkeeping;
use hrs_stream::{Broker, CreateGroupOutcome, GroupSetupError};

use crate::scheduler::ReadPhase;

/// Source of the advisory last-acknowledged-id hint. The broker's
/// pending-entries list stays the authoritative delivery cursor; this is
/// consulted only when that cursor has been lost.
#[async_trait]
pub trait OffsetStore: Send + Sync {
    async fn last_acked_id(&self, stream: &str) -> Result<Option<String>>;
}

pub struct PgOffsetStore {
    pool: PgPool,
}

impl PgOffsetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OffsetStore for PgOffsetStore {
    async fn last_acked_id(&self, stream: &str) -> Result<Option<String>> {
        bookkeeping::last_sync_offset(&self.pool, stream).await
    }
}

#[derive(Debug, Clone)]
pub struct Bootstrap {
    /// True when the group was created (or recreated) by this process and
    /// a one-time historical replay should run first.
    pub fresh: bool,
    pub historical_cursor: Option<String>,
}

impl Bootstrap {
    pub fn initial_phase(&self) -> ReadPhase {
        match (&self.historical_cursor, self.fresh) {
            (Some(cursor), true) => ReadPhase::Historical {
                cursor: cursor.clone(),
            },
            _ => ReadPhase::Steady,
        }
    }
}

pub async fn bootstrap(
    broker: &mut dyn Broker,
    offsets: &dyn OffsetStore,
    stream: &str,
    group: &str,
) -> Result<Bootstrap> {
    match broker.create_group(stream, group, "0", true).await {
        Ok(CreateGroupOutcome::Created) => {
            info!(stream = %stream, group = %group, "created consumer group");

            let cursor = match broker.stream_info(stream).await {
                Ok(info) => {
                    if info.first_entry_id.is_none() {
                        debug!(stream = %stream, "stream empty; nothing to replay");
                    }
                    info.first_entry_id
                }
                Err(e) => {
                    warn!(error = %e, "could not inspect stream; skipping historical replay");
                    None
                }
            };

            Ok(Bootstrap {
                fresh: true,
                historical_cursor: cursor,
            })
        }

        Ok(CreateGroupOutcome::AlreadyExists) => {
            debug!(stream = %stream, group = %group, "consumer group already exists");
            Ok(recover_existing(broker, offsets, stream, group).await)
        }

        Err(GroupSetupError::NoSuchStream(s)) => {
            error!(stream = %s, "stream does not exist and cannot be created");
            Err(anyhow!("fatal: stream {s} does not exist"))
        }

        Err(GroupSetupError::Other(e)) => {
            error!(error = %e, "consumer group setup failed");
            Err(e.context("consumer group setup failed"))
        }
    }
}

/// Inspect an existing group. Inspection and recovery failures are logged
/// and degrade to a healthy steady-state resume; the own-pending and
/// live phases still make progress.
async fn recover_existing(
    broker: &mut dyn Broker,
    offsets: &dyn OffsetStore,
    stream: &str,
    group: &str,
) -> Bootstrap {
    let healthy = Bootstrap {
        fresh: false,
        historical_cursor: None,
    };

    let info = match broker.stream_info(stream).await {
        Ok(info) => info,
        Err(e) => {
            warn!(error = %e, "could not inspect stream state");
            return healthy;
        }
    };

    if info.length == 0 {
        debug!(stream = %stream, "stream is empty");
        return healthy;
    }

    let pending = match broker.pending_count(stream, group).await {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "could not inspect pending entries");
            return healthy;
        }
    };

    if pending > 0 {
        info!(pending, "pending backlog present; it will drain before live reads");
        return healthy;
    }

    // Orphaned: history exists but the group claims none of it.
    let start_id = match offsets.last_acked_id(stream).await {
        Ok(Some(id)) => id,
        Ok(None) => "0".to_string(),
        Err(e) => {
            // Accepting loss of any backlog between the lost offset and the
            // tail: without the hint there is no better anchor.
            warn!(error = %e, "offset lookup failed; falling back to stream tail");
            info.last_entry_id.clone().unwrap_or_else(|| "0".to_string())
        }
    };

    info!(
        stream = %stream,
        group = %group,
        start_id = %start_id,
        "orphaned consumer group; recreating at recovered offset"
    );

    if let Err(e) = broker.destroy_group(stream, group).await {
        warn!(error = %e, "could not destroy orphaned group");
        return healthy;
    }

    match broker.create_group(stream, group, &start_id, false).await {
        Ok(_) => Bootstrap {
            fresh: true,
            historical_cursor: Some(start_id),
        },
        Err(e) => {
            warn!(error = %e, "could not recreate consumer group");
            healthy
        }
    }
}
