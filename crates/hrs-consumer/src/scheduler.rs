//! Read-phase scheduling.
//!
//! Per loop iteration the phases are tried in strict priority order
//! (historical backlog, then own-pending redelivery, then live tail) and
//! the first
//! that yields messages wins. Phases never mix within one iteration.
//! Historical replay is one-time best-effort: the first empty result or
//! read error retires it for the rest of the run.

use anyhow::Result;
use tracing::{debug, warn};

use hrs_stream::{Broker, ReadFrom, StreamMessage};

pub const HISTORICAL_BATCH: usize = 10;
pub const PENDING_BATCH: usize = 10;
pub const LIVE_BATCH: usize = 1;

/// Explicit scheduler state, threaded through the consumer loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadPhase {
    /// One-time historical catch-up from a tracked cursor.
    Historical { cursor: String },
    /// Own-pending redelivery first, then the blocking live tail.
    Steady,
}

/// Fetch the next batch according to the current phase, mutating the
/// phase in place. A live-tail timeout returns an empty batch, which is a
/// normal no-op iteration.
pub async fn next_batch(
    broker: &mut dyn Broker,
    stream: &str,
    group: &str,
    consumer: &str,
    phase: &mut ReadPhase,
    block_ms: u64,
) -> Result<Vec<StreamMessage>> {
    if let ReadPhase::Historical { cursor } = phase {
        let from = ReadFrom::Explicit(cursor.clone());
        match broker
            .read_group(stream, group, consumer, from, HISTORICAL_BATCH, None)
            .await
        {
            Ok(batch) if !batch.is_empty() => {
                if let Some(last) = batch.last() {
                    debug!(count = batch.len(), cursor = %last.id, "historical batch");
                    *phase = ReadPhase::Historical {
                        cursor: last.id.clone(),
                    };
                }
                return Ok(batch);
            }
            Ok(_) => {
                debug!("historical backlog drained; switching to steady reads");
                *phase = ReadPhase::Steady;
            }
            Err(e) => {
                warn!(error = %e, "historical read failed; switching to steady reads");
                *phase = ReadPhase::Steady;
            }
        }
    }

    let pending = broker
        .read_group(
            stream,
            group,
            consumer,
            ReadFrom::OwnPending,
            PENDING_BATCH,
            None,
        )
        .await?;
    if !pending.is_empty() {
        debug!(count = pending.len(), "own-pending batch");
        return Ok(pending);
    }

    broker
        .read_group(
            stream,
            group,
            consumer,
            ReadFrom::New,
            LIVE_BATCH,
            Some(block_ms),
        )
        .await
}
