//! Stream consumer: bootstrap, read scheduling, idempotent dispatch,
//! versioned reconciliation into the replica store.
//!
//! One sequential control flow: one broker batch at a time, one message
//! at a time, one replica transaction per message. Horizontal scale comes
//! from running more instances against the same group, not from threads
//! here.

use std::time::Duration;

use anyhow::Result;
use sqlx::PgPool;
use tracing::{error, info};

pub mod bootstrap;
pub mod dispatcher;
pub mod handlers;
pub mod payload;
pub mod route;
pub mod scheduler;
pub mod version;

pub use bootstrap::{Bootstrap, OffsetStore, PgOffsetStore};
pub use dispatcher::{Dispatcher, Disposition};
pub use scheduler::ReadPhase;

use hrs_stream::Broker;

/// Pause after an iteration or per-message failure before continuing.
const FAILURE_PAUSE: Duration = Duration::from_secs(1);

pub struct Consumer {
    replica: PgPool,
    stream_name: String,
    group: String,
    consumer_name: String,
    block_ms: u64,
    dispatcher: Dispatcher,
}

impl Consumer {
    pub fn new(
        replica: PgPool,
        stream_name: impl Into<String>,
        group: impl Into<String>,
        consumer_name: impl Into<String>,
        block_ms: u64,
    ) -> Self {
        let stream_name = stream_name.into();
        let group = group.into();
        let dispatcher = Dispatcher::new(replica.clone(), stream_name.clone(), group.clone());

        Self {
            replica,
            stream_name,
            group,
            consumer_name: consumer_name.into(),
            block_ms,
            dispatcher,
        }
    }

    /// Bootstrap the consumer group and process the stream until the
    /// process is killed. The only error this returns is a fatal
    /// bootstrap failure; everything after that is logged and retried in
    /// place.
    pub async fn run(&self, broker: &mut dyn Broker) -> Result<()> {
        let offsets = PgOffsetStore::new(self.replica.clone());
        let boot =
            bootstrap::bootstrap(broker, &offsets, &self.stream_name, &self.group).await?;

        let mut phase = boot.initial_phase();
        info!(
            stream = %self.stream_name,
            group = %self.group,
            consumer = %self.consumer_name,
            fresh = boot.fresh,
            historical = matches!(phase, ReadPhase::Historical { .. }),
            "consumer active"
        );

        loop {
            let batch = match scheduler::next_batch(
                broker,
                &self.stream_name,
                &self.group,
                &self.consumer_name,
                &mut phase,
                self.block_ms,
            )
            .await
            {
                Ok(batch) => batch,
                Err(e) => {
                    error!(error = %e, "read iteration failed");
                    tokio::time::sleep(FAILURE_PAUSE).await;
                    continue;
                }
            };

            for msg in &batch {
                match self.dispatcher.dispatch(broker, msg).await {
                    Ok(Disposition::Failed(_)) => {
                        // Recorded and left pending; brief pause before the
                        // next message.
                        tokio::time::sleep(FAILURE_PAUSE).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        error!(error = %e, entry_id = %msg.id, "dispatch failed");
                        tokio::time::sleep(FAILURE_PAUSE).await;
                    }
                }
            }
        }
    }
}
