//! Broker contract for the hrsync pipeline.
//!
//! The pipeline treats the stream broker as an ordered, durable,
//! consumer-group-capable append log with a fixed command surface:
//! append, group create/destroy, stream/pending inspection, group reads
//! (explicit id, own-pending, live tail) and per-entry acknowledgment.
//!
//! Two implementations ship: [`RedisBroker`] against Redis Streams, and
//! [`MemoryBroker`], a deterministic in-memory rendition of the same
//! semantics used by tests and fault-injection harnesses.

use anyhow::Result;
use async_trait::async_trait;

pub mod envelope;
pub mod memory;
pub mod redis_broker;

pub use envelope::{EntryFields, EventEnvelope};
pub use memory::MemoryBroker;
pub use redis_broker::RedisBroker;

/// One entry as delivered by a group read.
#[derive(Debug, Clone)]
pub struct StreamMessage {
    /// Broker-assigned entry id (e.g. "1234567890-0").
    pub id: String,
    /// Flat string field map in wire order.
    pub fields: Vec<(String, String)>,
}

impl StreamMessage {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Where a group read starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadFrom {
    /// Explicit entry id: serves this consumer's already-delivered entries
    /// with ids greater than the cursor.
    Explicit(String),
    /// This consumer's pending-entries list from the beginning (id `0`).
    OwnPending,
    /// New, never-delivered entries (`>`).
    New,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateGroupOutcome {
    Created,
    AlreadyExists,
}

/// Consumer-group creation failures the bootstrap has to branch on.
#[derive(Debug, thiserror::Error)]
pub enum GroupSetupError {
    #[error("stream does not exist: {0}")]
    NoSuchStream(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Default)]
pub struct StreamInfo {
    pub length: i64,
    pub first_entry_id: Option<String>,
    pub last_entry_id: Option<String>,
}

/// The fixed broker command contract.
#[async_trait]
pub trait Broker: Send {
    /// Append an entry; returns the broker-assigned id.
    async fn append(&mut self, stream: &str, fields: &[(String, String)]) -> Result<String>;

    async fn create_group(
        &mut self,
        stream: &str,
        group: &str,
        start_id: &str,
        mkstream: bool,
    ) -> Result<CreateGroupOutcome, GroupSetupError>;

    async fn destroy_group(&mut self, stream: &str, group: &str) -> Result<()>;

    async fn stream_info(&mut self, stream: &str) -> Result<StreamInfo>;

    /// Group-wide pending-entry count across all consumers.
    async fn pending_count(&mut self, stream: &str, group: &str) -> Result<i64>;

    async fn read_group(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        from: ReadFrom,
        count: usize,
        block_ms: Option<u64>,
    ) -> Result<Vec<StreamMessage>>;

    /// Acknowledge one entry; returns the number of entries removed from
    /// the pending list (0 when the id was not pending).
    async fn ack(&mut self, stream: &str, group: &str, id: &str) -> Result<i64>;
}
