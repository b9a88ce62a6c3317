//! Stream-entry wire format.
//!
//! Entries are flat string field maps mirroring the outbox record. The
//! relay writes [`EntryFields`]; the consumer decodes a delivered message
//! into an [`EventEnvelope`] without failing on missing fields; the
//! dispatcher decides what each absence means.

use crate::StreamMessage;

pub const EVENT_ID: &str = "event_id";
pub const EVENT_TYPE: &str = "event_type";
pub const AGGREGATE_TYPE: &str = "aggregate_type";
pub const AGGREGATE_ID: &str = "aggregate_id";
pub const VERSION: &str = "version";
pub const PAYLOAD: &str = "payload";
pub const CREATED_AT: &str = "created_at";

/// Fields of a new stream entry, in wire order.
#[derive(Debug, Clone)]
pub struct EntryFields {
    pub event_id: String,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub version: String,
    pub payload: String,
    pub created_at: String,
}

impl EntryFields {
    pub fn into_vec(self) -> Vec<(String, String)> {
        vec![
            (EVENT_ID.to_string(), self.event_id),
            (EVENT_TYPE.to_string(), self.event_type),
            (AGGREGATE_TYPE.to_string(), self.aggregate_type),
            (AGGREGATE_ID.to_string(), self.aggregate_id),
            (VERSION.to_string(), self.version),
            (PAYLOAD.to_string(), self.payload),
            (CREATED_AT.to_string(), self.created_at),
        ]
    }
}

/// A delivered entry, decoded field-by-field. Every field is optional;
/// upstream producers outside this repo may omit any of them.
#[derive(Debug, Clone, Default)]
pub struct EventEnvelope {
    pub event_id: Option<String>,
    pub event_type: Option<String>,
    pub aggregate_type: Option<String>,
    pub aggregate_id: Option<String>,
    pub version: Option<String>,
    pub payload: Option<String>,
    pub created_at: Option<String>,
}

impl EventEnvelope {
    pub fn from_message(msg: &StreamMessage) -> Self {
        Self {
            event_id: msg.field(EVENT_ID).map(str::to_string),
            event_type: msg.field(EVENT_TYPE).map(str::to_string),
            aggregate_type: msg.field(AGGREGATE_TYPE).map(str::to_string),
            aggregate_id: msg.field(AGGREGATE_ID).map(str::to_string),
            version: msg.field(VERSION).map(str::to_string),
            payload: msg.field(PAYLOAD).map(str::to_string),
            created_at: msg.field(CREATED_AT).map(str::to_string),
        }
    }
}
