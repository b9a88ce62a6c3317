//! Deterministic in-memory broker.
//!
//! Reproduces the Redis Streams consumer-group read semantics the pipeline
//! depends on: live reads (`>`) deliver never-delivered entries at the
//! group cursor and record them in the consumer's pending-entries list;
//! explicit-id and `0` reads serve only that consumer's pending entries;
//! ack removes an entry from the PEL. No randomness, no I/O; entry ids
//! are sequential `<n>-0` values.

use std::collections::{BTreeMap, HashMap};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::{
    Broker, CreateGroupOutcome, GroupSetupError, ReadFrom, StreamInfo, StreamMessage,
};

type EntryId = (u64, u64);

fn parse_id(s: &str) -> Option<EntryId> {
    if s == "0" {
        return Some((0, 0));
    }
    match s.split_once('-') {
        Some((ms, seq)) => Some((ms.parse().ok()?, seq.parse().ok()?)),
        None => Some((s.parse().ok()?, 0)),
    }
}

fn format_id(id: EntryId) -> String {
    format!("{}-{}", id.0, id.1)
}

struct Entry {
    id: EntryId,
    fields: Vec<(String, String)>,
}

struct Group {
    last_delivered: EntryId,
    /// entry id -> owning consumer identity
    pending: BTreeMap<EntryId, String>,
}

#[derive(Default)]
struct Stream {
    entries: Vec<Entry>,
    groups: HashMap<String, Group>,
}

pub struct MemoryBroker {
    streams: HashMap<String, Stream>,
    next_seq: u64,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Entry ids start at 1-0 so a group created at id 0 sees every entry.
    pub fn new() -> Self {
        Self {
            streams: HashMap::new(),
            next_seq: 1,
        }
    }

    fn stream_mut(&mut self, stream: &str) -> Option<&mut Stream> {
        self.streams.get_mut(stream)
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn append(&mut self, stream: &str, fields: &[(String, String)]) -> Result<String> {
        let id = (self.next_seq, 0);
        self.next_seq += 1;

        let entry = Entry {
            id,
            fields: fields.to_vec(),
        };
        self.streams.entry(stream.to_string()).or_default().entries.push(entry);

        Ok(format_id(id))
    }

    async fn create_group(
        &mut self,
        stream: &str,
        group: &str,
        start_id: &str,
        mkstream: bool,
    ) -> Result<CreateGroupOutcome, GroupSetupError> {
        if !mkstream && !self.streams.contains_key(stream) {
            return Err(GroupSetupError::NoSuchStream(stream.to_string()));
        }

        let st = self.streams.entry(stream.to_string()).or_default();
        if st.groups.contains_key(group) {
            return Ok(CreateGroupOutcome::AlreadyExists);
        }

        let last_delivered = if start_id == "$" {
            st.entries.last().map(|e| e.id).unwrap_or((0, 0))
        } else {
            parse_id(start_id)
                .ok_or_else(|| GroupSetupError::Other(anyhow!("bad start id: {start_id}")))?
        };

        st.groups.insert(
            group.to_string(),
            Group {
                last_delivered,
                pending: BTreeMap::new(),
            },
        );

        Ok(CreateGroupOutcome::Created)
    }

    async fn destroy_group(&mut self, stream: &str, group: &str) -> Result<()> {
        if let Some(st) = self.stream_mut(stream) {
            st.groups.remove(group);
        }
        Ok(())
    }

    async fn stream_info(&mut self, stream: &str) -> Result<StreamInfo> {
        let st = self
            .streams
            .get(stream)
            .ok_or_else(|| anyhow!("no such key: {stream}"))?;

        Ok(StreamInfo {
            length: st.entries.len() as i64,
            first_entry_id: st.entries.first().map(|e| format_id(e.id)),
            last_entry_id: st.entries.last().map(|e| format_id(e.id)),
        })
    }

    async fn pending_count(&mut self, stream: &str, group: &str) -> Result<i64> {
        let st = self
            .streams
            .get(stream)
            .ok_or_else(|| anyhow!("no such key: {stream}"))?;
        let g = st
            .groups
            .get(group)
            .ok_or_else(|| anyhow!("no such group: {group}"))?;

        Ok(g.pending.len() as i64)
    }

    async fn read_group(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        from: ReadFrom,
        count: usize,
        _block_ms: Option<u64>,
    ) -> Result<Vec<StreamMessage>> {
        let st = self
            .streams
            .get_mut(stream)
            .ok_or_else(|| anyhow!("no such key: {stream}"))?;
        // Split the borrow: entries are read while the group is mutated.
        let Stream { entries, groups } = st;
        let g = groups
            .get_mut(group)
            .ok_or_else(|| anyhow!("no such group: {group}"))?;

        match from {
            ReadFrom::New => {
                let cursor = g.last_delivered;
                let mut out = Vec::new();
                for entry in entries.iter().filter(|e| e.id > cursor).take(count) {
                    g.pending.insert(entry.id, consumer.to_string());
                    g.last_delivered = entry.id;
                    out.push(StreamMessage {
                        id: format_id(entry.id),
                        fields: entry.fields.clone(),
                    });
                }
                Ok(out)
            }
            ReadFrom::Explicit(_) | ReadFrom::OwnPending => {
                let cursor = match &from {
                    ReadFrom::Explicit(id) => {
                        parse_id(id).ok_or_else(|| anyhow!("bad entry id: {id}"))?
                    }
                    _ => (0, 0),
                };

                let ids: Vec<EntryId> = g
                    .pending
                    .iter()
                    .filter(|(id, owner)| **id > cursor && owner.as_str() == consumer)
                    .map(|(id, _)| *id)
                    .take(count)
                    .collect();

                let mut out = Vec::new();
                for id in ids {
                    if let Some(entry) = entries.iter().find(|e| e.id == id) {
                        out.push(StreamMessage {
                            id: format_id(id),
                            fields: entry.fields.clone(),
                        });
                    }
                }
                Ok(out)
            }
        }
    }

    async fn ack(&mut self, stream: &str, group: &str, id: &str) -> Result<i64> {
        let parsed = parse_id(id).ok_or_else(|| anyhow!("bad entry id: {id}"))?;

        let removed = self
            .streams
            .get_mut(stream)
            .and_then(|st| st.groups.get_mut(group))
            .map(|g| g.pending.remove(&parsed).is_some())
            .unwrap_or(false);

        Ok(if removed { 1 } else { 0 })
    }
}
