//! Redis Streams implementation of the broker contract.
//!
//! Uses a multiplexed async connection; stream commands the high-level
//! API does not cover go through the raw command builder.

use anyhow::{Context, Result};
use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::streams::{
    StreamInfoStreamReply, StreamPendingReply, StreamReadOptions, StreamReadReply,
};
use redis::{AsyncCommands, Client};
use tracing::{debug, info};

use crate::{
    Broker, CreateGroupOutcome, GroupSetupError, ReadFrom, StreamInfo, StreamMessage,
};

pub struct RedisBroker {
    client: Client,
    conn: MultiplexedConnection,
}

impl RedisBroker {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).context("invalid Redis URL")?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .context("failed to connect to Redis")?;

        Ok(Self { client, conn })
    }

    /// Re-establish the multiplexed connection after a transport error.
    pub async fn reconnect(&mut self) -> Result<()> {
        info!("reconnecting to Redis");
        self.conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("failed to reconnect to Redis")?;
        Ok(())
    }
}

#[async_trait]
impl Broker for RedisBroker {
    async fn append(&mut self, stream: &str, fields: &[(String, String)]) -> Result<String> {
        let mut cmd = redis::cmd("XADD");
        cmd.arg(stream).arg("*");
        for (k, v) in fields {
            cmd.arg(k).arg(v);
        }

        let id: String = cmd
            .query_async(&mut self.conn)
            .await
            .context("XADD failed")?;

        debug!(stream = %stream, entry_id = %id, "appended stream entry");
        Ok(id)
    }

    async fn create_group(
        &mut self,
        stream: &str,
        group: &str,
        start_id: &str,
        mkstream: bool,
    ) -> Result<CreateGroupOutcome, GroupSetupError> {
        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE").arg(stream).arg(group).arg(start_id);
        if mkstream {
            cmd.arg("MKSTREAM");
        }

        let res: redis::RedisResult<()> = cmd.query_async(&mut self.conn).await;
        match res {
            Ok(()) => Ok(CreateGroupOutcome::Created),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                Ok(CreateGroupOutcome::AlreadyExists)
            }
            Err(e) if e.to_string().contains("no such key") => {
                Err(GroupSetupError::NoSuchStream(stream.to_string()))
            }
            Err(e) => Err(GroupSetupError::Other(
                anyhow::Error::new(e).context("XGROUP CREATE failed"),
            )),
        }
    }

    async fn destroy_group(&mut self, stream: &str, group: &str) -> Result<()> {
        let _: i64 = redis::cmd("XGROUP")
            .arg("DESTROY")
            .arg(stream)
            .arg(group)
            .query_async(&mut self.conn)
            .await
            .context("XGROUP DESTROY failed")?;

        Ok(())
    }

    async fn stream_info(&mut self, stream: &str) -> Result<StreamInfo> {
        let reply: StreamInfoStreamReply = self
            .conn
            .xinfo_stream(stream)
            .await
            .context("XINFO STREAM failed")?;

        let non_empty = |id: String| if id.is_empty() { None } else { Some(id) };

        Ok(StreamInfo {
            length: reply.length as i64,
            first_entry_id: non_empty(reply.first_entry.id),
            last_entry_id: non_empty(reply.last_entry.id),
        })
    }

    async fn pending_count(&mut self, stream: &str, group: &str) -> Result<i64> {
        let reply: StreamPendingReply = self
            .conn
            .xpending(stream, group)
            .await
            .context("XPENDING failed")?;

        Ok(match reply {
            StreamPendingReply::Empty => 0,
            StreamPendingReply::Data(data) => data.count as i64,
        })
    }

    async fn read_group(
        &mut self,
        stream: &str,
        group: &str,
        consumer: &str,
        from: ReadFrom,
        count: usize,
        block_ms: Option<u64>,
    ) -> Result<Vec<StreamMessage>> {
        let start_id = match &from {
            ReadFrom::Explicit(id) => id.clone(),
            ReadFrom::OwnPending => "0".to_string(),
            ReadFrom::New => ">".to_string(),
        };

        let mut opts = StreamReadOptions::default()
            .group(group, consumer)
            .count(count);
        if let Some(ms) = block_ms {
            opts = opts.block(ms as usize);
        }

        let value: redis::Value = self
            .conn
            .xread_options(&[stream], &[start_id.as_str()], &opts)
            .await
            .context("XREADGROUP failed")?;

        // Block timeout with no entries comes back as nil.
        if let redis::Value::Nil = value {
            return Ok(Vec::new());
        }

        let reply: StreamReadReply =
            redis::from_redis_value(&value).context("unexpected XREADGROUP reply shape")?;

        let mut out = Vec::new();
        for key in reply.keys {
            for entry in key.ids {
                let mut fields = Vec::with_capacity(entry.map.len());
                for (name, value) in entry.map {
                    let text: String = redis::from_redis_value(&value).unwrap_or_default();
                    fields.push((name, text));
                }
                out.push(StreamMessage {
                    id: entry.id,
                    fields,
                });
            }
        }

        Ok(out)
    }

    async fn ack(&mut self, stream: &str, group: &str, id: &str) -> Result<i64> {
        let removed: i64 = self
            .conn
            .xack(stream, group, &[id])
            .await
            .context("XACK failed")?;

        if removed != 1 {
            debug!(entry_id = %id, removed, "XACK did not remove a pending entry");
        }

        Ok(removed)
    }
}
