//! Process configuration for the hrsync pipeline.
//!
//! Everything is sourced from environment variables so the relay and the
//! consumer can be pointed at different infrastructure without rebuilds.
//! Database URLs are owned by `hrs-db` (same split as the connection
//! helpers); this crate carries the broker and pipeline knobs.

pub const ENV_REDIS_URL: &str = "HRS_REDIS_URL";
pub const ENV_STREAM_NAME: &str = "HRS_STREAM_NAME";
pub const ENV_CONSUMER_GROUP: &str = "HRS_CONSUMER_GROUP";
pub const ENV_CONSUMER_NAME: &str = "HRS_CONSUMER_NAME";
pub const ENV_BLOCK_MS: &str = "HRS_BLOCK_MS";
pub const ENV_CHUNK_SIZE: &str = "HRS_CHUNK_SIZE";

pub const DEFAULT_STREAM_NAME: &str = "hr_events";
pub const DEFAULT_CONSUMER_GROUP: &str = "hr_replica";
pub const DEFAULT_CONSUMER_NAME: &str = "consumer-1";
pub const DEFAULT_BLOCK_MS: u64 = 5000;
pub const DEFAULT_CHUNK_SIZE: i64 = 100;

/// Pipeline configuration shared by the relay and the consumer.
#[derive(Debug, Clone)]
pub struct Config {
    /// Redis connection URL.
    pub redis_url: String,

    /// Stream key the relay appends to and the consumer group reads from.
    pub stream_name: String,

    /// Consumer group name.
    pub consumer_group: String,

    /// This consumer's identity. Must stay stable across restarts: the
    /// own-pending recovery phase only reclaims entries delivered to the
    /// same identity.
    pub consumer_name: String,

    /// Live-tail XREADGROUP block timeout in milliseconds.
    pub block_ms: u64,

    /// Relay page size (rows per outbox transaction).
    pub chunk_size: i64,
}

impl Config {
    /// Assemble configuration from the environment, falling back to
    /// defaults for everything optional. Call [`bootstrap_dotenv`] first
    /// in binaries so a local `.env` is honored.
    pub fn from_env() -> Self {
        let redis_url = std::env::var(ENV_REDIS_URL)
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

        let stream_name = std::env::var(ENV_STREAM_NAME)
            .unwrap_or_else(|_| DEFAULT_STREAM_NAME.to_string());

        let consumer_group = std::env::var(ENV_CONSUMER_GROUP)
            .unwrap_or_else(|_| DEFAULT_CONSUMER_GROUP.to_string());

        let consumer_name = std::env::var(ENV_CONSUMER_NAME)
            .unwrap_or_else(|_| DEFAULT_CONSUMER_NAME.to_string());

        let block_ms: u64 = std::env::var(ENV_BLOCK_MS)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_BLOCK_MS);

        let chunk_size: i64 = std::env::var(ENV_CHUNK_SIZE)
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_CHUNK_SIZE);

        Self {
            redis_url,
            stream_name,
            consumer_group,
            consumer_name,
            block_ms,
            chunk_size,
        }
    }
}

/// Best-effort `.env` loading for dev shells. Missing file is not an error.
pub fn bootstrap_dotenv() {
    let _ = dotenvy::dotenv();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied_when_env_absent() {
        let cfg = Config::from_env();
        assert_eq!(cfg.stream_name, DEFAULT_STREAM_NAME);
        assert_eq!(cfg.consumer_group, DEFAULT_CONSUMER_GROUP);
        assert_eq!(cfg.block_ms, DEFAULT_BLOCK_MS);
        assert_eq!(cfg.chunk_size, DEFAULT_CHUNK_SIZE);
    }
}
