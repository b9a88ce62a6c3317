use anyhow::{anyhow, Result};
use async_trait::async_trait;

use hrs_consumer::bootstrap::{bootstrap, OffsetStore};
use hrs_consumer::scheduler::ReadPhase;
use hrs_stream::{
    Broker, CreateGroupOutcome, GroupSetupError, MemoryBroker, ReadFrom, StreamInfo,
    StreamMessage,
};

const STREAM: &str = "hr_events";
const GROUP: &str = "hr_replica";
const CONSUMER: &str = "consumer-1";

fn entry(event_id: &str) -> Vec<(String, String)> {
    vec![("event_id".to_string(), event_id.to_string())]
}

/// Offset hints for tests: a fixed answer or a simulated lookup failure.
struct FixedOffsets {
    last_id: Option<String>,
    fail: bool,
}

impl FixedOffsets {
    fn some(id: &str) -> Self {
        Self {
            last_id: Some(id.to_string()),
            fail: false,
        }
    }

    fn none() -> Self {
        Self {
            last_id: None,
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            last_id: None,
            fail: true,
        }
    }
}

#[async_trait]
impl OffsetStore for FixedOffsets {
    async fn last_acked_id(&self, _stream: &str) -> Result<Option<String>> {
        if self.fail {
            return Err(anyhow!("offset store unavailable"));
        }
        Ok(self.last_id.clone())
    }
}

#[tokio::test]
async fn fresh_group_on_empty_stream_has_no_replay() -> Result<()> {
    let mut broker = MemoryBroker::new();

    let boot = bootstrap(&mut broker, &FixedOffsets::none(), STREAM, GROUP).await?;

    assert!(boot.fresh);
    assert!(boot.historical_cursor.is_none());
    assert_eq!(boot.initial_phase(), ReadPhase::Steady);

    Ok(())
}

#[tokio::test]
async fn fresh_group_with_history_replays_from_first_entry() -> Result<()> {
    let mut broker = MemoryBroker::new();
    let first = broker.append(STREAM, &entry("a")).await?;
    broker.append(STREAM, &entry("b")).await?;

    let boot = bootstrap(&mut broker, &FixedOffsets::none(), STREAM, GROUP).await?;

    assert!(boot.fresh);
    assert_eq!(boot.historical_cursor.as_deref(), Some(first.as_str()));
    assert_eq!(
        boot.initial_phase(),
        ReadPhase::Historical { cursor: first }
    );

    Ok(())
}

#[tokio::test]
async fn existing_group_with_pending_backlog_is_healthy() -> Result<()> {
    let mut broker = MemoryBroker::new();
    broker.create_group(STREAM, GROUP, "0", true).await?;
    broker.append(STREAM, &entry("a")).await?;
    broker.append(STREAM, &entry("b")).await?;

    // Delivered but unacknowledged: crash backlog.
    let delivered = broker
        .read_group(STREAM, GROUP, CONSUMER, ReadFrom::New, 10, None)
        .await?;
    assert_eq!(delivered.len(), 2);

    let boot = bootstrap(&mut broker, &FixedOffsets::none(), STREAM, GROUP).await?;

    assert!(!boot.fresh);
    assert_eq!(boot.initial_phase(), ReadPhase::Steady);
    // The group was not touched: the backlog is still claimable.
    assert_eq!(broker.pending_count(STREAM, GROUP).await?, 2);

    Ok(())
}

#[tokio::test]
async fn existing_group_on_empty_stream_is_healthy() -> Result<()> {
    let mut broker = MemoryBroker::new();
    broker.create_group(STREAM, GROUP, "0", true).await?;

    let boot = bootstrap(&mut broker, &FixedOffsets::none(), STREAM, GROUP).await?;

    assert!(!boot.fresh);
    assert!(boot.historical_cursor.is_none());

    Ok(())
}

#[tokio::test]
async fn orphaned_group_recreated_at_last_acked_offset() -> Result<()> {
    let mut broker = MemoryBroker::new();
    let first = broker.append(STREAM, &entry("a")).await?;
    broker.append(STREAM, &entry("b")).await?;

    // A group that claims nothing while history exists: orphaned.
    broker.create_group(STREAM, GROUP, "0", true).await?;

    let boot = bootstrap(&mut broker, &FixedOffsets::some(&first), STREAM, GROUP).await?;

    assert!(boot.fresh);
    assert_eq!(boot.historical_cursor.as_deref(), Some(first.as_str()));

    // The recreated group sits at the recovered offset: only entries after
    // it are delivered as new.
    let delivered = broker
        .read_group(STREAM, GROUP, CONSUMER, ReadFrom::New, 10, None)
        .await?;
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].field("event_id"), Some("b"));

    Ok(())
}

#[tokio::test]
async fn offset_lookup_failure_falls_back_to_stream_tail() -> Result<()> {
    let mut broker = MemoryBroker::new();
    broker.append(STREAM, &entry("a")).await?;
    let last = broker.append(STREAM, &entry("b")).await?;
    broker.create_group(STREAM, GROUP, "0", true).await?;

    let boot = bootstrap(&mut broker, &FixedOffsets::failing(), STREAM, GROUP).await?;

    assert!(boot.fresh);
    assert_eq!(
        boot.historical_cursor.as_deref(),
        Some(last.as_str()),
        "lost offset hint anchors at the stream tail, accepting backlog loss"
    );

    // Everything up to the tail is behind the cursor now.
    let delivered = broker
        .read_group(STREAM, GROUP, CONSUMER, ReadFrom::New, 10, None)
        .await?;
    assert!(delivered.is_empty());

    Ok(())
}

/// Broker that refuses group creation the way Redis does when the stream
/// key is missing and MKSTREAM is not honored.
struct NoStreamBroker;

#[async_trait]
impl Broker for NoStreamBroker {
    async fn append(&mut self, _: &str, _: &[(String, String)]) -> Result<String> {
        Err(anyhow!("unused"))
    }

    async fn create_group(
        &mut self,
        stream: &str,
        _: &str,
        _: &str,
        _: bool,
    ) -> Result<CreateGroupOutcome, GroupSetupError> {
        Err(GroupSetupError::NoSuchStream(stream.to_string()))
    }

    async fn destroy_group(&mut self, _: &str, _: &str) -> Result<()> {
        Ok(())
    }

    async fn stream_info(&mut self, _: &str) -> Result<StreamInfo> {
        Err(anyhow!("unused"))
    }

    async fn pending_count(&mut self, _: &str, _: &str) -> Result<i64> {
        Err(anyhow!("unused"))
    }

    async fn read_group(
        &mut self,
        _: &str,
        _: &str,
        _: &str,
        _: ReadFrom,
        _: usize,
        _: Option<u64>,
    ) -> Result<Vec<StreamMessage>> {
        Err(anyhow!("unused"))
    }

    async fn ack(&mut self, _: &str, _: &str, _: &str) -> Result<i64> {
        Err(anyhow!("unused"))
    }
}

#[tokio::test]
async fn missing_uncreatable_stream_is_fatal() {
    let mut broker = NoStreamBroker;
    let err = bootstrap(&mut broker, &FixedOffsets::none(), STREAM, GROUP)
        .await
        .unwrap_err();
    assert!(err.to_string().contains("fatal"));
}
