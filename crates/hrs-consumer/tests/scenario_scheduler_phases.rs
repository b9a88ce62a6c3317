use anyhow::Result;

use hrs_consumer::scheduler::{next_batch, ReadPhase};
use hrs_stream::{Broker, MemoryBroker, ReadFrom};

const STREAM: &str = "hr_events";
const GROUP: &str = "hr_replica";
const CONSUMER: &str = "consumer-1";

fn entry(event_id: &str) -> Vec<(String, String)> {
    vec![
        ("event_id".to_string(), event_id.to_string()),
        ("event_type".to_string(), "department.created".to_string()),
        ("payload".to_string(), "{}".to_string()),
    ]
}

#[tokio::test]
async fn historical_with_empty_pending_flips_to_steady_and_reads_live() -> Result<()> {
    let mut broker = MemoryBroker::new();
    broker.create_group(STREAM, GROUP, "0", true).await?;
    let first = broker.append(STREAM, &entry("a")).await?;
    broker.append(STREAM, &entry("b")).await?;

    // Fresh group: nothing pending yet, so the one-time historical pass
    // yields nothing and retires itself; the backlog arrives through the
    // live tail because the group cursor starts at the replay position.
    let mut phase = ReadPhase::Historical { cursor: first };
    let batch = next_batch(&mut broker, STREAM, GROUP, CONSUMER, &mut phase, 10).await?;

    assert_eq!(phase, ReadPhase::Steady);
    assert_eq!(batch.len(), 1, "live tail reads one entry per iteration");
    assert_eq!(batch[0].field("event_id"), Some("a"));

    Ok(())
}

#[tokio::test]
async fn historical_drains_own_pending_and_advances_cursor() -> Result<()> {
    let mut broker = MemoryBroker::new();
    broker.create_group(STREAM, GROUP, "0", true).await?;
    for tag in ["a", "b", "c"] {
        broker.append(STREAM, &entry(tag)).await?;
    }

    // Simulate a prior run that took delivery without acknowledging.
    let delivered = broker
        .read_group(STREAM, GROUP, CONSUMER, ReadFrom::New, 10, None)
        .await?;
    assert_eq!(delivered.len(), 3);

    let mut phase = ReadPhase::Historical {
        cursor: "0".to_string(),
    };
    let batch = next_batch(&mut broker, STREAM, GROUP, CONSUMER, &mut phase, 10).await?;

    assert_eq!(batch.len(), 3);
    match &phase {
        ReadPhase::Historical { cursor } => assert_eq!(cursor, &batch[2].id),
        other => panic!("expected historical phase to continue, got {other:?}"),
    }

    // Cursor now points at the last pending entry: the next pass comes up
    // empty and the phase retires for the rest of the run.
    let again = next_batch(&mut broker, STREAM, GROUP, CONSUMER, &mut phase, 10).await?;
    assert_eq!(phase, ReadPhase::Steady);
    // Steady falls through to own-pending, which still holds the
    // unacknowledged batch.
    assert_eq!(again.len(), 3);

    Ok(())
}

#[tokio::test]
async fn own_pending_takes_priority_over_live_tail() -> Result<()> {
    let mut broker = MemoryBroker::new();
    broker.create_group(STREAM, GROUP, "0", true).await?;
    broker.append(STREAM, &entry("a")).await?;
    broker.append(STREAM, &entry("b")).await?;

    // Deliver "a" without acking, leaving it in this consumer's PEL.
    let delivered = broker
        .read_group(STREAM, GROUP, CONSUMER, ReadFrom::New, 1, None)
        .await?;
    assert_eq!(delivered[0].field("event_id"), Some("a"));

    let mut phase = ReadPhase::Steady;
    let batch = next_batch(&mut broker, STREAM, GROUP, CONSUMER, &mut phase, 10).await?;
    assert_eq!(batch.len(), 1);
    assert_eq!(
        batch[0].field("event_id"),
        Some("a"),
        "pending backlog must drain before the live tail"
    );

    // Once the backlog is acknowledged, the live tail resumes.
    broker.ack(STREAM, GROUP, &batch[0].id).await?;
    let live = next_batch(&mut broker, STREAM, GROUP, CONSUMER, &mut phase, 10).await?;
    assert_eq!(live.len(), 1);
    assert_eq!(live[0].field("event_id"), Some("b"));

    Ok(())
}

#[tokio::test]
async fn empty_live_tail_is_a_normal_noop() -> Result<()> {
    let mut broker = MemoryBroker::new();
    broker.create_group(STREAM, GROUP, "0", true).await?;

    let mut phase = ReadPhase::Steady;
    let batch = next_batch(&mut broker, STREAM, GROUP, CONSUMER, &mut phase, 10).await?;
    assert!(batch.is_empty());
    assert_eq!(phase, ReadPhase::Steady);

    Ok(())
}
