use anyhow::Result;
use serde_json::json;
use uuid::Uuid;

use hrs_consumer::{Dispatcher, Disposition};
use hrs_db::bookkeeping;
use hrs_stream::{Broker, MemoryBroker, ReadFrom, StreamMessage};

const GROUP: &str = "hr_replica";
const CONSUMER: &str = "consumer-1";

fn unique_stream() -> String {
    format!("hr_events_{}", Uuid::new_v4().simple())
}

async fn deliver(
    broker: &mut MemoryBroker,
    stream: &str,
    fields: Vec<(String, String)>,
) -> Result<StreamMessage> {
    broker.append(stream, &fields).await?;
    let mut batch = broker
        .read_group(stream, GROUP, CONSUMER, ReadFrom::New, 10, None)
        .await?;
    Ok(batch.pop().expect("appended entry should be delivered"))
}

#[tokio::test]
async fn poison_messages_are_acknowledged_and_never_retried() -> Result<()> {
    let url = match std::env::var(hrs_db::ENV_REPLICA_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: HRS_REPLICA_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    hrs_db::migrate_replica(&pool).await?;

    let stream = unique_stream();
    let mut broker = MemoryBroker::new();
    broker.create_group(&stream, GROUP, "0", true).await?;
    let dispatcher = Dispatcher::new(pool.clone(), stream.clone(), GROUP);

    // Missing event_type: framing noise, acked, no ledger entry.
    let malformed = deliver(
        &mut broker,
        &stream,
        vec![("payload".to_string(), "{}".to_string())],
    )
    .await?;
    assert_eq!(
        dispatcher.dispatch(&mut broker, &malformed).await?,
        Disposition::Malformed
    );
    assert!(!bookkeeping::processed_event_exists(&pool, &malformed.id).await?);

    // Unparsable payload: acked, tombstoned with aggregate_id "0".
    let unparsable_event = Uuid::new_v4().to_string();
    let unparsable = deliver(
        &mut broker,
        &stream,
        vec![
            ("event_id".to_string(), unparsable_event.clone()),
            ("event_type".to_string(), "department.created".to_string()),
            ("aggregate_type".to_string(), "department".to_string()),
            ("payload".to_string(), "{not json".to_string()),
        ],
    )
    .await?;
    assert_eq!(
        dispatcher.dispatch(&mut broker, &unparsable).await?,
        Disposition::Unparsable
    );
    assert!(bookkeeping::processed_event_exists(&pool, &unparsable_event).await?);

    // Unknown event type: acked, tombstoned.
    let unrouted_event = Uuid::new_v4().to_string();
    let unrouted = deliver(
        &mut broker,
        &stream,
        vec![
            ("event_id".to_string(), unrouted_event.clone()),
            ("event_type".to_string(), "project.created".to_string()),
            ("aggregate_type".to_string(), "project".to_string()),
            ("payload".to_string(), json!({"id": 1}).to_string()),
        ],
    )
    .await?;
    assert_eq!(
        dispatcher.dispatch(&mut broker, &unrouted).await?,
        Disposition::Unrouted
    );
    assert!(bookkeeping::processed_event_exists(&pool, &unrouted_event).await?);

    // All three were acknowledged: nothing left pending.
    assert_eq!(broker.pending_count(&stream, GROUP).await?, 0);

    Ok(())
}

#[tokio::test]
async fn handler_failure_leaves_entry_pending_for_redelivery() -> Result<()> {
    let url = match std::env::var(hrs_db::ENV_REPLICA_DB_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: HRS_REPLICA_DATABASE_URL not set");
            return Ok(());
        }
    };

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&url)
        .await?;
    hrs_db::migrate_replica(&pool).await?;

    let stream = unique_stream();
    let mut broker = MemoryBroker::new();
    broker.create_group(&stream, GROUP, "0", true).await?;
    let dispatcher = Dispatcher::new(pool.clone(), stream.clone(), GROUP);

    // An employee snapshot without a name violates the replica schema:
    // a storage failure, not a skip.
    let employee_id = (Uuid::new_v4().as_u128() % 900_000_000) as i64 + 100_000_000;
    let event_id = Uuid::new_v4().to_string();
    let msg = deliver(
        &mut broker,
        &stream,
        vec![
            ("event_id".to_string(), event_id.clone()),
            ("event_type".to_string(), "employee.created".to_string()),
            ("aggregate_type".to_string(), "employee".to_string()),
            ("aggregate_id".to_string(), employee_id.to_string()),
            ("version".to_string(), "1".to_string()),
            (
                "payload".to_string(),
                json!({"id": employee_id, "version": 1}).to_string(),
            ),
        ],
    )
    .await?;

    let disposition = dispatcher.dispatch(&mut broker, &msg).await?;
    assert!(
        matches!(disposition, Disposition::Failed(_)),
        "expected handler failure, got {disposition:?}"
    );

    // Not acknowledged: the entry stays in the pending list for the
    // own-pending phase or a restart.
    assert_eq!(broker.pending_count(&stream, GROUP).await?, 1);

    // Not in the ledger (a retry must reach the handler again), but the
    // failure is on record.
    assert!(!bookkeeping::processed_event_exists(&pool, &event_id).await?);
    let (error_rows,): (i64,) = sqlx::query_as(
        "select count(*)::bigint from event_errors where event_id = $1",
    )
    .bind(&event_id)
    .fetch_one(&pool)
    .await?;
    assert_eq!(error_rows, 1);

    Ok(())
}
