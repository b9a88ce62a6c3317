//! Versioned reconcilers: one apply rule per (aggregate, operation).
//!
//! Every handler runs inside the dispatcher's replica transaction and
//! reports either `Applied` or `Skip(reason)`. A skip is a business
//! outcome (stale version, dangling reference, missing id), not an error:
//! the dispatcher still acknowledges and tombstones the message. Only
//! genuine storage failures propagate as errors.

use anyhow::Result;
use serde_json::Value;
use sqlx::PgConnection;

use crate::route::{Aggregate, EventKind, Op};

mod department;
mod employee;
mod skill;

pub const SKIP_VERSION_OUTDATED: &str = "version outdated";
pub const SKIP_ID_NOT_FOUND: &str = "id not found in payload";
pub const SKIP_INVALID_VERSION: &str = "invalid version";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Applied,
    Skip(&'static str),
}

pub async fn apply(
    conn: &mut PgConnection,
    kind: EventKind,
    payload: &Value,
) -> Result<ApplyOutcome> {
    match (kind.aggregate, kind.op) {
        (Aggregate::Department, Op::Created | Op::Updated) => {
            department::upsert(conn, payload).await
        }
        (Aggregate::Department, Op::Deleted) => department::delete(conn, payload).await,
        (Aggregate::Employee, Op::Created | Op::Updated) => employee::upsert(conn, payload).await,
        (Aggregate::Employee, Op::Deleted) => employee::delete(conn, payload).await,
        (Aggregate::Skill, Op::Created | Op::Updated) => skill::upsert(conn, payload).await,
        (Aggregate::Skill, Op::Deleted) => skill::delete(conn, payload).await,
    }
}
