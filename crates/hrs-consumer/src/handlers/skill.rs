use anyhow::Result;
use serde_json::Value;
use sqlx::PgConnection;

use hrs_db::replica::{self, SkillRecord};

use crate::handlers::{ApplyOutcome, SKIP_ID_NOT_FOUND, SKIP_INVALID_VERSION, SKIP_VERSION_OUTDATED};
use crate::payload::{entity, int_field, str_field, timestamp_field};
use crate::version;

pub(super) async fn upsert(conn: &mut PgConnection, payload: &Value) -> Result<ApplyOutcome> {
    let Some(id) = int_field(payload, "id") else {
        return Ok(ApplyOutcome::Skip(SKIP_ID_NOT_FOUND));
    };
    let incoming = int_field(payload, "version").unwrap_or(1);

    let rec = SkillRecord {
        id,
        name: str_field(payload, "name").map(str::to_string),
        description: str_field(payload, "description").unwrap_or("").to_string(),
        version: incoming,
        created_at: timestamp_field(payload, "created_at"),
        updated_at: timestamp_field(payload, "updated_at"),
    };

    match replica::skill_by_id(&mut *conn, id).await? {
        Some(existing) => {
            if !version::update_applies(incoming, existing.version) {
                return Ok(ApplyOutcome::Skip(SKIP_VERSION_OUTDATED));
            }
            replica::update_skill(&mut *conn, &rec).await?;
        }
        None => {
            replica::insert_skill(&mut *conn, &rec).await?;
        }
    }

    Ok(ApplyOutcome::Applied)
}

pub(super) async fn delete(conn: &mut PgConnection, payload: &Value) -> Result<ApplyOutcome> {
    // Delete snapshots may arrive wrapped: {"skill": {...}}.
    let snapshot = entity(payload, "skill");

    let Some(id) = int_field(snapshot, "id") else {
        return Ok(ApplyOutcome::Skip(SKIP_ID_NOT_FOUND));
    };

    let Some(existing) = replica::skill_by_id(&mut *conn, id).await? else {
        return Ok(ApplyOutcome::Applied);
    };

    let Some(incoming) = int_field(snapshot, "version") else {
        return Ok(ApplyOutcome::Skip(SKIP_INVALID_VERSION));
    };

    if !version::delete_applies(incoming, existing.version) {
        return Ok(ApplyOutcome::Skip(SKIP_VERSION_OUTDATED));
    }

    replica::delete_skill(&mut *conn, id).await?;
    Ok(ApplyOutcome::Applied)
}
