use anyhow::Result;
use serde_json::Value;
use sqlx::PgConnection;

use hrs_db::replica::{self, DepartmentRecord};

use crate::handlers::{ApplyOutcome, SKIP_ID_NOT_FOUND, SKIP_INVALID_VERSION, SKIP_VERSION_OUTDATED};
use crate::payload::{int_field, str_field, timestamp_field};
use crate::version;

pub(super) async fn upsert(conn: &mut PgConnection, payload: &Value) -> Result<ApplyOutcome> {
    let Some(id) = int_field(payload, "id") else {
        return Ok(ApplyOutcome::Skip(SKIP_ID_NOT_FOUND));
    };
    let incoming = int_field(payload, "version").unwrap_or(1);

    let rec = DepartmentRecord {
        id,
        name: str_field(payload, "name").map(str::to_string),
        cost_center_code: str_field(payload, "cost_center_code").map(str::to_string),
        version: incoming,
        created_at: timestamp_field(payload, "created_at"),
        updated_at: timestamp_field(payload, "updated_at"),
    };

    match replica::department_by_id(&mut *conn, id).await? {
        Some(existing) => {
            if !version::update_applies(incoming, existing.version) {
                return Ok(ApplyOutcome::Skip(SKIP_VERSION_OUTDATED));
            }
            replica::update_department(&mut *conn, &rec).await?;
        }
        None => {
            replica::insert_department(&mut *conn, &rec).await?;
        }
    }

    Ok(ApplyOutcome::Applied)
}

pub(super) async fn delete(conn: &mut PgConnection, payload: &Value) -> Result<ApplyOutcome> {
    let Some(id) = int_field(payload, "id") else {
        return Ok(ApplyOutcome::Skip(SKIP_ID_NOT_FOUND));
    };

    let Some(existing) = replica::department_by_id(&mut *conn, id).await? else {
        // Already convergent.
        return Ok(ApplyOutcome::Applied);
    };

    let Some(incoming) = int_field(payload, "version") else {
        return Ok(ApplyOutcome::Skip(SKIP_INVALID_VERSION));
    };

    if !version::delete_applies(incoming, existing.version) {
        return Ok(ApplyOutcome::Skip(SKIP_VERSION_OUTDATED));
    }

    replica::delete_department(&mut *conn, id).await?;
    Ok(ApplyOutcome::Applied)
}
