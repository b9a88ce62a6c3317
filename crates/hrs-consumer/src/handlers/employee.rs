use anyhow::Result;
use serde_json::Value;
use sqlx::PgConnection;
use tracing::warn;

use hrs_db::replica::{self, EmployeeRecord};

use crate::handlers::{ApplyOutcome, SKIP_ID_NOT_FOUND, SKIP_INVALID_VERSION, SKIP_VERSION_OUTDATED};
use crate::payload::{bool_field, date_field, int_field, skill_ids_of, str_field, timestamp_field};
use crate::version;

pub(super) async fn upsert(conn: &mut PgConnection, payload: &Value) -> Result<ApplyOutcome> {
    let Some(id) = int_field(payload, "id") else {
        return Ok(ApplyOutcome::Skip(SKIP_ID_NOT_FOUND));
    };
    let incoming = int_field(payload, "version").unwrap_or(1);

    // Tolerate out-of-order delivery of a department deletion: the FK is
    // revalidated against the replica at apply time and nulled when the
    // department is gone.
    let mut departments_id = int_field(payload, "departments_id");
    if let Some(dept) = departments_id {
        if !replica::department_exists(&mut *conn, dept).await? {
            warn!(employee_id = id, departments_id = dept, "department missing in replica; nulling reference");
            departments_id = None;
        }
    }

    let hire_date = date_field(payload, "hire_date");
    let is_active = bool_field(payload, "is_active");
    let deleted_at = timestamp_field(payload, "deleted_at");
    let name = str_field(payload, "name").map(str::to_string);
    let email = str_field(payload, "email").map(str::to_string);
    let position = str_field(payload, "position").map(str::to_string);

    match replica::employee_by_id(&mut *conn, id).await? {
        Some(existing) => {
            if !version::update_applies(incoming, existing.version) {
                return Ok(ApplyOutcome::Skip(SKIP_VERSION_OUTDATED));
            }
            let rec = EmployeeRecord {
                id,
                name,
                email,
                position,
                hire_date,
                departments_id,
                is_active: is_active.unwrap_or(existing.is_active),
                deleted_at: deleted_at.or(existing.deleted_at),
                version: incoming,
            };
            replica::update_employee(&mut *conn, &rec).await?;
        }
        None => {
            let rec = EmployeeRecord {
                id,
                name,
                email,
                position,
                hire_date,
                departments_id,
                is_active: is_active.unwrap_or(true),
                deleted_at,
                version: incoming,
            };
            replica::insert_employee(&mut *conn, &rec).await?;
        }
    }

    // Skill associations are replaced wholesale; an empty or missing list
    // clears them.
    let skill_ids = skill_ids_of(payload);
    replica::replace_employee_skills(conn, id, &skill_ids, incoming).await?;

    Ok(ApplyOutcome::Applied)
}

pub(super) async fn delete(conn: &mut PgConnection, payload: &Value) -> Result<ApplyOutcome> {
    // Delete snapshots may arrive wrapped: {"employee": {...}}.
    let snapshot = crate::payload::entity(payload, "employee");

    let Some(id) = int_field(snapshot, "id") else {
        return Ok(ApplyOutcome::Skip(SKIP_ID_NOT_FOUND));
    };

    let Some(existing) = replica::employee_by_id(&mut *conn, id).await? else {
        return Ok(ApplyOutcome::Applied);
    };

    let Some(incoming) = int_field(snapshot, "version") else {
        return Ok(ApplyOutcome::Skip(SKIP_INVALID_VERSION));
    };

    if !version::delete_applies(incoming, existing.version) {
        return Ok(ApplyOutcome::Skip(SKIP_VERSION_OUTDATED));
    }

    replica::delete_employee(&mut *conn, id).await?;
    Ok(ApplyOutcome::Applied)
}
