//! Replica-side aggregate access.
//!
//! Every function takes an executor so the reconcilers can run them inside
//! the dispatcher's per-message transaction. Version columns are the only
//! ordering authority; nothing here looks at wall-clock time to decide
//! whether a write applies.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

// ---------------------------------------------------------------------------
// Departments
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct DepartmentRow {
    pub id: i64,
    pub name: String,
    pub cost_center_code: Option<String>,
    pub version: i64,
}

#[derive(Debug, Clone)]
pub struct DepartmentRecord {
    pub id: i64,
    pub name: Option<String>,
    pub cost_center_code: Option<String>,
    pub version: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub async fn department_by_id(
    ex: impl sqlx::PgExecutor<'_>,
    id: i64,
) -> Result<Option<DepartmentRow>> {
    let row = sqlx::query(
        "select id, name, cost_center_code, version from departments where id = $1",
    )
    .bind(id)
    .fetch_optional(ex)
    .await
    .context("department_by_id failed")?;

    match row {
        Some(row) => Ok(Some(DepartmentRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            cost_center_code: row.try_get("cost_center_code")?,
            version: row.try_get("version")?,
        })),
        None => Ok(None),
    }
}

pub async fn department_exists(ex: impl sqlx::PgExecutor<'_>, id: i64) -> Result<bool> {
    let (exists,): (bool,) =
        sqlx::query_as::<_, (bool,)>("select exists (select 1 from departments where id = $1)")
            .bind(id)
            .fetch_one(ex)
            .await
            .context("department_exists failed")?;

    Ok(exists)
}

pub async fn insert_department(
    ex: impl sqlx::PgExecutor<'_>,
    rec: &DepartmentRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into departments (id, name, cost_center_code, created_at, updated_at, version)
        values ($1, $2, $3, coalesce($4, now()), coalesce($5, now()), $6)
        "#,
    )
    .bind(rec.id)
    .bind(&rec.name)
    .bind(&rec.cost_center_code)
    .bind(rec.created_at)
    .bind(rec.updated_at)
    .bind(rec.version)
    .execute(ex)
    .await
    .context("insert_department failed")?;

    Ok(())
}

pub async fn update_department(
    ex: impl sqlx::PgExecutor<'_>,
    rec: &DepartmentRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        update departments
        set name = $2,
            cost_center_code = $3,
            updated_at = now(),
            version = $4
        where id = $1
        "#,
    )
    .bind(rec.id)
    .bind(&rec.name)
    .bind(&rec.cost_center_code)
    .bind(rec.version)
    .execute(ex)
    .await
    .context("update_department failed")?;

    Ok(())
}

pub async fn delete_department(ex: impl sqlx::PgExecutor<'_>, id: i64) -> Result<()> {
    sqlx::query("delete from departments where id = $1")
        .bind(id)
        .execute(ex)
        .await
        .context("delete_department failed")?;

    Ok(())
}

// ---------------------------------------------------------------------------
// Employees
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct EmployeeRow {
    pub id: i64,
    pub version: i64,
    pub is_active: bool,
    pub departments_id: Option<i64>,
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Fully resolved employee state, computed by the reconciler after merging
/// the payload with the existing row (is_active / deleted_at carry-over).
#[derive(Debug, Clone)]
pub struct EmployeeRecord {
    pub id: i64,
    pub name: Option<String>,
    pub email: Option<String>,
    pub position: Option<String>,
    pub hire_date: Option<NaiveDate>,
    pub departments_id: Option<i64>,
    pub is_active: bool,
    pub deleted_at: Option<DateTime<Utc>>,
    pub version: i64,
}

pub async fn employee_by_id(
    ex: impl sqlx::PgExecutor<'_>,
    id: i64,
) -> Result<Option<EmployeeRow>> {
    let row = sqlx::query(
        "select id, version, is_active, departments_id, deleted_at from employees where id = $1",
    )
    .bind(id)
    .fetch_optional(ex)
    .await
    .context("employee_by_id failed")?;

    match row {
        Some(row) => Ok(Some(EmployeeRow {
            id: row.try_get("id")?,
            version: row.try_get("version")?,
            is_active: row.try_get("is_active")?,
            departments_id: row.try_get("departments_id")?,
            deleted_at: row.try_get("deleted_at")?,
        })),
        None => Ok(None),
    }
}

pub async fn insert_employee(ex: impl sqlx::PgExecutor<'_>, rec: &EmployeeRecord) -> Result<()> {
    sqlx::query(
        r#"
        insert into employees (
          id, name, email, position, hire_date, departments_id,
          is_active, version, updated_at, deleted_at
        ) values (
          $1, $2, $3, $4, $5, $6, $7, $8, now(), $9
        )
        "#,
    )
    .bind(rec.id)
    .bind(&rec.name)
    .bind(&rec.email)
    .bind(&rec.position)
    .bind(rec.hire_date)
    .bind(rec.departments_id)
    .bind(rec.is_active)
    .bind(rec.version)
    .bind(rec.deleted_at)
    .execute(ex)
    .await
    .context("insert_employee failed")?;

    Ok(())
}

pub async fn update_employee(ex: impl sqlx::PgExecutor<'_>, rec: &EmployeeRecord) -> Result<()> {
    sqlx::query(
        r#"
        update employees
        set name = $2,
            email = $3,
            position = $4,
            hire_date = $5,
            departments_id = $6,
            is_active = $7,
            deleted_at = $8,
            updated_at = now(),
            version = $9
        where id = $1
        "#,
    )
    .bind(rec.id)
    .bind(&rec.name)
    .bind(&rec.email)
    .bind(&rec.position)
    .bind(rec.hire_date)
    .bind(rec.departments_id)
    .bind(rec.is_active)
    .bind(rec.deleted_at)
    .bind(rec.version)
    .execute(ex)
    .await
    .context("update_employee failed")?;

    Ok(())
}

pub async fn delete_employee(ex: impl sqlx::PgExecutor<'_>, id: i64) -> Result<()> {
    sqlx::query("delete from employees where id = $1")
        .bind(id)
        .execute(ex)
        .await
        .context("delete_employee failed")?;

    Ok(())
}

/// Replace an employee's skill associations wholesale: delete everything
/// for the employee, then bulk-insert the incoming set. An empty set
/// clears the associations.
pub async fn replace_employee_skills(
    conn: &mut sqlx::PgConnection,
    employee_id: i64,
    skill_ids: &[i64],
    version: i64,
) -> Result<()> {
    sqlx::query("delete from employee_skills where employee_id = $1")
        .bind(employee_id)
        .execute(&mut *conn)
        .await
        .context("replace_employee_skills delete failed")?;

    if skill_ids.is_empty() {
        return Ok(());
    }

    sqlx::query(
        r#"
        insert into employee_skills (employee_id, skill_id, version)
        select $1, skill_id, $3
        from unnest($2::bigint[]) as skill_id
        "#,
    )
    .bind(employee_id)
    .bind(skill_ids)
    .bind(version)
    .execute(&mut *conn)
    .await
    .context("replace_employee_skills insert failed")?;

    Ok(())
}

pub async fn employee_skill_ids(
    ex: impl sqlx::PgExecutor<'_>,
    employee_id: i64,
) -> Result<Vec<i64>> {
    let rows = sqlx::query(
        "select skill_id from employee_skills where employee_id = $1 order by skill_id",
    )
    .bind(employee_id)
    .fetch_all(ex)
    .await
    .context("employee_skill_ids failed")?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let id: Option<i64> = row.try_get("skill_id")?;
        if let Some(id) = id {
            out.push(id);
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Skills
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SkillRow {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub version: i64,
}

#[derive(Debug, Clone)]
pub struct SkillRecord {
    pub id: i64,
    pub name: Option<String>,
    pub description: String,
    pub version: i64,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

pub async fn skill_by_id(ex: impl sqlx::PgExecutor<'_>, id: i64) -> Result<Option<SkillRow>> {
    let row = sqlx::query("select id, name, description, version from skills where id = $1")
        .bind(id)
        .fetch_optional(ex)
        .await
        .context("skill_by_id failed")?;

    match row {
        Some(row) => Ok(Some(SkillRow {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            description: row.try_get("description")?,
            version: row.try_get("version")?,
        })),
        None => Ok(None),
    }
}

pub async fn insert_skill(ex: impl sqlx::PgExecutor<'_>, rec: &SkillRecord) -> Result<()> {
    sqlx::query(
        r#"
        insert into skills (id, name, description, created_at, updated_at, version)
        values ($1, $2, $3, coalesce($4, now()), coalesce($5, now()), $6)
        "#,
    )
    .bind(rec.id)
    .bind(&rec.name)
    .bind(&rec.description)
    .bind(rec.created_at)
    .bind(rec.updated_at)
    .bind(rec.version)
    .execute(ex)
    .await
    .context("insert_skill failed")?;

    Ok(())
}

pub async fn update_skill(ex: impl sqlx::PgExecutor<'_>, rec: &SkillRecord) -> Result<()> {
    sqlx::query(
        r#"
        update skills
        set name = $2,
            description = $3,
            updated_at = coalesce($4, now()),
            version = $5
        where id = $1
        "#,
    )
    .bind(rec.id)
    .bind(&rec.name)
    .bind(&rec.description)
    .bind(rec.updated_at)
    .bind(rec.version)
    .execute(ex)
    .await
    .context("update_skill failed")?;

    Ok(())
}

pub async fn delete_skill(ex: impl sqlx::PgExecutor<'_>, id: i64) -> Result<()> {
    sqlx::query("delete from skills where id = $1")
        .bind(id)
        .execute(ex)
        .await
        .context("delete_skill failed")?;

    Ok(())
}
