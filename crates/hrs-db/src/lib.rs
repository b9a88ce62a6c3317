use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

pub mod bookkeeping;
pub mod outbox;
pub mod replica;

pub const ENV_ORIGIN_DB_URL: &str = "HRS_ORIGIN_DATABASE_URL";
pub const ENV_REPLICA_DB_URL: &str = "HRS_REPLICA_DATABASE_URL";

/// Connect to Postgres at an explicit URL.
pub async fn connect(url: &str) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Connect to the origin database (outbox) using HRS_ORIGIN_DATABASE_URL.
pub async fn connect_origin_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_ORIGIN_DB_URL)
        .with_context(|| format!("missing env var {ENV_ORIGIN_DB_URL}"))?;
    connect(&url).await
}

/// Connect to the replica database (aggregates + bookkeeping) using
/// HRS_REPLICA_DATABASE_URL.
pub async fn connect_replica_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_REPLICA_DB_URL)
        .with_context(|| format!("missing env var {ENV_REPLICA_DB_URL}"))?;
    connect(&url).await
}

/// Run the embedded origin migrations (outbox schema).
pub async fn migrate_origin(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations/origin")
        .run(pool)
        .await
        .context("origin db migrate failed")?;
    Ok(())
}

/// Run the embedded replica migrations (aggregates + bookkeeping schema).
pub async fn migrate_replica(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations/replica")
        .run(pool)
        .await
        .context("replica db migrate failed")?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_schema: bool,
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool, marker_table: &str) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as::<_, (i32,)>("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;
    let ok = one == 1;

    let (exists,): (bool,) = sqlx::query_as::<_, (bool,)>(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema='public' and table_name=$1
        )
        "#,
    )
    .bind(marker_table)
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus { ok, has_schema: exists })
}

/// Detect a Postgres unique-constraint violation (any constraint).
pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().as_deref() == Some("23505"),
        _ => false,
    }
}
