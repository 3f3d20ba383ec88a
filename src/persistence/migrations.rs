//! Schema versioning and migrations for the state database.
//!
//! Manages database schema evolution with forward-only migrations.

use crate::error::{AppError, Result};
use sqlx::sqlite::SqlitePool;
use tracing::info;

/// Forward-only migrations, applied in order. Each entry's statements run
/// in one transaction together with its `schema_versions` row.
const MIGRATIONS: &[(i32, &[&str])] = &[(
    1,
    &[
        r#"
        CREATE TABLE IF NOT EXISTS connections (
            name TEXT PRIMARY KEY,
            url TEXT NOT NULL,
            dialect TEXT NOT NULL CHECK (dialect IN ('postgres', 'mysql')),
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            last_connected_at TEXT
        )
        "#,
        r#"
        CREATE TABLE IF NOT EXISTS metadata_snapshots (
            connection_name TEXT PRIMARY KEY
                REFERENCES connections(name) ON DELETE CASCADE,
            snapshot_json TEXT NOT NULL,
            extracted_at TEXT NOT NULL
        )
        "#,
    ],
)];

fn latest_version() -> i32 {
    MIGRATIONS.last().map_or(0, |(version, _)| *version)
}

/// Brings the state database up to the latest schema version.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
    )
    .execute(pool)
    .await
    .map_err(|e| AppError::persistence(format!("Failed to create schema_versions table: {e}")))?;

    let applied = applied_version(pool).await?;
    let latest = latest_version();
    if applied > latest {
        return Err(AppError::persistence(format!(
            "State database is at schema version {applied}, newer than supported \
             version {latest}. Please upgrade db-query."
        )));
    }

    for (version, statements) in MIGRATIONS.iter().filter(|(v, _)| *v > applied) {
        apply(pool, *version, statements).await?;
        info!(version, "Applied state database migration");
    }

    Ok(())
}

async fn applied_version(pool: &SqlitePool) -> Result<i32> {
    let (version,): (Option<i32>,) = sqlx::query_as("SELECT MAX(version) FROM schema_versions")
        .fetch_one(pool)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to read schema version: {e}")))?;

    Ok(version.unwrap_or(0))
}

async fn apply(pool: &SqlitePool, version: i32, statements: &[&str]) -> Result<()> {
    let fail = |e: sqlx::Error| AppError::persistence(format!("Migration v{version} failed: {e}"));

    let mut tx = pool.begin().await.map_err(fail)?;
    for statement in statements {
        sqlx::query(statement).execute(&mut *tx).await.map_err(fail)?;
    }
    sqlx::query("INSERT INTO schema_versions (version) VALUES (?)")
        .bind(version)
        .execute(&mut *tx)
        .await
        .map_err(fail)?;
    tx.commit().await.map_err(fail)
}
