//! Metadata snapshots stored in the state database.

use crate::db::MetadataSnapshot;
use crate::error::{AppError, Result};
use crate::metadata::MetadataCache;
use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;
use tracing::warn;

/// [`MetadataCache`] persisting one JSON snapshot per connection.
///
/// Snapshots can only be stored for registered connections and disappear
/// with them.
#[derive(Debug, Clone)]
pub struct SqliteMetadataCache {
    pool: SqlitePool,
}

impl SqliteMetadataCache {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MetadataCache for SqliteMetadataCache {
    async fn get(&self, connection_name: &str) -> Result<Option<MetadataSnapshot>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT snapshot_json FROM metadata_snapshots WHERE connection_name = ?",
        )
        .bind(connection_name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to read metadata snapshot: {e}")))?;

        let Some((json,)) = row else {
            return Ok(None);
        };

        match serde_json::from_str(&json) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                warn!(
                    connection = %connection_name,
                    "Discarding unreadable metadata snapshot: {e}"
                );
                Ok(None)
            }
        }
    }

    async fn put(&self, snapshot: &MetadataSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| AppError::internal(format!("Failed to encode snapshot: {e}")))?;

        sqlx::query(
            r#"
            INSERT INTO metadata_snapshots (connection_name, snapshot_json, extracted_at)
            VALUES (?, ?, ?)
            ON CONFLICT(connection_name) DO UPDATE SET
                snapshot_json = excluded.snapshot_json,
                extracted_at = excluded.extracted_at
            "#,
        )
        .bind(&snapshot.connection_name)
        .bind(&json)
        .bind(snapshot.extracted_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to store metadata snapshot: {e}")))?;

        Ok(())
    }

    async fn invalidate(&self, connection_name: &str) -> Result<()> {
        sqlx::query("DELETE FROM metadata_snapshots WHERE connection_name = ?")
            .bind(connection_name)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::persistence(format!("Failed to delete snapshot: {e}")))?;
        Ok(())
    }
}
