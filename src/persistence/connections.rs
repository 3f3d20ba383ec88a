//! Registered connection persistence.
//!
//! CRUD operations for named connection strings, and the resolver seam the
//! service uses to turn a name into a [`ConnectionDescriptor`].

use crate::db::{ConnectionDescriptor, Dialect};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;
use std::collections::HashMap;
use std::sync::RwLock;
use tracing::debug;

/// Resolves logical connection names.
#[async_trait]
pub trait ConnectionResolver: Send + Sync {
    /// Returns the descriptor for `name`, or a not-found error.
    async fn resolve(&self, name: &str) -> Result<ConnectionDescriptor>;

    /// Records a successful connection. No-op by default.
    async fn mark_connected(&self, _name: &str) -> Result<()> {
        Ok(())
    }
}

/// Raw database row for a registered connection.
#[derive(Debug, Clone, FromRow)]
struct ConnectionRow {
    name: String,
    url: String,
    dialect: String,
    created_at: String,
    last_connected_at: Option<String>,
}

/// A registered connection, including its connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredConnection {
    pub name: String,
    pub url: String,
    pub dialect: Dialect,
    pub created_at: String,
    pub last_connected_at: Option<String>,
}

impl std::fmt::Debug for StoredConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoredConnection")
            .field("name", &self.name)
            .field("url", &self.descriptor().redacted_url())
            .field("dialect", &self.dialect)
            .field("created_at", &self.created_at)
            .field("last_connected_at", &self.last_connected_at)
            .finish()
    }
}

impl StoredConnection {
    pub fn descriptor(&self) -> ConnectionDescriptor {
        ConnectionDescriptor::new(self.name.clone(), self.dialect, self.url.clone())
    }

    /// Display-safe view without the password.
    pub fn summary(&self) -> ConnectionSummary {
        ConnectionSummary {
            name: self.name.clone(),
            dialect: self.dialect,
            url: self.descriptor().redacted_url(),
            created_at: self.created_at.clone(),
            last_connected_at: self.last_connected_at.clone(),
        }
    }
}

impl TryFrom<ConnectionRow> for StoredConnection {
    type Error = AppError;

    fn try_from(row: ConnectionRow) -> Result<Self> {
        let dialect = Dialect::parse(&row.dialect).ok_or_else(|| {
            AppError::persistence(format!(
                "Connection '{}' has unknown dialect '{}'",
                row.name, row.dialect
            ))
        })?;

        Ok(Self {
            name: row.name,
            url: row.url,
            dialect,
            created_at: row.created_at,
            last_connected_at: row.last_connected_at,
        })
    }
}

/// Serializable connection listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionSummary {
    pub name: String,
    pub dialect: Dialect,
    pub url: String,
    pub created_at: String,
    pub last_connected_at: Option<String>,
}

/// Connection store on the state database.
#[derive(Debug, Clone)]
pub struct ConnectionStore {
    pool: SqlitePool,
}

impl ConnectionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Registers a new connection.
    ///
    /// The dialect is detected from the URL scheme; malformed URLs and
    /// duplicate names are rejected.
    pub async fn add(&self, name: &str, url: &str) -> Result<StoredConnection> {
        let name = validate_name(name)?;
        let descriptor = ConnectionDescriptor::from_url(name, url)?;
        descriptor.validate_url()?;

        sqlx::query("INSERT INTO connections (name, url, dialect) VALUES (?, ?, ?)")
            .bind(&descriptor.name)
            .bind(&descriptor.url)
            .bind(descriptor.dialect.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if e.to_string().contains("UNIQUE constraint") {
                    AppError::persistence(format!("Connection '{name}' already exists"))
                } else {
                    AppError::persistence(format!("Failed to create connection: {e}"))
                }
            })?;

        debug!(connection = %name, dialect = %descriptor.dialect, "Connection registered");
        self.get(name)
            .await?
            .ok_or_else(|| AppError::internal(format!("Connection '{name}' vanished after insert")))
    }

    /// Lists all registered connections ordered by name.
    pub async fn list(&self) -> Result<Vec<StoredConnection>> {
        let rows: Vec<ConnectionRow> = sqlx::query_as(
            r#"
            SELECT name, url, dialect, created_at, last_connected_at
            FROM connections
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to list connections: {e}")))?;

        rows.into_iter().map(StoredConnection::try_from).collect()
    }

    pub async fn get(&self, name: &str) -> Result<Option<StoredConnection>> {
        let row: Option<ConnectionRow> = sqlx::query_as(
            r#"
            SELECT name, url, dialect, created_at, last_connected_at
            FROM connections
            WHERE name = ?
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to get connection: {e}")))?;

        row.map(StoredConnection::try_from).transpose()
    }

    /// Replaces the connection string and drops the cached snapshot.
    pub async fn update_url(&self, name: &str, url: &str) -> Result<StoredConnection> {
        let descriptor = ConnectionDescriptor::from_url(name, url)?;
        descriptor.validate_url()?;

        let mut tx = self.pool.begin().await.map_err(tx_error)?;

        let result = sqlx::query("UPDATE connections SET url = ?, dialect = ? WHERE name = ?")
            .bind(&descriptor.url)
            .bind(descriptor.dialect.as_str())
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::persistence(format!("Failed to update connection: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(not_found(name));
        }

        sqlx::query("DELETE FROM metadata_snapshots WHERE connection_name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::persistence(format!("Failed to invalidate snapshot: {e}")))?;

        tx.commit().await.map_err(tx_error)?;

        self.get(name).await?.ok_or_else(|| not_found(name))
    }

    /// Updates the last_connected_at timestamp.
    pub async fn touch(&self, name: &str) -> Result<()> {
        sqlx::query("UPDATE connections SET last_connected_at = datetime('now') WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::persistence(format!("Failed to update connection: {e}")))?;

        Ok(())
    }

    /// Deletes a connection and its cached snapshot.
    pub async fn remove(&self, name: &str) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(tx_error)?;

        sqlx::query("DELETE FROM metadata_snapshots WHERE connection_name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::persistence(format!("Failed to delete snapshot: {e}")))?;

        let result = sqlx::query("DELETE FROM connections WHERE name = ?")
            .bind(name)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::persistence(format!("Failed to delete connection: {e}")))?;

        if result.rows_affected() == 0 {
            return Err(not_found(name));
        }

        tx.commit().await.map_err(tx_error)?;
        Ok(())
    }
}

#[async_trait]
impl ConnectionResolver for ConnectionStore {
    async fn resolve(&self, name: &str) -> Result<ConnectionDescriptor> {
        self.get(name)
            .await?
            .map(|c| c.descriptor())
            .ok_or_else(|| not_found(name))
    }

    async fn mark_connected(&self, name: &str) -> Result<()> {
        self.touch(name).await
    }
}

/// Fixed set of connections held in memory.
#[derive(Debug, Default)]
pub struct StaticConnections {
    entries: RwLock<HashMap<String, ConnectionDescriptor>>,
}

impl StaticConnections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, descriptor: ConnectionDescriptor) -> Self {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(descriptor.name.clone(), descriptor);
        }
        self
    }
}

#[async_trait]
impl ConnectionResolver for StaticConnections {
    async fn resolve(&self, name: &str) -> Result<ConnectionDescriptor> {
        self.entries
            .read()
            .ok()
            .and_then(|entries| entries.get(name).cloned())
            .ok_or_else(|| not_found(name))
    }
}

fn validate_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(AppError::config("Connection name cannot be empty"));
    }
    Ok(trimmed)
}

fn not_found(name: &str) -> AppError {
    AppError::not_found(format!("Connection '{name}' not found"))
}

fn tx_error(e: sqlx::Error) -> AppError {
    AppError::persistence(format!("State database transaction failed: {e}"))
}
