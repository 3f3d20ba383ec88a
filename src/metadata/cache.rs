//! Metadata snapshot caches.

use crate::db::MetadataSnapshot;
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Key-value store of snapshots keyed by connection name.
///
/// `put` replaces any previous snapshot for the same connection as a whole;
/// concurrent writers race with last-write-wins.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get(&self, connection_name: &str) -> Result<Option<MetadataSnapshot>>;

    async fn put(&self, snapshot: &MetadataSnapshot) -> Result<()>;

    /// Drops the snapshot for a connection. Missing entries are not an error.
    async fn invalidate(&self, connection_name: &str) -> Result<()>;
}

/// Process-local cache.
#[derive(Debug, Default)]
pub struct InMemoryMetadataCache {
    entries: RwLock<HashMap<String, MetadataSnapshot>>,
}

impl InMemoryMetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached snapshots.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl MetadataCache for InMemoryMetadataCache {
    async fn get(&self, connection_name: &str) -> Result<Option<MetadataSnapshot>> {
        Ok(self.entries.read().await.get(connection_name).cloned())
    }

    async fn put(&self, snapshot: &MetadataSnapshot) -> Result<()> {
        self.entries
            .write()
            .await
            .insert(snapshot.connection_name.clone(), snapshot.clone());
        Ok(())
    }

    async fn invalidate(&self, connection_name: &str) -> Result<()> {
        self.entries.write().await.remove(connection_name);
        Ok(())
    }
}
