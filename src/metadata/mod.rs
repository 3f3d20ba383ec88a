//! Schema metadata extraction.
//!
//! Produces a [`MetadataSnapshot`] for a connection, serving it from the
//! injected [`MetadataCache`] unless a refresh is forced. Staleness is an
//! explicit action; cached snapshots never expire on their own.

mod cache;

pub use cache::{InMemoryMetadataCache, MetadataCache};

use crate::db::{
    CanonicalColumn, CanonicalTable, ConnectionDescriptor, Connector, DatabaseClient,
    MetadataSnapshot, TableKind,
};
use crate::error::{AppError, Result};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Builds metadata snapshots through a [`Connector`].
#[derive(Clone)]
pub struct MetadataExtractor {
    connector: Arc<dyn Connector>,
    cache: Arc<dyn MetadataCache>,
}

impl MetadataExtractor {
    pub fn new(connector: Arc<dyn Connector>, cache: Arc<dyn MetadataCache>) -> Self {
        Self { connector, cache }
    }

    /// Returns the snapshot for `descriptor`.
    ///
    /// Without `force_refresh` a cached snapshot is returned unchanged. On a
    /// refresh the whole catalog is read again; any failure leaves the cached
    /// snapshot untouched and surfaces as a metadata extraction error.
    pub async fn get_metadata(
        &self,
        descriptor: &ConnectionDescriptor,
        force_refresh: bool,
    ) -> Result<MetadataSnapshot> {
        if !force_refresh {
            if let Some(snapshot) = self.cache.get(&descriptor.name).await? {
                debug!(connection = %descriptor.name, "Metadata cache hit");
                return Ok(snapshot);
            }
            debug!(connection = %descriptor.name, "Metadata cache miss");
        }

        let snapshot = self.extract(descriptor).await.map_err(|e| {
            warn!(connection = %descriptor.name, error = %e, "Metadata extraction failed");
            into_extraction_error(e)
        })?;

        self.cache.put(&snapshot).await?;
        info!(
            connection = %descriptor.name,
            tables = snapshot.table_count(),
            views = snapshot.view_count(),
            "Metadata extracted"
        );
        Ok(snapshot)
    }

    /// Drops the cached snapshot so the next request re-extracts.
    pub async fn invalidate(&self, connection_name: &str) -> Result<()> {
        self.cache.invalidate(connection_name).await
    }

    async fn extract(&self, descriptor: &ConnectionDescriptor) -> Result<MetadataSnapshot> {
        let client = self.connector.open(descriptor).await?;
        let result = read_catalog(client.as_ref()).await;

        if let Err(e) = client.close().await {
            debug!(error = %e, "Failed to close metadata connection");
        }

        Ok(MetadataSnapshot {
            connection_name: descriptor.name.clone(),
            dialect: descriptor.dialect,
            tables: result?,
            extracted_at: Utc::now(),
        })
    }
}

async fn read_catalog(client: &dyn DatabaseClient) -> Result<Vec<CanonicalTable>> {
    let dialect = client.dialect();
    let mut tables = Vec::new();

    for table_ref in client.list_tables().await? {
        let mut raw_columns = client
            .list_columns(&table_ref.schema, &table_ref.name)
            .await?;
        raw_columns.sort_by_key(|c| c.ordinal_position);

        // Catalog ordinals can have gaps after dropped columns.
        let columns = raw_columns
            .into_iter()
            .zip(1u32..)
            .map(|(raw, ordinal)| CanonicalColumn::from_raw(raw, dialect, ordinal))
            .collect();

        let row_count = match table_ref.kind {
            TableKind::Table => client
                .approximate_row_count(&table_ref.schema, &table_ref.name)
                .await?
                .filter(|n| *n > 0),
            TableKind::View => None,
        };

        tables.push(CanonicalTable {
            schema: table_ref.schema,
            name: table_ref.name,
            kind: table_ref.kind,
            columns,
            row_count,
        });
    }

    Ok(tables)
}

fn into_extraction_error(error: AppError) -> AppError {
    match error {
        AppError::MetadataExtraction(_) => error,
        other => AppError::metadata(other.to_string()),
    }
}
