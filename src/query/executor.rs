//! Query execution with safety validation.
//!
//! Provides isolated query execution that can be tested independently
//! of the service facade.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::QueryResultSet;
use crate::db::{ConnectionDescriptor, Connector};
use crate::error::Result;
use crate::safety::{QueryValidator, DEFAULT_ROW_CEILING};

/// Validates, executes and canonicalizes ad-hoc queries.
#[derive(Clone)]
pub struct QueryExecutor {
    connector: Arc<dyn Connector>,
    validator: QueryValidator,
    row_ceiling: u64,
}

impl QueryExecutor {
    /// Creates a new query executor with the given row ceiling.
    pub fn new(connector: Arc<dyn Connector>, row_ceiling: u64) -> Self {
        Self {
            connector,
            validator: QueryValidator::new(),
            row_ceiling,
        }
    }

    /// Creates a query executor with the default ceiling of 1000 rows.
    pub fn with_default_ceiling(connector: Arc<dyn Connector>) -> Self {
        Self::new(connector, DEFAULT_ROW_CEILING)
    }

    pub fn row_ceiling(&self) -> u64 {
        self.row_ceiling
    }

    /// Runs one SQL text against the described connection.
    ///
    /// Validation errors are returned before any connection is opened.
    /// Engine errors come back as execution errors carrying the native
    /// message.
    pub async fn run(
        &self,
        descriptor: &ConnectionDescriptor,
        sql: &str,
    ) -> Result<QueryResultSet> {
        self.run_with_ceiling(descriptor, sql, self.row_ceiling).await
    }

    /// Like [`run`](Self::run) but with an explicit row ceiling.
    pub async fn run_with_ceiling(
        &self,
        descriptor: &ConnectionDescriptor,
        sql: &str,
        row_ceiling: u64,
    ) -> Result<QueryResultSet> {
        let validated = self.validator.validate(sql, row_ceiling)?;

        let client = self.connector.open(descriptor).await?;

        let start = Instant::now();
        let result = client.execute(&validated.rewritten).await;
        let execution_time = start.elapsed();

        if let Err(e) = client.close().await {
            debug!(error = %e, "Failed to close query connection");
        }

        match result {
            Ok(raw) => {
                let result_set = QueryResultSet::from_raw(raw, execution_time);
                info!(
                    connection = %descriptor.name,
                    rows = result_set.row_count(),
                    elapsed_ms = result_set.execution_time_ms(),
                    "Query executed"
                );
                Ok(result_set)
            }
            Err(e) => {
                warn!(connection = %descriptor.name, error = %e, "Query failed");
                Err(e)
            }
        }
    }
}
