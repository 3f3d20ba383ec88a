//! Mock database client for testing.
//!
//! Provides an in-memory database implementation so the metadata, query and
//! export paths can be exercised without a live server.

use super::{
    ColumnInfo, ConnectionDescriptor, Connector, DatabaseClient, Dialect, QueryResult, RawColumn,
    TableRef, Value,
};
use crate::error::{AppError, ConnectionErrorKind, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
struct MockTable {
    table: TableRef,
    columns: Vec<RawColumn>,
    row_count: Option<i64>,
    broken: bool,
}

#[derive(Debug, Clone)]
enum MockResponse {
    Rows(QueryResult),
    Error(String),
}

#[derive(Debug, Default)]
struct MockState {
    catalog_failure: AtomicBool,
    closed: AtomicBool,
    executed: Mutex<Vec<String>>,
}

/// A mock database client that serves a predefined catalog and results.
///
/// Clones share call history and failure switches, so a test can keep one
/// handle while a connector hands out others.
#[derive(Debug, Clone)]
pub struct MockDatabaseClient {
    dialect: Dialect,
    tables: Vec<MockTable>,
    responses: Vec<(String, MockResponse)>,
    state: Arc<MockState>,
}

impl MockDatabaseClient {
    /// Creates a new mock client with an empty catalog.
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            tables: Vec::new(),
            responses: Vec::new(),
            state: Arc::new(MockState::default()),
        }
    }

    /// Adds a table or view to the catalog.
    pub fn with_table(
        mut self,
        table: TableRef,
        columns: Vec<RawColumn>,
        row_count: Option<i64>,
    ) -> Self {
        self.tables.push(MockTable {
            table,
            columns,
            row_count,
            broken: false,
        });
        self
    }

    /// Adds a table whose column listing fails.
    pub fn with_broken_table(mut self, table: TableRef) -> Self {
        self.tables.push(MockTable {
            table,
            columns: Vec::new(),
            row_count: None,
            broken: true,
        });
        self
    }

    /// Returns `result` for any SQL containing `pattern` (case-insensitive).
    pub fn with_result(mut self, pattern: impl Into<String>, result: QueryResult) -> Self {
        self.responses
            .push((pattern.into().to_lowercase(), MockResponse::Rows(result)));
        self
    }

    /// Fails any SQL containing `pattern` with the given engine message.
    pub fn with_execution_error(
        mut self,
        pattern: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        self.responses.push((
            pattern.into().to_lowercase(),
            MockResponse::Error(message.into()),
        ));
        self
    }

    /// Makes every catalog query fail until switched off again.
    pub fn set_catalog_failure(&self, fail: bool) {
        self.state.catalog_failure.store(fail, Ordering::SeqCst);
    }

    /// SQL texts passed to `execute`, in call order.
    pub fn executed_sql(&self) -> Vec<String> {
        self.state
            .executed
            .lock()
            .map(|v| v.clone())
            .unwrap_or_default()
    }

    /// Returns true once `close` has been called on any clone.
    pub fn is_closed(&self) -> bool {
        self.state.closed.load(Ordering::SeqCst)
    }

    fn check_catalog(&self) -> Result<()> {
        if self.state.catalog_failure.load(Ordering::SeqCst) {
            return Err(AppError::metadata("mock catalog unavailable"));
        }
        Ok(())
    }

    fn find_table(&self, schema: &str, table: &str) -> Option<&MockTable> {
        self.tables
            .iter()
            .find(|t| t.table.schema == schema && t.table.name == table)
    }
}

#[async_trait]
impl DatabaseClient for MockDatabaseClient {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    async fn list_tables(&self) -> Result<Vec<TableRef>> {
        self.check_catalog()?;
        Ok(self.tables.iter().map(|t| t.table.clone()).collect())
    }

    async fn list_columns(&self, schema: &str, table: &str) -> Result<Vec<RawColumn>> {
        self.check_catalog()?;
        match self.find_table(schema, table) {
            Some(t) if t.broken => Err(AppError::metadata(format!(
                "Failed to fetch columns for {schema}.{table}: permission denied"
            ))),
            Some(t) => Ok(t.columns.clone()),
            None => Ok(Vec::new()),
        }
    }

    async fn approximate_row_count(&self, schema: &str, table: &str) -> Result<Option<i64>> {
        self.check_catalog()?;
        Ok(self.find_table(schema, table).and_then(|t| t.row_count))
    }

    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        if let Ok(mut executed) = self.state.executed.lock() {
            executed.push(sql.to_string());
        }

        let lower = sql.to_lowercase();
        let response = self
            .responses
            .iter()
            .find(|(pattern, _)| lower.contains(pattern.as_str()))
            .map(|(_, response)| response.clone());

        match response {
            Some(MockResponse::Rows(result)) => {
                Ok(result.with_execution_time(Duration::from_millis(1)))
            }
            Some(MockResponse::Error(message)) => Err(AppError::execution(message)),
            None => Ok(QueryResult::with_data(
                vec![ColumnInfo::new(
                    "result",
                    "text",
                    self.dialect.map_native_type("text"),
                )],
                vec![vec![Value::String(format!("Mock result for: {sql}"))]],
            )
            .with_execution_time(Duration::from_millis(1))),
        }
    }

    async fn close(&self) -> Result<()> {
        self.state.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// Connector that hands out clones of one mock client.
#[derive(Debug, Clone)]
pub struct MockConnector {
    client: MockDatabaseClient,
    opens: Arc<AtomicUsize>,
}

impl MockConnector {
    pub fn new(client: MockDatabaseClient) -> Self {
        Self {
            client,
            opens: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of successful `open` calls.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// The shared mock client.
    pub fn client(&self) -> &MockDatabaseClient {
        &self.client
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn DatabaseClient>> {
        descriptor.validate_url()?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(self.client.clone()))
    }
}

/// Connector whose every `open` fails with the given kind.
#[derive(Debug, Clone, Copy)]
pub struct FailingConnector {
    kind: ConnectionErrorKind,
}

impl FailingConnector {
    pub fn new(kind: ConnectionErrorKind) -> Self {
        Self { kind }
    }
}

#[async_trait]
impl Connector for FailingConnector {
    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<Box<dyn DatabaseClient>> {
        Err(AppError::connection(
            self.kind,
            format!("Mock connection failure for '{}'", descriptor.name),
        ))
    }
}
