//! Request-level facade.
//!
//! [`QueryService`] resolves connection names and drives the metadata,
//! query, export and natural-language pipelines. Every request opens its
//! own database handle; the metadata cache is the only shared state.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::LimitsConfig;
use crate::db::{self, ConnectionDescriptor, Connector, MetadataSnapshot};
use crate::error::{AppError, Result};
use crate::export::{ExportEngine, ExportFormat, ExportOutput};
use crate::llm::{GeneratedSql, SqlGenerator};
use crate::metadata::{MetadataCache, MetadataExtractor};
use crate::persistence::ConnectionResolver;
use crate::query::{QueryExecutor, QueryResultSet};
use crate::safety::DEFAULT_ROW_CEILING;

/// What an export request serializes.
#[derive(Debug, Clone)]
pub enum ExportSource {
    /// SQL to run against the connection first.
    Sql(String),
    /// A result set the caller already holds.
    ResultSet(QueryResultSet),
}

/// Answer to a natural-language request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NaturalLanguageResponse {
    #[serde(flatten)]
    pub generated: GeneratedSql,
    pub result: QueryResultSet,
}

/// Entry point for all requests against named connections.
#[derive(Clone)]
pub struct QueryService {
    resolver: Arc<dyn ConnectionResolver>,
    connector: Arc<dyn Connector>,
    metadata: MetadataExtractor,
    executor: QueryExecutor,
    exporter: ExportEngine,
    generator: Option<Arc<dyn SqlGenerator>>,
}

impl QueryService {
    /// Creates a service with default limits and no SQL generator.
    pub fn new(
        resolver: Arc<dyn ConnectionResolver>,
        connector: Arc<dyn Connector>,
        cache: Arc<dyn MetadataCache>,
    ) -> Self {
        Self {
            metadata: MetadataExtractor::new(connector.clone(), cache),
            executor: QueryExecutor::new(connector.clone(), DEFAULT_ROW_CEILING),
            exporter: ExportEngine::default(),
            generator: None,
            resolver,
            connector,
        }
    }

    /// Applies the configured row ceiling and export limit.
    pub fn with_limits(mut self, limits: &LimitsConfig) -> Self {
        self.executor = QueryExecutor::new(self.connector.clone(), limits.query_row_ceiling);
        self.exporter = ExportEngine::new(limits.export_row_limit);
        self
    }

    /// Enables natural-language requests.
    pub fn with_generator(mut self, generator: Arc<dyn SqlGenerator>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Returns the metadata snapshot for `connection_name`.
    pub async fn metadata(
        &self,
        connection_name: &str,
        force_refresh: bool,
    ) -> Result<MetadataSnapshot> {
        let descriptor = self.resolver.resolve(connection_name).await?;
        let snapshot = self.metadata.get_metadata(&descriptor, force_refresh).await?;
        self.mark_connected(connection_name).await;
        Ok(snapshot)
    }

    /// Drops the cached snapshot for `connection_name`.
    pub async fn invalidate_metadata(&self, connection_name: &str) -> Result<()> {
        self.metadata.invalidate(connection_name).await
    }

    /// Validates and runs one SQL text.
    pub async fn query(&self, connection_name: &str, sql: &str) -> Result<QueryResultSet> {
        let descriptor = self.resolver.resolve(connection_name).await?;
        let result = self.executor.run(&descriptor, sql).await?;
        self.mark_connected(connection_name).await;
        Ok(result)
    }

    /// Serializes a result set, running the SQL first when given one.
    ///
    /// SQL sources run with a ceiling one above the export limit so an
    /// oversized result is reported as too large instead of being cut
    /// short.
    pub async fn export(
        &self,
        connection_name: &str,
        source: ExportSource,
        format: ExportFormat,
    ) -> Result<ExportOutput> {
        match source {
            ExportSource::ResultSet(result) => {
                self.exporter.export(&result, format, connection_name)
            }
            ExportSource::Sql(sql) => {
                let descriptor = self.resolver.resolve(connection_name).await?;
                let ceiling = self.exporter.row_limit() as u64 + 1;
                let result = self
                    .executor
                    .run_with_ceiling(&descriptor, &sql, ceiling)
                    .await?;
                self.mark_connected(connection_name).await;
                self.exporter.export(&result, format, connection_name)
            }
        }
    }

    /// Generates SQL for `prompt` and runs it through the query path.
    pub async fn natural_language(
        &self,
        connection_name: &str,
        prompt: &str,
    ) -> Result<NaturalLanguageResponse> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| AppError::llm("Natural-language queries are not configured"))?;

        let descriptor = self.resolver.resolve(connection_name).await?;
        let snapshot = self.metadata.get_metadata(&descriptor, false).await?;
        let generated = generator
            .generate(prompt, &snapshot, descriptor.dialect)
            .await?;
        debug!(sql = %generated.sql, "Running generated SQL");

        let result = self.executor.run(&descriptor, &generated.sql).await?;
        self.mark_connected(connection_name).await;
        Ok(NaturalLanguageResponse { generated, result })
    }

    /// Opens and closes a connection to verify it.
    pub async fn test_connection(&self, connection_name: &str) -> Result<ConnectionDescriptor> {
        let descriptor = self.resolver.resolve(connection_name).await?;
        db::test_connection(self.connector.as_ref(), &descriptor).await?;
        info!(connection = %connection_name, "Connection test succeeded");
        self.mark_connected(connection_name).await;
        Ok(descriptor)
    }

    async fn mark_connected(&self, connection_name: &str) {
        if let Err(e) = self.resolver.mark_connected(connection_name).await {
            warn!(connection = %connection_name, error = %e, "Failed to record connection use");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{
        ColumnInfo, Dialect, FailingConnector, MockConnector, MockDatabaseClient, QueryResult,
        RawColumn, TableKind, TableRef, Value,
    };
    use crate::error::ConnectionErrorKind;
    use crate::llm::{LlmSqlGenerator, MockLlmClient};
    use crate::metadata::InMemoryMetadataCache;
    use crate::persistence::StaticConnections;

    fn resolver() -> Arc<StaticConnections> {
        Arc::new(StaticConnections::new().with(ConnectionDescriptor::new(
            "shop",
            Dialect::Postgres,
            "postgres://localhost/shop",
        )))
    }

    fn client() -> MockDatabaseClient {
        MockDatabaseClient::new(Dialect::Postgres)
            .with_table(
                TableRef::new("public", "users", TableKind::Table),
                vec![RawColumn::new("id", "int4", 1).primary_key()],
                Some(3),
            )
            .with_result(
                "from users",
                QueryResult::with_data(
                    vec![ColumnInfo::new("id", "int4", Dialect::Postgres.map_native_type("int4"))],
                    vec![vec![Value::Int(1)], vec![Value::Int(2)], vec![Value::Int(3)]],
                ),
            )
    }

    fn service(connector: MockConnector) -> QueryService {
        QueryService::new(
            resolver(),
            Arc::new(connector),
            Arc::new(InMemoryMetadataCache::new()),
        )
    }

    #[tokio::test]
    async fn test_unknown_connection_is_not_found() {
        let service = service(MockConnector::new(client()));

        let err = service.query("nope", "SELECT 1").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_query_uses_configured_ceiling() {
        let connector = MockConnector::new(client());
        let limits = LimitsConfig {
            query_row_ceiling: 50,
            ..LimitsConfig::default()
        };
        let service = service(connector.clone()).with_limits(&limits);

        let result = service.query("shop", "SELECT id FROM users").await.unwrap();

        assert_eq!(result.row_count(), 3);
        assert_eq!(
            connector.client().executed_sql(),
            vec!["SELECT id FROM users LIMIT 50".to_string()]
        );
    }

    #[tokio::test]
    async fn test_export_sql_runs_one_above_limit() {
        let connector = MockConnector::new(client());
        let limits = LimitsConfig {
            export_row_limit: 2,
            ..LimitsConfig::default()
        };
        let service = service(connector.clone()).with_limits(&limits);

        let err = service
            .export(
                "shop",
                ExportSource::Sql("SELECT id FROM users".to_string()),
                ExportFormat::Csv,
            )
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::ExportTooLarge { limit: 2, actual: 3 }));
        assert_eq!(
            connector.client().executed_sql(),
            vec!["SELECT id FROM users LIMIT 3".to_string()]
        );
    }

    #[tokio::test]
    async fn test_export_result_set_needs_no_connection() {
        let service = QueryService::new(
            Arc::new(StaticConnections::new()),
            Arc::new(FailingConnector::new(ConnectionErrorKind::HostUnreachable)),
            Arc::new(InMemoryMetadataCache::new()),
        );
        let result = QueryResultSet::from_raw(
            QueryResult::with_data(
                vec![ColumnInfo::new("n", "int4", Dialect::Postgres.map_native_type("int4"))],
                vec![vec![Value::Int(7)]],
            ),
            std::time::Duration::ZERO,
        );

        let output = service
            .export("adhoc", ExportSource::ResultSet(result), ExportFormat::Json)
            .await
            .unwrap();

        assert!(output.filename.starts_with("adhoc_"));
        assert!(output.filename.ends_with(".json"));
    }

    #[tokio::test]
    async fn test_natural_language_requires_generator() {
        let service = service(MockConnector::new(client()));

        let err = service
            .natural_language("shop", "show users")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "LLM_ERROR");
    }

    #[tokio::test]
    async fn test_natural_language_runs_through_validator() {
        let connector = MockConnector::new(client());
        let service = service(connector.clone())
            .with_generator(Arc::new(LlmSqlGenerator::new(MockLlmClient::new())));

        let response = service.natural_language("shop", "show users").await.unwrap();
        assert_eq!(response.generated.sql, "SELECT * FROM users");
        assert_eq!(response.result.row_count(), 3);

        let err = service
            .natural_language("shop", "delete the user")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "FORBIDDEN_STATEMENT");
        assert_eq!(
            connector.client().executed_sql(),
            vec!["SELECT * FROM users LIMIT 1000".to_string()]
        );
    }

    #[tokio::test]
    async fn test_connection_test_reports_kind() {
        let service = QueryService::new(
            resolver(),
            Arc::new(FailingConnector::new(ConnectionErrorKind::AuthenticationRejected)),
            Arc::new(InMemoryMetadataCache::new()),
        );

        let err = service.test_connection("shop").await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Connection {
                kind: ConnectionErrorKind::AuthenticationRejected,
                ..
            }
        ));
    }
}
