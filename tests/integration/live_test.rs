//! Tests against real servers.
//!
//! Set `DATABASE_URL` (Postgres) and/or `MYSQL_DATABASE_URL` to run them.

use db_query::db::{ConnectionDescriptor, DriverConnector, Value};
use db_query::metadata::InMemoryMetadataCache;
use db_query::persistence::StaticConnections;
use db_query::service::QueryService;
use std::sync::Arc;

fn descriptor_from_env(var: &str, name: &str) -> Option<ConnectionDescriptor> {
    let url = std::env::var(var).ok()?;
    ConnectionDescriptor::from_url(name, url).ok()
}

fn live_service(descriptor: ConnectionDescriptor) -> QueryService {
    QueryService::new(
        Arc::new(StaticConnections::new().with(descriptor)),
        Arc::new(DriverConnector::default()),
        Arc::new(InMemoryMetadataCache::new()),
    )
}

#[tokio::test]
async fn test_postgres_select_literals() {
    let Some(descriptor) = descriptor_from_env("DATABASE_URL", "pg") else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let service = live_service(descriptor);

    let result = service
        .query("pg", "SELECT 1 AS num, 'hello' AS greeting")
        .await
        .unwrap();

    assert_eq!(result.column_names(), vec!["num", "greeting"]);
    assert_eq!(result.rows[0][0], Value::Int(1));
    assert_eq!(result.rows[0][1], Value::from("hello"));
}

#[tokio::test]
async fn test_postgres_rejects_write_before_connecting() {
    let Some(descriptor) = descriptor_from_env("DATABASE_URL", "pg") else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let service = live_service(descriptor);

    let err = service
        .query("pg", "CREATE TABLE should_not_exist (id int)")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FORBIDDEN_STATEMENT");
}

#[tokio::test]
async fn test_postgres_metadata_excludes_system_schemas() {
    let Some(descriptor) = descriptor_from_env("DATABASE_URL", "pg") else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let service = live_service(descriptor);

    let snapshot = service.metadata("pg", true).await.unwrap();

    assert!(snapshot
        .tables
        .iter()
        .all(|t| t.schema != "pg_catalog" && t.schema != "information_schema"));
    assert!(snapshot.tables.iter().all(|t| t.has_contiguous_ordinals()));
}

#[tokio::test]
async fn test_postgres_engine_error_is_reported() {
    let Some(descriptor) = descriptor_from_env("DATABASE_URL", "pg") else {
        eprintln!("Skipping test: DATABASE_URL not set");
        return;
    };
    let service = live_service(descriptor);

    let err = service
        .query("pg", "SELECT * FROM table_that_does_not_exist_12345")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "EXECUTION_ERROR");
    assert!(err.to_string().contains("table_that_does_not_exist_12345"));
}

#[tokio::test]
async fn test_mysql_select_literals() {
    let Some(descriptor) = descriptor_from_env("MYSQL_DATABASE_URL", "my") else {
        eprintln!("Skipping test: MYSQL_DATABASE_URL not set");
        return;
    };
    let service = live_service(descriptor);

    let result = service
        .query("my", "SELECT 1 AS num, 'hello' AS greeting")
        .await
        .unwrap();

    assert_eq!(result.row_count(), 1);
    assert_eq!(result.rows[0][0], Value::Int(1));
    assert_eq!(result.rows[0][1], Value::from("hello"));
}

#[tokio::test]
async fn test_mysql_metadata_excludes_system_schemas() {
    let Some(descriptor) = descriptor_from_env("MYSQL_DATABASE_URL", "my") else {
        eprintln!("Skipping test: MYSQL_DATABASE_URL not set");
        return;
    };
    let service = live_service(descriptor);

    let snapshot = service.metadata("my", true).await.unwrap();

    assert!(snapshot.tables.iter().all(|t| !["mysql", "sys", "performance_schema"]
        .contains(&t.schema.as_str())));
}
