//! Ad-hoc query requests against the mock adapter.

use super::common::{shop_client, shop_connector, shop_descriptor, shop_service, SHOP};
use db_query::db::{CanonicalType, ColumnInfo, Dialect, MockConnector, QueryResult, Value};
use db_query::error::AppError;
use db_query::metadata::InMemoryMetadataCache;
use db_query::persistence::StaticConnections;
use db_query::query::QueryResultSet;
use db_query::service::QueryService;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_missing_limit_is_injected() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let result = service
        .query(SHOP, "SELECT * FROM users -- everyone\n;")
        .await
        .unwrap();

    assert_eq!(result.row_count(), 2);
    assert_eq!(
        connector.client().executed_sql(),
        vec!["SELECT * FROM users LIMIT 1000".to_string()]
    );
}

#[tokio::test]
async fn test_existing_limit_is_left_alone() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    service
        .query(SHOP, "SELECT * FROM users LIMIT 5000")
        .await
        .unwrap();

    assert_eq!(
        connector.client().executed_sql(),
        vec!["SELECT * FROM users LIMIT 5000".to_string()]
    );
}

#[tokio::test]
async fn test_writes_are_rejected_before_execution() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    for sql in [
        "DELETE FROM users",
        "UPDATE users SET email = NULL",
        "DROP TABLE users",
        "SELECT 1; DELETE FROM users",
        "INSERT INTO users (id) VALUES (3)",
    ] {
        let err = service.query(SHOP, sql).await.unwrap_err();
        assert!(
            matches!(err, AppError::ForbiddenStatement { .. }),
            "{sql} gave {err:?}"
        );
    }

    assert_eq!(connector.open_count(), 0);
    assert!(connector.client().executed_sql().is_empty());
}

#[tokio::test]
async fn test_syntax_error_carries_position() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let err = service
        .query(SHOP, "SELECT * FROM users WHERE id = = 1")
        .await
        .unwrap_err();

    assert_eq!(err.code(), "SQL_SYNTAX_ERROR");
    let details = err.details().unwrap();
    assert_eq!(details["line"], 1);
    assert!(details["column"].as_u64().is_some());
    assert_eq!(connector.open_count(), 0);
}

#[tokio::test]
async fn test_engine_error_is_verbatim() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let err = service
        .query(SHOP, "SELECT * FROM missing")
        .await
        .unwrap_err();

    match err {
        AppError::Execution { message, .. } => {
            assert_eq!(message, "relation \"missing\" does not exist")
        }
        other => panic!("expected execution error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_result_serialization_shape() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let result = service.query(SHOP, "SELECT * FROM users").await.unwrap();
    let json = serde_json::to_value(&result).unwrap();

    assert_eq!(
        json["columns"],
        json!(["id", "email", "active", "created_at"])
    );
    assert_eq!(json["columnTypes"][3]["canonicalType"], "datetime");
    assert_eq!(json["rowCount"], 2);
    assert_eq!(
        json["rows"][0],
        json!({
            "id": 1,
            "email": "ada@example.com",
            "active": true,
            "created_at": "2024-03-01T09:30:00+00:00"
        })
    );
    assert_eq!(json["rows"][1]["active"], serde_json::Value::Null);
    assert!(json["executionTime"].is_number());
}

#[tokio::test]
async fn test_duplicate_columns_are_disambiguated() {
    let int4 = |name: &str| ColumnInfo::new(name, "int4", CanonicalType::Integer);
    let client = shop_client().with_result(
        "join",
        QueryResult::with_data(
            vec![int4("id"), int4("id"), int4("id")],
            vec![vec![Value::Int(1), Value::Int(10), Value::Int(100)]],
        ),
    );
    let connector = MockConnector::new(client);
    let service = shop_service(&connector);

    let result = service
        .query(SHOP, "SELECT u.id, o.id, p.id FROM a u JOIN b o ON true JOIN c p ON true")
        .await
        .unwrap();

    assert_eq!(result.column_names(), vec!["id", "id_1", "id_2"]);
    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["rows"][0], json!({"id": 1, "id_1": 10, "id_2": 100}));
}

#[tokio::test]
async fn test_client_held_result_round_trips_through_json() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let result = service.query(SHOP, "SELECT * FROM users").await.unwrap();
    let posted = serde_json::to_value(&result).unwrap();
    let restored = QueryResultSet::from_json(&posted).unwrap();

    assert_eq!(restored.row_count(), 2);
    assert_eq!(restored.column_names(), result.column_names());
    assert_eq!(restored.rows[0][0], Value::Int(1));
    assert!(matches!(restored.rows[0][3], Value::TimestampTz(_)));
}

#[tokio::test]
async fn test_mysql_connection_resolves_independently() {
    let mysql = db_query::db::ConnectionDescriptor::new(
        "warehouse",
        Dialect::MySql,
        "mysql://root@localhost/warehouse",
    );
    let connector = shop_connector();
    let service = QueryService::new(
        Arc::new(StaticConnections::new().with(shop_descriptor()).with(mysql)),
        Arc::new(connector.clone()),
        Arc::new(InMemoryMetadataCache::new()),
    );

    service.query("warehouse", "SELECT 1").await.unwrap();
    service.query(SHOP, "SELECT 1").await.unwrap();

    assert_eq!(connector.open_count(), 2);
}
