//! Metadata extraction through the service facade.

use super::common::{shop_connector, shop_service, SHOP};
use db_query::db::{CanonicalType, TableKind};
use pretty_assertions::assert_eq;

#[tokio::test]
async fn test_snapshot_shape() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let snapshot = service.metadata(SHOP, false).await.unwrap();

    assert_eq!(snapshot.connection_name, SHOP);
    assert_eq!(snapshot.table_count(), 2);
    assert_eq!(snapshot.view_count(), 1);

    let users = snapshot.find_table("public", "users").unwrap();
    assert!(users.has_contiguous_ordinals());
    let ordinals: Vec<u32> = users.columns.iter().map(|c| c.ordinal_position).collect();
    assert_eq!(ordinals, vec![1, 2, 3, 4]);
    assert_eq!(users.primary_key(), vec!["id"]);
    assert_eq!(users.row_count, Some(2));

    let types: Vec<CanonicalType> = users.columns.iter().map(|c| c.canonical_type).collect();
    assert_eq!(
        types,
        vec![
            CanonicalType::Integer,
            CanonicalType::Text,
            CanonicalType::Boolean,
            CanonicalType::Datetime,
        ]
    );
}

#[tokio::test]
async fn test_zero_estimate_and_views_have_no_row_count() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let snapshot = service.metadata(SHOP, false).await.unwrap();

    assert_eq!(snapshot.find_table("public", "orders").unwrap().row_count, None);
    let view = snapshot.find_table("public", "active_users").unwrap();
    assert_eq!(view.kind, TableKind::View);
    assert_eq!(view.row_count, None);
}

#[tokio::test]
async fn test_cache_and_forced_refresh() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let first = service.metadata(SHOP, false).await.unwrap();
    let cached = service.metadata(SHOP, false).await.unwrap();
    assert_eq!(first, cached);
    assert_eq!(connector.open_count(), 1);

    let refreshed = service.metadata(SHOP, true).await.unwrap();
    assert_eq!(connector.open_count(), 2);
    assert!(refreshed.extracted_at >= first.extracted_at);
}

#[tokio::test]
async fn test_failed_refresh_keeps_previous_snapshot() {
    let connector = shop_connector();
    let service = shop_service(&connector);
    let original = service.metadata(SHOP, false).await.unwrap();

    connector.client().set_catalog_failure(true);
    let err = service.metadata(SHOP, true).await.unwrap_err();
    assert_eq!(err.code(), "METADATA_EXTRACTION_ERROR");

    connector.client().set_catalog_failure(false);
    assert_eq!(service.metadata(SHOP, false).await.unwrap(), original);
}

#[tokio::test]
async fn test_invalidate_forces_extraction() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    service.metadata(SHOP, false).await.unwrap();
    service.invalidate_metadata(SHOP).await.unwrap();
    service.metadata(SHOP, false).await.unwrap();

    assert_eq!(connector.open_count(), 2);
}

#[tokio::test]
async fn test_snapshot_serializes_camel_case() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let snapshot = service.metadata(SHOP, false).await.unwrap();
    let json = serde_json::to_value(&snapshot).unwrap();

    assert_eq!(json["connectionName"], SHOP);
    assert_eq!(json["tables"][0]["columns"][0]["canonicalType"], "integer");
    assert_eq!(json["tables"][0]["columns"][0]["isPrimaryKey"], true);
    assert!(json["extractedAt"].is_string());
}

#[tokio::test]
async fn test_llm_context_lists_qualified_tables() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let context = service.metadata(SHOP, false).await.unwrap().format_for_llm();

    assert!(context.contains("public.users"));
    assert!(context.contains("public.active_users"));
}
