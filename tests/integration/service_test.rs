//! Natural-language requests through the service facade.

use super::common::{shop_connector, shop_service, SHOP};
use db_query::db::MockConnector;
use db_query::llm::{LlmSqlGenerator, MockLlmClient, Role};
use db_query::service::QueryService;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn nl_service(connector: &MockConnector, llm: &MockLlmClient) -> QueryService {
    shop_service(connector).with_generator(Arc::new(LlmSqlGenerator::new(llm.clone())))
}

#[tokio::test]
async fn test_question_runs_generated_sql() {
    let connector = shop_connector();
    let llm = MockLlmClient::new();
    let service = nl_service(&connector, &llm);

    let response = service
        .natural_language(SHOP, "Show all users please")
        .await
        .unwrap();

    assert_eq!(response.generated.sql, "SELECT * FROM users");
    assert_eq!(response.generated.explanation, "Lists every user.");
    assert_eq!(response.result.row_count(), 2);
    assert_eq!(
        connector.client().executed_sql().last().unwrap(),
        "SELECT * FROM users LIMIT 1000"
    );
}

#[tokio::test]
async fn test_schema_is_sent_with_question() {
    let connector = shop_connector();
    let llm = MockLlmClient::new();
    let service = nl_service(&connector, &llm);

    service
        .natural_language(SHOP, "count the orders")
        .await
        .unwrap();

    let requests = llm.requests();
    assert_eq!(requests.len(), 1);
    let system = &requests[0][0];
    assert_eq!(system.role, Role::System);
    assert!(system.content.contains("public.users"));
    assert!(system.content.contains("public.orders"));
    assert_eq!(requests[0][1].content, "count the orders");
}

#[tokio::test]
async fn test_generated_write_is_rejected() {
    let connector = shop_connector();
    let llm = MockLlmClient::new();
    let service = nl_service(&connector, &llm);

    let err = service
        .natural_language(SHOP, "delete the first user")
        .await
        .unwrap_err();

    assert_eq!(err.code(), "FORBIDDEN_STATEMENT");
    assert!(connector.client().executed_sql().is_empty());
}

#[tokio::test]
async fn test_unusable_answer_is_llm_error() {
    let connector = shop_connector();
    let llm = MockLlmClient::new();
    let service = nl_service(&connector, &llm);

    let err = service
        .natural_language(SHOP, "what is the meaning of life")
        .await
        .unwrap_err();

    assert_eq!(err.code(), "LLM_ERROR");
}

#[tokio::test]
async fn test_second_question_uses_cached_metadata() {
    let connector = shop_connector();
    let llm = MockLlmClient::new();
    let service = nl_service(&connector, &llm);

    service.natural_language(SHOP, "show users").await.unwrap();
    service.natural_language(SHOP, "count users").await.unwrap();

    // One open for the catalog, one per executed query.
    assert_eq!(connector.open_count(), 3);
}

#[tokio::test]
async fn test_without_generator() {
    let connector = shop_connector();
    let service = shop_service(&connector);

    let err = service
        .natural_language(SHOP, "show users")
        .await
        .unwrap_err();

    assert_eq!(err.code(), "LLM_ERROR");
    assert_eq!(connector.open_count(), 0);
}

#[tokio::test]
async fn test_response_json_shape() {
    let connector = shop_connector();
    let llm = MockLlmClient::new()
        .with_response("emails", "```sql\nSELECT email FROM users\n```");
    let service = nl_service(&connector, &llm);

    let response = service
        .natural_language(SHOP, "list the emails")
        .await
        .unwrap();
    let json = serde_json::to_value(&response).unwrap();

    assert_eq!(json["sql"], "SELECT email FROM users");
    assert!(json["explanation"].is_string());
    assert_eq!(json["result"]["rowCount"], 2);
}
