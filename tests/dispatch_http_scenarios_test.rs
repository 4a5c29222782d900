//! End-to-end scenarios S1-S4: compiling a toolset from an in-memory OpenAPI
//! document and dispatching a call against a mocked upstream Airflow.

use airflow_mcp_server::http_client::HttpClientHandle;
use airflow_mcp_server::toolset::Toolset;
use openapiv3::OpenAPI;
use serde_json::{json, Map, Value};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn items_spec() -> OpenAPI {
    let body = r#"{
        "openapi": "3.0.0",
        "info": {"title": "items", "version": "1"},
        "paths": {
            "/items/{item_id}": {
                "get": {
                    "operationId": "get_item",
                    "tags": ["Items"],
                    "parameters": [
                        {"name": "item_id", "in": "path", "required": true, "schema": {"type": "string"}},
                        {"name": "limit", "in": "query", "required": false, "schema": {"type": "integer"}},
                        {"name": "exclude_stale", "in": "query", "required": false, "schema": {"type": "boolean"}},
                        {"name": "order_by", "in": "query", "required": false, "schema": {"type": "array", "items": {"type": "string"}}}
                    ],
                    "responses": {"200": {"description": "ok"}}
                },
                "post": {
                    "operationId": "create_item",
                    "tags": ["Items"],
                    "parameters": [
                        {"name": "item_id", "in": "path", "required": true, "schema": {"type": "string"}}
                    ],
                    "responses": {"200": {"description": "ok"}}
                }
            }
        }
    }"#;
    serde_json::from_str(body).unwrap()
}

/// S1 -- safe mode filters mutations.
#[test]
fn s1_safe_mode_filters_mutations() {
    let spec = items_spec();

    let read_only = Toolset::from_document(&spec, false);
    let names: Vec<String> = read_only.list_tools().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["get_item".to_string()]);

    let read_write = Toolset::from_document(&spec, true);
    let names: Vec<String> = read_write.list_tools().into_iter().map(|t| t.name).collect();
    assert_eq!(names, vec!["create_item".to_string(), "get_item".to_string()]);
}

fn args() -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("item_id".to_string(), json!("alpha"));
    m.insert("limit".to_string(), json!(5));
    m.insert("exclude_stale".to_string(), json!(true));
    m.insert("order_by".to_string(), json!(["dag_id"]));
    m
}

/// S2 -- call_tool primitive serialization: verify the outbound request
/// shape the mock observes.
#[tokio::test]
async fn s2_call_tool_primitive_serialization() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/alpha"))
        .and(query_param("limit", "5"))
        .and(query_param("exclude_stale", "true"))
        .and(query_param("order_by", "dag_id"))
        .respond_with(ResponseTemplate::new(200).set_body_string("ok").insert_header("content-type", "text/plain"))
        .expect(1)
        .mount(&server)
        .await;

    let toolset = Toolset::from_document(&items_spec(), false);
    let http = HttpClientHandle::new(server.uri(), "token").unwrap();

    let result = toolset.call_tool("get_item", args(), &http).await.unwrap();
    assert!(!result.is_error);
}

/// S3 -- content-type fallback: a `text/plain` reply becomes a single text
/// content part with no structured payload.
#[tokio::test]
async fn s3_content_type_fallback_to_text() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/alpha"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("plain text")
                .insert_header("content-type", "text/plain"),
        )
        .mount(&server)
        .await;

    let toolset = Toolset::from_document(&items_spec(), false);
    let http = HttpClientHandle::new(server.uri(), "token").unwrap();

    let result = toolset.call_tool("get_item", args(), &http).await.unwrap();
    assert_eq!(result.text.as_deref(), Some("plain text"));
    assert!(result.structured.is_none());
    assert!(!result.is_error);
}

/// S4 -- a JSON reply becomes a structured payload with no text part.
#[tokio::test]
async fn s4_json_reply_becomes_structured_result() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/items/alpha"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let toolset = Toolset::from_document(&items_spec(), false);
    let http = HttpClientHandle::new(server.uri(), "token").unwrap();

    let result = toolset.call_tool("get_item", args(), &http).await.unwrap();
    assert!(result.text.is_none());
    assert_eq!(result.structured, Some(json!({"ok": true})));
    assert!(!result.is_error);
}
