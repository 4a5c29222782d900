//! End-to-end scenarios S5-S6: drives the real compiled server over stdio
//! against a mocked upstream Airflow, exercising hierarchical navigation
//! through an actual MCP client session.

use rmcp::model::CallToolRequestParams;
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use rmcp::ServiceExt;
use serde_json::json;
use tokio::process::Command;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn dag_and_connections_spec() -> serde_json::Value {
    json!({
        "openapi": "3.0.0",
        "info": {"title": "airflow", "version": "1"},
        "paths": {
            "/dags": {
                "get": {"operationId": "list_dags", "tags": ["DAG"], "responses": {"200": {"description": "ok"}}}
            },
            "/connections": {
                "get": {"operationId": "list_connections", "tags": ["Connections"], "responses": {"200": {"description": "ok"}}}
            }
        }
    })
}

async fn spawn_server(upstream: &MockServer) -> rmcp::service::RunningService<rmcp::service::RoleClient, ()> {
    let bin = std::path::PathBuf::from(env!("CARGO_BIN_EXE_airflow-mcp-server"));
    ().serve(TokioChildProcess::new(Command::new(&bin).configure(|cmd| {
        cmd.env("AIRFLOW_BASE_URL", upstream.uri())
            .env("AUTH_TOKEN", "test-token")
            .kill_on_drop(true);
    })))
    .await
    .expect("server should start over stdio")
}

async fn mock_upstream() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/openapi.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(dag_and_connections_spec()))
        .mount(&server)
        .await;
    server
}

/// S5 -- hierarchical navigation: a fresh session auto-selects `DAG`;
/// selecting `Connections` swaps the visible tool set.
#[tokio::test]
async fn s5_hierarchical_navigation_switches_category() {
    let upstream = mock_upstream().await;
    let client = spawn_server(&upstream).await;

    let initial_tools = client.list_all_tools().await.expect("list_tools should succeed");
    let names: Vec<&str> = initial_tools.iter().map(|t| t.name.as_ref()).collect();
    assert!(names.contains(&"browse_categories"));
    assert!(names.contains(&"select_category"));
    assert!(names.contains(&"list_dags"));
    assert!(!names.contains(&"list_connections"));

    let select = client
        .call_tool(CallToolRequestParams {
            name: "select_category".into(),
            arguments: Some(json!({"category": "Connections"}).as_object().unwrap().clone()),
            task: None,
            meta: None,
        })
        .await
        .expect("select_category should succeed");
    assert!(!select.is_error.unwrap_or(false));

    let after_select = client.list_all_tools().await.expect("list_tools should succeed");
    let names: Vec<&str> = after_select.iter().map(|t| t.name.as_ref()).collect();
    assert!(names.contains(&"list_connections"));
    assert!(!names.contains(&"list_dags"));

    client.cancel().await.ok();
}

/// S6 -- selecting an unknown category reports the known ones and leaves
/// the session's current category untouched.
#[tokio::test]
async fn s6_unknown_category_lists_known_categories() {
    let upstream = mock_upstream().await;
    let client = spawn_server(&upstream).await;

    let result = client
        .call_tool(CallToolRequestParams {
            name: "select_category".into(),
            arguments: Some(json!({"category": "Nope"}).as_object().unwrap().clone()),
            task: None,
            meta: None,
        })
        .await
        .expect("select_category should not error the session");
    assert!(!result.is_error.unwrap_or(false));

    let tools = client.list_all_tools().await.expect("list_tools should succeed");
    let names: Vec<&str> = tools.iter().map(|t| t.name.as_ref()).collect();
    // Still on the default DAG category -- unknown selection is a no-op.
    assert!(names.contains(&"list_dags"));
    assert!(!names.contains(&"list_connections"));

    client.cancel().await.ok();
}
