//! Presents a shallow, category-scoped tool surface over a (possibly large)
//! Toolset by intercepting `list_tools`/`call_tool` with a small set of
//! always-visible navigation tools. See §4.5.

use std::collections::BTreeMap;
use std::sync::Arc;

use rmcp::service::{Peer, RoleServer};
use serde_json::{Map, Value};
use tokio::sync::RwLock;

use crate::category_mapper::{self, Route};
use crate::error::AirflowMcpError;
use crate::http_client::HttpClientHandle;
use crate::toolset::{CallResult, ToolDescriptor, Toolset};

const DEFAULT_CATEGORY: &str = "DAG";

/// Per-session navigation state. Lives on the `ServerHandler` instance for
/// one connection, never shared across sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCategoryState {
    Unset,
    Selected(String),
}

/// Category name -> its routes, built once from the Toolset's document and
/// filtered to the methods the Toolset actually admits.
pub struct CategoryIndex {
    categories: BTreeMap<String, Vec<Route>>,
}

impl CategoryIndex {
    pub fn build(doc: &openapiv3::OpenAPI, allowed_methods: &[&str]) -> Self {
        let mut categories = category_mapper::extract_categories(doc);
        for routes in categories.values_mut() {
            *routes = category_mapper::filter_routes_by_methods(routes, allowed_methods);
        }
        categories.retain(|_, routes| !routes.is_empty());
        Self { categories }
    }

    pub fn names(&self) -> Vec<String> {
        self.categories.keys().cloned().collect()
    }

    pub fn routes(&self, category: &str) -> &[Route] {
        self.categories
            .get(category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn tool_names(&self, category: &str) -> Vec<String> {
        self.routes(category)
            .iter()
            .map(category_mapper::tool_name_for_route)
            .collect()
    }

    pub fn has_category(&self, category: &str) -> bool {
        self.categories.contains_key(category)
    }

    pub fn as_map(&self) -> &BTreeMap<String, Vec<Route>> {
        &self.categories
    }
}

/// Owns a non-owning reference to the Toolset and its CategoryIndex, plus
/// the one session's navigation state.
pub struct HierarchicalManager {
    toolset: Arc<Toolset>,
    index: Arc<CategoryIndex>,
    state: RwLock<SessionCategoryState>,
}

impl HierarchicalManager {
    pub fn new(toolset: Arc<Toolset>, index: Arc<CategoryIndex>) -> Self {
        let initial = if index.has_category(DEFAULT_CATEGORY) {
            SessionCategoryState::Selected(DEFAULT_CATEGORY.to_string())
        } else {
            SessionCategoryState::Unset
        };
        Self {
            toolset,
            index,
            state: RwLock::new(initial),
        }
    }

    pub async fn current_state(&self) -> SessionCategoryState {
        self.state.read().await.clone()
    }

    pub async fn list_tools(&self) -> Vec<ToolDescriptor> {
        let mut tools = navigation_tool_descriptors();

        if let SessionCategoryState::Selected(category) = self.current_state().await {
            let names = self.index.tool_names(&category);
            tools.extend(self.toolset.tool_names_in(&names));
        }

        tools
    }

    pub async fn call_tool(
        &self,
        name: &str,
        args: Map<String, Value>,
        http: &HttpClientHandle,
        peer: &Peer<RoleServer>,
    ) -> Result<CallResult, AirflowMcpError> {
        match name {
            "browse_categories" => Ok(text_result(category_mapper::format_categories(self.index.as_map()))),
            "select_category" => self.select_category(args, peer).await,
            "get_current_category" => Ok(text_result(self.current_category_text().await)),
            "back_to_categories" => self.back_to_categories(peer).await,
            _ => self.toolset.call_tool(name, args, http).await,
        }
    }

    async fn select_category(
        &self,
        args: Map<String, Value>,
        peer: &Peer<RoleServer>,
    ) -> Result<CallResult, AirflowMcpError> {
        let Some(category) = args.get("category").and_then(Value::as_str) else {
            return Ok(text_result(
                "select_category requires a 'category' string argument.".to_string(),
            ));
        };

        if !self.index.has_category(category) {
            let known = self.index.names().join(", ");
            return Ok(text_result(format!(
                "Unknown category '{category}'. Known categories: {known}."
            )));
        }

        // Release the write lock before the notification `.await` -- never
        // hold a lock guard across a suspension point.
        {
            let mut state = self.state.write().await;
            *state = SessionCategoryState::Selected(category.to_string());
        }

        peer.notify_tool_list_changed()
            .await
            .map_err(|e| AirflowMcpError::UpstreamError(e.to_string()))?;

        let routes = self.index.routes(category);
        Ok(text_result(category_mapper::format_category_tools(category, routes)))
    }

    async fn back_to_categories(&self, peer: &Peer<RoleServer>) -> Result<CallResult, AirflowMcpError> {
        {
            let mut state = self.state.write().await;
            *state = SessionCategoryState::Unset;
        }

        peer.notify_tool_list_changed()
            .await
            .map_err(|e| AirflowMcpError::UpstreamError(e.to_string()))?;

        Ok(text_result(category_mapper::format_categories(self.index.as_map())))
    }

    async fn current_category_text(&self) -> String {
        match self.current_state().await {
            SessionCategoryState::Unset => "No category selected.".to_string(),
            SessionCategoryState::Selected(c) => {
                let count = self.index.tool_names(&c).len();
                format!("Current category: '{c}' ({count} tools).")
            }
        }
    }
}

pub fn is_navigation_tool(name: &str) -> bool {
    matches!(
        name,
        "browse_categories" | "select_category" | "get_current_category" | "back_to_categories"
    )
}

fn navigation_tool_descriptors() -> Vec<ToolDescriptor> {
    vec![
        ToolDescriptor {
            name: "browse_categories".to_string(),
            description: "List the available tool categories.".to_string(),
            input_schema: empty_object_schema(),
        },
        ToolDescriptor {
            name: "select_category".to_string(),
            description: "Select a category, narrowing the visible tool list to it.".to_string(),
            input_schema: category_arg_schema(),
        },
        ToolDescriptor {
            name: "get_current_category".to_string(),
            description: "Report the currently selected category, if any.".to_string(),
            input_schema: empty_object_schema(),
        },
        ToolDescriptor {
            name: "back_to_categories".to_string(),
            description: "Clear the selected category and return to the top-level category list."
                .to_string(),
            input_schema: empty_object_schema(),
        },
    ]
}

fn empty_object_schema() -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("type".into(), Value::String("object".into()));
    m.insert("properties".into(), Value::Object(Map::new()));
    m
}

fn category_arg_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert("category".into(), serde_json::json!({"type": "string"}));
    let mut m = Map::new();
    m.insert("type".into(), Value::String("object".into()));
    m.insert("properties".into(), Value::Object(properties));
    m.insert("required".into(), serde_json::json!(["category"]));
    m
}

fn text_result(text: String) -> CallResult {
    CallResult {
        text: Some(text),
        structured: None,
        is_error: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> openapiv3::OpenAPI {
        let body = r#"{
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/dags": {"get": {"operationId": "get_dags", "tags": ["DAG"], "responses": {"200": {"description": "ok"}}}},
                "/connections": {"get": {"operationId": "get_connections", "tags": ["Connections"], "responses": {"200": {"description": "ok"}}}}
            }
        }"#;
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn default_category_selected_when_dag_present() {
        let document = doc();
        let index = Arc::new(CategoryIndex::build(&document, &["GET"]));
        let toolset = Arc::new(Toolset::from_document(&document, false));
        let manager = HierarchicalManager::new(toolset, index);
        assert_eq!(
            manager.state.try_read().unwrap().clone(),
            SessionCategoryState::Selected("DAG".to_string())
        );
    }

    #[test]
    fn category_index_drops_empty_categories() {
        let document = doc();
        // No GET-filtered category is empty here, but build() should still
        // only contain categories that survive the method filter.
        let index = CategoryIndex::build(&document, &["GET"]);
        assert!(index.has_category("DAG"));
        assert!(index.has_category("Connections"));
    }
}
