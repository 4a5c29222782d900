//! Holds the compiled tool catalogue and enforces the read-only/read-write
//! policy. See [`dispatch`] for the HTTP request/response translation.

pub mod dispatch;

use std::collections::BTreeSet;

use indexmap::IndexMap;
use openapiv3::OpenAPI;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::AirflowMcpError;
use crate::http_client::HttpClientHandle;
use crate::schema_compiler::{compile_operation, OperationDescriptor, RefResolver};

pub use dispatch::CallResult;

const METHODS: &[&str] = &["GET", "POST", "PUT", "DELETE", "PATCH"];

/// What a tool looks like from the MCP peer's side: name, human
/// description, and the compiled JSON-Schema for its arguments.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Map<String, Value>,
}

/// The compiled tool catalogue for one OpenAPI document.
pub struct Toolset {
    operations: IndexMap<String, OperationDescriptor>,
    allow_mutations: bool,
}

impl Toolset {
    /// Compiles every `path x method` in `doc` into a tool. When
    /// `allow_mutations` is false, only `GET` operations are admitted --
    /// this is a strict subset, not a runtime filter, so a disallowed name
    /// simply never exists in the catalogue.
    pub fn from_document(doc: &OpenAPI, allow_mutations: bool) -> Self {
        let resolver = RefResolver::new(doc.components.as_ref());
        let mut operations = IndexMap::new();

        for (path, path_item_ref) in doc.paths.paths.iter() {
            let Some(path_item) = path_item_ref.as_item() else {
                continue;
            };

            for method in METHODS {
                if !allow_mutations && *method != "GET" {
                    continue;
                }
                let Some(operation) = method_operation(path_item, method) else {
                    continue;
                };

                match compile_operation(&resolver, doc.components.as_ref(), path, method, path_item, operation) {
                    Ok(descriptor) => {
                        if operations.contains_key(&descriptor.tool_name) {
                            warn!(tool = %descriptor.tool_name, "duplicate tool name; keeping first registration");
                            continue;
                        }
                        operations.insert(descriptor.tool_name.clone(), descriptor);
                    }
                    Err(err) => {
                        warn!(%path, %method, error = %err, "skipping operation that failed to compile");
                    }
                }
            }
        }

        Self {
            operations,
            allow_mutations,
        }
    }

    pub fn allow_mutations(&self) -> bool {
        self.allow_mutations
    }

    /// Stable, deterministic ordering: sorted by `(tag, tool_name)`.
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        let mut names: Vec<&String> = self.operations.keys().collect();
        names.sort_by_key(|name| {
            let op = &self.operations[*name];
            (op.tag.clone(), (*name).clone())
        });

        names
            .into_iter()
            .map(|name| self.tool_descriptor(&self.operations[name]))
            .collect()
    }

    pub fn tool_names_in(&self, names: &[String]) -> Vec<ToolDescriptor> {
        names
            .iter()
            .filter_map(|n| match self.operations.get(n) {
                Some(op) => Some(op),
                None => {
                    debug!(tool = %n, "category lists a tool name not present in the toolset; skipping");
                    None
                }
            })
            .map(|op| self.tool_descriptor(op))
            .collect()
    }

    pub fn get_operation(&self, name: &str) -> Result<&OperationDescriptor, AirflowMcpError> {
        self.operations
            .get(name)
            .ok_or_else(|| AirflowMcpError::NotFound(name.to_string()))
    }

    pub fn get_tool(&self, name: &str) -> Result<ToolDescriptor, AirflowMcpError> {
        self.get_operation(name).map(|op| self.tool_descriptor(op))
    }

    /// All distinct category (tag) names present in the catalogue, in sorted order.
    pub fn tags(&self) -> BTreeSet<String> {
        self.operations.values().map(|op| op.tag.clone()).collect()
    }

    pub async fn call_tool(
        &self,
        name: &str,
        args: Map<String, Value>,
        http: &HttpClientHandle,
    ) -> Result<CallResult, AirflowMcpError> {
        let descriptor = self.get_operation(name)?;
        dispatch::dispatch(descriptor, args, http).await
    }

    fn tool_descriptor(&self, op: &OperationDescriptor) -> ToolDescriptor {
        let description = op
            .summary
            .clone()
            .or_else(|| op.description.clone())
            .unwrap_or_else(|| op.tool_name.clone());
        ToolDescriptor {
            name: op.tool_name.clone(),
            description,
            input_schema: op.input_schema.clone(),
        }
    }
}

fn method_operation<'a>(item: &'a openapiv3::PathItem, method: &str) -> Option<&'a openapiv3::Operation> {
    match method {
        "GET" => item.get.as_ref(),
        "POST" => item.post.as_ref(),
        "PUT" => item.put.as_ref(),
        "DELETE" => item.delete.as_ref(),
        "PATCH" => item.patch.as_ref(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> OpenAPI {
        let body = r#"{
            "openapi": "3.0.0",
            "info": {"title": "t", "version": "1"},
            "paths": {
                "/items/{id}": {
                    "get": {"operationId": "get_item", "tags": ["Items"],
                        "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}],
                        "responses": {"200": {"description": "ok"}}},
                    "post": {"operationId": "create_item", "tags": ["Items"],
                        "parameters": [{"name": "id", "in": "path", "required": true, "schema": {"type": "string"}}],
                        "responses": {"200": {"description": "ok"}}}
                }
            }
        }"#;
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn read_only_toolset_exposes_only_get() {
        let doc = spec();
        let toolset = Toolset::from_document(&doc, false);
        let names: Vec<String> = toolset.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["get_item".to_string()]);
        assert!(matches!(toolset.get_operation("create_item"), Err(AirflowMcpError::NotFound(_))));
    }

    #[test]
    fn read_write_toolset_exposes_both_sorted() {
        let doc = spec();
        let toolset = Toolset::from_document(&doc, true);
        let names: Vec<String> = toolset.list_tools().into_iter().map(|t| t.name).collect();
        assert_eq!(names, vec!["create_item".to_string(), "get_item".to_string()]);
    }
}
