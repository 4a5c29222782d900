//! Pure functions that group OpenAPI operations into human-navigable categories.
//!
//! Everything here is a pure function over an already-parsed [`openapiv3::OpenAPI`]
//! document; no I/O, no state. The Hierarchical Manager builds its
//! [`crate::hierarchical::CategoryIndex`] on top of these.

use openapiv3::OpenAPI;
use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

const UNCATEGORIZED: &str = "Uncategorized";

static NON_IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-zA-Z0-9]+").expect("static regex is valid"));

/// A single `path + method` operation, stripped of everything but what the
/// Category Mapper and Hierarchical Manager need to display and route it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub path: String,
    pub method: String,
    pub operation_id: Option<String>,
    pub summary: Option<String>,
    pub description: Option<String>,
}

/// Walks `doc`, grouping every operation by its first OpenAPI tag (falling
/// back to [`UNCATEGORIZED`]). Categories are returned in sorted order so
/// that downstream formatting is deterministic.
pub fn extract_categories(doc: &OpenAPI) -> BTreeMap<String, Vec<Route>> {
    let mut categories: BTreeMap<String, Vec<Route>> = BTreeMap::new();

    for (path, path_item_ref) in doc.paths.paths.iter() {
        let Some(path_item) = path_item_ref.as_item() else {
            continue;
        };

        for (method, operation) in operations_of(path_item) {
            let category = operation
                .tags
                .first()
                .cloned()
                .unwrap_or_else(|| UNCATEGORIZED.to_string());

            categories.entry(category).or_default().push(Route {
                path: path.clone(),
                method: method.to_string(),
                operation_id: operation.operation_id.clone(),
                summary: operation.summary.clone(),
                description: operation.description.clone(),
            });
        }
    }

    categories
}

fn operations_of(item: &openapiv3::PathItem) -> Vec<(&'static str, &openapiv3::Operation)> {
    let mut ops = Vec::new();
    if let Some(op) = &item.get {
        ops.push(("GET", op));
    }
    if let Some(op) = &item.post {
        ops.push(("POST", op));
    }
    if let Some(op) = &item.put {
        ops.push(("PUT", op));
    }
    if let Some(op) = &item.delete {
        ops.push(("DELETE", op));
    }
    if let Some(op) = &item.patch {
        ops.push(("PATCH", op));
    }
    ops
}

/// Keeps only routes whose HTTP method is in `allowed`.
pub fn filter_routes_by_methods(routes: &[Route], allowed: &[&str]) -> Vec<Route> {
    routes
        .iter()
        .filter(|r| allowed.iter().any(|m| m.eq_ignore_ascii_case(&r.method)))
        .cloned()
        .collect()
}

/// Renders the `browse_categories` body: a bulleted summary with tool counts.
pub fn format_categories(categories: &BTreeMap<String, Vec<Route>>) -> String {
    if categories.is_empty() {
        return "No categories are available.".to_string();
    }

    let mut out = String::from("Available categories:\n");
    for (name, routes) in categories {
        out.push_str(&format!("- {name} ({} tools)\n", routes.len()));
    }
    out.push_str("\nCall select_category(\"<name>\") to explore a category's tools.");
    out
}

/// Renders the `category_info`-equivalent body for a single selected category.
pub fn format_category_tools(category: &str, routes: &[Route]) -> String {
    let mut by_method: BTreeMap<&str, Vec<&Route>> = BTreeMap::new();
    for route in routes {
        by_method.entry(route.method.as_str()).or_default().push(route);
    }

    let mut out = format!("Tools in category '{category}':\n");
    for (method, routes) in by_method {
        out.push_str(&format!("\n{method}:\n"));
        for route in routes {
            let name = tool_name_for_route(route);
            let summary = route
                .summary
                .clone()
                .or_else(|| route.description.clone())
                .unwrap_or_else(|| route.path.clone());
            out.push_str(&format!("- {name}: {summary}\n"));
        }
    }
    out.push_str("\nCall back_to_categories() to return to the category list.");
    out
}

/// Uses `operation_id` when present; otherwise slugifies `method + path`.
pub fn tool_name_for_route(route: &Route) -> String {
    match &route.operation_id {
        Some(id) if !id.is_empty() => id.clone(),
        _ => slugify(&format!("{}_{}", route.method, route.path)),
    }
}

fn slugify(raw: &str) -> String {
    let replaced = NON_IDENTIFIER.replace_all(raw, "_");
    replaced.trim_matches('_').to_lowercase()
}
