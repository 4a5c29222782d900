//! Turns a compiled [`OperationDescriptor`] plus an argument object into a
//! concrete HTTP request, and translates the response back into MCP content.

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use reqwest::Method;
use serde_json::{Map, Value};

use crate::error::AirflowMcpError;
use crate::http_client::HttpClientHandle;
use crate::schema_compiler::OperationDescriptor;

const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b'/')
    .add(b'?')
    .add(b'#')
    .add(b' ')
    .add(b'"')
    .add(b'<')
    .add(b'>')
    .add(b'`')
    .add(b'{')
    .add(b'}');

/// Either a flat list of text content parts, or a structured JSON payload --
/// the dispatcher picks based on the upstream's content type, per §4.4 step 8.
#[derive(Debug, Clone)]
pub struct CallResult {
    pub text: Option<String>,
    pub structured: Option<Value>,
    pub is_error: bool,
}

pub async fn dispatch(
    descriptor: &OperationDescriptor,
    args: Map<String, Value>,
    http: &HttpClientHandle,
) -> Result<CallResult, AirflowMcpError> {
    validate_args(descriptor, &args)?;

    let (path_args, query_args, body_args) = partition(descriptor, &args);

    let url_path = render_url(&descriptor.path_template, &path_args)?;
    let url = format!("{}{}", http.base_url().trim_end_matches('/'), url_path);

    let method = Method::from_bytes(descriptor.http_method.as_bytes())
        .map_err(|e| AirflowMcpError::UpstreamError(e.to_string()))?;

    let mut request = http.client().request(method, &url).bearer_auth(http.token());

    let query_pairs = build_query_pairs(descriptor, &query_args);
    if !query_pairs.is_empty() {
        request = request.query(&query_pairs);
    }

    if descriptor.http_method != "GET" && !body_args.is_empty() {
        let body = build_body(descriptor, body_args);
        request = request.json(&body).header("content-type", "application/json");
    }
    request = request.header("accept", "application/json");

    let response = http
        .with_timeout(async {
            request
                .send()
                .await
                .map_err(|e| AirflowMcpError::UpstreamError(e.to_string()))
        })
        .await?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let body_text = response
        .text()
        .await
        .map_err(|e| AirflowMcpError::UpstreamError(e.to_string()))?;

    let is_error = status.as_u16() >= 400;

    if content_type.starts_with("application/json") {
        let parsed: Value = serde_json::from_str(&body_text)
            .unwrap_or_else(|_| Value::String(body_text.clone()));
        Ok(CallResult {
            text: None,
            structured: Some(parsed),
            is_error,
        })
    } else {
        Ok(CallResult {
            text: Some(body_text),
            structured: None,
            is_error,
        })
    }
}

fn validate_args(
    descriptor: &OperationDescriptor,
    args: &Map<String, Value>,
) -> Result<(), AirflowMcpError> {
    for key in &descriptor.required_keys {
        if !args.contains_key(key) {
            return Err(AirflowMcpError::invalid_argument(
                key.clone(),
                "missing required property",
            ));
        }
    }

    let Some(Value::Object(properties)) = descriptor.input_schema.get("properties") else {
        return Ok(());
    };

    for (key, value) in args {
        let Some(Value::Object(schema)) = properties.get(key) else {
            continue;
        };
        let Some(expected_type) = schema.get("type").and_then(Value::as_str) else {
            continue;
        };
        if value.is_null() {
            continue;
        }
        let matches = match expected_type {
            "string" => value.is_string(),
            "integer" => value.is_i64() || value.is_u64(),
            "number" => value.is_number(),
            "boolean" => value.is_boolean(),
            "array" => value.is_array(),
            "object" => value.is_object(),
            _ => true,
        };
        if !matches {
            return Err(AirflowMcpError::invalid_argument(
                key.clone(),
                format!("expected {expected_type}, got {value}"),
            ));
        }
    }

    Ok(())
}

fn partition(
    descriptor: &OperationDescriptor,
    args: &Map<String, Value>,
) -> (Map<String, Value>, Map<String, Value>, Map<String, Value>) {
    let mut path_args = Map::new();
    let mut query_args = Map::new();
    let mut body_args = Map::new();

    for name in &descriptor.parameter_map.path {
        if let Some(v) = args.get(name) {
            path_args.insert(name.clone(), v.clone());
        }
    }
    for name in &descriptor.parameter_map.query {
        if let Some(v) = args.get(name) {
            query_args.insert(name.clone(), v.clone());
        }
    }
    for name in &descriptor.parameter_map.body {
        if let Some(v) = args.get(name) {
            body_args.insert(name.clone(), v.clone());
        }
    }

    (path_args, query_args, body_args)
}

fn render_url(template: &str, path_args: &Map<String, Value>) -> Result<String, AirflowMcpError> {
    let mut out = String::with_capacity(template.len());
    let bytes = template.as_bytes();
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'{' {
            let end = template[i..]
                .find('}')
                .map(|rel| i + rel)
                .ok_or_else(|| AirflowMcpError::invalid_argument(template, "unterminated path placeholder"))?;
            let name = &template[i + 1..end];
            let value = path_args
                .get(name)
                .ok_or_else(|| AirflowMcpError::invalid_argument(name, "missing required path parameter"))?;
            let rendered = scalar_to_query_string(value)
                .ok_or_else(|| AirflowMcpError::invalid_argument(name, "path parameter cannot be null"))?;
            out.push_str(&utf8_percent_encode(&rendered, PATH_SEGMENT).to_string());
            i = end + 1;
        } else {
            let ch = template[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
    }

    Ok(out)
}

fn build_query_pairs(
    descriptor: &OperationDescriptor,
    query_args: &Map<String, Value>,
) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for name in &descriptor.parameter_map.query {
        let Some(value) = query_args.get(name) else {
            continue;
        };
        let wire_name = descriptor
            .aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.clone());

        match value {
            Value::Array(items) => {
                for item in items {
                    if let Some(s) = scalar_to_query_string(item) {
                        pairs.push((wire_name.clone(), s));
                    }
                }
            }
            Value::Null => {}
            other => {
                if let Some(s) = scalar_to_query_string(other) {
                    pairs.push((wire_name, s));
                }
            }
        }
    }
    pairs
}

fn scalar_to_query_string(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn build_body(descriptor: &OperationDescriptor, body_args: Map<String, Value>) -> Value {
    let mut wire_body = Map::new();
    for (name, value) in body_args {
        let wire_name = descriptor
            .aliases
            .get(&name)
            .cloned()
            .unwrap_or(name);
        wire_body.insert(wire_name, value);
    }
    Value::Object(wire_body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema_compiler::ParameterMap;
    use std::collections::HashMap;

    fn descriptor() -> OperationDescriptor {
        let mut properties = Map::new();
        properties.insert("item_id".into(), serde_json::json!({"type": "string"}));
        properties.insert("limit".into(), serde_json::json!({"type": "integer"}));
        properties.insert("exclude_stale".into(), serde_json::json!({"type": "boolean"}));
        properties.insert("order_by".into(), serde_json::json!({"type": "array"}));
        let mut input_schema = Map::new();
        input_schema.insert("type".into(), Value::String("object".into()));
        input_schema.insert("properties".into(), Value::Object(properties));
        input_schema.insert("required".into(), serde_json::json!(["item_id"]));

        OperationDescriptor {
            tool_name: "get_item".to_string(),
            http_method: "GET".to_string(),
            path_template: "/items/{item_id}".to_string(),
            summary: None,
            description: None,
            tag: "Items".to_string(),
            input_schema,
            parameter_map: ParameterMap {
                path: vec!["item_id".to_string()],
                query: vec!["limit".to_string(), "exclude_stale".to_string(), "order_by".to_string()],
                body: vec![],
            },
            required_keys: vec!["item_id".to_string()],
            aliases: HashMap::new(),
        }
    }

    #[test]
    fn renders_path_template_with_percent_encoding() {
        let mut path_args = Map::new();
        path_args.insert("item_id".to_string(), Value::String("alpha beta".to_string()));
        let rendered = render_url("/items/{item_id}", &path_args).unwrap();
        assert_eq!(rendered, "/items/alpha%20beta");
    }

    #[test]
    fn missing_required_path_placeholder_is_invalid_argument() {
        let path_args = Map::new();
        let err = render_url("/items/{item_id}", &path_args).unwrap_err();
        assert!(matches!(err, AirflowMcpError::InvalidArgument { .. }));
    }

    #[test]
    fn serializes_json_primitives_for_query() {
        let desc = descriptor();
        let mut query_args = Map::new();
        query_args.insert("limit".to_string(), serde_json::json!(5));
        query_args.insert("exclude_stale".to_string(), serde_json::json!(true));
        query_args.insert("order_by".to_string(), serde_json::json!(["dag_id"]));
        let pairs = build_query_pairs(&desc, &query_args);
        assert!(pairs.contains(&("limit".to_string(), "5".to_string())));
        assert!(pairs.contains(&("exclude_stale".to_string(), "true".to_string())));
        assert!(pairs.contains(&("order_by".to_string(), "dag_id".to_string())));
    }

    #[test]
    fn validate_args_rejects_missing_required() {
        let desc = descriptor();
        let args = Map::new();
        let err = validate_args(&desc, &args).unwrap_err();
        assert!(matches!(err, AirflowMcpError::InvalidArgument { ref path, .. } if path == "item_id"));
    }

    #[test]
    fn validate_args_rejects_type_mismatch() {
        let desc = descriptor();
        let mut args = Map::new();
        args.insert("item_id".to_string(), Value::String("alpha".to_string()));
        args.insert("limit".to_string(), Value::String("not a number".to_string()));
        let err = validate_args(&desc, &args).unwrap_err();
        assert!(matches!(err, AirflowMcpError::InvalidArgument { ref path, .. } if path == "limit"));
    }
}
