//! Compiles a single OpenAPI operation into a flat `input_schema` plus the
//! parameter-origin map the dispatcher needs to rebuild an HTTP request.
//!
//! See §4.1 of the design: path/query/body parameters are unified into one
//! JSON-Schema object; `$ref`s are resolved through a cache to avoid
//! re-expanding shared schemas, with a resolving-stack guard against cycles.

use openapiv3::{
    Components, Operation, Parameter, ParameterSchemaOrContent, PathItem, ReferenceOr,
    RequestBody, Schema, SchemaKind, Type,
};
use serde_json::{Map, Value};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use crate::error::AirflowMcpError;

const RESERVED_WORDS: &[&str] = &["type", "schema", "ref"];

#[derive(Debug, Clone, Default)]
pub struct ParameterMap {
    pub path: Vec<String>,
    pub query: Vec<String>,
    pub body: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    pub tool_name: String,
    pub http_method: String,
    pub path_template: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub tag: String,
    pub input_schema: Map<String, Value>,
    pub parameter_map: ParameterMap,
    pub required_keys: Vec<String>,
    /// Internal (tool-facing) property name -> wire name, for body properties
    /// renamed away from a JSON-Schema-reserved word.
    pub aliases: HashMap<String, String>,
}

/// Resolves `$ref`s against a document's `components`, caching by ref string
/// and guarding re-entrant resolution of self-referential schemas.
pub struct RefResolver<'a> {
    components: Option<&'a Components>,
    cache: RefCell<HashMap<String, Value>>,
    resolving: RefCell<HashSet<String>>,
}

impl<'a> RefResolver<'a> {
    pub fn new(components: Option<&'a Components>) -> Self {
        Self {
            components,
            cache: RefCell::new(HashMap::new()),
            resolving: RefCell::new(HashSet::new()),
        }
    }

    pub fn resolve_schema_ref(&self, r: &ReferenceOr<Schema>) -> Value {
        match r {
            ReferenceOr::Item(schema) => self.schema_to_json(schema),
            ReferenceOr::Reference { reference } => self.resolve_ref_string(reference),
        }
    }

    fn resolve_boxed_schema_ref(&self, r: &ReferenceOr<Box<Schema>>) -> Value {
        match r {
            ReferenceOr::Item(schema) => self.schema_to_json(schema),
            ReferenceOr::Reference { reference } => self.resolve_ref_string(reference),
        }
    }

    fn resolve_ref_string(&self, reference: &str) -> Value {
        if let Some(cached) = self.cache.borrow().get(reference) {
            return cached.clone();
        }
        if self.resolving.borrow().contains(reference) {
            // Cyclic schema: emit an empty-object placeholder to let
            // compilation progress instead of recursing forever.
            return Value::Object(Map::from_iter([(
                "type".to_string(),
                Value::String("object".to_string()),
            )]));
        }

        self.resolving.borrow_mut().insert(reference.to_string());

        let resolved = reference
            .strip_prefix("#/components/schemas/")
            .and_then(|name| self.components.and_then(|c| c.schemas.get(name)))
            .map(|schema_ref| self.resolve_schema_ref(schema_ref))
            .unwrap_or_else(|| {
                Value::Object(Map::from_iter([(
                    "type".to_string(),
                    Value::String("object".to_string()),
                )]))
            });

        self.resolving.borrow_mut().remove(reference);
        self.cache
            .borrow_mut()
            .insert(reference.to_string(), resolved.clone());
        resolved
    }

    fn schema_to_json(&self, schema: &Schema) -> Value {
        match &schema.schema_kind {
            SchemaKind::Type(Type::String(s)) => {
                let mut m = Map::new();
                m.insert("type".into(), Value::String("string".into()));
                if let Some(format) = format_of(&s.format) {
                    m.insert("format".into(), Value::String(format));
                }
                if !s.enumeration.is_empty() {
                    let values: Vec<Value> = s
                        .enumeration
                        .iter()
                        .filter_map(|e| e.clone().map(Value::String))
                        .collect();
                    m.insert("enum".into(), Value::Array(values));
                }
                apply_common(&mut m, schema);
                Value::Object(m)
            }
            SchemaKind::Type(Type::Integer(i)) => {
                let mut m = Map::new();
                m.insert("type".into(), Value::String("integer".into()));
                if !i.enumeration.is_empty() {
                    let values: Vec<Value> = i
                        .enumeration
                        .iter()
                        .filter_map(|e| e.map(|v| Value::Number(v.into())))
                        .collect();
                    m.insert("enum".into(), Value::Array(values));
                }
                apply_common(&mut m, schema);
                Value::Object(m)
            }
            SchemaKind::Type(Type::Number(_)) => {
                let mut m = Map::new();
                m.insert("type".into(), Value::String("number".into()));
                apply_common(&mut m, schema);
                Value::Object(m)
            }
            SchemaKind::Type(Type::Boolean(_)) => {
                let mut m = Map::new();
                m.insert("type".into(), Value::String("boolean".into()));
                apply_common(&mut m, schema);
                Value::Object(m)
            }
            SchemaKind::Type(Type::Array(a)) => {
                let mut m = Map::new();
                m.insert("type".into(), Value::String("array".into()));
                let items = a
                    .items
                    .as_ref()
                    .map(|i| self.resolve_boxed_schema_ref(i))
                    .unwrap_or_else(|| Value::Object(Map::new()));
                m.insert("items".into(), items);
                apply_common(&mut m, schema);
                Value::Object(m)
            }
            SchemaKind::Type(Type::Object(o)) => {
                let mut properties = Map::new();
                for (name, prop_ref) in o.properties.iter() {
                    properties.insert(name.clone(), self.resolve_boxed_schema_ref(prop_ref));
                }
                let mut m = Map::new();
                m.insert("type".into(), Value::String("object".into()));
                m.insert("properties".into(), Value::Object(properties));
                if !o.required.is_empty() {
                    m.insert(
                        "required".into(),
                        Value::Array(o.required.iter().cloned().map(Value::String).collect()),
                    );
                }
                apply_common(&mut m, schema);
                Value::Object(m)
            }
            SchemaKind::AllOf { all_of } => self.merge_all_of(all_of),
            SchemaKind::OneOf { one_of } => {
                let variants: Vec<Value> =
                    one_of.iter().map(|s| self.resolve_schema_ref(s)).collect();
                Value::Object(Map::from_iter([("oneOf".to_string(), Value::Array(variants))]))
            }
            SchemaKind::AnyOf { any_of } => {
                let variants: Vec<Value> =
                    any_of.iter().map(|s| self.resolve_schema_ref(s)).collect();
                Value::Object(Map::from_iter([("anyOf".to_string(), Value::Array(variants))]))
            }
            SchemaKind::Not { .. } | SchemaKind::Any(_) => {
                Value::Object(Map::from_iter([("type".to_string(), Value::String("object".into()))]))
            }
        }
    }

    /// Deep-merges the member object schemas of an `allOf` into one property map.
    fn merge_all_of(&self, members: &[ReferenceOr<Schema>]) -> Value {
        let mut properties = Map::new();
        let mut required: Vec<Value> = Vec::new();

        for member in members {
            let resolved = self.resolve_schema_ref(member);
            if let Value::Object(obj) = resolved {
                if let Some(Value::Object(props)) = obj.get("properties") {
                    properties.extend(props.clone());
                }
                if let Some(Value::Array(req)) = obj.get("required") {
                    for r in req {
                        if !required.contains(r) {
                            required.push(r.clone());
                        }
                    }
                }
            }
        }

        let mut m = Map::new();
        m.insert("type".into(), Value::String("object".into()));
        m.insert("properties".into(), Value::Object(properties));
        if !required.is_empty() {
            m.insert("required".into(), Value::Array(required));
        }
        Value::Object(m)
    }
}

fn format_of(format: &openapiv3::VariantOrUnknownOrEmpty<openapiv3::StringFormat>) -> Option<String> {
    use openapiv3::VariantOrUnknownOrEmpty;
    match format {
        VariantOrUnknownOrEmpty::Item(f) => Some(format!("{f:?}").to_lowercase()),
        VariantOrUnknownOrEmpty::Unknown(s) => Some(s.clone()),
        VariantOrUnknownOrEmpty::Empty => None,
    }
}

fn apply_common(m: &mut Map<String, Value>, schema: &Schema) {
    if schema.schema_data.nullable {
        m.insert("nullable".into(), Value::Bool(true));
    }
    if let Some(desc) = &schema.schema_data.description {
        m.insert("description".into(), Value::String(desc.clone()));
    }
    if let Some(default) = &schema.schema_data.default {
        m.insert("default".into(), default.clone());
    }
}

/// Compiles one `(path, method, operation)` into an [`OperationDescriptor`].
pub fn compile_operation(
    resolver: &RefResolver,
    components: Option<&Components>,
    path: &str,
    method: &str,
    path_item: &PathItem,
    operation: &Operation,
) -> Result<OperationDescriptor, AirflowMcpError> {
    let tool_name = operation.operation_id.clone().unwrap_or_else(|| {
        crate::category_mapper::tool_name_for_route(&crate::category_mapper::Route {
            path: path.to_string(),
            method: method.to_string(),
            operation_id: None,
            summary: operation.summary.clone(),
            description: operation.description.clone(),
        })
    });
    let tag = operation
        .tags
        .first()
        .cloned()
        .unwrap_or_else(|| "Uncategorized".to_string());

    let mut properties = Map::new();
    let mut required_keys: Vec<String> = Vec::new();
    let mut parameter_map = ParameterMap::default();

    // Operation-level parameters win over path-item-level ones on a
    // (name, in) collision: collect path-item first, then let operation
    // entries overwrite by keying on (location, name).
    let mut collected: HashMap<(String, String), Parameter> = HashMap::new();
    for p in path_item.parameters.iter().chain(operation.parameters.iter()) {
        if let Some(param) = resolve_parameter(components, p) {
            let (location, name) = location_and_name(&param);
            collected.insert((location, name), param);
        }
    }

    for ((location, name), param) in collected {
        if location != "path" && location != "query" {
            continue; // headers are not surfaced as tool inputs
        }
        let data = parameter_data(&param);
        let Some(schema_ref) = (match &data.format {
            ParameterSchemaOrContent::Schema(s) => Some(s),
            ParameterSchemaOrContent::Content(_) => None,
        }) else {
            continue;
        };

        let mut prop = resolver.resolve_schema_ref(schema_ref);
        if let Value::Object(obj) = &mut prop {
            if !obj.contains_key("description") {
                if let Some(desc) = &data.description {
                    obj.insert("description".into(), Value::String(desc.clone()));
                }
            }
        }
        properties.insert(name.clone(), prop);

        let required = if location == "path" { true } else { data.required };
        if required {
            required_keys.push(name.clone());
        }
        match location.as_str() {
            "path" => parameter_map.path.push(name),
            "query" => parameter_map.query.push(name),
            _ => unreachable!(),
        }
    }

    let mut aliases = HashMap::new();
    if let Some(request_body_ref) = &operation.request_body {
        let body_resource = last_resource_segment(path);
        if let Some(body) = resolve_request_body(components, request_body_ref) {
            if let Some(media) = body.content.get("application/json") {
                if let Some(schema_ref) = &media.schema {
                    let resolved = resolver.resolve_schema_ref(schema_ref);
                    match resolved {
                        Value::Object(obj) if obj.get("type").and_then(Value::as_str) == Some("object") => {
                            if let Some(Value::Object(props)) = obj.get("properties") {
                                for (name, schema) in props {
                                    let wire_name = name.clone();
                                    let internal_name = if RESERVED_WORDS.contains(&name.as_str()) {
                                        format!("{body_resource}_{name}")
                                    } else {
                                        name.clone()
                                    };
                                    if internal_name != wire_name {
                                        aliases.insert(internal_name.clone(), wire_name);
                                    }
                                    properties.insert(internal_name.clone(), schema.clone());
                                    parameter_map.body.push(internal_name);
                                }
                            }
                            if let Some(Value::Array(req)) = obj.get("required") {
                                for r in req {
                                    if let Some(name) = r.as_str() {
                                        let internal_name = if RESERVED_WORDS.contains(&name) {
                                            format!("{body_resource}_{name}")
                                        } else {
                                            name.to_string()
                                        };
                                        required_keys.push(internal_name);
                                    }
                                }
                            }
                        }
                        other => {
                            // oneOf/anyOf/non-object body: pass through
                            // unchanged behind one synthetic property.
                            properties.insert("body".to_string(), other);
                            parameter_map.body.push("body".to_string());
                            if body.required {
                                required_keys.push("body".to_string());
                            }
                        }
                    }
                }
            }
        }
    }

    let mut input_schema = Map::new();
    input_schema.insert("type".into(), Value::String("object".into()));
    input_schema.insert("properties".into(), Value::Object(properties));
    if !required_keys.is_empty() {
        input_schema.insert(
            "required".into(),
            Value::Array(required_keys.iter().cloned().map(Value::String).collect()),
        );
    }

    Ok(OperationDescriptor {
        tool_name,
        http_method: method.to_uppercase(),
        path_template: path.to_string(),
        summary: operation.summary.clone(),
        description: operation.description.clone(),
        tag,
        input_schema,
        parameter_map,
        required_keys,
        aliases,
    })
}

fn resolve_parameter(
    components: Option<&Components>,
    r: &ReferenceOr<Parameter>,
) -> Option<Parameter> {
    match r {
        ReferenceOr::Item(p) => Some(p.clone()),
        ReferenceOr::Reference { reference } => reference
            .strip_prefix("#/components/parameters/")
            .and_then(|name| components.and_then(|c| c.parameters.get(name)))
            .and_then(|inner| match inner {
                ReferenceOr::Item(p) => Some(p.clone()),
                ReferenceOr::Reference { .. } => None,
            }),
    }
}

fn resolve_request_body(
    components: Option<&Components>,
    r: &ReferenceOr<RequestBody>,
) -> Option<RequestBody> {
    match r {
        ReferenceOr::Item(b) => Some(b.clone()),
        ReferenceOr::Reference { reference } => reference
            .strip_prefix("#/components/requestBodies/")
            .and_then(|name| components.and_then(|c| c.request_bodies.get(name)))
            .and_then(|inner| match inner {
                ReferenceOr::Item(b) => Some(b.clone()),
                ReferenceOr::Reference { .. } => None,
            }),
    }
}

fn location_and_name(p: &Parameter) -> (String, String) {
    match p {
        Parameter::Query { parameter_data, .. } => ("query".to_string(), parameter_data.name.clone()),
        Parameter::Path { parameter_data, .. } => ("path".to_string(), parameter_data.name.clone()),
        Parameter::Header { parameter_data, .. } => ("header".to_string(), parameter_data.name.clone()),
        Parameter::Cookie { parameter_data, .. } => ("cookie".to_string(), parameter_data.name.clone()),
    }
}

fn parameter_data(p: &Parameter) -> &openapiv3::ParameterData {
    match p {
        Parameter::Query { parameter_data, .. }
        | Parameter::Path { parameter_data, .. }
        | Parameter::Header { parameter_data, .. }
        | Parameter::Cookie { parameter_data, .. } => parameter_data,
    }
}

/// The resource noun a path names, used as a prefix for reserved-word
/// aliasing. Prefers the last path placeholder (`{connection_id}` ->
/// `connection`), since that's the entity the operation actually acts on;
/// falls back to the last literal segment when the path has no placeholder.
fn last_resource_segment(path: &str) -> String {
    let last_placeholder = path
        .split('/')
        .rev()
        .find(|seg| seg.starts_with('{') && seg.ends_with('}'))
        .map(|seg| &seg[1..seg.len() - 1]);

    if let Some(name) = last_placeholder {
        return name.strip_suffix("_id").unwrap_or(name).to_string();
    }

    path.split('/')
        .rev()
        .find(|seg| !seg.is_empty())
        .unwrap_or("resource")
        .to_string()
}
