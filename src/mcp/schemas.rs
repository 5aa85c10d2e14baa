//! JSON schema builders for the meta-tools.

use crate::config::SearchConfig;
use serde_json::{Map, Value, json};

/// Build the schema describing the `mcp_search` tool input.
pub(crate) fn search_input_schema(search: &SearchConfig) -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(
        "query".into(),
        string_schema("Natural language description of the capability you need"),
    );

    let mut limit_schema = Map::new();
    limit_schema.insert("type".into(), Value::String("integer".into()));
    limit_schema.insert(
        "description".into(),
        Value::String("Maximum number of tools to return".into()),
    );
    limit_schema.insert("minimum".into(), Value::Number(1.into()));
    limit_schema.insert("maximum".into(), Value::Number(20.into()));
    limit_schema.insert(
        "default".into(),
        Value::Number(serde_json::Number::from(search.top_k as u64)),
    );
    properties.insert("limit".into(), Value::Object(limit_schema));

    let mut include_schema = Map::new();
    include_schema.insert("type".into(), Value::String("boolean".into()));
    include_schema.insert(
        "description".into(),
        Value::String("Append each tool's full parameter schema to its card".into()),
    );
    include_schema.insert(
        "default".into(),
        Value::Bool(search.include_parameters_default),
    );
    properties.insert("include_schema".into(), Value::Object(include_schema));

    let mut schema = finalize_object_schema(properties, &["query"]);
    schema.insert(
        "examples".into(),
        Value::Array(vec![
            json!({ "query": "read a file from disk" }),
            json!({ "query": "list open pull requests", "limit": 3, "include_schema": true }),
        ]),
    );
    schema
}

/// Build the schema describing the `mcp_call` tool input.
pub(crate) fn call_input_schema() -> Map<String, Value> {
    let mut properties = Map::new();
    properties.insert(
        "tool_name".into(),
        string_schema("Exact tool name as returned by mcp_search"),
    );

    let mut params_schema = Map::new();
    params_schema.insert("type".into(), Value::String("string".into()));
    params_schema.insert(
        "description".into(),
        Value::String("Tool arguments encoded as a JSON object string".into()),
    );
    params_schema.insert("default".into(), Value::String("{}".into()));
    properties.insert("params_json".into(), Value::Object(params_schema));

    let mut schema = finalize_object_schema(properties, &["tool_name"]);
    schema.insert(
        "examples".into(),
        Value::Array(vec![json!({
            "tool_name": "read_file",
            "params_json": "{\"path\": \"README.md\"}"
        })]),
    );
    schema
}

fn string_schema(description: &str) -> Value {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("string".into()));
    schema.insert("description".into(), Value::String(description.into()));
    Value::Object(schema)
}

fn finalize_object_schema(properties: Map<String, Value>, required: &[&str]) -> Map<String, Value> {
    let mut schema = Map::new();
    schema.insert("type".into(), Value::String("object".into()));
    schema.insert("properties".into(), Value::Object(properties));
    if !required.is_empty() {
        schema.insert(
            "required".into(),
            Value::Array(
                required
                    .iter()
                    .map(|&key| Value::String(key.into()))
                    .collect(),
            ),
        );
    }
    schema.insert("additionalProperties".into(), Value::Bool(false));
    schema
}
