//! Tool handlers bridging MCP requests to the operators.

use crate::indexer::ServiceBag;
use crate::ops::{
    call::{CallRequest, call},
    search::{SearchRequest, search},
};
use rmcp::{
    ErrorData as McpError,
    model::{CallToolResult, Content, JsonObject},
};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

/// Parse structured arguments supplied to a tool invocation.
pub(crate) fn parse_arguments<T: DeserializeOwned>(
    arguments: Option<JsonObject>,
) -> Result<T, McpError> {
    let value = arguments
        .map(Value::Object)
        .unwrap_or_else(|| Value::Object(JsonObject::new()));
    serde_json::from_value(value)
        .map_err(|err| McpError::invalid_params(format!("Invalid arguments: {err}"), None))
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SearchToolArguments {
    query: String,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    include_schema: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CallToolArguments {
    tool_name: String,
    #[serde(default)]
    params_json: Option<String>,
}

/// Handle `mcp_search`: embed the query and return ranked tool cards.
pub(crate) async fn handle_search(
    bag: &ServiceBag,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: SearchToolArguments = parse_arguments(arguments)?;
    let outcome = search(
        bag,
        SearchRequest {
            query: args.query,
            limit: args.limit,
            include_schema: args.include_schema,
        },
    )
    .await;

    let mut result = if outcome.is_error {
        CallToolResult::error(vec![Content::text(outcome.text)])
    } else {
        CallToolResult::success(vec![Content::text(outcome.text)])
    };
    result.structured_content = Some(json!({
        "count": outcome.count,
        "includeSchema": outcome.include_schema,
    }));
    Ok(result)
}

/// Handle `mcp_call`: dispatch a tool against its owning server.
pub(crate) async fn handle_call(
    bag: &ServiceBag,
    arguments: Option<JsonObject>,
) -> Result<CallToolResult, McpError> {
    let args: CallToolArguments = parse_arguments(arguments)?;
    let outcome = call(
        bag,
        CallRequest {
            tool_name: args.tool_name,
            params_json: args.params_json,
        },
    )
    .await;

    let mut result = if outcome.is_error {
        CallToolResult::error(outcome.content)
    } else {
        CallToolResult::success(outcome.content)
    };
    result.structured_content = Some(json!({ "isError": outcome.is_error }));
    Ok(result)
}
