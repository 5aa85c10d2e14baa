//! Filter builders for tool-entry payload fields.
//!
//! Filters are structural JSON matches, so identifier values need no quoting or escaping —
//! compound IDs containing quotes or separators are matched verbatim.

use serde_json::{Value, json};

/// Match a single row by its compound `tool_id`.
pub(crate) fn by_tool_id(tool_id: &str) -> Value {
    json!({
        "must": [
            { "key": "tool_id", "match": { "value": tool_id } }
        ]
    })
}

/// Match every chunk row of one `(server, tool)` pair.
pub(crate) fn by_server_tool(server: &str, tool: &str) -> Value {
    json!({
        "must": [
            { "key": "server_name", "match": { "value": server } },
            { "key": "tool_name", "match": { "value": tool } }
        ]
    })
}

/// Match every row owned by a server.
pub(crate) fn by_server(server: &str) -> Value {
    json!({
        "must": [
            { "key": "server_name", "match": { "value": server } }
        ]
    })
}
