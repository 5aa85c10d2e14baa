//! Semantic search over indexed tool entries.

use crate::indexer::ServiceBag;
use crate::store::DistanceHit;
use serde_json::Value;
use std::collections::HashMap;

const LIMIT_FLOOR: usize = 1;
const LIMIT_CEILING: usize = 20;
const FETCH_CEILING: usize = 60;
const SCHEMA_PREVIEW_CHARS: usize = 2000;

/// Caller-supplied search parameters.
#[derive(Clone, Debug, Default)]
pub struct SearchRequest {
    /// Natural-language query describing the wanted capability.
    pub query: String,
    /// Requested result count; clamped to `[1, 20]`.
    pub limit: Option<i64>,
    /// Whether to append each tool's full parameter schema.
    pub include_schema: Option<bool>,
}

/// Rendered search outcome.
#[derive(Clone, Debug)]
pub struct SearchResponse {
    /// Human-readable tool cards (or an error card).
    pub text: String,
    /// Number of tools rendered.
    pub count: usize,
    /// Whether schemas were included.
    pub include_schema: bool,
    /// Whether the response is an error card.
    pub is_error: bool,
}

/// One ranked entry after deduplication.
#[derive(Clone, Debug)]
pub(crate) struct RankedTool {
    pub(crate) server_name: String,
    pub(crate) tool_name: String,
    pub(crate) description: String,
    pub(crate) parameters_json: String,
    pub(crate) score: f32,
}

/// Execute a semantic tool search.
pub async fn search(bag: &ServiceBag, request: SearchRequest) -> SearchResponse {
    let include_schema = request
        .include_schema
        .unwrap_or(bag.config.search.include_parameters_default);

    let query = request.query.trim();
    if query.is_empty() {
        return SearchResponse {
            text: "A non-empty `query` is required.".into(),
            count: 0,
            include_schema,
            is_error: true,
        };
    }

    let query_vector = match bag.embedder.embed(query).await {
        Ok(vector) => vector,
        Err(error) => {
            tracing::warn!(error = %error, "Query embedding failed");
            return SearchResponse {
                text: "The embedding service is not reachable, so tools cannot be searched \
                       right now. Start it and run `mcp-scout index` to rebuild the catalog."
                    .into(),
                count: 0,
                include_schema,
                is_error: true,
            };
        }
    };

    let limit = clamp_limit(request.limit, bag.config.search.top_k);
    let hits = match bag.store.search_tools(query_vector, fetch_limit(limit)).await {
        Ok(hits) => hits,
        Err(error) => {
            tracing::warn!(error = %error, "Vector search failed");
            return SearchResponse {
                text: format!("Tool search failed: {error}"),
                count: 0,
                include_schema,
                is_error: true,
            };
        }
    };

    let min_score = bag.config.search.min_score;
    let mut ranked = dedupe_and_rank(hits, min_score);
    ranked.truncate(limit);

    if ranked.is_empty() {
        return SearchResponse {
            text: "No matching tools found. Try rephrasing the query or lowering expectations \
                   about specificity."
                .into(),
            count: 0,
            include_schema,
            is_error: false,
        };
    }

    let text = render_cards(query, &ranked, include_schema);
    SearchResponse {
        count: ranked.len(),
        text,
        include_schema,
        is_error: false,
    }
}

/// Clamp a requested result count into `[1, 20]`, defaulting to the configured top-k.
pub(crate) fn clamp_limit(raw: Option<i64>, default_top_k: usize) -> usize {
    raw.unwrap_or(default_top_k as i64)
        .clamp(LIMIT_FLOOR as i64, LIMIT_CEILING as i64) as usize
}

/// Over-fetch factor: chunked descriptions can occupy several of the nearest slots, so
/// request extra rows to keep the page full after deduplication.
pub(crate) fn fetch_limit(limit: usize) -> usize {
    (limit * 3).min(FETCH_CEILING)
}

/// Collapse chunk rows by `(server, tool)`, keep the best score, sort descending.
pub(crate) fn dedupe_and_rank(hits: Vec<DistanceHit>, min_score: f32) -> Vec<RankedTool> {
    let mut best: HashMap<(String, String), RankedTool> = HashMap::new();
    for hit in hits {
        let score = 1.0 / (1.0 + hit.distance.max(0.0));
        if score < min_score {
            continue;
        }
        let key = (hit.entry.server_name.clone(), hit.entry.tool_name.clone());
        let candidate = RankedTool {
            server_name: hit.entry.server_name,
            tool_name: hit.entry.tool_name,
            description: hit.entry.description,
            parameters_json: hit.entry.parameters_json,
            score,
        };
        best.entry(key)
            .and_modify(|existing| {
                if candidate.score > existing.score {
                    *existing = candidate.clone();
                }
            })
            .or_insert(candidate);
    }

    let mut ranked: Vec<RankedTool> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.tool_name.cmp(&b.tool_name))
    });
    ranked
}

fn render_cards(query: &str, ranked: &[RankedTool], include_schema: bool) -> String {
    let mut out = format!("Found {} tools for \"{query}\":\n", ranked.len());
    for (position, tool) in ranked.iter().enumerate() {
        let percent = (tool.score * 100.0).round() as i64;
        out.push('\n');
        out.push_str(&format!(
            "{}. {} (server: {}, relevance: {percent}%)\n",
            position + 1,
            tool.tool_name,
            tool.server_name
        ));
        if !tool.description.is_empty() {
            out.push_str(&format!("   {}\n", tool.description));
        }
        out.push_str(&render_signature(&tool.parameters_json));
        out.push_str(&format!(
            "   Invoke: mcp_call {{\"tool_name\": \"{}\", \"params_json\": \"{{…}}\"}}\n",
            tool.tool_name
        ));
        if include_schema {
            out.push_str(&format!(
                "   Schema: {}\n",
                truncate_schema(&tool.parameters_json)
            ));
        }
    }
    out
}

/// Render `name: type` / `name?: type` lines from a JSON schema string.
fn render_signature(parameters_json: &str) -> String {
    let Ok(schema) = serde_json::from_str::<Value>(parameters_json) else {
        return String::new();
    };
    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return "   Arguments: none\n".into();
    };
    if properties.is_empty() {
        return "   Arguments: none\n".into();
    }

    let required: Vec<&str> = schema
        .get("required")
        .and_then(Value::as_array)
        .map(|items| items.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut out = String::from("   Arguments:\n");
    for (name, property) in properties {
        let kind = property
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("any");
        let marker = if required.contains(&name.as_str()) { "" } else { "?" };
        out.push_str(&format!("     {name}{marker}: {kind}\n"));
    }
    out
}

fn truncate_schema(parameters_json: &str) -> String {
    if parameters_json.chars().count() <= SCHEMA_PREVIEW_CHARS {
        return parameters_json.to_string();
    }
    let prefix: String = parameters_json.chars().take(SCHEMA_PREVIEW_CHARS).collect();
    format!("{prefix}…")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ToolEntry;

    fn hit(tool_id: &str, server: &str, tool: &str, distance: f32) -> DistanceHit {
        DistanceHit {
            entry: ToolEntry {
                tool_id: tool_id.into(),
                server_name: server.into(),
                tool_name: tool.into(),
                description: format!("{tool} description"),
                parameters_json: "{}".into(),
                vector: Vec::new(),
            },
            distance,
        }
    }

    #[test]
    fn limits_clamp_into_the_valid_window() {
        assert_eq!(clamp_limit(None, 5), 5);
        assert_eq!(clamp_limit(Some(0), 5), 1);
        assert_eq!(clamp_limit(Some(-3), 5), 1);
        assert_eq!(clamp_limit(Some(99), 5), 20);
        assert_eq!(clamp_limit(Some(7), 5), 7);
    }

    #[test]
    fn fetch_limit_triples_and_caps_at_sixty() {
        assert_eq!(fetch_limit(1), 3);
        assert_eq!(fetch_limit(5), 15);
        assert_eq!(fetch_limit(20), 60);
    }

    #[test]
    fn chunk_rows_collapse_to_the_best_score() {
        // 1/(1+d): chunk1 of read_file is the closest row overall.
        let hits = vec![
            hit("fs::read_file::chunk0", "fs", "read_file", 0.176),
            hit("fs::read_file::chunk1", "fs", "read_file", 0.087),
            hit("git::git_log", "git", "git_log", 0.25),
        ];
        let ranked = dedupe_and_rank(hits, 0.3);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].tool_name, "read_file");
        assert_eq!((ranked[0].score * 100.0).round() as i64, 92);
        assert_eq!(ranked[1].tool_name, "git_log");
        assert_eq!((ranked[1].score * 100.0).round() as i64, 80);
    }

    #[test]
    fn low_scores_are_filtered_out() {
        let hits = vec![hit("fs::read_file", "fs", "read_file", 9.0)];
        assert!(dedupe_and_rank(hits, 0.3).is_empty());
    }

    #[test]
    fn negative_distances_clamp_into_the_score_range() {
        let hits = vec![hit("fs::read_file", "fs", "read_file", -0.5)];
        let ranked = dedupe_and_rank(hits, 0.3);
        assert!((ranked[0].score - 1.0).abs() < 1e-6);
    }

    #[test]
    fn signature_marks_optional_arguments() {
        let schema = r#"{
            "type": "object",
            "properties": {
                "path": { "type": "string" },
                "recursive": { "type": "boolean" }
            },
            "required": ["path"]
        }"#;
        let rendered = render_signature(schema);
        assert!(rendered.contains("path: string"));
        assert!(rendered.contains("recursive?: boolean"));
    }

    #[test]
    fn empty_schema_renders_no_arguments() {
        assert_eq!(render_signature("{}"), "   Arguments: none\n");
        assert_eq!(
            render_signature(r#"{"type":"object","properties":{}}"#),
            "   Arguments: none\n"
        );
    }

    #[test]
    fn oversized_schema_is_truncated_with_marker() {
        let schema = format!(
            r#"{{"type":"object","properties":{{"x":{{"description":"{}"}}}}}}"#,
            "p".repeat(3_000)
        );
        let preview = truncate_schema(&schema);
        assert!(preview.chars().count() == SCHEMA_PREVIEW_CHARS + 1);
        assert!(preview.ends_with('…'));
    }
}
