//! Layered configuration resolution for mcp-scout.
//!
//! This module turns a host-provided JSON configuration tree into a validated, typed
//! [`ResolvedConfig`]. Sources are merged with a fixed precedence:
//!
//! - Servers: file-based list (`mcpServersFile`) as the base, the inline `mcpServers` map on
//!   top (inline wins on name collision, including its `disabled` flag), and the legacy
//!   positional `servers` array only when both of the former are empty.
//! - Embedding: an explicit `embedding` block wins; otherwise a host `memorySearch` block with
//!   the same shape is adopted; otherwise a local OpenAI-compatible default.
//! - `${NAME}` tokens inside `env` and `headers` values expand from the process environment;
//!   `~/` prefixes in paths expand to the user's home directory.
//!
//! A missing document resolves to an empty configuration (zero servers is a valid start
//! state); a malformed document fails the entire resolution with a descriptive error.
use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Environment variable naming an absolute path to the configuration document.
/// The unprefixed `CONFIG_PATH` is honoured as a fallback for host-managed deployments.
pub const CONFIG_PATH_VAR: &str = "MCP_SCOUT_CONFIG";
/// Environment variable naming the state directory; unprefixed `STATE_DIR` works as a
/// fallback.
pub const STATE_DIR_VAR: &str = "MCP_SCOUT_STATE_DIR";

const DEFAULT_EMBEDDING_BASE_URL: &str = "http://127.0.0.1:11434/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";
const DEFAULT_VECTOR_DB_URL: &str = "http://127.0.0.1:6333";
const DEFAULT_COLLECTION: &str = "mcp-scout-tools";

/// Errors encountered while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A referenced configuration file could not be read.
    #[error("Failed to read config file {path}: {source}")]
    Io {
        /// Path of the file that failed to load.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// A configuration document failed to parse as JSON.
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        /// Path of the offending document.
        path: PathBuf,
        /// Underlying JSON error.
        #[source]
        source: serde_json::Error,
    },
    /// A server entry was structurally invalid.
    #[error("Invalid server '{name}': {reason}")]
    InvalidServer {
        /// Name of the offending server entry.
        name: String,
        /// Human-readable description of the problem.
        reason: String,
    },
}

/// Wire transports a capability server can speak.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
pub enum TransportKind {
    /// Spawn a child process and communicate over standard streams.
    #[serde(rename = "childproc")]
    ChildProc,
    /// Connect to a URL and receive server-sent events.
    #[serde(rename = "sse")]
    Sse,
    /// Connect to a URL with a streamable HTTP body.
    #[serde(rename = "streaming-http")]
    StreamableHttp,
}

impl TransportKind {
    /// Stable label used in logs and reports.
    pub fn label(self) -> &'static str {
        match self {
            Self::ChildProc => "childproc",
            Self::Sse => "sse",
            Self::StreamableHttp => "streaming-http",
        }
    }
}

/// Fully resolved description of one capability server.
#[derive(Clone, Debug)]
pub struct ServerDescriptor {
    /// Unique server name used in compound tool IDs.
    pub name: String,
    /// Transport the server speaks.
    pub transport: TransportKind,
    /// Executable for childproc servers.
    pub command: Option<String>,
    /// Arguments appended to the command.
    pub args: Vec<String>,
    /// Environment merged over the parent environment when spawning.
    pub env: BTreeMap<String, String>,
    /// Endpoint URL for sse and streaming-http servers.
    pub url: Option<String>,
    /// Headers attached to the initial request for URL transports.
    pub headers: BTreeMap<String, String>,
    /// Per-server override for the indexer's connect timeout (milliseconds).
    pub timeout_ms: Option<u64>,
}

/// Embedding service connection settings.
#[derive(Clone, Debug)]
pub struct EmbeddingConfig {
    /// Provider label, informational only.
    pub provider: String,
    /// Model identifier sent with every request.
    pub model: String,
    /// Base URL of the OpenAI-compatible endpoint (no trailing slash).
    pub base_url: String,
    /// Optional bearer token.
    pub api_key: Option<String>,
    /// Extra headers attached to each request.
    pub headers: BTreeMap<String, String>,
}

/// Vector database connection settings.
#[derive(Clone, Debug)]
pub struct VectorDbConfig {
    /// Base URL of the Qdrant instance.
    pub url: String,
    /// Collection holding tool entries.
    pub collection: String,
    /// Optional API key.
    pub api_key: Option<String>,
}

/// Search operator defaults.
#[derive(Clone, Copy, Debug)]
pub struct SearchConfig {
    /// Default result count, clamped to `[1, 20]`.
    pub top_k: usize,
    /// Minimum similarity score in `[0, 1]`.
    pub min_score: f32,
    /// Whether `mcp_search` includes full parameter schemas by default.
    pub include_parameters_default: bool,
}

/// Indexer tuning knobs.
#[derive(Clone, Copy, Debug)]
pub struct IndexerConfig {
    /// Default connect timeout per server (milliseconds).
    pub connect_timeout_ms: u64,
    /// Retry attempts after the first failure; `0` means a single attempt.
    pub max_retries: u32,
    /// First retry delay (milliseconds).
    pub initial_retry_delay_ms: u64,
    /// Upper bound on the exponential backoff (milliseconds).
    pub max_retry_delay_ms: u64,
    /// Character budget per chunk; `0` disables chunking.
    pub max_chunk_chars: usize,
    /// Characters of tail overlap carried into continuation chunks.
    pub overlap_chars: usize,
    /// Whether the supervisor writes a `catalog.json` manifest after each run.
    pub generate_catalog: bool,
}

/// Validated configuration consumed by the rest of the system.
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    /// Enabled capability servers.
    pub servers: Vec<ServerDescriptor>,
    /// Embedding service settings.
    pub embedding: EmbeddingConfig,
    /// Vector database settings.
    pub vector_db: VectorDbConfig,
    /// Search defaults.
    pub search: SearchConfig,
    /// Indexer settings.
    pub indexer: IndexerConfig,
    /// Directory holding the status file and other run artifacts.
    pub state_dir: PathBuf,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawConfig {
    #[serde(default)]
    mcp_servers: Option<BTreeMap<String, RawServerEntry>>,
    #[serde(default)]
    mcp_servers_file: Option<String>,
    #[serde(default)]
    servers: Option<Vec<RawLegacyServer>>,
    #[serde(default)]
    embedding: Option<RawEmbedding>,
    #[serde(default)]
    memory_search: Option<RawEmbedding>,
    #[serde(default)]
    vector_db: Option<RawVectorDb>,
    #[serde(default)]
    search: Option<RawSearch>,
    #[serde(default)]
    indexer: Option<RawIndexer>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawServerEntry {
    #[serde(default)]
    command: Option<String>,
    #[serde(default)]
    args: Option<Vec<String>>,
    #[serde(default)]
    env: Option<BTreeMap<String, String>>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    server_url: Option<String>,
    #[serde(default)]
    headers: Option<BTreeMap<String, String>>,
    #[serde(default, rename = "type")]
    transport_type: Option<TransportKind>,
    #[serde(default)]
    timeout: Option<i64>,
    #[serde(default)]
    disabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLegacyServer {
    name: String,
    transport: TransportKind,
    #[serde(flatten)]
    entry: RawServerEntry,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEmbedding {
    #[serde(default)]
    provider: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    base_url: Option<String>,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    headers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawVectorDb {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    collection: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSearch {
    #[serde(default)]
    top_k: Option<i64>,
    #[serde(default)]
    min_score: Option<f64>,
    #[serde(default)]
    include_parameters_default: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawIndexer {
    #[serde(default)]
    connect_timeout: Option<i64>,
    #[serde(default)]
    max_retries: Option<i64>,
    #[serde(default)]
    initial_retry_delay: Option<i64>,
    #[serde(default)]
    max_retry_delay: Option<i64>,
    #[serde(default)]
    max_chunk_chars: Option<i64>,
    #[serde(default)]
    overlap_chars: Option<i64>,
    #[serde(default)]
    generate_cli_artifacts: Option<bool>,
}

fn env_lookup(primary: &str, fallback: &str) -> Option<String> {
    env::var(primary)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .or_else(|| env::var(fallback).ok().filter(|value| !value.trim().is_empty()))
}

/// Resolve the state directory: `MCP_SCOUT_STATE_DIR` (or `STATE_DIR`), else `~/.mcp-scout`.
pub fn resolve_state_dir() -> PathBuf {
    if let Some(dir) = env_lookup(STATE_DIR_VAR, "STATE_DIR") {
        return expand_home(dir.trim());
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mcp-scout")
}

/// Locate and resolve the configuration document.
///
/// Precedence: `MCP_SCOUT_CONFIG` (or `CONFIG_PATH`) > `{state_dir}/config.json`. A missing
/// document is treated as an empty tree; a malformed one fails the whole resolution.
pub fn resolve() -> Result<ResolvedConfig, ConfigError> {
    let state_dir = resolve_state_dir();
    let path = env_lookup(CONFIG_PATH_VAR, "CONFIG_PATH")
        .map(|value| expand_home(value.trim()))
        .unwrap_or_else(|| state_dir.join("config.json"));

    let raw = if path.is_file() {
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?
    } else {
        tracing::debug!(path = %path.display(), "No config document found; starting empty");
        RawConfig::default()
    };

    resolve_tree(raw, state_dir)
}

/// Resolve a pre-parsed configuration value against the given state directory.
///
/// Exposed so hosts embedding the router can pass their own tree.
pub fn resolve_value(tree: serde_json::Value, state_dir: PathBuf) -> Result<ResolvedConfig, ConfigError> {
    let raw: RawConfig = serde_json::from_value(tree).map_err(|source| ConfigError::Parse {
        path: PathBuf::from("<inline>"),
        source,
    })?;
    resolve_tree(raw, state_dir)
}

fn resolve_tree(raw: RawConfig, state_dir: PathBuf) -> Result<ResolvedConfig, ConfigError> {
    let servers = resolve_servers(&raw)?;
    let embedding = resolve_embedding(raw.embedding, raw.memory_search);
    let vector_db = resolve_vector_db(raw.vector_db);
    let search = resolve_search(raw.search);
    let indexer = resolve_indexer(raw.indexer);

    tracing::debug!(
        servers = servers.len(),
        embedding_model = %embedding.model,
        embedding_base_url = %embedding.base_url,
        vector_db = %vector_db.url,
        collection = %vector_db.collection,
        top_k = search.top_k,
        min_score = search.min_score,
        "Resolved configuration"
    );

    Ok(ResolvedConfig {
        servers,
        embedding,
        vector_db,
        search,
        indexer,
        state_dir,
    })
}

fn resolve_servers(raw: &RawConfig) -> Result<Vec<ServerDescriptor>, ConfigError> {
    let mut merged: BTreeMap<String, RawServerEntry> = BTreeMap::new();

    if let Some(file) = raw.mcp_servers_file.as_deref() {
        for (name, entry) in load_servers_file(&expand_home(file))? {
            merged.insert(name, entry);
        }
    }
    if let Some(inline) = raw.mcp_servers.as_ref() {
        // Inline entries replace file-based ones wholesale, including `disabled`.
        for (name, entry) in inline {
            merged.insert(name.clone(), entry.clone());
        }
    }

    let mut servers = Vec::new();
    if merged.is_empty() {
        if let Some(legacy) = raw.servers.as_ref() {
            for item in legacy {
                if item.entry.disabled.unwrap_or(false) {
                    continue;
                }
                servers.push(build_descriptor(
                    &item.name,
                    &item.entry,
                    Some(item.transport),
                )?);
            }
        }
        return Ok(servers);
    }

    for (name, entry) in &merged {
        if entry.disabled.unwrap_or(false) {
            tracing::debug!(server = %name, "Skipping disabled server");
            continue;
        }
        servers.push(build_descriptor(name, entry, None)?);
    }
    Ok(servers)
}

fn load_servers_file(path: &Path) -> Result<BTreeMap<String, RawServerEntry>, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: serde_json::Value =
        serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

    // Accept both a bare `{name → entry}` map and an `{mcpServers: {…}}` wrapper.
    let map_value = match value {
        serde_json::Value::Object(ref object) if object.contains_key("mcpServers") => object
            .get("mcpServers")
            .cloned()
            .unwrap_or(serde_json::Value::Null),
        other => other,
    };
    serde_json::from_value(map_value).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

fn build_descriptor(
    name: &str,
    entry: &RawServerEntry,
    explicit: Option<TransportKind>,
) -> Result<ServerDescriptor, ConfigError> {
    let url = entry.url.clone().or_else(|| entry.server_url.clone());
    let transport = explicit
        .or(entry.transport_type)
        .or_else(|| infer_transport(entry, url.as_deref()))
        .ok_or_else(|| ConfigError::InvalidServer {
            name: name.to_string(),
            reason: "entry needs either `command` or `url`".into(),
        })?;

    match transport {
        TransportKind::ChildProc if entry.command.is_none() => {
            return Err(ConfigError::InvalidServer {
                name: name.to_string(),
                reason: "childproc transport requires `command`".into(),
            });
        }
        TransportKind::Sse | TransportKind::StreamableHttp if url.is_none() => {
            return Err(ConfigError::InvalidServer {
                name: name.to_string(),
                reason: format!("{} transport requires `url`", transport.label()),
            });
        }
        _ => {}
    }

    Ok(ServerDescriptor {
        name: name.to_string(),
        transport,
        command: entry.command.clone(),
        args: entry.args.clone().unwrap_or_default(),
        env: expand_map(entry.env.clone().unwrap_or_default()),
        url,
        headers: expand_map(entry.headers.clone().unwrap_or_default()),
        timeout_ms: entry.timeout.map(clamp_u64),
    })
}

fn infer_transport(entry: &RawServerEntry, url: Option<&str>) -> Option<TransportKind> {
    if entry.command.is_some() {
        Some(TransportKind::ChildProc)
    } else if url.is_some() {
        Some(TransportKind::StreamableHttp)
    } else {
        None
    }
}

fn resolve_embedding(explicit: Option<RawEmbedding>, adopted: Option<RawEmbedding>) -> EmbeddingConfig {
    let raw = explicit.or(adopted).unwrap_or_default();
    let base_url = match (raw.base_url, raw.url) {
        (Some(base), _) => base,
        // Legacy `url` predates the `/v1` path convention; migrate it.
        (None, Some(legacy)) => {
            let trimmed = legacy.trim_end_matches('/');
            if trimmed.ends_with("/v1") {
                trimmed.to_string()
            } else {
                format!("{trimmed}/v1")
            }
        }
        (None, None) => DEFAULT_EMBEDDING_BASE_URL.to_string(),
    };

    EmbeddingConfig {
        provider: raw.provider.unwrap_or_else(|| "openai".into()),
        model: raw.model.unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.into()),
        base_url: base_url.trim_end_matches('/').to_string(),
        api_key: raw.api_key.filter(|key| !key.is_empty()),
        headers: expand_map(raw.headers.unwrap_or_default()),
    }
}

fn resolve_vector_db(raw: Option<RawVectorDb>) -> VectorDbConfig {
    let raw = raw.unwrap_or_default();
    VectorDbConfig {
        url: raw.url.unwrap_or_else(|| DEFAULT_VECTOR_DB_URL.into()),
        collection: raw.collection.unwrap_or_else(|| DEFAULT_COLLECTION.into()),
        api_key: raw.api_key.filter(|key| !key.is_empty()),
    }
}

fn resolve_search(raw: Option<RawSearch>) -> SearchConfig {
    let raw = raw.unwrap_or_default();
    SearchConfig {
        top_k: raw.top_k.unwrap_or(5).clamp(1, 20) as usize,
        min_score: raw.min_score.unwrap_or(0.3).clamp(0.0, 1.0) as f32,
        include_parameters_default: raw.include_parameters_default.unwrap_or(false),
    }
}

fn resolve_indexer(raw: Option<RawIndexer>) -> IndexerConfig {
    let raw = raw.unwrap_or_default();
    IndexerConfig {
        connect_timeout_ms: raw.connect_timeout.map(clamp_u64).unwrap_or(60_000),
        max_retries: raw.max_retries.map(|v| clamp_u64(v) as u32).unwrap_or(3),
        initial_retry_delay_ms: raw.initial_retry_delay.map(clamp_u64).unwrap_or(2_000),
        max_retry_delay_ms: raw.max_retry_delay.map(clamp_u64).unwrap_or(30_000),
        max_chunk_chars: raw.max_chunk_chars.map(|v| clamp_u64(v) as usize).unwrap_or(500),
        overlap_chars: raw.overlap_chars.map(|v| clamp_u64(v) as usize).unwrap_or(100),
        generate_catalog: raw.generate_cli_artifacts.unwrap_or(false),
    }
}

fn clamp_u64(value: i64) -> u64 {
    value.max(0) as u64
}

/// Expand `${NAME}` tokens from the process environment; unset names become empty strings.
fn expand_vars(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                out.push_str(&env::var(name).unwrap_or_default());
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

fn expand_map(map: BTreeMap<String, String>) -> BTreeMap<String, String> {
    map.into_iter()
        .map(|(key, value)| (key, expand_vars(&value)))
        .collect()
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(stripped) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(stripped);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolve_json(tree: serde_json::Value) -> ResolvedConfig {
        resolve_value(tree, PathBuf::from("/tmp/mcp-scout-test")).expect("resolution succeeds")
    }

    #[test]
    fn empty_tree_resolves_with_defaults() {
        let config = resolve_json(json!({}));
        assert!(config.servers.is_empty());
        assert_eq!(config.embedding.base_url, DEFAULT_EMBEDDING_BASE_URL);
        assert_eq!(config.embedding.model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.search.top_k, 5);
        assert!((config.search.min_score - 0.3).abs() < 1e-6);
        assert_eq!(config.indexer.connect_timeout_ms, 60_000);
        assert_eq!(config.indexer.max_retries, 3);
        assert_eq!(config.indexer.max_chunk_chars, 500);
        assert_eq!(config.indexer.overlap_chars, 100);
        assert!(!config.indexer.generate_catalog);
    }

    #[test]
    fn transport_inference_prefers_explicit_type() {
        let config = resolve_json(json!({
            "mcpServers": {
                "fs": { "command": "fs-server" },
                "web": { "url": "http://example.test/mcp" },
                "events": { "url": "http://example.test/sse", "type": "sse" }
            }
        }));
        let by_name = |name: &str| {
            config
                .servers
                .iter()
                .find(|server| server.name == name)
                .expect("server present")
        };
        assert_eq!(by_name("fs").transport, TransportKind::ChildProc);
        assert_eq!(by_name("web").transport, TransportKind::StreamableHttp);
        assert_eq!(by_name("events").transport, TransportKind::Sse);
    }

    #[test]
    fn server_without_command_or_url_is_rejected() {
        let error = resolve_value(
            json!({ "mcpServers": { "broken": {} } }),
            PathBuf::from("/tmp"),
        )
        .unwrap_err();
        assert!(matches!(error, ConfigError::InvalidServer { .. }));
    }

    #[test]
    fn disabled_servers_are_dropped() {
        let config = resolve_json(json!({
            "mcpServers": {
                "on": { "command": "run" },
                "off": { "command": "run", "disabled": true }
            }
        }));
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].name, "on");
    }

    #[test]
    fn legacy_servers_used_only_when_no_map_present() {
        let legacy = json!({
            "servers": [
                { "name": "old", "transport": "childproc", "command": "legacy-server" }
            ]
        });
        let config = resolve_json(legacy);
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].name, "old");

        let shadowed = resolve_json(json!({
            "mcpServers": { "new": { "command": "new-server" } },
            "servers": [
                { "name": "old", "transport": "childproc", "command": "legacy-server" }
            ]
        }));
        assert_eq!(shadowed.servers.len(), 1);
        assert_eq!(shadowed.servers[0].name, "new");
    }

    #[test]
    fn env_and_header_values_expand_process_variables() {
        // Safety: test-local variable name, value only observed in this test.
        unsafe { env::set_var("MCP_SCOUT_TEST_TOKEN", "sesame") };
        let config = resolve_json(json!({
            "mcpServers": {
                "fs": {
                    "command": "fs-server",
                    "env": { "TOKEN": "${MCP_SCOUT_TEST_TOKEN}", "MISSING": "${MCP_SCOUT_NOPE}" }
                },
                "web": {
                    "url": "http://example.test/mcp",
                    "headers": { "Authorization": "Bearer ${MCP_SCOUT_TEST_TOKEN}" }
                }
            }
        }));
        let fs = config
            .servers
            .iter()
            .find(|server| server.name == "fs")
            .expect("fs server");
        assert_eq!(fs.env.get("TOKEN").map(String::as_str), Some("sesame"));
        assert_eq!(fs.env.get("MISSING").map(String::as_str), Some(""));
        let web = config
            .servers
            .iter()
            .find(|server| server.name == "web")
            .expect("web server");
        assert_eq!(
            web.headers.get("Authorization").map(String::as_str),
            Some("Bearer sesame")
        );
    }

    #[test]
    fn legacy_embedding_url_gains_v1_suffix() {
        let config = resolve_json(json!({
            "embedding": { "url": "http://embed.test:8080/" }
        }));
        assert_eq!(config.embedding.base_url, "http://embed.test:8080/v1");

        let already = resolve_json(json!({
            "embedding": { "url": "http://embed.test:8080/v1" }
        }));
        assert_eq!(already.embedding.base_url, "http://embed.test:8080/v1");
    }

    #[test]
    fn memory_search_block_is_adopted_when_embedding_absent() {
        let config = resolve_json(json!({
            "memorySearch": { "model": "mxbai-embed-large", "baseUrl": "http://mem.test/v1" }
        }));
        assert_eq!(config.embedding.model, "mxbai-embed-large");
        assert_eq!(config.embedding.base_url, "http://mem.test/v1");

        let overridden = resolve_json(json!({
            "embedding": { "model": "explicit" },
            "memorySearch": { "model": "adopted" }
        }));
        assert_eq!(overridden.embedding.model, "explicit");
    }

    #[test]
    fn search_bounds_are_clamped() {
        let config = resolve_json(json!({
            "search": { "topK": 99, "minScore": 7.5 }
        }));
        assert_eq!(config.search.top_k, 20);
        assert!((config.search.min_score - 1.0).abs() < 1e-6);

        let low = resolve_json(json!({
            "search": { "topK": 0, "minScore": -3.0 }
        }));
        assert_eq!(low.search.top_k, 1);
        assert!((low.search.min_score - 0.0).abs() < 1e-6);
    }

    #[test]
    fn negative_indexer_values_clamp_to_zero() {
        let config = resolve_json(json!({
            "indexer": { "maxRetries": -5, "initialRetryDelay": -100 }
        }));
        assert_eq!(config.indexer.max_retries, 0);
        assert_eq!(config.indexer.initial_retry_delay_ms, 0);
    }

    #[test]
    fn malformed_tree_fails_resolution() {
        let error = resolve_value(
            json!({ "mcpServers": "not-a-map" }),
            PathBuf::from("/tmp"),
        )
        .unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn servers_file_supports_bare_and_wrapped_maps() {
        let dir = tempfile::tempdir().expect("tempdir");
        let bare = dir.path().join("bare.json");
        std::fs::write(&bare, r#"{ "fs": { "command": "fs-server" } }"#).expect("write");
        let config = resolve_json(json!({
            "mcpServersFile": bare.to_str().expect("utf8 path")
        }));
        assert_eq!(config.servers.len(), 1);

        let wrapped = dir.path().join("wrapped.json");
        std::fs::write(
            &wrapped,
            r#"{ "mcpServers": { "git": { "command": "git-server" } } }"#,
        )
        .expect("write");
        let config = resolve_json(json!({
            "mcpServersFile": wrapped.to_str().expect("utf8 path")
        }));
        assert_eq!(config.servers[0].name, "git");
    }

    #[test]
    fn inline_entry_wins_over_file_entry() {
        let dir = tempfile::tempdir().expect("tempdir");
        let file = dir.path().join("servers.json");
        std::fs::write(
            &file,
            r#"{ "fs": { "command": "file-version" }, "git": { "command": "git-server" } }"#,
        )
        .expect("write");
        let config = resolve_json(json!({
            "mcpServersFile": file.to_str().expect("utf8 path"),
            "mcpServers": {
                "fs": { "command": "inline-version" },
                // Inline disable hides the file-based entry entirely.
                "git": { "command": "git-server", "disabled": true }
            }
        }));
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0].command.as_deref(), Some("inline-version"));
    }
}
