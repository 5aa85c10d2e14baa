//! Concurrent per-server indexing pipeline.
//!
//! One task per enabled server connects, lists tools, chunks and embeds each description, and
//! upserts the resulting entries. Tasks settle independently — a failing server never cancels
//! its peers — and every long-running step observes the run's cancellation token: before each
//! connect attempt, before each tool, before each chunk embedding, and inside the retry
//! sleep. Connect failures retry with capped exponential backoff; everything else is counted
//! and reported per server.

use crate::chunking;
use crate::config::{IndexerConfig, ResolvedConfig, ServerDescriptor};
use crate::embedding::Embedder;
use crate::registry::CapabilityRegistry;
use crate::store::{ToolEntry, ToolStore};
use crate::transport::{RemoteTool, ServerSession, SessionFactory, TransportError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// Explicit parameter bag carrying every side-effecting collaborator.
///
/// Passed into the indexer and the operators instead of living behind globals, so tests can
/// substitute any component.
#[derive(Clone)]
pub struct ServiceBag {
    /// Resolved configuration.
    pub config: Arc<ResolvedConfig>,
    /// Tool persistence.
    pub store: Arc<dyn ToolStore>,
    /// Embedding backend.
    pub embedder: Arc<dyn Embedder>,
    /// Ownership registry.
    pub registry: Arc<CapabilityRegistry>,
    /// Session opener for capability servers.
    pub sessions: Arc<dyn SessionFactory>,
}

/// Outcome of one indexing run.
#[derive(Clone, Debug, Default)]
pub struct IndexReport {
    /// Tools indexed across all servers.
    pub indexed: usize,
    /// Tools (or whole servers) that failed.
    pub failed: usize,
    /// Per-server details in completion order.
    pub servers: Vec<ServerReport>,
}

/// Per-server indexing result, persisted into the status file.
#[derive(Clone, Debug, Serialize, Deserialize, schemars::JsonSchema)]
pub struct ServerReport {
    /// Server name.
    pub name: String,
    /// Tools indexed from this server.
    pub indexed: usize,
    /// Tools that failed on this server (`1` when the server itself was unreachable).
    pub failed: usize,
    /// Terminal error after the retry budget, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

enum TaskFailure {
    Cancelled,
    Fatal(String),
}

/// Index every server in the bag's configuration.
pub async fn run_indexer(bag: &ServiceBag, cancel: &CancellationToken) -> IndexReport {
    run_indexer_for(bag, bag.config.servers.clone(), cancel).await
}

/// Index the given subset of servers; used for partial (single-server) re-runs.
pub async fn run_indexer_for(
    bag: &ServiceBag,
    servers: Vec<ServerDescriptor>,
    cancel: &CancellationToken,
) -> IndexReport {
    let mut join_set = JoinSet::new();
    for server in servers {
        let bag = bag.clone();
        let cancel = cancel.clone();
        join_set.spawn(async move { index_server(&bag, server, &cancel).await });
    }

    let mut report = IndexReport::default();
    while let Some(settled) = join_set.join_next().await {
        let server_report = match settled {
            Ok(server_report) => server_report,
            Err(join_error) => {
                tracing::error!(error = %join_error, "Indexing task aborted");
                ServerReport {
                    name: "<unknown>".into(),
                    indexed: 0,
                    failed: 1,
                    error: Some(join_error.to_string()),
                }
            }
        };
        report.indexed += server_report.indexed;
        report.failed += server_report.failed;
        report.servers.push(server_report);
    }

    tracing::info!(
        indexed = report.indexed,
        failed = report.failed,
        servers = report.servers.len(),
        "Indexing run finished"
    );
    report
}

async fn index_server(
    bag: &ServiceBag,
    server: ServerDescriptor,
    cancel: &CancellationToken,
) -> ServerReport {
    bag.registry.register_server(server.clone());
    let cfg = bag.config.indexer;
    let timeout = Duration::from_millis(server.timeout_ms.unwrap_or(cfg.connect_timeout_ms));
    let mut last_error = String::new();

    for attempt in 0..=cfg.max_retries {
        if cancel.is_cancelled() {
            return cancelled_report(&server.name);
        }
        if attempt > 0 {
            let delay = backoff_delay(&cfg, attempt);
            if !cancellable_sleep(delay, cancel).await {
                return cancelled_report(&server.name);
            }
        }

        let session = match bag.sessions.connect(&server, timeout, cancel).await {
            Ok(session) => session,
            Err(TransportError::Cancelled) => return cancelled_report(&server.name),
            Err(error) => {
                last_error = error.to_string();
                if attempt == cfg.max_retries {
                    log_terminal_failure(&server.name, &last_error);
                    return ServerReport {
                        name: server.name,
                        indexed: 0,
                        failed: 1,
                        error: Some(last_error),
                    };
                }
                tracing::info!(
                    server = %server.name,
                    attempt = attempt + 1,
                    error = %error,
                    "Server not ready; retrying"
                );
                continue;
            }
        };

        let outcome = index_connected(bag, &server, session.as_ref(), cancel).await;
        session.disconnect().await;

        return match outcome {
            Ok((indexed, failed)) => ServerReport {
                name: server.name,
                indexed,
                failed,
                error: None,
            },
            Err(TaskFailure::Cancelled) => cancelled_report(&server.name),
            Err(TaskFailure::Fatal(message)) => {
                log_terminal_failure(&server.name, &message);
                ServerReport {
                    name: server.name,
                    indexed: 0,
                    failed: 1,
                    error: Some(message),
                }
            }
        };
    }

    ServerReport {
        name: server.name,
        indexed: 0,
        failed: 1,
        error: Some(last_error),
    }
}

async fn index_connected(
    bag: &ServiceBag,
    server: &ServerDescriptor,
    session: &dyn ServerSession,
    cancel: &CancellationToken,
) -> Result<(usize, usize), TaskFailure> {
    let tools = session
        .list_tools()
        .await
        .map_err(|error| TaskFailure::Fatal(error.to_string()))?;
    tracing::debug!(server = %server.name, tools = tools.len(), "Listing complete");

    let mut indexed = 0;
    let mut failed = 0;
    for tool in &tools {
        if cancel.is_cancelled() {
            return Err(TaskFailure::Cancelled);
        }
        match index_tool(bag, server, tool, cancel).await {
            Ok(()) => {
                bag.registry.register_tool_owner(&tool.name, &server.name);
                indexed += 1;
            }
            Err(ToolFailure::Cancelled) => return Err(TaskFailure::Cancelled),
            Err(ToolFailure::Other(message)) => {
                tracing::warn!(
                    server = %server.name,
                    tool = %tool.name,
                    error = %message,
                    "Failed to index tool"
                );
                failed += 1;
            }
        }
    }
    Ok((indexed, failed))
}

enum ToolFailure {
    Cancelled,
    Other(String),
}

async fn index_tool(
    bag: &ServiceBag,
    server: &ServerDescriptor,
    tool: &RemoteTool,
    cancel: &CancellationToken,
) -> Result<(), ToolFailure> {
    let cfg = bag.config.indexer;
    let chunks = chunking::chunk(
        &tool.description,
        &tool.name,
        cfg.max_chunk_chars,
        cfg.overlap_chars,
    );
    let parameters_json = serde_json::to_string(&tool.input_schema)
        .unwrap_or_else(|_| "{}".to_string());

    if chunks.len() == 1 {
        if cancel.is_cancelled() {
            return Err(ToolFailure::Cancelled);
        }
        let vector = bag
            .embedder
            .embed(&chunks[0].text)
            .await
            .map_err(|error| ToolFailure::Other(error.to_string()))?;
        bag.store
            .upsert_tool(ToolEntry {
                tool_id: ToolEntry::id_for(&server.name, &tool.name),
                server_name: server.name.clone(),
                tool_name: tool.name.clone(),
                description: tool.description.clone(),
                parameters_json,
                vector,
            })
            .await
            .map_err(|error| ToolFailure::Other(error.to_string()))?;
        return Ok(());
    }

    // Multi-chunk: clear the previous chunk set first so a shrinking description leaves no
    // orphan rows behind, then append the fresh batch in one write.
    bag.store
        .delete_tool_chunks(&server.name, &tool.name)
        .await
        .map_err(|error| ToolFailure::Other(error.to_string()))?;

    let mut batch = Vec::with_capacity(chunks.len());
    for chunk in &chunks {
        if cancel.is_cancelled() {
            return Err(ToolFailure::Cancelled);
        }
        let vector = bag
            .embedder
            .embed(&chunk.text)
            .await
            .map_err(|error| ToolFailure::Other(error.to_string()))?;
        batch.push(ToolEntry {
            tool_id: ToolEntry::chunk_id_for(&server.name, &tool.name, chunk.index),
            server_name: server.name.clone(),
            tool_name: tool.name.clone(),
            description: tool.description.clone(),
            parameters_json: parameters_json.clone(),
            vector,
        });
    }
    bag.store
        .add_tool_entries(batch)
        .await
        .map_err(|error| ToolFailure::Other(error.to_string()))?;
    Ok(())
}

fn cancelled_report(name: &str) -> ServerReport {
    ServerReport {
        name: name.to_string(),
        indexed: 0,
        failed: 1,
        error: Some("cancelled".into()),
    }
}

fn log_terminal_failure(server: &str, error: &str) {
    if error.to_lowercase().contains("embedding") {
        tracing::warn!(
            server,
            error,
            "Failed to index server: embedding service unavailable; start it and re-run `mcp-scout index`"
        );
    } else {
        tracing::warn!(server, error, "Failed to index server");
    }
}

/// Exponential backoff with cap: `min(initial · 2^(attempt-1), max)`.
fn backoff_delay(cfg: &IndexerConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(20);
    let delay = cfg
        .initial_retry_delay_ms
        .saturating_mul(1u64 << exponent)
        .min(cfg.max_retry_delay_ms);
    Duration::from_millis(delay)
}

/// Sleep that aborts early when the token fires; returns `false` when cancelled.
async fn cancellable_sleep(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
