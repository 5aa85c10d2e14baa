//! Service lifecycle supervision and status reporting.
//!
//! The supervisor owns at most one outstanding indexing run. Starting a new run signals the
//! previous run's cancellation token before minting a fresh one; stopping signals and clears
//! it. After any run a best-effort status summary is written into the state directory —
//! partial (single-server) runs merge their per-server entries into the existing summary
//! instead of replacing it.

use crate::indexer::{IndexReport, ServerReport, ServiceBag, run_indexer, run_indexer_for};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// Name of the status summary written after each run.
pub const STATUS_FILE: &str = "index-status.json";
/// Name of the optional tool catalog manifest.
pub const CATALOG_FILE: &str = "catalog.json";

/// Post-run status summary persisted to disk.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct StatusSummary {
    /// RFC3339 timestamp of the run that produced (or last merged into) the summary.
    pub timestamp: String,
    /// Per-server results.
    pub servers: Vec<ServerReport>,
}

/// Coordinates indexer runs for the host process.
pub struct Supervisor {
    bag: ServiceBag,
    current: Mutex<Option<(u64, CancellationToken)>>,
    generation: std::sync::atomic::AtomicU64,
}

impl Supervisor {
    /// Create a supervisor over the given components.
    pub fn new(bag: ServiceBag) -> Self {
        Self {
            bag,
            current: Mutex::new(None),
            generation: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// The parameter bag shared with the operators.
    pub fn bag(&self) -> &ServiceBag {
        &self.bag
    }

    /// Launch a full background indexing run, cancelling any run still in flight.
    pub async fn start(self: &Arc<Self>) {
        let (generation, token) = self.rotate_token().await;
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let report = run_indexer(&supervisor.bag, &token).await;
            supervisor.publish(&report, false).await;
            supervisor.clear_token(generation).await;
        });
    }

    /// Run the indexer inline over all servers (or one), returning the report.
    ///
    /// A single-server run is treated as partial: its entry merges into the existing status
    /// summary rather than replacing it.
    pub async fn run_once(self: &Arc<Self>, server: Option<&str>) -> Option<IndexReport> {
        let (generation, token) = self.rotate_token().await;
        let report = match server {
            None => run_indexer(&self.bag, &token).await,
            Some(name) => {
                let Some(descriptor) = self
                    .bag
                    .config
                    .servers
                    .iter()
                    .find(|server| server.name == name)
                    .cloned()
                else {
                    tracing::error!(server = name, "No such server in configuration");
                    self.clear_token(generation).await;
                    return None;
                };
                run_indexer_for(&self.bag, vec![descriptor], &token).await
            }
        };
        self.publish(&report, server.is_some()).await;
        self.clear_token(generation).await;
        Some(report)
    }

    /// Signal and clear the outstanding run, if any.
    pub async fn stop(&self) {
        let mut current = self.current.lock().await;
        if let Some((_, token)) = current.take() {
            token.cancel();
        }
    }

    async fn rotate_token(&self) -> (u64, CancellationToken) {
        let mut current = self.current.lock().await;
        if let Some((_, previous)) = current.take() {
            previous.cancel();
        }
        let generation = self
            .generation
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let token = CancellationToken::new();
        *current = Some((generation, token.clone()));
        (generation, token)
    }

    /// Drop the stored token when it still belongs to the finished run; a restart may
    /// already have rotated it.
    async fn clear_token(&self, generation: u64) {
        let mut current = self.current.lock().await;
        if matches!(current.as_ref(), Some((stored, _)) if *stored == generation) {
            *current = None;
        }
    }

    async fn publish(&self, report: &IndexReport, partial: bool) {
        let state_dir = self.bag.config.state_dir.clone();
        write_status(&state_dir, &report.servers, partial);
        if self.bag.config.indexer.generate_catalog {
            write_catalog(&state_dir, &self.bag);
        }
    }
}

/// Write (or merge) the status summary. Best effort: failures are logged, never raised.
pub fn write_status(state_dir: &Path, servers: &[ServerReport], merge: bool) {
    let path = state_dir.join(STATUS_FILE);
    let mut entries: Vec<ServerReport> = if merge {
        read_status(state_dir)
            .map(|summary| summary.servers)
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    for report in servers {
        match entries.iter_mut().find(|entry| entry.name == report.name) {
            Some(existing) => *existing = report.clone(),
            None => entries.push(report.clone()),
        }
    }

    let summary = StatusSummary {
        timestamp: OffsetDateTime::now_utc()
            .format(&Rfc3339)
            .unwrap_or_default(),
        servers: entries,
    };

    if let Err(error) = std::fs::create_dir_all(state_dir) {
        tracing::warn!(path = %state_dir.display(), error = %error, "Could not create state directory");
        return;
    }
    match serde_json::to_string_pretty(&summary) {
        Ok(text) => {
            if let Err(error) = std::fs::write(&path, text) {
                tracing::warn!(path = %path.display(), error = %error, "Could not write status file");
            }
        }
        Err(error) => {
            tracing::warn!(error = %error, "Could not serialize status summary");
        }
    }
}

/// Read the current status summary, if one exists and parses.
pub fn read_status(state_dir: &Path) -> Option<StatusSummary> {
    let path = state_dir.join(STATUS_FILE);
    let text = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&text).ok()
}

/// Path of the status file inside a state directory.
pub fn status_path(state_dir: &Path) -> PathBuf {
    state_dir.join(STATUS_FILE)
}

#[derive(Serialize)]
struct CatalogEntry {
    server: String,
    tools: Vec<String>,
}

/// Write the tool catalog manifest from the registry snapshot. Best effort.
fn write_catalog(state_dir: &Path, bag: &ServiceBag) {
    let entries: Vec<CatalogEntry> = bag
        .registry
        .tools_by_server()
        .into_iter()
        .map(|(server, tools)| CatalogEntry { server, tools })
        .collect();

    let path = state_dir.join(CATALOG_FILE);
    match serde_json::to_string_pretty(&entries) {
        Ok(text) => {
            if let Err(error) = std::fs::write(&path, text) {
                tracing::warn!(path = %path.display(), error = %error, "Could not write catalog file");
            }
        }
        Err(error) => {
            tracing::warn!(error = %error, "Could not serialize catalog");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(name: &str, indexed: usize, failed: usize) -> ServerReport {
        ServerReport {
            name: name.into(),
            indexed,
            failed,
            error: None,
        }
    }

    #[test]
    fn full_run_replaces_the_summary() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_status(dir.path(), &[report("fs", 3, 0), report("git", 2, 1)], false);
        write_status(dir.path(), &[report("fs", 4, 0)], false);

        let summary = read_status(dir.path()).expect("summary");
        assert_eq!(summary.servers.len(), 1);
        assert_eq!(summary.servers[0].name, "fs");
        assert_eq!(summary.servers[0].indexed, 4);
        assert!(!summary.timestamp.is_empty());
    }

    #[test]
    fn partial_run_merges_into_existing_entries() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_status(dir.path(), &[report("fs", 3, 0), report("git", 2, 1)], false);
        write_status(dir.path(), &[report("git", 5, 0)], true);

        let summary = read_status(dir.path()).expect("summary");
        assert_eq!(summary.servers.len(), 2);
        let git = summary
            .servers
            .iter()
            .find(|entry| entry.name == "git")
            .expect("git entry");
        assert_eq!(git.indexed, 5);
        assert_eq!(git.failed, 0);
        let fs = summary
            .servers
            .iter()
            .find(|entry| entry.name == "fs")
            .expect("fs entry");
        assert_eq!(fs.indexed, 3);
    }

    #[test]
    fn status_file_is_pretty_printed_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_status(dir.path(), &[report("fs", 1, 0)], false);
        let text = std::fs::read_to_string(status_path(dir.path())).expect("file");
        assert!(text.contains('\n'));
        let parsed: StatusSummary = serde_json::from_str(&text).expect("valid json");
        assert_eq!(parsed.servers[0].name, "fs");
    }

    #[test]
    fn missing_summary_reads_as_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(read_status(dir.path()).is_none());
    }
}
