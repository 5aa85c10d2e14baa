//! Vector store integration for tool entries.
//!
//! Tool entries live in a single Qdrant collection, keyed by a compound `tool_id` payload
//! field. The collection is created on first use with the resolved embedding dimension and a
//! Euclid metric; an existing collection's schema is trusted as-is.

pub mod client;
pub mod filters;
pub mod types;

use async_trait::async_trait;
use std::collections::BTreeMap;

pub use client::QdrantToolStore;
pub use types::{DistanceHit, StoreError, ToolEntry};

/// Persistence contract consumed by the indexer and the search operator.
///
/// Fronted by a trait so tests can substitute an in-memory double through the service bag.
#[async_trait]
pub trait ToolStore: Send + Sync {
    /// Replace any row with the same `tool_id`, then add the entry.
    async fn upsert_tool(&self, entry: ToolEntry) -> Result<(), StoreError>;

    /// Delete every chunk row belonging to `(server, tool)`.
    async fn delete_tool_chunks(&self, server: &str, tool: &str) -> Result<(), StoreError>;

    /// Batch-append entries without deleting; no-op on empty input.
    async fn add_tool_entries(&self, entries: Vec<ToolEntry>) -> Result<(), StoreError>;

    /// Delete every row belonging to a server.
    async fn delete_server(&self, server: &str) -> Result<(), StoreError>;

    /// Total number of stored rows.
    async fn count_tools(&self) -> Result<usize, StoreError>;

    /// Row counts grouped by owning server.
    async fn count_tools_by_server(&self) -> Result<BTreeMap<String, usize>, StoreError>;

    /// Nearest-neighbour query returning entries with their raw distances.
    async fn search_tools(
        &self,
        vector: Vec<f32>,
        fetch_limit: usize,
    ) -> Result<Vec<DistanceHit>, StoreError>;
}
