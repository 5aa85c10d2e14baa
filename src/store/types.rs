//! Shared types used by the tool store and its helpers.

use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors returned while interacting with the vector store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Base URL failed to parse or normalize.
    #[error("Invalid vector store URL: {0}")]
    InvalidUrl(String),
    /// HTTP layer failed before receiving a response.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The store responded with an unexpected status code.
    #[error("Unexpected vector store response ({status}): {body}")]
    UnexpectedStatus {
        /// HTTP status returned by the store.
        status: StatusCode,
        /// Body payload associated with the failing response.
        body: String,
    },
    /// Collection initialization could not determine a vector dimension.
    #[error("Failed to resolve embedding dimension for collection init: {0}")]
    DimensionUnavailable(String),
}

/// One stored row describing a capability (or one chunk of its description).
#[derive(Clone, Debug, PartialEq)]
pub struct ToolEntry {
    /// Stable compound key: `"{server}::{tool}"`, or `"{server}::{tool}::chunk{i}"` for
    /// multi-chunk descriptions.
    pub tool_id: String,
    /// Owning server name.
    pub server_name: String,
    /// Capability name.
    pub tool_name: String,
    /// Full original description, identical across all chunks of one capability.
    pub description: String,
    /// Input schema serialized as a JSON string, identical across chunks.
    pub parameters_json: String,
    /// Embedding vector; its length matches the collection dimension.
    pub vector: Vec<f32>,
}

impl ToolEntry {
    /// Compound key for a single-chunk entry.
    pub fn id_for(server: &str, tool: &str) -> String {
        format!("{server}::{tool}")
    }

    /// Compound key for one chunk of a multi-chunk entry.
    pub fn chunk_id_for(server: &str, tool: &str, index: usize) -> String {
        format!("{server}::{tool}::chunk{index}")
    }
}

/// Search hit carrying the raw backend distance; score mapping happens in the operator.
#[derive(Clone, Debug)]
pub struct DistanceHit {
    /// Stored entry reconstructed from the row payload (vector omitted).
    pub entry: ToolEntry,
    /// Distance reported by the store; smaller is closer.
    pub distance: f32,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfoResponse {
    pub(crate) result: CollectionInfo,
}

#[derive(Deserialize)]
pub(crate) struct CollectionInfo {
    #[serde(default)]
    pub(crate) config: Option<CollectionConfig>,
}

#[derive(Deserialize)]
pub(crate) struct CollectionConfig {
    #[serde(default)]
    pub(crate) params: Option<CollectionParams>,
}

#[derive(Deserialize)]
pub(crate) struct CollectionParams {
    #[serde(default)]
    pub(crate) vectors: Option<VectorParams>,
}

#[derive(Deserialize)]
pub(crate) struct VectorParams {
    #[serde(default)]
    pub(crate) size: Option<u64>,
}

#[derive(Deserialize)]
pub(crate) struct CountResponse {
    pub(crate) result: CountResult,
}

#[derive(Deserialize)]
pub(crate) struct CountResult {
    pub(crate) count: usize,
}

#[derive(Deserialize)]
pub(crate) struct QueryResponse {
    pub(crate) result: QueryResponseResult,
}

#[derive(Deserialize)]
#[serde(untagged)]
pub(crate) enum QueryResponseResult {
    Points(Vec<QueryPoint>),
    Object {
        #[serde(default)]
        points: Vec<QueryPoint>,
    },
}

#[derive(Deserialize)]
pub(crate) struct QueryPoint {
    pub(crate) score: f32,
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResponse {
    pub(crate) result: ScrollResult,
}

#[derive(Deserialize)]
pub(crate) struct ScrollResult {
    #[serde(default)]
    pub(crate) points: Vec<ScrollPoint>,
    #[serde(default)]
    pub(crate) next_page_offset: Option<Value>,
}

#[derive(Deserialize)]
pub(crate) struct ScrollPoint {
    #[serde(default)]
    pub(crate) payload: Option<Map<String, Value>>,
}
