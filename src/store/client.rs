//! HTTP client wrapper for the Qdrant-backed tool store.

use crate::config::VectorDbConfig;
use crate::embedding::Embedder;
use crate::store::{
    ToolStore,
    filters::{by_server, by_server_tool, by_tool_id},
    types::{
        CollectionInfoResponse, CountResponse, DistanceHit, QueryResponse, QueryResponseResult,
        ScrollResponse, StoreError, ToolEntry,
    },
};
use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use uuid::Uuid;

/// Lightweight HTTP client for tool-entry persistence.
pub struct QdrantToolStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    collection: String,
    embedder: Arc<dyn Embedder>,
    init: OnceCell<()>,
}

impl QdrantToolStore {
    /// Construct a new store client from resolved configuration.
    ///
    /// The embedder is only consulted during first-use initialization, to size a collection
    /// that does not exist yet.
    pub fn new(
        config: &VectorDbConfig,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, StoreError> {
        let client = Client::builder().user_agent("mcp-scout/0.1").build()?;
        let base_url = normalize_base_url(&config.url).map_err(StoreError::InvalidUrl)?;
        tracing::debug!(
            url = %base_url,
            collection = %config.collection,
            "Initialized vector store HTTP client"
        );

        Ok(Self {
            client,
            base_url,
            api_key: config.api_key.clone(),
            collection: config.collection.clone(),
            embedder,
            init: OnceCell::new(),
        })
    }

    /// Guarantee the collection exists before any read or write.
    ///
    /// Concurrent first callers share a single in-flight initialization future; later callers
    /// see the fully initialized store. An existing collection's schema is trusted without
    /// migration — a dimension drift against the embedding service is logged, not repaired.
    async fn ensure_ready(&self) -> Result<(), StoreError> {
        self.init
            .get_or_try_init(|| self.initialize())
            .await
            .map(|_| ())
    }

    async fn initialize(&self) -> Result<(), StoreError> {
        let response = self
            .request(Method::GET, &format!("collections/{}", self.collection))?
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {
                let info: CollectionInfoResponse = response.json().await?;
                let existing = info
                    .result
                    .config
                    .and_then(|config| config.params)
                    .and_then(|params| params.vectors)
                    .and_then(|vectors| vectors.size);
                if let (Some(existing), Some(resolved)) = (existing, self.embedder.dims()) {
                    if existing != resolved as u64 {
                        tracing::error!(
                            collection = %self.collection,
                            existing,
                            resolved,
                            "Collection dimension differs from embedding model; delete the collection to rebuild"
                        );
                    }
                }
                Ok(())
            }
            StatusCode::NOT_FOUND => {
                let dims = self
                    .embedder
                    .probe_dims()
                    .await
                    .map_err(|err| StoreError::DimensionUnavailable(err.to_string()))?;
                self.create_collection(dims as u64).await
            }
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(StoreError::UnexpectedStatus { status, body })
            }
        }
    }

    async fn create_collection(&self, vector_size: u64) -> Result<(), StoreError> {
        // Euclid keeps query scores as raw distances for the operator's 1/(1+d) mapping.
        let body = json!({
            "vectors": {
                "size": vector_size,
                "distance": "Euclid"
            }
        });

        let response = self
            .request(Method::PUT, &format!("collections/{}", self.collection))?
            .json(&body)
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, vector_size, "Collection created");
        })
        .await
    }

    async fn delete_points(&self, filter: Value) -> Result<(), StoreError> {
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/delete", self.collection),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "filter": filter }))
            .send()
            .await?;

        self.ensure_success(response, || {}).await
    }

    async fn put_points(&self, entries: Vec<ToolEntry>) -> Result<(), StoreError> {
        let count = entries.len();
        let points: Vec<Value> = entries
            .into_iter()
            .map(|entry| {
                json!({
                    "id": Uuid::new_v4().to_string(),
                    "vector": entry.vector,
                    "payload": {
                        "tool_id": entry.tool_id,
                        "server_name": entry.server_name,
                        "tool_name": entry.tool_name,
                        "description": entry.description,
                        "parameters_json": entry.parameters_json,
                    }
                })
            })
            .collect();

        let response = self
            .request(
                Method::PUT,
                &format!("collections/{}/points", self.collection),
            )?
            .query(&[("wait", true)])
            .json(&json!({ "points": points }))
            .send()
            .await?;

        self.ensure_success(response, || {
            tracing::debug!(collection = %self.collection, points = count, "Entries stored");
        })
        .await
    }

    fn request(&self, method: Method, path: &str) -> Result<reqwest::RequestBuilder, StoreError> {
        let url = format_endpoint(&self.base_url, path);
        let mut request = self.client.request(method, url);
        if let Some(api_key) = &self.api_key
            && !api_key.is_empty()
        {
            request = request.header("api-key", api_key);
        }
        Ok(request)
    }

    async fn ensure_success<F>(
        &self,
        response: reqwest::Response,
        on_success: F,
    ) -> Result<(), StoreError>
    where
        F: FnOnce(),
    {
        if response.status().is_success() {
            on_success();
            Ok(())
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(error = %error, "Vector store request failed");
            Err(error)
        }
    }

    async fn scroll_payloads(&self, fields: Value) -> Result<Vec<Map<String, Value>>, StoreError> {
        let mut offset: Option<Value> = None;
        let mut payloads = Vec::new();

        loop {
            let mut body = json!({
                "with_payload": fields.clone(),
                "with_vector": false,
                "limit": 512,
                "offset": offset.clone().unwrap_or(Value::Null),
            });
            if offset.is_none() {
                body.as_object_mut()
                    .expect("scroll body is an object")
                    .remove("offset");
            }

            let response = self
                .request(
                    Method::POST,
                    &format!("collections/{}/points/scroll", self.collection),
                )?
                .json(&body)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                let error = StoreError::UnexpectedStatus { status, body };
                tracing::error!(collection = %self.collection, error = %error, "Failed to scroll payloads");
                return Err(error);
            }

            let ScrollResponse { result } = response.json().await?;
            for point in result.points {
                if let Some(payload) = point.payload {
                    payloads.push(payload);
                }
            }

            match result.next_page_offset {
                Some(next) => offset = Some(next),
                None => break,
            }
        }

        Ok(payloads)
    }
}

#[async_trait]
impl ToolStore for QdrantToolStore {
    async fn upsert_tool(&self, entry: ToolEntry) -> Result<(), StoreError> {
        self.ensure_ready().await?;
        self.delete_points(by_tool_id(&entry.tool_id)).await?;
        self.put_points(vec![entry]).await
    }

    async fn delete_tool_chunks(&self, server: &str, tool: &str) -> Result<(), StoreError> {
        self.ensure_ready().await?;
        self.delete_points(by_server_tool(server, tool)).await
    }

    async fn add_tool_entries(&self, entries: Vec<ToolEntry>) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.ensure_ready().await?;
        self.put_points(entries).await
    }

    async fn delete_server(&self, server: &str) -> Result<(), StoreError> {
        self.ensure_ready().await?;
        self.delete_points(by_server(server)).await
    }

    async fn count_tools(&self) -> Result<usize, StoreError> {
        self.ensure_ready().await?;
        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/count", self.collection),
            )?
            .json(&json!({ "exact": true }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::UnexpectedStatus { status, body });
        }

        let payload: CountResponse = response.json().await?;
        Ok(payload.result.count)
    }

    async fn count_tools_by_server(&self) -> Result<BTreeMap<String, usize>, StoreError> {
        self.ensure_ready().await?;
        let payloads = self.scroll_payloads(json!(["server_name"])).await?;
        let mut counts = BTreeMap::new();
        for payload in payloads {
            if let Some(server) = payload.get("server_name").and_then(Value::as_str) {
                *counts.entry(server.to_string()).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    async fn search_tools(
        &self,
        vector: Vec<f32>,
        fetch_limit: usize,
    ) -> Result<Vec<DistanceHit>, StoreError> {
        self.ensure_ready().await?;
        let body = json!({
            "query": vector,
            "limit": fetch_limit,
            "with_payload": true,
        });

        let response = self
            .request(
                Method::POST,
                &format!("collections/{}/points/query", self.collection),
            )?
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let error = StoreError::UnexpectedStatus { status, body };
            tracing::error!(collection = %self.collection, error = %error, "Vector search failed");
            return Err(error);
        }

        let payload: QueryResponse = response.json().await?;
        let points = match payload.result {
            QueryResponseResult::Points(points) => points,
            QueryResponseResult::Object { points } => points,
        };

        let hits = points
            .into_iter()
            .filter_map(|point| {
                let payload = point.payload?;
                Some(DistanceHit {
                    entry: entry_from_payload(&payload),
                    distance: point.score,
                })
            })
            .collect();
        Ok(hits)
    }
}

fn entry_from_payload(payload: &Map<String, Value>) -> ToolEntry {
    let field = |name: &str| {
        payload
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };
    ToolEntry {
        tool_id: field("tool_id"),
        server_name: field("server_name"),
        tool_name: field("tool_name"),
        description: field("description"),
        parameters_json: field("parameters_json"),
        vector: Vec::new(),
    }
}

fn normalize_base_url(url: &str) -> Result<String, String> {
    let mut parsed = reqwest::Url::parse(url).map_err(|err| err.to_string())?;
    let path = parsed.path().trim_end_matches('/').to_string();
    parsed.set_path(&path);
    Ok(parsed.to_string().trim_end_matches('/').to_string())
}

fn format_endpoint(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
