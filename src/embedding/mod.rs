//! Embedding client abstraction and the OpenAI-compatible HTTP adapter.
//!
//! Vectors are obtained from an HTTP service speaking the OpenAI embeddings contract:
//! `POST {base_url}/embeddings` with `{model, input}` returning `{data:[{embedding:[…]}]}`.
//! The vector dimension is resolved up front for known models and cached from the first
//! successful response otherwise, so the store can size its collection without an extra
//! round trip.

use crate::config::EmbeddingConfig;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use thiserror::Error;

const BODY_PREVIEW_CHARS: usize = 200;
const PROBE_TEXT: &str = "dimension probe";

/// Errors raised while obtaining embeddings.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    /// The service could not be reached at the network level.
    #[error("Embedding service not reachable at {url}: {source}")]
    Unreachable {
        /// Request URL that failed.
        url: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },
    /// The service answered with a non-2xx status.
    #[error("Embedding service returned {status}: {body}")]
    UnexpectedStatus {
        /// HTTP status of the failing response.
        status: StatusCode,
        /// Truncated body prefix for diagnostics.
        body: String,
    },
    /// A 2xx response did not carry `data[0].embedding`.
    #[error("Embedding response missing data[0].embedding")]
    MalformedResponse,
    /// The configured endpoint was rejected at construction time.
    #[error("Invalid embedding endpoint: {0}")]
    InvalidEndpoint(String),
}

impl EmbeddingError {
    /// Whether the failure is a connectivity fault the indexer should treat as retryable.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Produce a fixed-length vector for the supplied text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Vector length, if already resolved.
    fn dims(&self) -> Option<usize>;

    /// Force dimension resolution, embedding a short probe when necessary.
    async fn probe_dims(&self) -> Result<usize, EmbeddingError>;
}

/// Dimensions of commonly deployed embedding models, resolved without a round trip.
fn known_model_dims(model: &str) -> Option<usize> {
    let normalized = model.to_lowercase();
    match normalized.as_str() {
        "nomic-embed-text" => Some(768),
        "mxbai-embed-large" | "mxbai-embed-large-v1" => Some(1024),
        "text-embedding-3-small" | "text-embedding-ada-002" => Some(1536),
        "text-embedding-3-large" => Some(3072),
        value if value.contains("all-minilm") => Some(384),
        _ => None,
    }
}

/// OpenAI-compatible HTTP embedding client.
#[derive(Debug)]
pub struct HttpEmbedder {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    headers: BTreeMap<String, String>,
    dims: OnceLock<usize>,
}

impl HttpEmbedder {
    /// Build a client from resolved configuration.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let client = Client::builder()
            .user_agent("mcp-scout/0.1")
            .build()
            .map_err(|err| EmbeddingError::InvalidEndpoint(err.to_string()))?;

        let dims = OnceLock::new();
        if let Some(known) = known_model_dims(&config.model) {
            let _ = dims.set(known);
            tracing::debug!(model = %config.model, dims = known, "Resolved known model dimension");
        }

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            headers: config.headers.clone(),
            dims,
        })
    }
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    #[serde(default)]
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    #[serde(default)]
    embedding: Option<Vec<f32>>,
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let url = format!("{}/embeddings", self.base_url);
        let mut request = self
            .client
            .post(&url)
            .json(&json!({ "model": self.model, "input": text }));
        if let Some(key) = self.api_key.as_deref() {
            request = request.bearer_auth(key);
        }
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|source| EmbeddingError::Unreachable {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(EmbeddingError::UnexpectedStatus {
                status,
                body: truncate_body(&body),
            });
        }

        let payload: EmbeddingsResponse =
            serde_json::from_str(&body).map_err(|_| EmbeddingError::MalformedResponse)?;
        let vector = payload
            .data
            .into_iter()
            .next()
            .and_then(|datum| datum.embedding)
            .filter(|vector| !vector.is_empty())
            .ok_or(EmbeddingError::MalformedResponse)?;

        let _ = self.dims.set(vector.len());
        Ok(vector)
    }

    fn dims(&self) -> Option<usize> {
        self.dims.get().copied()
    }

    async fn probe_dims(&self) -> Result<usize, EmbeddingError> {
        if let Some(dims) = self.dims() {
            return Ok(dims);
        }
        let vector = self.embed(PROBE_TEXT).await?;
        Ok(vector.len())
    }
}

fn truncate_body(body: &str) -> String {
    if body.chars().count() <= BODY_PREVIEW_CHARS {
        return body.to_string();
    }
    let prefix: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
    format!("{prefix}…")
}

/// Deprecated native client for the legacy local endpoint.
///
/// Construction enforces a loopback-only host allowlist so a stray configuration cannot point
/// the default endpoint at an arbitrary network target.
#[derive(Debug)]
pub struct LocalEmbedder {
    inner: HttpEmbedder,
}

impl LocalEmbedder {
    /// Build a loopback-restricted client; non-loopback hosts are rejected.
    pub fn new(config: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let parsed = reqwest::Url::parse(&config.base_url)
            .map_err(|err| EmbeddingError::InvalidEndpoint(err.to_string()))?;
        let host = parsed.host_str().unwrap_or_default();
        if !matches!(host, "localhost" | "127.0.0.1" | "::1") {
            return Err(EmbeddingError::InvalidEndpoint(format!(
                "legacy embedding endpoint must be loopback, got '{host}'"
            )));
        }
        Ok(Self {
            inner: HttpEmbedder::new(config)?,
        })
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.inner.embed(text).await
    }

    fn dims(&self) -> Option<usize> {
        self.inner.dims()
    }

    async fn probe_dims(&self) -> Result<usize, EmbeddingError> {
        self.inner.probe_dims().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn config_for(base_url: &str, model: &str) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: "openai".into(),
            model: model.into(),
            base_url: base_url.trim_end_matches('/').into(),
            api_key: None,
            headers: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn embed_posts_model_and_input() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/embeddings")
                    .json_body_partial(r#"{ "model": "custom-model", "input": "hello" }"#);
                then.status(200)
                    .json_body(serde_json::json!({ "data": [ { "embedding": [0.1, 0.2, 0.3] } ] }));
            })
            .await;

        let embedder =
            HttpEmbedder::new(&config_for(&server.base_url(), "custom-model")).expect("client");
        let vector = embedder.embed("hello").await.expect("embedding");

        mock.assert();
        assert_eq!(vector, vec![0.1, 0.2, 0.3]);
        assert_eq!(embedder.dims(), Some(3));
    }

    #[tokio::test]
    async fn known_model_resolves_dims_without_request() {
        let embedder =
            HttpEmbedder::new(&config_for("http://127.0.0.1:9", "nomic-embed-text")).expect("client");
        assert_eq!(embedder.dims(), Some(768));
        assert_eq!(embedder.probe_dims().await.expect("cached"), 768);
    }

    #[tokio::test]
    async fn non_success_status_carries_truncated_body() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(500).body("b".repeat(5_000));
            })
            .await;

        let embedder =
            HttpEmbedder::new(&config_for(&server.base_url(), "custom-model")).expect("client");
        let error = embedder.embed("hello").await.unwrap_err();
        match error {
            EmbeddingError::UnexpectedStatus { status, body } => {
                assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
                assert!(body.chars().count() <= BODY_PREVIEW_CHARS + 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn missing_embedding_field_is_a_protocol_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/embeddings");
                then.status(200).json_body(serde_json::json!({ "data": [ {} ] }));
            })
            .await;

        let embedder =
            HttpEmbedder::new(&config_for(&server.base_url(), "custom-model")).expect("client");
        let error = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(error, EmbeddingError::MalformedResponse));
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_a_connectivity_fault() {
        let embedder =
            HttpEmbedder::new(&config_for("http://127.0.0.1:1", "custom-model")).expect("client");
        let error = embedder.embed("hello").await.unwrap_err();
        assert!(error.is_connectivity());
    }

    #[test]
    fn legacy_client_rejects_non_loopback_hosts() {
        let error = LocalEmbedder::new(&config_for("http://internal.corp:8080/v1", "m")).unwrap_err();
        assert!(matches!(error, EmbeddingError::InvalidEndpoint(_)));

        assert!(LocalEmbedder::new(&config_for("http://localhost:11434/v1", "m")).is_ok());
        assert!(LocalEmbedder::new(&config_for("http://127.0.0.1:11434/v1", "m")).is_ok());
        assert!(LocalEmbedder::new(&config_for("http://[::1]:11434/v1", "m")).is_ok());
    }
}
