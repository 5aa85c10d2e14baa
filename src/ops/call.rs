//! Dispatching a chosen tool against its owning server.

use crate::indexer::ServiceBag;
use rmcp::model::{Content, JsonObject};
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Caller-supplied call parameters.
#[derive(Clone, Debug, Default)]
pub struct CallRequest {
    /// Name of the tool to invoke.
    pub tool_name: String,
    /// Tool arguments as a JSON object string; defaults to `"{}"`.
    pub params_json: Option<String>,
}

/// Outcome of a dispatched call.
#[derive(Clone, Debug)]
pub struct CallResponse {
    /// Content blocks relayed from the server (or a single error card).
    pub content: Vec<Content>,
    /// Whether the call failed.
    pub is_error: bool,
}

impl CallResponse {
    fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![Content::text(message.into())],
            is_error: true,
        }
    }
}

/// Resolve the owning server, open a fresh session, dispatch, and tear down.
pub async fn call(bag: &ServiceBag, request: CallRequest) -> CallResponse {
    let tool_name = request.tool_name.trim();
    if tool_name.is_empty() {
        return CallResponse::error("`tool_name` is required.");
    }

    let raw_params = request.params_json.unwrap_or_else(|| "{}".to_string());
    let params: JsonObject = match serde_json::from_str::<Value>(&raw_params) {
        Ok(Value::Object(map)) => map,
        Ok(_) | Err(_) => {
            return CallResponse::error(
                "`params_json` must decode to a JSON object, e.g. \"{\\\"path\\\": \\\"…\\\"}\".",
            );
        }
    };

    let Some(server) = bag.registry.resolve_server(tool_name) else {
        return CallResponse::error(format!(
            "Unknown tool '{tool_name}'. Use mcp_search to discover available tools first."
        ));
    };

    let timeout = Duration::from_millis(bag.config.indexer.connect_timeout_ms);
    let cancel = CancellationToken::new();
    let session = match bag.sessions.connect(&server, timeout, &cancel).await {
        Ok(session) => session,
        Err(error) => {
            tracing::error!(
                server = %server.name,
                tool = tool_name,
                error = %error,
                "Failed to open session for tool call"
            );
            return CallResponse::error(format!(
                "Could not reach server '{}': {error}",
                server.name
            ));
        }
    };

    let outcome = session.call_tool(tool_name, params).await;
    session.disconnect().await;

    match outcome {
        Ok(outcome) => {
            tracing::debug!(
                server = %server.name,
                tool = tool_name,
                is_error = outcome.is_error,
                "Tool call completed"
            );
            CallResponse {
                content: outcome.content,
                is_error: outcome.is_error,
            }
        }
        Err(error) => {
            tracing::error!(
                server = %server.name,
                tool = tool_name,
                error = %error,
                "Tool call failed"
            );
            CallResponse::error(format!("Tool call failed: {error}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        EmbeddingConfig, IndexerConfig, ResolvedConfig, SearchConfig, ServerDescriptor,
        TransportKind, VectorDbConfig,
    };
    use crate::embedding::{Embedder, EmbeddingError};
    use crate::registry::CapabilityRegistry;
    use crate::store::{DistanceHit, StoreError, ToolEntry, ToolStore};
    use crate::transport::{
        CallOutcome, RemoteTool, ServerSession, SessionFactory, TransportError,
    };
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct NullEmbedder;

    #[async_trait]
    impl Embedder for NullEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, EmbeddingError> {
            Ok(vec![0.0; 4])
        }

        fn dims(&self) -> Option<usize> {
            Some(4)
        }

        async fn probe_dims(&self) -> Result<usize, EmbeddingError> {
            Ok(4)
        }
    }

    struct NullStore;

    #[async_trait]
    impl ToolStore for NullStore {
        async fn upsert_tool(&self, _entry: ToolEntry) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_tool_chunks(&self, _server: &str, _tool: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn add_tool_entries(&self, _entries: Vec<ToolEntry>) -> Result<(), StoreError> {
            Ok(())
        }

        async fn delete_server(&self, _server: &str) -> Result<(), StoreError> {
            Ok(())
        }

        async fn count_tools(&self) -> Result<usize, StoreError> {
            Ok(0)
        }

        async fn count_tools_by_server(
            &self,
        ) -> Result<BTreeMap<String, usize>, StoreError> {
            Ok(BTreeMap::new())
        }

        async fn search_tools(
            &self,
            _vector: Vec<f32>,
            _fetch_limit: usize,
        ) -> Result<Vec<DistanceHit>, StoreError> {
            Ok(Vec::new())
        }
    }

    struct EchoSession;

    #[async_trait]
    impl ServerSession for EchoSession {
        async fn list_tools(&self) -> Result<Vec<RemoteTool>, TransportError> {
            Ok(Vec::new())
        }

        async fn call_tool(
            &self,
            name: &str,
            params: JsonObject,
        ) -> Result<CallOutcome, TransportError> {
            let echo = format!("{name}:{}", serde_json::Value::Object(params));
            Ok(CallOutcome {
                content: vec![Content::text(echo)],
                is_error: false,
            })
        }

        async fn disconnect(self: Box<Self>) {}
    }

    struct EchoFactory {
        connects: AtomicUsize,
    }

    #[async_trait]
    impl SessionFactory for EchoFactory {
        async fn connect(
            &self,
            _server: &ServerDescriptor,
            _timeout: Duration,
            _cancel: &CancellationToken,
        ) -> Result<Box<dyn ServerSession>, TransportError> {
            self.connects.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(EchoSession))
        }
    }

    fn test_config() -> ResolvedConfig {
        ResolvedConfig {
            servers: Vec::new(),
            embedding: EmbeddingConfig {
                provider: "openai".into(),
                model: "test".into(),
                base_url: "http://127.0.0.1:1/v1".into(),
                api_key: None,
                headers: BTreeMap::new(),
            },
            vector_db: VectorDbConfig {
                url: "http://127.0.0.1:1".into(),
                collection: "tools".into(),
                api_key: None,
            },
            search: SearchConfig {
                top_k: 5,
                min_score: 0.3,
                include_parameters_default: false,
            },
            indexer: IndexerConfig {
                connect_timeout_ms: 1_000,
                max_retries: 0,
                initial_retry_delay_ms: 1,
                max_retry_delay_ms: 10,
                max_chunk_chars: 500,
                overlap_chars: 100,
                generate_catalog: false,
            },
            state_dir: PathBuf::from("/tmp/mcp-scout-test"),
        }
    }

    fn bag_with_factory(factory: Arc<EchoFactory>) -> ServiceBag {
        let registry = CapabilityRegistry::new();
        registry.register_server(ServerDescriptor {
            name: "fs".into(),
            transport: TransportKind::ChildProc,
            command: Some("fs-server".into()),
            args: Vec::new(),
            env: BTreeMap::new(),
            url: None,
            headers: BTreeMap::new(),
            timeout_ms: None,
        });
        registry.register_tool_owner("read_file", "fs");

        ServiceBag {
            config: Arc::new(test_config()),
            store: Arc::new(NullStore),
            embedder: Arc::new(NullEmbedder),
            registry: Arc::new(registry),
            sessions: factory,
        }
    }

    fn text_of(response: &CallResponse) -> String {
        response
            .content
            .iter()
            .filter_map(|content| content.raw.as_text())
            .map(|text| text.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    #[tokio::test]
    async fn empty_tool_name_is_rejected() {
        let bag = bag_with_factory(Arc::new(EchoFactory {
            connects: AtomicUsize::new(0),
        }));
        let response = call(
            &bag,
            CallRequest {
                tool_name: "   ".into(),
                params_json: None,
            },
        )
        .await;
        assert!(response.is_error);
        assert!(text_of(&response).contains("tool_name"));
    }

    #[tokio::test]
    async fn non_object_params_are_rejected() {
        let bag = bag_with_factory(Arc::new(EchoFactory {
            connects: AtomicUsize::new(0),
        }));
        for payload in ["[]", "null", "42", "not json"] {
            let response = call(
                &bag,
                CallRequest {
                    tool_name: "read_file".into(),
                    params_json: Some(payload.into()),
                },
            )
            .await;
            assert!(response.is_error, "payload {payload:?} should be rejected");
            assert!(text_of(&response).contains("JSON object"));
        }
    }

    #[tokio::test]
    async fn unknown_tool_references_search() {
        let bag = bag_with_factory(Arc::new(EchoFactory {
            connects: AtomicUsize::new(0),
        }));
        let response = call(
            &bag,
            CallRequest {
                tool_name: "no_such_tool".into(),
                params_json: None,
            },
        )
        .await;
        assert!(response.is_error);
        assert!(text_of(&response).contains("mcp_search"));
    }

    #[tokio::test]
    async fn dispatch_uses_a_fresh_session_and_relays_content() {
        let factory = Arc::new(EchoFactory {
            connects: AtomicUsize::new(0),
        });
        let bag = bag_with_factory(factory.clone());

        let response = call(
            &bag,
            CallRequest {
                tool_name: "read_file".into(),
                params_json: Some(r#"{"path":"/etc/hosts"}"#.into()),
            },
        )
        .await;
        assert!(!response.is_error);
        assert!(text_of(&response).contains("read_file"));
        assert!(text_of(&response).contains("/etc/hosts"));
        assert_eq!(factory.connects.load(Ordering::SeqCst), 1);

        call(
            &bag,
            CallRequest {
                tool_name: "read_file".into(),
                params_json: None,
            },
        )
        .await;
        assert_eq!(factory.connects.load(Ordering::SeqCst), 2);
    }
}
