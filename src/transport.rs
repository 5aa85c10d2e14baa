//! Client sessions over the MCP transports.
//!
//! A session is opened per use and torn down afterwards — nothing here is pooled or reused.
//! Three transports are supported: child processes speaking stdio, server-sent events, and
//! streamable HTTP. The concrete rmcp plumbing hides behind the [`ServerSession`] and
//! [`SessionFactory`] traits so the indexer and the call operator can be exercised against
//! in-memory doubles.

use crate::config::{ServerDescriptor, TransportKind};
use async_trait::async_trait;
use rmcp::{
    RoleClient, ServiceExt,
    model::{CallToolRequestParam, Content, JsonObject},
    service::RunningService,
    transport::{
        child_process::TokioChildProcess,
        sse_client::{SseClientConfig, SseClientTransport},
        streamable_http_client::{
            StreamableHttpClientTransport, StreamableHttpClientTransportConfig,
        },
    },
};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

/// Errors raised while talking to a capability server.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The child process could not be spawned.
    #[error("Failed to spawn server '{server}': {source}")]
    Spawn {
        /// Server whose command failed to start.
        server: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The session could not be established.
    #[error("Failed to connect to server '{server}': {message}")]
    Connect {
        /// Server that refused the session.
        server: String,
        /// Description of the failure.
        message: String,
    },
    /// The connect attempt exceeded its time budget.
    #[error("Connect to server '{server}' timed out after {after_ms}ms")]
    Timeout {
        /// Server that did not answer in time.
        server: String,
        /// Budget that was exhausted, in milliseconds.
        after_ms: u64,
    },
    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,
    /// A request on an established session failed.
    #[error("Server request failed: {0}")]
    Request(String),
}

/// Tool metadata as reported by a capability server.
#[derive(Clone, Debug)]
pub struct RemoteTool {
    /// Tool name unique within its server.
    pub name: String,
    /// Human-readable description; empty when the server omitted one.
    pub description: String,
    /// Input schema; empty object when the server omitted one.
    pub input_schema: JsonObject,
}

/// Result of dispatching a tool call.
#[derive(Clone, Debug)]
pub struct CallOutcome {
    /// Content blocks returned by the server.
    pub content: Vec<Content>,
    /// Whether the server flagged the call as failed.
    pub is_error: bool,
}

/// One live session with a capability server.
#[async_trait]
pub trait ServerSession: Send + Sync {
    /// Enumerate the tools the server exposes.
    async fn list_tools(&self) -> Result<Vec<RemoteTool>, TransportError>;

    /// Invoke a tool by name. Server-side failures are folded into the outcome's
    /// `is_error` flag rather than surfaced as transport errors.
    async fn call_tool(&self, name: &str, params: JsonObject) -> Result<CallOutcome, TransportError>;

    /// Tear the session down. Idempotent and infallible; safe from cleanup paths.
    async fn disconnect(self: Box<Self>);
}

/// Opens fresh sessions; one per connect, never shared.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    /// Open a session honouring the time budget and the cancellation token.
    async fn connect(
        &self,
        server: &ServerDescriptor,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn ServerSession>, TransportError>;
}

/// Production factory backed by the rmcp client transports.
#[derive(Default)]
pub struct RmcpSessionFactory;

impl RmcpSessionFactory {
    /// Create a factory instance.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SessionFactory for RmcpSessionFactory {
    async fn connect(
        &self,
        server: &ServerDescriptor,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn ServerSession>, TransportError> {
        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled);
        }

        let open = open_session(server);
        let service = tokio::select! {
            _ = cancel.cancelled() => return Err(TransportError::Cancelled),
            outcome = tokio::time::timeout(timeout, open) => match outcome {
                Ok(Ok(service)) => service,
                Ok(Err(error)) => return Err(error),
                Err(_) => {
                    return Err(TransportError::Timeout {
                        server: server.name.clone(),
                        after_ms: timeout.as_millis() as u64,
                    });
                }
            },
        };

        tracing::debug!(
            server = %server.name,
            transport = server.transport.label(),
            "Session established"
        );
        Ok(Box::new(RmcpSession {
            server: server.name.clone(),
            service,
        }))
    }
}

async fn open_session(
    server: &ServerDescriptor,
) -> Result<RunningService<RoleClient, ()>, TransportError> {
    match server.transport {
        TransportKind::ChildProc => {
            let program = server.command.as_deref().ok_or_else(|| TransportError::Connect {
                server: server.name.clone(),
                message: "childproc server has no command".into(),
            })?;
            let mut command = Command::new(program);
            command.args(&server.args);
            for (name, value) in &server.env {
                command.env(name, value);
            }
            let transport =
                TokioChildProcess::new(command).map_err(|source| TransportError::Spawn {
                    server: server.name.clone(),
                    source,
                })?;
            ().serve(transport)
                .await
                .map_err(|error| TransportError::Connect {
                    server: server.name.clone(),
                    message: error.to_string(),
                })
        }
        TransportKind::Sse => {
            let url = require_url(server)?;
            let client = http_client(&server.headers, &server.name)?;
            let transport = SseClientTransport::start_with_client(
                client,
                SseClientConfig {
                    sse_endpoint: url.into(),
                    ..Default::default()
                },
            )
            .await
            .map_err(|error| TransportError::Connect {
                server: server.name.clone(),
                message: error.to_string(),
            })?;
            ().serve(transport)
                .await
                .map_err(|error| TransportError::Connect {
                    server: server.name.clone(),
                    message: error.to_string(),
                })
        }
        TransportKind::StreamableHttp => {
            let url = require_url(server)?;
            let client = http_client(&server.headers, &server.name)?;
            let transport = StreamableHttpClientTransport::with_client(
                client,
                StreamableHttpClientTransportConfig::with_uri(url),
            );
            ().serve(transport)
                .await
                .map_err(|error| TransportError::Connect {
                    server: server.name.clone(),
                    message: error.to_string(),
                })
        }
    }
}

fn require_url(server: &ServerDescriptor) -> Result<String, TransportError> {
    server.url.clone().ok_or_else(|| TransportError::Connect {
        server: server.name.clone(),
        message: format!("{} server has no url", server.transport.label()),
    })
}

fn http_client(
    headers: &BTreeMap<String, String>,
    server: &str,
) -> Result<reqwest::Client, TransportError> {
    let mut header_map = reqwest::header::HeaderMap::new();
    for (name, value) in headers {
        let name: reqwest::header::HeaderName =
            name.parse().map_err(|_| TransportError::Connect {
                server: server.to_string(),
                message: format!("invalid header name '{name}'"),
            })?;
        let value: reqwest::header::HeaderValue =
            value.parse().map_err(|_| TransportError::Connect {
                server: server.to_string(),
                message: format!("invalid header value for '{name}'"),
            })?;
        header_map.insert(name, value);
    }
    reqwest::Client::builder()
        .default_headers(header_map)
        .user_agent("mcp-scout/0.1")
        .build()
        .map_err(|error| TransportError::Connect {
            server: server.to_string(),
            message: error.to_string(),
        })
}

struct RmcpSession {
    server: String,
    service: RunningService<RoleClient, ()>,
}

#[async_trait]
impl ServerSession for RmcpSession {
    async fn list_tools(&self) -> Result<Vec<RemoteTool>, TransportError> {
        let tools = self
            .service
            .list_all_tools()
            .await
            .map_err(|error| TransportError::Request(error.to_string()))?;

        Ok(tools
            .into_iter()
            .map(|tool| RemoteTool {
                name: tool.name.into_owned(),
                description: tool
                    .description
                    .map(|text| text.into_owned())
                    .unwrap_or_default(),
                input_schema: (*tool.input_schema).clone(),
            })
            .collect())
    }

    async fn call_tool(&self, name: &str, params: JsonObject) -> Result<CallOutcome, TransportError> {
        let result = self
            .service
            .call_tool(CallToolRequestParam {
                name: name.to_string().into(),
                arguments: Some(params),
            })
            .await;

        match result {
            Ok(outcome) => Ok(CallOutcome {
                is_error: outcome.is_error.unwrap_or(false),
                content: outcome.content,
            }),
            // A failed dispatch becomes a single error content block rather than a
            // transport error, so callers get a uniform result shape.
            Err(error) => Ok(CallOutcome {
                content: vec![Content::text(error.to_string())],
                is_error: true,
            }),
        }
    }

    async fn disconnect(self: Box<Self>) {
        let server = self.server;
        if let Err(error) = self.service.cancel().await {
            tracing::debug!(server = %server, error = %error, "Session teardown reported an error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn childproc(name: &str, command: &str) -> ServerDescriptor {
        ServerDescriptor {
            name: name.into(),
            transport: TransportKind::ChildProc,
            command: Some(command.into()),
            args: Vec::new(),
            env: BTreeMap::new(),
            url: None,
            headers: BTreeMap::new(),
            timeout_ms: None,
        }
    }

    #[tokio::test]
    async fn missing_binary_fails_to_spawn() {
        let factory = RmcpSessionFactory::new();
        let result = factory
            .connect(
                &childproc("ghost", "/nonexistent/mcp-server-binary"),
                Duration::from_secs(5),
                &CancellationToken::new(),
            )
            .await;
        let error = match result {
            Ok(_) => panic!("expected connect to fail"),
            Err(err) => err,
        };
        assert!(matches!(
            error,
            TransportError::Spawn { .. } | TransportError::Connect { .. }
        ));
    }

    #[tokio::test]
    async fn silent_process_hits_the_connect_timeout() {
        let factory = RmcpSessionFactory::new();
        let mut server = childproc("mute", "sleep");
        server.args = vec!["5".into()];
        let started = std::time::Instant::now();
        let result = factory
            .connect(&server, Duration::from_millis(200), &CancellationToken::new())
            .await;
        let error = match result {
            Ok(_) => panic!("expected connect to fail"),
            Err(err) => err,
        };
        assert!(matches!(error, TransportError::Timeout { .. }));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let factory = RmcpSessionFactory::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = factory
            .connect(
                &childproc("any", "sleep"),
                Duration::from_secs(60),
                &cancel,
            )
            .await;
        let error = match result {
            Ok(_) => panic!("expected connect to fail"),
            Err(err) => err,
        };
        assert!(matches!(error, TransportError::Cancelled));
    }
}
