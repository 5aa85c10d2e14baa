//! MCP server bootstrap and request dispatch.
//!
//! The router surfaces exactly two tools and one resource, so dispatch is a direct match on
//! the request name rather than a handler table.

use std::{borrow::Cow, sync::Arc};

use crate::{
    lifecycle::{self, Supervisor},
    mcp::{
        CALL_TOOL, SEARCH_TOOL,
        handlers::{handle_call, handle_search},
        schemas,
    },
};
use rmcp::{
    ErrorData as McpError,
    handler::server::ServerHandler,
    model::{
        AnnotateAble, CallToolRequestParam, CallToolResult, ListResourcesResult, ListToolsResult,
        RawResource, ReadResourceRequestParam, ReadResourceResult, Resource, ResourceContents,
        ServerCapabilities, ServerInfo, Tool, ToolAnnotations,
    },
};

const STATUS_URI: &str = "scout://status";
const APPLICATION_JSON: &str = "application/json";

/// MCP server exposing the router's meta-tools.
#[derive(Clone)]
pub struct ScoutMcpServer {
    supervisor: Arc<Supervisor>,
}

impl ScoutMcpServer {
    /// Create a new MCP server around the supervised service components.
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }

    fn describe_tools(&self) -> Vec<Tool> {
        let search = &self.supervisor.bag().config.search;
        vec![
            Tool {
                name: Cow::Borrowed(SEARCH_TOOL),
                title: Some("Find Tools".to_string()),
                description: Some(Cow::Borrowed(
                    "Discover relevant tools across all connected MCP servers by describing what you need in natural language.",
                )),
                input_schema: Arc::new(schemas::search_input_schema(search)),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Find Tools")
                        .read_only(true)
                        .idempotent(true)
                        .open_world(false),
                ),
                icons: None,
            },
            Tool {
                name: Cow::Borrowed(CALL_TOOL),
                title: Some("Call Tool".to_string()),
                description: Some(Cow::Borrowed(
                    "Execute a tool found via mcp_search against the server that owns it.",
                )),
                input_schema: Arc::new(schemas::call_input_schema()),
                output_schema: None,
                annotations: Some(
                    ToolAnnotations::with_title("Call Tool")
                        .destructive(true)
                        .idempotent(false)
                        .open_world(true),
                ),
                icons: None,
            },
        ]
    }

    fn describe_resources(&self) -> Vec<Resource> {
        let mut status = RawResource::new(STATUS_URI, "status");
        status.description = Some("Per-server results of the most recent indexing run".into());
        vec![status.no_annotation()]
    }

    async fn read_status_resource(&self) -> Result<ReadResourceResult, McpError> {
        let state_dir = self.supervisor.bag().config.state_dir.clone();
        let payload = match lifecycle::read_status(&state_dir) {
            Some(summary) => {
                serde_json::to_string_pretty(&summary).unwrap_or_else(|_| "{}".into())
            }
            None => "{\"servers\": []}".into(),
        };
        Ok(ReadResourceResult {
            contents: vec![ResourceContents::TextResourceContents {
                uri: STATUS_URI.to_string(),
                mime_type: Some(APPLICATION_JSON.into()),
                text: payload,
                meta: None,
            }],
        })
    }
}

impl ServerHandler for ScoutMcpServer {
    fn get_info(&self) -> ServerInfo {
        let mut implementation = rmcp::model::Implementation::from_build_env();
        implementation.name = "mcp-scout".to_string();
        implementation.title = Some("MCP Scout".to_string());
        implementation.version = env!("CARGO_PKG_VERSION").to_string();

        ServerInfo {
            capabilities: ServerCapabilities::builder()
                .enable_resources()
                .enable_tools()
                .build(),
            server_info: implementation,
            instructions: Some(
                "Use mcp_search to find tools across all connected MCP servers by describing the capability you need, then mcp_call to execute the chosen tool. Tool schemas stay out of your prompt until you ask for them.".into(),
            ),
            ..ServerInfo::default()
        }
    }

    fn list_resources(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListResourcesResult, McpError>> + Send + '_ {
        let resources = self.describe_resources();
        std::future::ready(Ok(ListResourcesResult::with_all_items(resources)))
    }

    fn list_tools(
        &self,
        _request: Option<rmcp::model::PaginatedRequestParam>,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ListToolsResult, McpError>> + Send + '_ {
        let tools = self.describe_tools();
        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }

    fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<ReadResourceResult, McpError>> + Send + '_ {
        async move {
            match request.uri.as_str() {
                STATUS_URI => self.read_status_resource().await,
                other => Err(McpError::invalid_params(
                    format!("Unknown resource URI: {other}"),
                    None,
                )),
            }
        }
    }

    #[allow(clippy::manual_async_fn)]
    fn call_tool(
        &self,
        request: CallToolRequestParam,
        _context: rmcp::service::RequestContext<rmcp::service::RoleServer>,
    ) -> impl std::future::Future<Output = Result<CallToolResult, McpError>> + Send + '_ {
        async move {
            let bag = self.supervisor.bag();
            match request.name.as_ref() {
                SEARCH_TOOL => handle_search(bag, request.arguments).await,
                CALL_TOOL => handle_call(bag, request.arguments).await,
                other => Err(McpError::invalid_params(
                    format!("Unknown tool: {other}"),
                    None,
                )),
            }
        }
    }
}
