//! Model Context Protocol (MCP) integration for mcp-scout.
//!
//! This module wires the router into an MCP server so agent hosts see exactly two
//! meta-tools instead of every downstream server's full catalog:
//!
//! - Tools: `mcp_search` (semantic tool retrieval) and `mcp_call` (dispatch).
//! - Resources: `scout://status`, the last indexing run's summary.
//!
//! Handlers and schemas are kept in focused submodules to make tests and reviews small and
//! targeted; with only two tools and one resource, the server dispatches requests directly.

mod handlers;
mod schemas;
mod server;

pub use server::ScoutMcpServer;

/// Name of the search meta-tool.
pub(crate) const SEARCH_TOOL: &str = "mcp_search";
/// Name of the call meta-tool.
pub(crate) const CALL_TOOL: &str = "mcp_call";
