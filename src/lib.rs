#![deny(missing_docs)]

//! Core library for the mcp-scout tool-discovery router.

/// Semantic chunking of tool descriptions.
pub mod chunking;
/// Layered configuration resolution.
pub mod config;
/// Embedding client abstraction and HTTP adapter.
pub mod embedding;
/// Concurrent per-server indexing pipeline.
pub mod indexer;
/// Service lifecycle supervision and status reporting.
pub mod lifecycle;
/// Structured logging and tracing setup.
pub mod logging;
/// Model Context Protocol server implementation.
pub mod mcp;
/// Search and call operators exposed as meta-tools.
pub mod ops;
/// In-memory capability ownership registry.
pub mod registry;
/// Vector store integration for tool entries.
pub mod store;
/// Client sessions over the MCP transports.
pub mod transport;
