//! Search and call operators exposed as meta-tools.
//!
//! These are the runtime surfaces of the router: `mcp_search` embeds a query and ranks
//! deduplicated tool entries; `mcp_call` resolves ownership and dispatches against a fresh
//! session. Both consume the same parameter bag as the indexer.

pub mod call;
pub mod search;
