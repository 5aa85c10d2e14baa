//! In-memory capability ownership registry.
//!
//! The registry maps each discovered tool name to the server that exposed it, alongside the
//! descriptors of all known servers. It is written only by the indexer; reads may happen
//! concurrently from the call operator. Name collisions across servers apply
//! last-writer-wins with an operator-visible warning — duplicate names are rare enough that
//! rejecting them would turn a soft problem into a hard one.

use crate::config::ServerDescriptor;
use std::collections::HashMap;
use std::sync::RwLock;

/// Mapping of tool names to owning server descriptors.
#[derive(Default)]
pub struct CapabilityRegistry {
    owners: RwLock<HashMap<String, String>>,
    servers: RwLock<HashMap<String, ServerDescriptor>>,
}

impl CapabilityRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record (or refresh) a server descriptor.
    pub fn register_server(&self, descriptor: ServerDescriptor) {
        let mut servers = self.servers.write().expect("servers lock poisoned");
        servers.insert(descriptor.name.clone(), descriptor);
    }

    /// Bind a tool name to its owning server, overwriting any previous binding.
    pub fn register_tool_owner(&self, tool: &str, server: &str) {
        let mut owners = self.owners.write().expect("owners lock poisoned");
        if let Some(previous) = owners.insert(tool.to_string(), server.to_string()) {
            if previous != server {
                tracing::warn!(
                    tool,
                    previous = %previous,
                    server,
                    "Tool name collision; last writer wins"
                );
            }
        }
    }

    /// Resolve the descriptor of the server owning `tool`, if any.
    pub fn resolve_server(&self, tool: &str) -> Option<ServerDescriptor> {
        let owners = self.owners.read().expect("owners lock poisoned");
        let server_name = owners.get(tool)?;
        let servers = self.servers.read().expect("servers lock poisoned");
        servers.get(server_name).cloned()
    }

    /// Number of registered tool bindings.
    pub fn tool_count(&self) -> usize {
        self.owners.read().expect("owners lock poisoned").len()
    }

    /// Snapshot of tool names grouped by owning server, sorted for stable output.
    pub fn tools_by_server(&self) -> Vec<(String, Vec<String>)> {
        let owners = self.owners.read().expect("owners lock poisoned");
        let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
        for (tool, server) in owners.iter() {
            grouped.entry(server.clone()).or_default().push(tool.clone());
        }
        let mut result: Vec<(String, Vec<String>)> = grouped
            .into_iter()
            .map(|(server, mut tools)| {
                tools.sort();
                (server, tools)
            })
            .collect();
        result.sort_by(|a, b| a.0.cmp(&b.0));
        result
    }
}
