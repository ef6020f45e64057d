//! Aggregated tool catalog
//!
//! 接続中の全サーバーのツールを一つのフラットな一覧にまとめる

use serde_json::Value as JsonValue;
use tracing::warn;

use relay_core::ToolDefinition;

use crate::client::McpTool;
use crate::namespace::Namespace;
use crate::registry::ServerRegistry;

/// Longest tool name the Messages API accepts
pub const MAX_TOOL_NAME_LEN: usize = 64;

/// A server tool rewritten into the shared namespace
#[derive(Debug, Clone, PartialEq)]
pub struct NamespacedTool {
    /// Name exposed to the LLM: `<prefix>__<original_name>`
    pub namespaced_name: String,
    /// Name understood by the owning server
    pub original_name: String,
    /// Server description, tagged with the owning server's identifier
    pub description: String,
    /// Input schema as declared by the server
    pub input_schema: JsonValue,
    /// Identifier of the owning server
    pub server_id: String,
}

impl NamespacedTool {
    pub fn new(server_id: &str, namespace: &Namespace, tool: McpTool) -> Self {
        let description = if tool.description.is_empty() {
            format!("[{}]", server_id)
        } else {
            format!("[{}] {}", server_id, tool.description)
        };

        Self {
            namespaced_name: namespace.qualify(&tool.name),
            original_name: tool.name,
            description,
            input_schema: tool.input_schema,
            server_id: server_id.to_string(),
        }
    }

    /// Definition sent to the LLM
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            self.namespaced_name.clone(),
            self.description.clone(),
            self.input_schema.clone(),
        )
    }
}

/// Flat list of every tool across all live connections
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolCatalog {
    tools: Vec<NamespacedTool>,
}

impl ToolCatalog {
    /// Concatenate every connection's tools in registry order
    pub fn rebuild(registry: &ServerRegistry) -> Self {
        let tools: Vec<NamespacedTool> = registry
            .all()
            .flat_map(|connection| connection.tools().iter().cloned())
            .collect();

        for tool in &tools {
            if tool.namespaced_name.len() > MAX_TOOL_NAME_LEN {
                warn!(
                    tool_name = %tool.namespaced_name,
                    server_id = %tool.server_id,
                    "Namespaced tool name exceeds {} characters and may be rejected by the API",
                    MAX_TOOL_NAME_LEN
                );
            }
        }

        Self { tools }
    }

    /// Definitions for a Messages API request
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(NamespacedTool::definition).collect()
    }

    /// Namespaced names, in catalog order
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.namespaced_name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
