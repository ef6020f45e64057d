//! Error types for relay-mcp

use thiserror::Error;

/// Failure to bring one tool server into the registry
///
/// Always non-fatal: the server is simply absent from the catalog.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("Server script {path} must be a .js or .py file")]
    UnsupportedScript { path: String },

    #[error("Server identifier {identifier:?} has no usable characters for a tool prefix")]
    EmptyPrefix { identifier: String },

    #[error("Server {identifier} would share tool prefix {prefix:?} with already connected {existing}")]
    PrefixCollision {
        identifier: String,
        existing: String,
        prefix: String,
    },

    #[error("Failed to launch server {identifier}: {source}")]
    Launch {
        identifier: String,
        #[source]
        source: relay_core::Error,
    },

    #[error("Failed to list tools from server {identifier}: {source}")]
    ListTools {
        identifier: String,
        #[source]
        source: relay_core::Error,
    },
}

/// A tool name the LLM emitted that no live connection owns
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("Tool {name} not found or its server is not connected")]
    UnknownTool { name: String },
}

/// The resolved tool call itself failed
#[derive(Error, Debug)]
pub enum ToolInvocationError {
    #[error("{message}")]
    Call {
        server: String,
        tool: String,
        message: String,
    },
}

/// Close failure collected during teardown
#[derive(Error, Debug)]
#[error("Failed to close connection to {identifier}: {source}")]
pub struct CloseError {
    pub identifier: String,
    #[source]
    pub source: relay_core::Error,
}
