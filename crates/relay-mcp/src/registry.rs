//! Server connection registry
//!
//! MCP サーバー接続の一元管理

use serde_json::Value as JsonValue;
use tracing::{error, info, warn};

use relay_core::LaunchConfig;

use crate::catalog::NamespacedTool;
use crate::client::{Connector, ToolOutput, ToolServer};
use crate::error::{CloseError, ConnectError, RoutingError, ToolInvocationError};
use crate::launch::LaunchSpec;
use crate::namespace::Namespace;

/// One successfully connected tool server
pub struct ServerConnection {
    identifier: String,
    namespace: Namespace,
    server: Box<dyn ToolServer>,
    tools: Vec<NamespacedTool>,
}

impl ServerConnection {
    /// Launch path the server was connected with
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Tools of this server, already namespaced
    pub fn tools(&self) -> &[NamespacedTool] {
        &self.tools
    }

    /// Call a tool by its server-local name
    pub async fn call_tool(
        &self,
        original_name: &str,
        args: JsonValue,
    ) -> Result<ToolOutput, ToolInvocationError> {
        self.server
            .call_tool(original_name, args)
            .await
            .map_err(|e| ToolInvocationError::Call {
                server: self.identifier.clone(),
                tool: original_name.to_string(),
                message: e.to_string(),
            })
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("identifier", &self.identifier)
            .field("prefix", &self.namespace.prefix())
            .field("tools", &self.tools.len())
            .finish()
    }
}

/// A namespaced tool name resolved to its server
#[derive(Debug, Clone, Copy)]
pub struct Route<'a> {
    pub connection: &'a ServerConnection,
    /// Name understood by the server
    pub tool_name: &'a str,
}

/// Outcome of [`ServerRegistry::disconnect_all`]
#[derive(Debug, Default)]
pub struct TeardownReport {
    /// Identifiers closed cleanly
    pub closed: Vec<String>,
    /// Every close that failed
    pub failures: Vec<CloseError>,
}

impl TeardownReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Registry for all live server connections, in connect order
pub struct ServerRegistry {
    connections: Vec<ServerConnection>,
    connector: Box<dyn Connector>,
    launch: LaunchConfig,
}

impl ServerRegistry {
    /// Create an empty registry that launches servers through `connector`
    pub fn new(connector: impl Connector + 'static, launch: LaunchConfig) -> Self {
        Self {
            connections: Vec::new(),
            connector: Box::new(connector),
            launch,
        }
    }

    /// Connect to a single server
    ///
    /// Connecting an identifier that is already present succeeds without doing
    /// anything. On any failure the registry is left exactly as it was.
    pub async fn connect(
        &mut self,
        identifier: &str,
        spec: &LaunchSpec,
    ) -> Result<(), ConnectError> {
        if self.get(identifier).is_some() {
            info!(server_id = identifier, "Already connected to server");
            return Ok(());
        }

        let namespace = Namespace::for_identifier(identifier);
        if namespace.prefix().is_empty() {
            return Err(ConnectError::EmptyPrefix {
                identifier: identifier.to_string(),
            });
        }
        if let Some(existing) = self
            .connections
            .iter()
            .find(|c| c.namespace.prefix() == namespace.prefix())
        {
            return Err(ConnectError::PrefixCollision {
                identifier: identifier.to_string(),
                existing: existing.identifier.clone(),
                prefix: namespace.prefix().to_string(),
            });
        }

        info!(server_id = identifier, command = %spec.display(), "Connecting to MCP server");

        let server = self
            .connector
            .connect(identifier, spec)
            .await
            .map_err(|source| ConnectError::Launch {
                identifier: identifier.to_string(),
                source,
            })?;

        let tools = match server.list_tools().await {
            Ok(tools) => tools,
            Err(source) => {
                // 起動済みのプロセスを残さない
                if let Err(e) = server.shutdown().await {
                    warn!(server_id = identifier, error = %e, "Failed to close server after listing error");
                }
                return Err(ConnectError::ListTools {
                    identifier: identifier.to_string(),
                    source,
                });
            }
        };

        let tools: Vec<NamespacedTool> = tools
            .into_iter()
            .map(|tool| NamespacedTool::new(identifier, &namespace, tool))
            .collect();

        info!(
            server_id = identifier,
            tool_count = tools.len(),
            tools = ?tools.iter().map(|t| t.namespaced_name.as_str()).collect::<Vec<_>>(),
            "Connected to server"
        );

        self.connections.push(ServerConnection {
            identifier: identifier.to_string(),
            namespace,
            server,
            tools,
        });

        Ok(())
    }

    /// Connect to a server script, choosing its interpreter from the extension
    pub async fn connect_script(&mut self, path: &str) -> Result<(), ConnectError> {
        let spec = LaunchSpec::for_script(path, &self.launch)?;
        self.connect(path, &spec).await
    }

    /// Connect to every script in order, skipping the ones that fail
    ///
    /// # Returns
    /// The errors of the scripts that could not be connected
    pub async fn connect_scripts(&mut self, paths: &[String]) -> Vec<ConnectError> {
        let mut failures = Vec::new();

        for path in paths {
            if let Err(e) = self.connect_script(path).await {
                warn!(server_id = %path, error = %e, "Skipping MCP server due to connection error");
                failures.push(e);
            }
        }

        info!(
            server_count = self.connections.len(),
            failed = failures.len(),
            "MCP registry initialized"
        );
        failures
    }

    /// Close every connection and empty the registry
    ///
    /// Closes run one after another; a failure is recorded and the remaining
    /// connections are still closed.
    pub async fn disconnect_all(&mut self) -> TeardownReport {
        info!("Cleaning up all server connections");

        let mut report = TeardownReport::default();
        let connections = std::mem::take(&mut self.connections);

        for connection in connections {
            let identifier = connection.identifier;
            match connection.server.shutdown().await {
                Ok(()) => {
                    info!(server_id = %identifier, "Closed connection");
                    report.closed.push(identifier);
                }
                Err(source) => {
                    error!(server_id = %identifier, error = %source, "Error cleaning up connection");
                    report.failures.push(CloseError { identifier, source });
                }
            }
        }

        info!(
            closed = report.closed.len(),
            failed = report.failures.len(),
            "Cleanup complete"
        );
        report
    }

    /// Resolve a namespaced tool name to its connection
    ///
    /// The first connection (in connect order) whose prefix matches wins.
    pub fn route<'a>(&'a self, namespaced_name: &'a str) -> Result<Route<'a>, RoutingError> {
        self.connections
            .iter()
            .find_map(|connection| {
                connection
                    .namespace
                    .strip(namespaced_name)
                    .map(|tool_name| Route {
                        connection,
                        tool_name,
                    })
            })
            .ok_or_else(|| RoutingError::UnknownTool {
                name: namespaced_name.to_string(),
            })
    }

    pub fn get(&self, identifier: &str) -> Option<&ServerConnection> {
        self.connections.iter().find(|c| c.identifier == identifier)
    }

    pub fn all(&self) -> impl Iterator<Item = &ServerConnection> {
        self.connections.iter()
    }

    /// Get the number of connected servers
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
