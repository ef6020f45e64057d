//! relay-mcp: MCP (Model Context Protocol) server routing
//!
//! 複数のMCPサーバーに接続し、ツール名を名前空間で区別して呼び出しを振り分けます。

pub mod catalog;
pub mod client;
pub mod error;
pub mod launch;
pub mod namespace;
pub mod registry;

pub use catalog::{MAX_TOOL_NAME_LEN, NamespacedTool, ToolCatalog};
pub use client::{ChildProcessConnector, Connector, McpClient, McpTool, ToolOutput, ToolServer};
pub use error::{CloseError, ConnectError, RoutingError, ToolInvocationError};
pub use launch::LaunchSpec;
pub use namespace::{Namespace, SEPARATOR};
pub use registry::{Route, ServerConnection, ServerRegistry, TeardownReport};
