//! MCP Client implementation
//!
//! rmcpを使用して子プロセスのMCPサーバーと通信するクライアント

use async_trait::async_trait;
use rmcp::{
    model::{CallToolRequestParams, CallToolResult, JsonObject, RawContent, Tool},
    service::{RoleClient, RunningService, ServiceExt},
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::Value as JsonValue;
use tokio::process::Command;
use tracing::{debug, warn};

use relay_core::{Error, ImageSource, Result, ToolResultBlock, ToolResultContent};

use crate::launch::LaunchSpec;

/// MCP Tool information, as declared by the server
#[derive(Debug, Clone, PartialEq)]
pub struct McpTool {
    /// Tool name
    pub name: String,
    /// Tool description
    pub description: String,
    /// JSON schema for input parameters
    pub input_schema: JsonValue,
}

impl From<Tool> for McpTool {
    fn from(tool: Tool) -> Self {
        Self {
            name: tool.name.to_string(),
            description: tool.description.clone().unwrap_or_default().to_string(),
            input_schema: JsonValue::Object((*tool.input_schema).clone()),
        }
    }
}

/// Outcome of a tool call that reached the server
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutput {
    /// Raw result content, in server order
    pub content: ToolResultContent,
    /// The server's own `isError` flag
    pub is_error: bool,
}

impl ToolOutput {
    /// Plain-text output
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: ToolResultContent::Blocks(vec![ToolResultBlock::Text { text: text.into() }]),
            is_error: false,
        }
    }
}

impl From<CallToolResult> for ToolOutput {
    fn from(result: CallToolResult) -> Self {
        let mut blocks: Vec<ToolResultBlock> = result
            .content
            .into_iter()
            .map(|content| match &content.raw {
                RawContent::Text(text) => ToolResultBlock::Text {
                    text: text.text.clone(),
                },
                RawContent::Image(image) => ToolResultBlock::Image {
                    source: ImageSource::base64(image.mime_type.clone(), image.data.clone()),
                },
                // resources, audio and links have no tool_result counterpart
                _ => ToolResultBlock::Text {
                    text: serde_json::to_string(&content.raw).unwrap_or_default(),
                },
            })
            .collect();

        // servers that only return structured output still need a visible result
        if blocks.is_empty() {
            if let Some(structured) = &result.structured_content {
                blocks.push(ToolResultBlock::Text {
                    text: structured.to_string(),
                });
            }
        }

        Self {
            content: ToolResultContent::Blocks(blocks),
            is_error: result.is_error.unwrap_or(false),
        }
    }
}

/// Arguments for an MCP call; only a JSON object can be sent
fn tool_arguments(name: &str, args: &JsonValue) -> Option<JsonObject> {
    match args {
        JsonValue::Object(map) => Some(map.clone()),
        JsonValue::Null => None,
        other => {
            warn!(tool_name = %name, input = %other, "Tool input is not a JSON object; calling without arguments");
            None
        }
    }
}

/// A connected tool server
///
/// Owns both the protocol client and the transport beneath it.
#[async_trait]
pub trait ToolServer: Send + Sync {
    /// List every tool the server declares, in server order
    async fn list_tools(&self) -> Result<Vec<McpTool>>;

    /// Call a tool by its server-local name
    async fn call_tool(&self, name: &str, args: JsonValue) -> Result<ToolOutput>;

    /// Close the client, then the transport
    async fn shutdown(self: Box<Self>) -> Result<()>;
}

/// Launches tool servers
#[async_trait]
pub trait Connector: Send + Sync {
    /// Start the server described by `spec` and complete the handshake
    async fn connect(&self, identifier: &str, spec: &LaunchSpec) -> Result<Box<dyn ToolServer>>;
}

/// MCP Client for communicating with a server over its stdio
pub struct McpClient {
    /// Inner rmcp running service
    service: RunningService<RoleClient, ()>,
}

impl McpClient {
    /// Spawn the server process and perform the MCP handshake
    pub async fn connect(spec: &LaunchSpec) -> Result<Self> {
        if spec.command.is_empty() {
            return Err(Error::Config("Empty command".into()));
        }

        let transport = TokioChildProcess::new(Command::new(&spec.command).configure(|c| {
            c.args(&spec.args);
        }))
        .map_err(|e| Error::Mcp(format!("Failed to create transport: {}", e)))?;

        // Serve with unit type handler (client-only mode)
        let service = ()
            .serve(transport)
            .await
            .map_err(|e| Error::Mcp(format!("Failed to connect: {}", e)))?;

        let server_name = service
            .peer_info()
            .map(|info| info.server_info.name.to_string())
            .unwrap_or_else(|| "unknown".to_string());

        debug!(server_name = %server_name, command = %spec.display(), "MCP handshake complete");

        Ok(Self { service })
    }
}

#[async_trait]
impl ToolServer for McpClient {
    async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let tools = self
            .service
            .list_all_tools()
            .await
            .map_err(|e| Error::Mcp(format!("Failed to list tools: {}", e)))?;

        Ok(tools.into_iter().map(McpTool::from).collect())
    }

    async fn call_tool(&self, name: &str, args: JsonValue) -> Result<ToolOutput> {
        let result = self
            .service
            .call_tool(CallToolRequestParams {
                meta: None,
                name: name.to_string().into(),
                arguments: tool_arguments(name, &args),
                task: None,
            })
            .await
            .map_err(|e| Error::Mcp(format!("Tool call failed: {}", e)))?;

        Ok(ToolOutput::from(result))
    }

    /// Cancelling the service stops the client and drops the child-process transport
    async fn shutdown(self: Box<Self>) -> Result<()> {
        self.service
            .cancel()
            .await
            .map_err(|e| Error::Mcp(format!("Shutdown failed: {}", e)))?;
        Ok(())
    }
}

/// Connector that runs each server as a child process over stdio
#[derive(Debug, Default, Clone, Copy)]
pub struct ChildProcessConnector;

#[async_trait]
impl Connector for ChildProcessConnector {
    async fn connect(&self, _identifier: &str, spec: &LaunchSpec) -> Result<Box<dyn ToolServer>> {
        let client = McpClient::connect(spec).await?;
        Ok(Box::new(client))
    }
}
