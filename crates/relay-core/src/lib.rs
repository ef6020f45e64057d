//! relay-core: mcp-relay Core Library
//!
//! Claude Messages API との通信、設定、エラー型のコア機能を提供します。

pub mod config;
pub mod error;
pub mod llm;

pub use config::{Config, ConversationConfig, LaunchConfig, LlmConfig};
pub use error::{Error, Result};
pub use llm::{
    ClaudeClient, ImageSource, LlmClient, Message, MessageContent, MessagesRequest,
    MessagesRequestBuilder, MessagesResponse, Role, ToolDefinition, ToolResultBlock,
    ToolResultContent, Usage,
};
