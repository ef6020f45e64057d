//! relay-agent: Conversation orchestration
//!
//! LLM との対話ループを管理し、ツール呼び出しを接続中の MCP サーバーへ振り分けます。

pub mod conversation;

pub use conversation::{Conversation, DEFAULT_MAX_TOOL_ROUNDS};
