//! LLM API client and types
//!
//! Anthropic Messages API のクライアントと型定義

mod client;
mod types;

pub use client::{ClaudeClient, LlmClient};
pub use types::*;
