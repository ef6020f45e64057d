//! Error types for relay-core

use thiserror::Error;

/// Main error type for relay-core
#[derive(Error, Debug)]
pub enum Error {
    #[error("Claude API error: {0}")]
    ClaudeApi(String),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("MCP error: {0}")]
    Mcp(String),
}

/// Result type alias for relay-core
pub type Result<T> = std::result::Result<T, Error>;
