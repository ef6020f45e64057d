//! エラー型定義 (relay-cli)

use thiserror::Error;

/// Failures that stop the relay before any server is launched
#[derive(Error, Debug)]
pub enum StartupError {
    /// No API key in the environment or config file
    #[error("ANTHROPIC_API_KEY is not set (LLM_API_KEY is also accepted)")]
    MissingCredential,

    #[error("Failed to load configuration: {0}")]
    Config(#[source] relay_core::Error),

    #[error("Failed to create LLM client: {0}")]
    Client(#[source] relay_core::Error),
}
