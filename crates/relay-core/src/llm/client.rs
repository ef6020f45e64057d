//! Claude Messages API HTTP client

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::error::{Error, Result};

use super::types::*;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anything that can answer a Messages API request
///
/// Implemented by [`ClaudeClient`]; tests substitute scripted clients.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a message request and return the model's reply
    async fn messages(&self, request: MessagesRequest) -> Result<MessagesResponse>;

    /// Model name used for requests
    fn model(&self) -> &str;
}

/// Claude API client
#[derive(Clone)]
pub struct ClaudeClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl ClaudeClient {
    /// Create a new Claude client
    pub fn new(config: &LlmConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(Error::Config("API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(Error::Http)?;

        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl LlmClient for ClaudeClient {
    async fn messages(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        let url = format!("{}/messages", self.base_url);

        debug!(
            url = %url,
            messages = request.messages.len(),
            tools = request.tools.as_ref().map(Vec::len).unwrap_or(0),
            "Sending request to Claude API"
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .await
            .map_err(Error::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(Error::Http)?;

        if !status.is_success() {
            warn!("Claude API error: {} - {}", status, body);
            return Err(Error::ClaudeApi(format!("{}: {}", status, body)));
        }

        let parsed: MessagesResponse = serde_json::from_str(&body).map_err(|e| {
            Error::ClaudeApi(format!("Failed to parse response: {} - {}", e, body))
        })?;

        info!(
            "Claude API response: stop_reason={:?}, tokens={}",
            parsed.stop_reason,
            parsed.usage.as_ref().map(|u| u.output_tokens).unwrap_or(0)
        );

        Ok(parsed)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
