//! Configuration management
//!
//! 設定は以下の優先順位で読み込まれます:
//! 1. 環境変数
//! 2. mcp-relay.toml 設定ファイル
//! 3. デフォルト値
//!
//! 設定ファイル内では `${VAR_NAME}` 形式で環境変数を展開できます。

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Error;

/// Default configuration file looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "mcp-relay.toml";

/// LLM configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LlmConfig {
    /// API key
    pub api_key: String,

    /// Model to use
    #[serde(default = "default_model")]
    pub model: String,

    /// Base URL of the Messages API
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,

    /// HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: default_model(),
            base_url: default_base_url(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Conversation loop configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationConfig {
    /// How many rounds of tool calls a single query may resolve
    #[serde(default = "default_max_tool_rounds")]
    pub max_tool_rounds: usize,

    /// Optional system prompt sent with every request
    pub system_prompt: Option<String>,
}

impl Default for ConversationConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: default_max_tool_rounds(),
            system_prompt: None,
        }
    }
}

/// Interpreter overrides for launching tool server scripts
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LaunchConfig {
    /// Runtime for `.js` servers (default: `node`)
    pub node_command: Option<String>,

    /// Interpreter for `.py` servers (default: `python3`, `python` on Windows)
    pub python_command: Option<String>,
}

/// Main configuration for mcp-relay
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub conversation: ConversationConfig,

    #[serde(default)]
    pub launch: LaunchConfig,
}

fn default_model() -> String {
    "claude-3-haiku-20240307".to_string()
}

fn default_base_url() -> String {
    "https://api.anthropic.com/v1".to_string()
}

fn default_max_tokens() -> u64 {
    1000
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_max_tool_rounds() -> usize {
    1
}

/// TOML file layout; every field optional so partial files work
#[derive(Debug, Default, Deserialize)]
struct TomlConfig {
    llm: Option<TomlLlmConfig>,
    conversation: Option<TomlConversationConfig>,
    launch: Option<LaunchConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlLlmConfig {
    api_key: Option<String>,
    model: Option<String>,
    base_url: Option<String>,
    max_tokens: Option<u64>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct TomlConversationConfig {
    max_tool_rounds: Option<usize>,
    system_prompt: Option<String>,
}

impl Config {
    /// 設定ファイルから環境変数を展開する
    ///
    /// `${VAR_NAME}` 形式の文字列を環境変数の値に置換します。
    /// 環境変数が存在しない場合は空文字列になります。
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next(); // '{' を消費

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// TOML 設定ファイルから設定を読み込む
    ///
    /// 環境変数による上書きも適用されます。
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let toml_content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let mut cfg = Self::from_toml_str(&toml_content)?;
        cfg.apply_env_overrides();
        Ok(cfg)
    }

    /// Parse a TOML document (after `${VAR}` expansion), without env overrides
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded_content = Self::expand_env_vars(content);

        let toml: TomlConfig = toml::from_str(&expanded_content)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))?;

        let llm = toml.llm.unwrap_or_default();
        let conversation = toml.conversation.unwrap_or_default();

        Ok(Self {
            llm: LlmConfig {
                api_key: llm.api_key.unwrap_or_default(),
                model: llm.model.unwrap_or_else(default_model),
                base_url: llm.base_url.unwrap_or_else(default_base_url),
                max_tokens: llm.max_tokens.unwrap_or_else(default_max_tokens),
                timeout_secs: llm.timeout_secs.unwrap_or_else(default_timeout_secs),
            },
            conversation: ConversationConfig {
                max_tool_rounds: conversation
                    .max_tool_rounds
                    .unwrap_or_else(default_max_tool_rounds)
                    .max(1),
                system_prompt: conversation.system_prompt,
            },
            launch: toml.launch.unwrap_or_default(),
        })
    }

    /// デフォルトパスから設定を読み込む
    ///
    /// `./mcp-relay.toml` があればそれを、なければ環境変数のみを使います。
    pub fn load() -> crate::Result<Self> {
        if Path::new(CONFIG_FILE_NAME).exists() {
            return Self::from_toml_file(CONFIG_FILE_NAME);
        }

        Ok(Self::from_env())
    }

    /// Build a configuration from defaults plus environment variables
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.apply_env_overrides();
        cfg
    }

    /// 環境変数で設定を上書きする
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable source; empty values are ignored
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(api_key) = var("ANTHROPIC_API_KEY").or_else(|| var("LLM_API_KEY")) {
            self.llm.api_key = api_key;
        }
        if let Some(model) = var("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(base_url) = var("LLM_BASE_URL") {
            self.llm.base_url = base_url;
        }
        if let Some(max_tokens) = var("LLM_MAX_TOKENS").and_then(|v| v.parse().ok()) {
            self.llm.max_tokens = max_tokens;
        }
        if let Some(rounds) = var("MCP_RELAY_MAX_TOOL_ROUNDS").and_then(|v| v.parse::<usize>().ok()) {
            self.conversation.max_tool_rounds = rounds.max(1);
        }
        if let Some(node) = var("MCP_RELAY_NODE") {
            self.launch.node_command = Some(node);
        }
        if let Some(python) = var("MCP_RELAY_PYTHON") {
            self.launch.python_command = Some(python);
        }
    }

    /// Check startup preconditions
    pub fn validate(&self) -> crate::Result<()> {
        if self.llm.api_key.trim().is_empty() {
            return Err(Error::Config("ANTHROPIC_API_KEY is not set".to_string()));
        }
        Ok(())
    }
}
