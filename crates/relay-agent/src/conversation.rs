//! Conversation orchestrator
//!
//! ユーザーのクエリごとに LLM を呼び出し、tool_use を MCP サーバーへ振り分けて結果を履歴に戻す

use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};

use relay_core::{
    Config, LlmClient, Message, MessageContent, MessagesRequestBuilder, MessagesResponse, Result,
    Role, ToolResultContent,
};
use relay_mcp::{Route, ServerRegistry, ToolCatalog};

/// Tool rounds per query unless configured otherwise
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 1;

const DEFAULT_MAX_TOKENS: u64 = 1000;

/// Text returned to the model for tool calls past the round limit
const ROUND_LIMIT_MESSAGE: &str = "Tool call not executed: tool round limit reached.";

/// A multi-turn conversation with one LLM
///
/// History lives as long as the conversation and is shared by every query.
pub struct Conversation<C: LlmClient> {
    client: C,
    history: Vec<Message>,
    max_tokens: u64,
    system_prompt: Option<String>,
    max_tool_rounds: usize,
}

impl<C: LlmClient> Conversation<C> {
    pub fn new(client: C) -> Self {
        Self {
            client,
            history: Vec::new(),
            max_tokens: DEFAULT_MAX_TOKENS,
            system_prompt: None,
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }

    /// Create a conversation using the LLM and conversation settings of `config`
    pub fn from_config(client: C, config: &Config) -> Self {
        Self::new(client)
            .with_max_tokens(config.llm.max_tokens)
            .with_system_prompt(config.conversation.system_prompt.clone())
            .with_max_tool_rounds(config.conversation.max_tool_rounds)
    }

    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: Option<String>) -> Self {
        self.system_prompt = system_prompt;
        self
    }

    /// Number of tool rounds allowed per query (at least 1)
    pub fn with_max_tool_rounds(mut self, rounds: usize) -> Self {
        self.max_tool_rounds = rounds.max(1);
        self
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn max_tool_rounds(&self) -> usize {
        self.max_tool_rounds
    }

    /// Answer one operator query
    ///
    /// Tool calls requested by the model are routed through `registry`, and
    /// when at least one tool was invoked the results go back to the model in
    /// a follow-up call. Routing and tool failures become error tool_results
    /// and never abort the query; only a failed LLM call is returned as an
    /// error. If the first LLM call fails, the query is removed from history.
    ///
    /// # Returns
    /// Every text block, status line and error line produced for this query,
    /// joined by newlines
    pub async fn process_query(
        &mut self,
        registry: &ServerRegistry,
        catalog: &ToolCatalog,
        query: &str,
    ) -> Result<String> {
        info!(query_len = query.len(), tool_count = catalog.len(), "Processing query");

        let checkpoint = self.checkpoint();
        self.push_user(vec![MessageContent::Text {
            text: query.to_string(),
        }]);

        let mut answer = Vec::new();
        let mut rounds = 0;
        let mut offer_tools = true;

        loop {
            let response = match self.send(offer_tools.then_some(catalog)).await {
                Ok(response) => response,
                Err(e) => {
                    if rounds == 0 {
                        self.restore(checkpoint);
                    }
                    return Err(e);
                }
            };

            if response.role == Role::Assistant {
                self.history.push(Message::assistant(response.content.clone()));
            }

            let can_run = rounds < self.max_tool_rounds;
            let mut invoked = false;
            let mut results = Vec::new();

            for block in &response.content {
                match block {
                    MessageContent::Text { text } => answer.push(text.clone()),
                    MessageContent::ToolUse { id, name, input } if can_run => {
                        match registry.route(name) {
                            Ok(route) => {
                                invoked = true;
                                results.push(self.invoke(route, id, input, &mut answer).await);
                            }
                            Err(e) => {
                                warn!(tool_name = %name, "Could not find a server for tool");
                                answer.push(format!(
                                    "[Error: Tool {} not found or server not connected]",
                                    name
                                ));
                                results.push(tool_error(id, format!("Error: {}.", e)));
                            }
                        }
                    }
                    MessageContent::ToolUse { id, name, .. } => {
                        warn!(tool_name = %name, rounds, "Declining tool call past the round limit");
                        results.push(tool_error(id, ROUND_LIMIT_MESSAGE));
                    }
                    MessageContent::Image { .. } | MessageContent::ToolResult { .. } => {}
                }
            }

            if results.is_empty() {
                break;
            }
            // results without a follow-up are carried into the next query's user message
            self.push_user(results);

            if !invoked {
                break;
            }
            rounds += 1;
            offer_tools = rounds < self.max_tool_rounds;
        }

        Ok(answer.join("\n"))
    }

    /// Send the whole history, attaching the catalog when given
    async fn send(&self, catalog: Option<&ToolCatalog>) -> Result<MessagesResponse> {
        let mut builder = MessagesRequestBuilder::new(self.client.model())
            .max_tokens(self.max_tokens)
            .system(self.system_prompt.clone())
            .messages(self.history.clone());
        if let Some(catalog) = catalog {
            builder = builder.tools(catalog.definitions());
        }

        let response = self.client.messages(builder.build()).await?;

        debug!(
            stop_reason = ?response.stop_reason,
            tool_uses = response.tool_use_count(),
            "Received LLM response"
        );
        Ok(response)
    }

    /// Run one routed tool_use block, producing its tool_result
    async fn invoke(
        &self,
        route: Route<'_>,
        tool_use_id: &str,
        input: &JsonValue,
        answer: &mut Vec<String>,
    ) -> MessageContent {
        let server_id = route.connection.identifier();
        answer.push(format!(
            "[Calling tool {} on server {} with args {}]",
            route.tool_name, server_id, input
        ));
        info!(tool_name = %route.tool_name, server_id = %server_id, "Calling tool");

        match route.connection.call_tool(route.tool_name, input.clone()).await {
            Ok(output) => {
                if output.is_error {
                    warn!(
                        tool_name = %route.tool_name,
                        server_id = %server_id,
                        detail = %output.content.text(),
                        "Tool reported an error"
                    );
                }
                MessageContent::ToolResult {
                    tool_use_id: tool_use_id.to_string(),
                    content: output.content,
                    is_error: output.is_error,
                }
            }
            Err(e) => {
                error!(tool_name = %route.tool_name, server_id = %server_id, error = %e, "Tool call failed");
                answer.push(format!("[Error executing tool {}: {}]", route.tool_name, e));
                tool_error(
                    tool_use_id,
                    format!("Error executing tool {}: {}", route.tool_name, e),
                )
            }
        }
    }

    /// History length and size of the last message, for undoing a failed query
    fn checkpoint(&self) -> (usize, usize) {
        (
            self.history.len(),
            self.history.last().map_or(0, |m| m.content.len()),
        )
    }

    fn restore(&mut self, (len, last_len): (usize, usize)) {
        self.history.truncate(len);
        if let Some(last) = self.history.last_mut() {
            last.content.truncate(last_len);
        }
    }

    /// Append user content, merging into a trailing user message so roles keep alternating
    fn push_user(&mut self, content: Vec<MessageContent>) {
        match self.history.last_mut() {
            Some(last) if last.role == Role::User => last.content.extend(content),
            _ => self.history.push(Message {
                role: Role::User,
                content,
            }),
        }
    }
}

/// Error tool_result answering one tool_use block
fn tool_error(tool_use_id: &str, message: impl Into<String>) -> MessageContent {
    MessageContent::ToolResult {
        tool_use_id: tool_use_id.to_string(),
        content: ToolResultContent::Text(message.into()),
        is_error: true,
    }
}
