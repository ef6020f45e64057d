use async_trait::async_trait;
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use relay_agent::Conversation;
use relay_core::{
    Error, LaunchConfig, LlmClient, Message, MessageContent, MessagesRequest, MessagesResponse, Result,
    Role, ToolResultContent,
};
use relay_mcp::{
    Connector, LaunchSpec, McpTool, ServerRegistry, ToolCatalog, ToolOutput, ToolServer,
};

#[derive(Clone)]
struct MockClient {
    responses: Arc<Mutex<Vec<MessagesResponse>>>,
    requests: Arc<Mutex<Vec<MessagesRequest>>>,
}

impl MockClient {
    fn new(responses: Vec<MessagesResponse>) -> Self {
        Self {
            responses: Arc::new(Mutex::new(responses)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn requests(&self) -> Vec<MessagesRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmClient for MockClient {
    async fn messages(&self, request: MessagesRequest) -> Result<MessagesResponse> {
        self.requests.lock().unwrap().push(request);
        let mut responses = self.responses.lock().unwrap();
        if !responses.is_empty() {
            Ok(responses.remove(0))
        } else {
            Err(Error::ClaudeApi("No more mock responses".to_string()))
        }
    }

    fn model(&self) -> &str {
        "mock-model"
    }
}

type CallLog = Arc<Mutex<Vec<(String, String, JsonValue)>>>;

struct MockServer {
    identifier: String,
    tools: Vec<McpTool>,
    calls: CallLog,
}

#[async_trait]
impl ToolServer for MockServer {
    async fn list_tools(&self) -> Result<Vec<McpTool>> {
        Ok(self.tools.clone())
    }

    async fn call_tool(&self, name: &str, args: JsonValue) -> Result<ToolOutput> {
        self.calls
            .lock()
            .unwrap()
            .push((self.identifier.clone(), name.to_string(), args.clone()));
        match name {
            "add" => {
                let sum = args["a"].as_i64().unwrap_or(0) + args["b"].as_i64().unwrap_or(0);
                Ok(ToolOutput::text(sum.to_string()))
            }
            "explode" => Err(Error::Mcp("server went away".to_string())),
            "reject" => Ok(ToolOutput {
                is_error: true,
                ..ToolOutput::text("invalid city")
            }),
            other => Ok(ToolOutput::text(format!("{} from {}", other, self.identifier))),
        }
    }

    async fn shutdown(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

#[derive(Clone, Default)]
struct MockConnector {
    servers: HashMap<String, Vec<&'static str>>,
    calls: CallLog,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, identifier: &str, _spec: &LaunchSpec) -> Result<Box<dyn ToolServer>> {
        let tools = self
            .servers
            .get(identifier)
            .ok_or_else(|| Error::Mcp(format!("no such server {identifier}")))?
            .iter()
            .map(|name| McpTool {
                name: name.to_string(),
                description: format!("{name} tool"),
                input_schema: json!({"type": "object"}),
            })
            .collect();
        Ok(Box::new(MockServer {
            identifier: identifier.to_string(),
            tools,
            calls: Arc::clone(&self.calls),
        }))
    }
}

async fn registry_with(servers: &[(&str, Vec<&'static str>)]) -> (ServerRegistry, ToolCatalog, CallLog) {
    let connector = MockConnector {
        servers: servers
            .iter()
            .map(|(id, tools)| (id.to_string(), tools.clone()))
            .collect(),
        ..MockConnector::default()
    };
    let calls = Arc::clone(&connector.calls);
    let mut registry = ServerRegistry::new(connector, LaunchConfig::default());
    for (id, _) in servers {
        registry
            .connect(id, &LaunchSpec::new("node", vec![id.to_string()]))
            .await
            .unwrap();
    }
    let catalog = ToolCatalog::rebuild(&registry);
    (registry, catalog, calls)
}

fn reply(content: Vec<MessageContent>) -> MessagesResponse {
    let stop_reason = if content.iter().any(|c| matches!(c, MessageContent::ToolUse { .. })) {
        "tool_use"
    } else {
        "end_turn"
    };
    MessagesResponse {
        id: "msg_mock".to_string(),
        response_type: "message".to_string(),
        role: Role::Assistant,
        content,
        model: "mock-model".to_string(),
        stop_reason: Some(stop_reason.to_string()),
        stop_sequence: None,
        usage: None,
    }
}

fn text(text: &str) -> MessageContent {
    MessageContent::Text {
        text: text.to_string(),
    }
}

fn tool_use(id: &str, name: &str, input: JsonValue) -> MessageContent {
    MessageContent::ToolUse {
        id: id.to_string(),
        name: name.to_string(),
        input,
    }
}

/// Text blocks of a message, joined by newlines
fn text_of(message: &Message) -> String {
    message
        .content
        .iter()
        .filter_map(|c| match c {
            MessageContent::Text { text } => Some(text.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// (tool_use_id, text, is_error) of every tool_result block in a request
fn tool_results(request: &MessagesRequest) -> Vec<(String, String, bool)> {
    request
        .messages
        .iter()
        .flat_map(|m| m.content.iter())
        .filter_map(|c| match c {
            MessageContent::ToolResult {
                tool_use_id,
                content,
                is_error,
            } => Some((tool_use_id.clone(), content.text(), *is_error)),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_simple_text_reply() {
    let (registry, _, _) = registry_with(&[]).await;
    let catalog = ToolCatalog::rebuild(&registry);
    let client = MockClient::new(vec![reply(vec![text("Hello")])]);
    let mut conversation = Conversation::new(client.clone());

    let answer = conversation.process_query(&registry, &catalog, "Hi").await.unwrap();

    assert_eq!(answer, "Hello");
    let requests = client.requests();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].tools.is_none());
    assert_eq!(requests[0].model, "mock-model");
    assert_eq!(conversation.history().len(), 2);
}

#[tokio::test]
async fn test_namespaced_call_reaches_server() {
    let (registry, catalog, calls) = registry_with(&[("./math.js", vec!["add"])]).await;
    let client = MockClient::new(vec![
        reply(vec![
            text("Let me add those."),
            tool_use("toolu_1", "math_js__add", json!({"a": 2, "b": 3})),
        ]),
        reply(vec![text("The sum is 5.")]),
    ]);
    let mut conversation = Conversation::new(client.clone());

    let answer = conversation
        .process_query(&registry, &catalog, "What is 2 + 3?")
        .await
        .unwrap();

    assert_eq!(
        answer,
        "Let me add those.\n\
         [Calling tool add on server ./math.js with args {\"a\":2,\"b\":3}]\n\
         The sum is 5."
    );
    assert_eq!(
        *calls.lock().unwrap(),
        vec![("./math.js".to_string(), "add".to_string(), json!({"a": 2, "b": 3}))]
    );

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    let tools = requests[0].tools.as_ref().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "math_js__add");
    assert_eq!(tools[0].description, "[./math.js] add tool");
    // follow-up carries no tools
    assert!(requests[1].tools.is_none());
    assert_eq!(
        tool_results(&requests[1]),
        vec![("toolu_1".to_string(), "5".to_string(), false)]
    );

    let roles: Vec<_> = conversation.history().iter().map(|m| m.role).collect();
    assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
}

#[tokio::test]
async fn test_unknown_tool_becomes_error_result() {
    let (registry, catalog, calls) = registry_with(&[("./math.js", vec!["add"])]).await;
    let client = MockClient::new(vec![reply(vec![tool_use(
        "toolu_1",
        "calendar_js__list",
        json!({}),
    )])]);
    let mut conversation = Conversation::new(client.clone());

    let answer = conversation
        .process_query(&registry, &catalog, "What's on today?")
        .await
        .unwrap();

    assert_eq!(
        answer,
        "[Error: Tool calendar_js__list not found or server not connected]"
    );
    assert!(calls.lock().unwrap().is_empty());
    // nothing was invoked, so no follow-up call
    assert_eq!(client.requests().len(), 1);

    let last = conversation.history().last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(
        last.content,
        vec![MessageContent::ToolResult {
            tool_use_id: "toolu_1".to_string(),
            content: ToolResultContent::Text(
                "Error: Tool calendar_js__list not found or its server is not connected."
                    .to_string()
            ),
            is_error: true,
        }]
    );
}

#[tokio::test]
async fn test_failures_do_not_stop_remaining_blocks() {
    let (registry, catalog, calls) = registry_with(&[
        ("./flaky.js", vec!["explode"]),
        ("./math.js", vec!["add"]),
    ])
    .await;
    let client = MockClient::new(vec![
        reply(vec![
            tool_use("toolu_1", "unknown__x", json!({})),
            tool_use("toolu_2", "flaky_js__explode", json!({})),
            text("t"),
            tool_use("toolu_3", "math_js__add", json!({"a": 1, "b": 4})),
        ]),
        reply(vec![text("Partly done.")]),
    ]);
    let mut conversation = Conversation::new(client.clone());

    let answer = conversation
        .process_query(&registry, &catalog, "Do everything")
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    let order: Vec<_> = calls.iter().map(|(id, tool, _)| (id.as_str(), tool.as_str())).collect();
    assert_eq!(order, vec![("./flaky.js", "explode"), ("./math.js", "add")]);

    let lines: Vec<_> = answer.lines().collect();
    assert_eq!(lines.len(), 6);
    assert_eq!(lines[0], "[Error: Tool unknown__x not found or server not connected]");
    assert_eq!(lines[1], "[Calling tool explode on server ./flaky.js with args {}]");
    assert!(lines[2].starts_with("[Error executing tool explode: "));
    assert_eq!(lines[3], "t");
    assert_eq!(
        lines[4],
        "[Calling tool add on server ./math.js with args {\"a\":1,\"b\":4}]"
    );
    assert_eq!(lines[5], "Partly done.");

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    let results = tool_results(&requests[1]);
    let flags: Vec<_> = results.iter().map(|(id, _, err)| (id.as_str(), *err)).collect();
    assert_eq!(flags, vec![("toolu_1", true), ("toolu_2", true), ("toolu_3", false)]);
    assert_eq!(results[2].1, "5");
}

#[tokio::test]
async fn test_two_servers_called_in_order_with_single_follow_up() {
    let (registry, catalog, calls) = registry_with(&[
        ("./math.js", vec!["add"]),
        ("./weather.py", vec!["get_forecast"]),
    ])
    .await;
    let client = MockClient::new(vec![
        reply(vec![
            tool_use("toolu_1", "weather_py__get_forecast", json!({"city": "Tokyo"})),
            tool_use("toolu_2", "math_js__add", json!({"a": 1, "b": 1})),
        ]),
        reply(vec![text("Sunny, and 2.")]),
    ]);
    let mut conversation = Conversation::new(client.clone());

    conversation
        .process_query(&registry, &catalog, "Weather and 1+1?")
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    let order: Vec<_> = calls.iter().map(|(id, tool, _)| (id.as_str(), tool.as_str())).collect();
    assert_eq!(order, vec![("./weather.py", "get_forecast"), ("./math.js", "add")]);

    let requests = client.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tools.as_ref().map(Vec::len), Some(2));
    assert_eq!(
        tool_results(&requests[1]),
        vec![
            ("toolu_1".to_string(), "get_forecast from ./weather.py".to_string(), false),
            ("toolu_2".to_string(), "2".to_string(), false),
        ]
    );
    // both results travel in one user message right after the assistant turn
    let last = requests[1].messages.last().unwrap();
    assert_eq!(last.role, Role::User);
    assert_eq!(last.content.len(), 2);
}

#[tokio::test]
async fn test_tool_failure_is_contained() {
    let (registry, catalog, _) = registry_with(&[("./flaky.js", vec!["explode"])]).await;
    let client = MockClient::new(vec![
        reply(vec![tool_use("toolu_1", "flaky_js__explode", json!({}))]),
        reply(vec![text("Something went wrong.")]),
    ]);
    let mut conversation = Conversation::new(client.clone());

    let answer = conversation
        .process_query(&registry, &catalog, "Try it")
        .await
        .unwrap();

    let lines: Vec<_> = answer.lines().collect();
    assert_eq!(lines[0], "[Calling tool explode on server ./flaky.js with args {}]");
    assert!(lines[1].starts_with("[Error executing tool explode: "));
    assert!(lines[1].contains("server went away"));
    assert_eq!(lines[2], "Something went wrong.");

    let results = tool_results(&client.requests()[1]);
    assert_eq!(results.len(), 1);
    assert!(results[0].2);
    assert!(results[0].1.contains("server went away"));
}

#[tokio::test]
async fn test_server_error_flag_is_forwarded() {
    let (registry, catalog, _) = registry_with(&[("./weather.py", vec!["reject"])]).await;
    let client = MockClient::new(vec![
        reply(vec![tool_use("toolu_1", "weather_py__reject", json!({"city": ""}))]),
        reply(vec![text("Please give a city.")]),
    ]);
    let mut conversation = Conversation::new(client.clone());

    let answer = conversation
        .process_query(&registry, &catalog, "Weather?")
        .await
        .unwrap();

    assert!(!answer.contains("[Error executing tool"));
    assert_eq!(
        tool_results(&client.requests()[1]),
        vec![("toolu_1".to_string(), "invalid city".to_string(), true)]
    );
}

#[tokio::test]
async fn test_history_persists_across_queries() {
    let (registry, catalog, _) = registry_with(&[("./math.js", vec!["add"])]).await;
    let client = MockClient::new(vec![
        reply(vec![text("Hi there.")]),
        reply(vec![text("You said hello.")]),
    ]);
    let mut conversation = Conversation::new(client.clone());

    conversation.process_query(&registry, &catalog, "Hello").await.unwrap();
    conversation
        .process_query(&registry, &catalog, "What did I say?")
        .await
        .unwrap();

    let requests = client.requests();
    assert_eq!(requests[1].messages.len(), 3);
    assert_eq!(text_of(&requests[1].messages[0]), "Hello");
    assert_eq!(text_of(&requests[1].messages[1]), "Hi there.");
    // every query starts with the catalog attached
    assert!(requests[1].tools.is_some());
    assert_eq!(conversation.history().len(), 4);
}

#[tokio::test]
async fn test_chained_tool_use_is_declined_by_default() {
    let (registry, catalog, calls) = registry_with(&[("./math.js", vec!["add"])]).await;
    let client = MockClient::new(vec![
        reply(vec![tool_use("toolu_1", "math_js__add", json!({"a": 1, "b": 2}))]),
        reply(vec![
            text("Adding again."),
            tool_use("toolu_2", "math_js__add", json!({"a": 3, "b": 3})),
        ]),
        reply(vec![text("Done.")]),
    ]);
    let mut conversation = Conversation::new(client.clone());

    let answer = conversation
        .process_query(&registry, &catalog, "Chain")
        .await
        .unwrap();

    assert_eq!(calls.lock().unwrap().len(), 1);
    assert!(answer.ends_with("Adding again."));
    assert_eq!(client.requests().len(), 2);

    let last = conversation.history().last().unwrap();
    assert_eq!(last.role, Role::User);
    assert!(matches!(
        &last.content[0],
        MessageContent::ToolResult { is_error: true, .. }
    ));

    // the declined result and the next query share one user message
    conversation.process_query(&registry, &catalog, "Next").await.unwrap();
    let requests = client.requests();
    let trailing = requests[2].messages.last().unwrap();
    assert_eq!(trailing.role, Role::User);
    assert!(matches!(
        &trailing.content[0],
        MessageContent::ToolResult { tool_use_id, is_error: true, .. } if tool_use_id == "toolu_2"
    ));
    assert_eq!(text_of(trailing), "Next");

    let roles: Vec<_> = requests[2].messages.iter().map(|m| m.role).collect();
    assert!(roles.windows(2).all(|w| w[0] != w[1]));
}

#[tokio::test]
async fn test_bounded_tool_chaining() {
    let (registry, catalog, calls) = registry_with(&[("./math.js", vec!["add"])]).await;
    let client = MockClient::new(vec![
        reply(vec![tool_use("toolu_1", "math_js__add", json!({"a": 1, "b": 2}))]),
        reply(vec![tool_use("toolu_2", "math_js__add", json!({"a": 3, "b": 3}))]),
        reply(vec![text("The total is 6.")]),
    ]);
    let mut conversation = Conversation::new(client.clone()).with_max_tool_rounds(2);

    let answer = conversation
        .process_query(&registry, &catalog, "Chain")
        .await
        .unwrap();

    assert_eq!(calls.lock().unwrap().len(), 2);
    assert!(answer.ends_with("The total is 6."));

    let requests = client.requests();
    assert_eq!(requests.len(), 3);
    assert!(requests[0].tools.is_some());
    assert!(requests[1].tools.is_some());
    assert!(requests[2].tools.is_none());
    assert_eq!(
        tool_results(&requests[2])
            .into_iter()
            .map(|(id, _, _)| id)
            .collect::<Vec<_>>(),
        vec!["toolu_1".to_string(), "toolu_2".to_string()]
    );
}

#[tokio::test]
async fn test_llm_failure_is_returned() {
    let (registry, catalog, _) = registry_with(&[]).await;
    let mut conversation = Conversation::new(MockClient::new(vec![]));

    let result = conversation.process_query(&registry, &catalog, "Hello").await;

    assert!(matches!(result, Err(Error::ClaudeApi(_))));
    // the failed query leaves no dangling user message
    assert!(conversation.history().is_empty());
}

#[tokio::test]
async fn test_failed_query_keeps_pending_tool_results() {
    let (registry, catalog, _) = registry_with(&[("./math.js", vec!["add"])]).await;
    let client = MockClient::new(vec![reply(vec![tool_use("toolu_1", "gone__x", json!({}))])]);
    let mut conversation = Conversation::new(client.clone());

    conversation.process_query(&registry, &catalog, "First").await.unwrap();
    let before = conversation.history().to_vec();

    let result = conversation.process_query(&registry, &catalog, "Second").await;

    assert!(result.is_err());
    // the second query reached the model merged after the pending result
    assert_eq!(text_of(client.requests()[1].messages.last().unwrap()), "Second");
    assert_eq!(conversation.history(), before.as_slice());
}

#[tokio::test]
async fn test_tool_result_content_is_raw_blocks() {
    let (registry, catalog, _) = registry_with(&[("./math.js", vec!["add"])]).await;
    let client = MockClient::new(vec![
        reply(vec![tool_use("toolu_1", "math_js__add", json!({"a": 2, "b": 2}))]),
        reply(vec![text("4")]),
    ]);
    let mut conversation = Conversation::new(client.clone());

    conversation.process_query(&registry, &catalog, "2+2").await.unwrap();

    let result_message = &conversation.history()[2];
    match &result_message.content[0] {
        MessageContent::ToolResult { content, .. } => {
            assert!(matches!(content, ToolResultContent::Blocks(blocks) if blocks.len() == 1));
        }
        other => panic!("expected tool_result, got {other:?}"),
    }
}
