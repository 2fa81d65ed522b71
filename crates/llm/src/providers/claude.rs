//! Anthropic Claude provider implementation.
//!
//! Talks to the Messages API: https://docs.anthropic.com/en/api/messages
//! Streaming uses server-sent events; tool binding uses `tool_use` content blocks.

use crate::client::{
    ChatMessage, ChatRole, LlmClient, LlmRequest, LlmResponse, LlmStream, LlmStreamChunk,
    LlmUsage, ToolCall, ToolDecision, ToolRequest,
};
use crate::providers::LineBuffer;
use care_core::{AppError, AppResult};
use futures::StreamExt;
use serde::{Deserialize, Serialize};

const DEFAULT_ENDPOINT: &str = "https://api.anthropic.com";
const DEFAULT_API_VERSION: &str = "2023-06-01";

/// The Messages API requires `max_tokens` on every request.
const DEFAULT_MAX_TOKENS: u32 = 1024;

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ClaudeMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ClaudeTool<'a>>,
    stream: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct ClaudeMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ClaudeTool<'a> {
    name: &'a str,
    description: &'a str,
    input_schema: &'a serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    model: String,
    content: Vec<ClaudeContentBlock>,
    #[serde(default)]
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        name: String,
        #[serde(default)]
        input: serde_json::Value,
    },
    #[serde(other)]
    Unsupported,
}

#[derive(Debug, Default, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

/// Server-sent event payloads we care about while streaming.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeEvent {
    MessageStart {
        message: ClaudeMessageStart,
    },
    ContentBlockDelta {
        delta: ClaudeDelta,
    },
    MessageDelta {
        #[serde(default)]
        usage: ClaudeUsage,
    },
    MessageStop,
    Error {
        error: ClaudeErrorBody,
    },
    #[serde(other)]
    Ignored,
}

#[derive(Debug, Deserialize)]
struct ClaudeMessageStart {
    model: String,
    #[serde(default)]
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
struct ClaudeDelta {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClaudeErrorBody {
    #[serde(default)]
    message: String,
}

/// Anthropic Claude client.
pub struct ClaudeClient {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl ClaudeClient {
    /// Create a client against the public Anthropic endpoint.
    pub fn new(api_key: impl Into<String>) -> Self {
        Self::with_base_url(DEFAULT_ENDPOINT, api_key)
    }

    /// Create a client with a custom base URL (proxies, gateways).
    pub fn with_base_url(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            client: reqwest::Client::new(),
        }
    }

    fn to_claude_request<'a>(&self, request: &'a LlmRequest, stream: bool) -> ClaudeRequest<'a> {
        ClaudeRequest {
            model: &request.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system.as_deref(),
            messages: vec![ClaudeMessage {
                role: "user",
                content: request.prompt.clone(),
            }],
            temperature: request.temperature,
            top_p: request.top_p,
            tools: Vec::new(),
            stream,
        }
    }

    async fn post(&self, body: &ClaudeRequest<'_>) -> AppResult<reqwest::Response> {
        let url = format!("{}/v1/messages", self.base_url);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", DEFAULT_API_VERSION)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to send request to Claude: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Claude API error ({}): {}",
                status, error_text
            )));
        }

        Ok(response)
    }
}

/// Convert chat history to the alternating user/assistant shape the Messages API accepts.
///
/// System messages are lifted into the system prompt, leading assistant turns are
/// dropped and consecutive messages from the same speaker are merged.
fn to_claude_messages(messages: &[ChatMessage]) -> (Option<String>, Vec<ClaudeMessage>) {
    let mut system: Vec<&str> = Vec::new();
    let mut converted: Vec<ClaudeMessage> = Vec::new();

    for message in messages {
        let role = match message.role {
            ChatRole::System => {
                system.push(&message.content);
                continue;
            }
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        };

        if converted.is_empty() && role == "assistant" {
            continue;
        }

        match converted.last_mut() {
            Some(last) if last.role == role => {
                last.content.push_str("\n\n");
                last.content.push_str(&message.content);
            }
            _ => converted.push(ClaudeMessage {
                role,
                content: message.content.clone(),
            }),
        }
    }

    let system = (!system.is_empty()).then(|| system.join("\n\n"));
    (system, converted)
}

/// Parse one SSE line into an optional stream chunk.
///
/// `event:` lines are ignored; the payload's own `type` field names the event.
fn parse_sse_line(line: &str, model: &mut String) -> Option<AppResult<LlmStreamChunk>> {
    let data = line.strip_prefix("data:")?.trim();

    let event: ClaudeEvent = match serde_json::from_str(data) {
        Ok(event) => event,
        Err(e) => {
            return Some(Err(AppError::Llm(format!(
                "Failed to parse Claude stream event: {}",
                e
            ))))
        }
    };

    match event {
        ClaudeEvent::MessageStart { message } => {
            *model = message.model;
            tracing::trace!(input_tokens = message.usage.input_tokens, "Claude stream opened");
            None
        }
        ClaudeEvent::ContentBlockDelta { delta } => delta.text.map(|text| {
            Ok(LlmStreamChunk {
                content: text,
                model: model.clone(),
                done: false,
                usage: None,
            })
        }),
        ClaudeEvent::MessageDelta { usage } => {
            tracing::trace!(output_tokens = usage.output_tokens, "Claude stream usage");
            None
        }
        ClaudeEvent::MessageStop => Some(Ok(LlmStreamChunk {
            content: String::new(),
            model: model.clone(),
            done: true,
            usage: None,
        })),
        ClaudeEvent::Error { error } => Some(Err(AppError::Llm(format!(
            "Claude stream error: {}",
            error.message
        )))),
        ClaudeEvent::Ignored => None,
    }
}

#[async_trait::async_trait]
impl LlmClient for ClaudeClient {
    fn provider_name(&self) -> &str {
        "claude"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::debug!(model = %request.model, "Sending completion request to Claude");

        let body = self.to_claude_request(request, false);
        let response: ClaudeResponse = self
            .post(&body)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Claude response: {}", e)))?;

        let content = response
            .content
            .into_iter()
            .filter_map(|block| match block {
                ClaudeContentBlock::Text { text } => Some(text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("");

        Ok(LlmResponse {
            content,
            model: response.model,
            usage: LlmUsage::new(response.usage.input_tokens, response.usage.output_tokens),
            done: true,
        })
    }

    async fn stream(&self, request: &LlmRequest) -> AppResult<LlmStream> {
        tracing::debug!(model = %request.model, "Starting streaming request to Claude");

        let body = self.to_claude_request(request, true);
        let response = self.post(&body).await?;

        let mut lines = LineBuffer::default();
        let mut model = request.model.clone();
        let stream = response.bytes_stream().map(move |result| {
            let bytes = result.map_err(|e| AppError::Llm(format!("Stream error: {}", e)))?;
            let chunks: Vec<AppResult<LlmStreamChunk>> = lines
                .push(&bytes)
                .iter()
                .filter_map(|line| parse_sse_line(line, &mut model))
                .collect();
            Ok(futures::stream::iter(chunks))
        });

        Ok(Box::pin(stream.flat_map(|result| match result {
            Ok(chunks) => chunks,
            Err(e) => futures::stream::iter(vec![Err(e)]),
        })))
    }

    async fn complete_with_tools(&self, request: &ToolRequest) -> AppResult<ToolDecision> {
        tracing::debug!(
            model = %request.model,
            tools = request.tools.len(),
            "Sending tool-bound request to Claude"
        );

        let (system, messages) = to_claude_messages(&request.messages);
        if messages.is_empty() {
            return Ok(ToolDecision::default());
        }

        let body = ClaudeRequest {
            model: &request.model,
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: system.as_deref(),
            messages,
            temperature: request.temperature,
            top_p: None,
            tools: request
                .tools
                .iter()
                .map(|tool| ClaudeTool {
                    name: &tool.name,
                    description: &tool.description,
                    input_schema: &tool.parameters,
                })
                .collect(),
            stream: false,
        };

        let response: ClaudeResponse = self
            .post(&body)
            .await?
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Claude response: {}", e)))?;

        Ok(decision_from_blocks(response.content))
    }
}

fn decision_from_blocks(blocks: Vec<ClaudeContentBlock>) -> ToolDecision {
    let mut decision = ToolDecision::default();
    for block in blocks {
        match block {
            ClaudeContentBlock::Text { text } => decision.content.push_str(&text),
            ClaudeContentBlock::ToolUse { name, input } => decision.calls.push(ToolCall {
                name,
                arguments: input,
            }),
            ClaudeContentBlock::Unsupported => {}
        }
    }
    decision
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_max_tokens() {
        let client = ClaudeClient::new("sk-test");
        let request = LlmRequest::new("Hi", "claude-3-haiku-20240307");
        let body = client.to_claude_request(&request, true);

        assert_eq!(body.max_tokens, DEFAULT_MAX_TOKENS);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["messages"][0]["role"], "user");
        assert_eq!(json["stream"], true);
        assert!(json.get("tools").is_none());
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_to_claude_messages_normalizes_history() {
        let history = vec![
            ChatMessage::assistant("Hi there! How can I help?"),
            ChatMessage::new(ChatRole::System, "Be brief."),
            ChatMessage::user("I live in Denver."),
            ChatMessage::user("Any adult day care nearby?"),
            ChatMessage::assistant("Let me check."),
        ];

        let (system, messages) = to_claude_messages(&history);
        assert_eq!(system.as_deref(), Some("Be brief."));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "user");
        assert_eq!(
            messages[0].content,
            "I live in Denver.\n\nAny adult day care nearby?"
        );
        assert_eq!(messages[1].role, "assistant");
    }

    #[test]
    fn test_parse_sse_text_delta() {
        let mut model = "claude".to_string();
        let chunk = parse_sse_line(
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Hello"}}"#,
            &mut model,
        )
        .unwrap()
        .unwrap();
        assert_eq!(chunk.content, "Hello");
        assert!(!chunk.done);
    }

    #[test]
    fn test_parse_sse_ignores_event_lines_and_pings() {
        let mut model = "claude".to_string();
        assert!(parse_sse_line("event: ping", &mut model).is_none());
        assert!(parse_sse_line(r#"data: {"type":"ping"}"#, &mut model).is_none());
    }

    #[test]
    fn test_parse_sse_message_start_and_stop() {
        let mut model = String::new();
        assert!(parse_sse_line(
            r#"data: {"type":"message_start","message":{"id":"m1","model":"claude-3-haiku-20240307","usage":{"input_tokens":12}}}"#,
            &mut model,
        )
        .is_none());
        assert_eq!(model, "claude-3-haiku-20240307");

        let stop = parse_sse_line(r#"data: {"type":"message_stop"}"#, &mut model)
            .unwrap()
            .unwrap();
        assert!(stop.done);
    }

    #[test]
    fn test_parse_sse_error_event() {
        let mut model = String::new();
        let result = parse_sse_line(
            r#"data: {"type":"error","error":{"type":"overloaded_error","message":"Overloaded"}}"#,
            &mut model,
        )
        .unwrap();
        assert!(matches!(result, Err(AppError::Llm(msg)) if msg.contains("Overloaded")));
    }

    #[test]
    fn test_decision_from_tool_use_blocks() {
        let response: ClaudeResponse = serde_json::from_str(
            r#"{"model":"claude-3-haiku-20240307","content":[
                {"type":"text","text":"Looking that up."},
                {"type":"tool_use","id":"t1","name":"search_by_city_state","input":{"city":"Denver","state":"CO"}}
            ],"usage":{"input_tokens":5,"output_tokens":7}}"#,
        )
        .unwrap();

        let decision = decision_from_blocks(response.content);
        assert_eq!(decision.content, "Looking that up.");
        assert_eq!(decision.calls.len(), 1);
        assert_eq!(decision.calls[0].name, "search_by_city_state");
        assert_eq!(decision.calls[0].arguments["state"], "CO");
    }
}
