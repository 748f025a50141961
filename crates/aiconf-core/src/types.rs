//! Chat types shared by every client: messages, options, responses,
//! streaming updates, client metadata, and the OpenAI-compatible wire shapes.
//!
//! Messages follow the OpenAI chat completions format, which every built-in
//! provider speaks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

// ─────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────

/// A chat message, tagged by `role` on the wire.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        tool_calls: Option<Vec<ToolCall>>,
    },
    Tool {
        content: String,
        tool_call_id: String,
    },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_calls: None,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            content: content.into(),
            tool_call_id: tool_call_id.into(),
        }
    }

    /// Whether this is a system message.
    pub fn is_system(&self) -> bool {
        matches!(self, Message::System { .. })
    }
}

/// A tool call requested by the assistant.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolCall {
    pub id: String,
    /// Always `"function"`.
    #[serde(rename = "type")]
    pub call_type: String,
    pub function: FunctionCall,
}

/// Function name plus JSON-encoded arguments.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: String,
}

/// A tool the model may call.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: FunctionDefinition,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        ToolDefinition {
            tool_type: "function".to_string(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

// ─────────────────────────────────────────────
// Options, responses, metadata
// ─────────────────────────────────────────────

/// Per-request options.
///
/// `model_id` overrides the client's configured default model for this call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatOptions {
    pub model_id: Option<String>,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub tools: Option<Vec<ToolDefinition>>,
}

impl ChatOptions {
    /// Options that only select a model.
    pub fn with_model(model_id: impl Into<String>) -> Self {
        Self {
            model_id: Some(model_id.into()),
            ..Default::default()
        }
    }
}

/// Token usage reported by the vendor.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct UsageInfo {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// A complete (non-streaming) chat response.
#[derive(Clone, Debug, PartialEq)]
pub struct ChatResponse {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageInfo>,
    /// Reasoning/thinking content, for models that return it separately.
    pub reasoning_content: Option<String>,
    /// Model that served the request.
    pub model_id: String,
    pub created_at: DateTime<Utc>,
}

impl ChatResponse {
    /// A plain text response.
    pub fn text(model_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            tool_calls: Vec::new(),
            finish_reason: Some("stop".to_string()),
            usage: None,
            reasoning_content: None,
            model_id: model_id.into(),
            created_at: Utc::now(),
        }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// One increment of a streaming response.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChatResponseUpdate {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
    pub finish_reason: Option<String>,
    pub usage: Option<UsageInfo>,
    pub model_id: Option<String>,
}

/// Describes the backend a client talks to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientMetadata {
    /// Registry name of the provider, e.g. `"openai"`.
    pub provider_name: String,
    /// Endpoint the client sends requests to, when known.
    pub provider_uri: Option<Url>,
    /// Model used when a request does not override it.
    pub default_model_id: String,
    /// Client id the instance was declared under.
    pub id: String,
    /// Configuration section the client was resolved from.
    pub section_path: String,
}

// ─────────────────────────────────────────────
// OpenAI-compatible wire shapes
// ─────────────────────────────────────────────

/// Request body for `/chat/completions`.
#[derive(Debug, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,
}

impl ChatCompletionRequest {
    /// Build a request body for `model` from messages and options.
    pub fn new(model: &str, messages: &[Message], options: &ChatOptions, stream: bool) -> Self {
        Self {
            model: model.to_string(),
            messages: messages.to_vec(),
            tools: options.tools.clone(),
            tool_choice: options.tools.as_ref().map(|_| "auto".to_string()),
            max_tokens: options.max_tokens,
            temperature: options.temperature,
            stream,
        }
    }
}

/// Non-streaming response body.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    pub id: Option<String>,
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ChatChoice {
    pub message: AssistantMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssistantMessage {
    pub content: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(default)]
    pub reasoning_content: Option<String>,
}

impl ChatCompletionResponse {
    /// Convert into a [`ChatResponse`]; `None` when the body has no choices.
    pub fn into_response(self, requested_model: &str) -> Option<ChatResponse> {
        let choice = self.choices.into_iter().next()?;
        Some(ChatResponse {
            content: choice.message.content,
            tool_calls: choice.message.tool_calls.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            usage: self.usage,
            reasoning_content: choice.message.reasoning_content,
            model_id: self.model.unwrap_or_else(|| requested_model.to_string()),
            created_at: Utc::now(),
        })
    }
}

/// One server-sent event of a streaming response.
#[derive(Debug, Deserialize)]
pub struct ChatCompletionChunk {
    pub model: Option<String>,
    #[serde(default)]
    pub choices: Vec<ChunkChoice>,
    pub usage: Option<UsageInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ChunkChoice {
    #[serde(default)]
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ChunkDelta {
    pub content: Option<String>,
    pub reasoning_content: Option<String>,
}

impl From<ChatCompletionChunk> for ChatResponseUpdate {
    fn from(chunk: ChatCompletionChunk) -> Self {
        let (content, reasoning_content, finish_reason) = match chunk.choices.into_iter().next() {
            Some(c) => (c.delta.content, c.delta.reasoning_content, c.finish_reason),
            None => (None, None, None),
        };
        ChatResponseUpdate {
            content,
            reasoning_content,
            finish_reason,
            usage: chunk.usage,
            model_id: chunk.model,
        }
    }
}

// ─────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_message_roles_on_the_wire() {
        let system = serde_json::to_value(Message::system("Be brief.")).unwrap();
        assert_eq!(system["role"], "system");

        let assistant = serde_json::to_value(Message::assistant("42")).unwrap();
        assert_eq!(assistant["role"], "assistant");
        assert!(assistant.get("tool_calls").is_none());

        let tool = serde_json::to_value(Message::tool_result("call_1", "done")).unwrap();
        assert_eq!(tool["role"], "tool");
        assert_eq!(tool["tool_call_id"], "call_1");
    }

    #[test]
    fn test_request_omits_unset_fields() {
        let request = ChatCompletionRequest::new(
            "gpt-4.1",
            &[Message::user("Hello")],
            &ChatOptions::default(),
            false,
        );
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["model"], "gpt-4.1");
        assert!(body.get("tools").is_none());
        assert!(body.get("max_tokens").is_none());
        assert!(body.get("stream").is_none());
    }

    #[test]
    fn test_request_with_tools_and_stream() {
        let options = ChatOptions {
            tools: Some(vec![ToolDefinition::new("search", "Search", json!({"type": "object"}))]),
            max_tokens: Some(256),
            ..Default::default()
        };
        let request = ChatCompletionRequest::new("grok-4", &[Message::user("q")], &options, true);
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(body["tool_choice"], "auto");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn test_response_conversion() {
        let raw: ChatCompletionResponse = serde_json::from_value(json!({
            "id": "chatcmpl-1",
            "choices": [{
                "message": { "content": "Hi!", "tool_calls": null },
                "finish_reason": "stop"
            }],
            "usage": { "prompt_tokens": 3, "completion_tokens": 2, "total_tokens": 5 }
        }))
        .unwrap();

        let resp = raw.into_response("gpt-4.1").unwrap();
        assert_eq!(resp.content.as_deref(), Some("Hi!"));
        assert_eq!(resp.model_id, "gpt-4.1");
        assert_eq!(resp.usage.as_ref().unwrap().total_tokens, 5);
        assert!(!resp.has_tool_calls());
    }

    #[test]
    fn test_response_without_choices() {
        let raw: ChatCompletionResponse =
            serde_json::from_value(json!({ "choices": [], "usage": null })).unwrap();
        assert!(raw.into_response("m").is_none());
    }

    #[test]
    fn test_chunk_conversion() {
        let chunk: ChatCompletionChunk = serde_json::from_value(json!({
            "model": "grok-4",
            "choices": [{ "delta": { "content": "Hel" }, "finish_reason": null }]
        }))
        .unwrap();
        let update: ChatResponseUpdate = chunk.into();
        assert_eq!(update.content.as_deref(), Some("Hel"));
        assert_eq!(update.model_id.as_deref(), Some("grok-4"));
        assert!(update.finish_reason.is_none());
    }
}
