//! Conversation message types.
//!
//! A [`Message`] is one turn: role, text content, optional multimodal blocks,
//! tool calls (assistant) or a tool-call id (tool), error flag, stop reason,
//! metadata and token usage. Everything the agents, workflows, and the output
//! queue exchange is a `Message`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Message role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Natural end of the reply.
    Complete,
    /// Hit the max-token limit.
    Length,
    /// Hit a configured stop word.
    StopWord,
    /// Stopped to call tools.
    ToolCall,
}

/// One block of multimodal content inside a message or tool result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ContentBlock {
    Text { text: String },
    Image { url: String },
    Video { url: String },
}

impl ContentBlock {
    /// Creates a text block.
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Returns the text of a text block, or `None` for image/video.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// One tool invocation requested by an assistant message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Call id, echoed back on the tool-role result message.
    pub id: String,
    /// Tool name.
    pub name: String,
    /// Arguments as a JSON object.
    pub arguments: Map<String, Value>,
}

/// Token usage for one LLM call (prompt + completion).
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CompletionUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

/// A single conversation turn.
///
/// Value-like and safe to share read-only; mutation happens only through the
/// owning task's `append_context`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    /// Plain-text content. Empty for tool results whose payload lives in
    /// `multimodal_content`.
    pub content: String,
    /// Ordered multimodal blocks (tool results, rich user input).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub multimodal_content: Vec<ContentBlock>,
    /// Tool calls requested by an assistant turn.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallRequest>,
    /// For tool-role messages: the id of the call this result answers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    /// Tool-reported failure flag.
    #[serde(default)]
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<StopReason>,
    /// Structured side-channel (e.g. a tool's structured content).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<CompletionUsage>,
}

impl Message {
    /// Creates a message with the given role and text content; all other
    /// fields empty.
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            multimodal_content: Vec::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            is_error: false,
            stop_reason: None,
            metadata: Map::new(),
            usage: None,
        }
    }

    /// Creates a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    /// Creates a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Creates an assistant message with stop reason `Complete`.
    pub fn assistant(content: impl Into<String>) -> Self {
        let mut m = Self::new(Role::Assistant, content);
        m.stop_reason = Some(StopReason::Complete);
        m
    }

    /// Creates an assistant message that requests tool calls.
    pub fn assistant_with_tool_calls(
        content: impl Into<String>,
        tool_calls: Vec<ToolCallRequest>,
    ) -> Self {
        let mut m = Self::new(Role::Assistant, content);
        m.tool_calls = tool_calls;
        m.stop_reason = Some(StopReason::ToolCall);
        m
    }

    /// Creates a tool-role result message.
    ///
    /// Content stays empty; the payload is the ordered block list. `metadata`
    /// carries the tool's structured content when present.
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        blocks: Vec<ContentBlock>,
        is_error: bool,
        metadata: Map<String, Value>,
    ) -> Self {
        Self {
            role: Role::Tool,
            content: String::new(),
            multimodal_content: blocks,
            tool_calls: Vec::new(),
            tool_call_id: Some(tool_call_id.into()),
            is_error,
            stop_reason: None,
            metadata,
            usage: None,
        }
    }

    /// Concatenated text of all text blocks, falling back to `content`.
    pub fn text(&self) -> String {
        if self.multimodal_content.is_empty() {
            return self.content.clone();
        }
        self.multimodal_content
            .iter()
            .filter_map(ContentBlock::as_text)
            .collect::<Vec<_>>()
            .join("\n")
    }
}
