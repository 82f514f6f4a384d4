//! Scripted LLM for tests.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::model::{CompletionConfig, Message, ToolCallRequest};

use super::Llm;

/// Returns pre-scripted assistant messages in order; repeats the last one
/// when the script runs dry.
pub struct MockLlm {
    script: Mutex<VecDeque<Message>>,
    fallback: Message,
}

impl MockLlm {
    /// Scripted replies, served first to last.
    pub fn with_replies(replies: Vec<Message>) -> Self {
        let fallback = replies
            .last()
            .cloned()
            .unwrap_or_else(|| Message::assistant(""));
        Self {
            script: Mutex::new(replies.into()),
            fallback,
        }
    }

    /// A single fixed text reply with no tool calls.
    pub fn with_text(content: impl Into<String>) -> Self {
        Self::with_replies(vec![Message::assistant(content)])
    }

    /// A single reply that requests the given tool calls.
    pub fn with_tool_calls(content: impl Into<String>, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self::with_replies(vec![Message::assistant_with_tool_calls(
            content, tool_calls,
        )])
    }
}

#[async_trait]
impl Llm for MockLlm {
    async fn completion(
        &self,
        _messages: &[Message],
        _config: &CompletionConfig,
    ) -> Result<Message, RuntimeError> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| RuntimeError::Llm("mock script lock poisoned".to_string()))?;
        Ok(script.pop_front().unwrap_or_else(|| self.fallback.clone()))
    }
}
