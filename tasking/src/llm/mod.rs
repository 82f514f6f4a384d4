//! LLM client abstraction.
//!
//! Agents depend on a callable that turns a message history plus a
//! [`CompletionConfig`] into one assistant [`Message`] (text, tool calls,
//! stop reason, usage). HTTP clients for OpenAI- or Anthropic-compatible
//! endpoints implement this trait outside the crate; the wire fragments they
//! need come from [`CompletionConfig::to_openai`] and
//! [`CompletionConfig::to_anthropic`]. [`MockLlm`] scripts replies for tests.

mod mock;

pub use mock::MockLlm;

use async_trait::async_trait;

use crate::error::RuntimeError;
use crate::model::{CompletionConfig, Message};

/// LLM client: messages in, one assistant message out.
#[async_trait]
pub trait Llm: Send + Sync {
    /// One completion turn. The result is an assistant-role message that may
    /// carry `tool_calls` and/or text; errors propagate as
    /// [`RuntimeError::Llm`].
    async fn completion(
        &self,
        messages: &[Message],
        config: &CompletionConfig,
    ) -> Result<Message, RuntimeError>;
}
