//! Shared value types: messages, completion configuration, queues, and the
//! per-request runtime context.

mod completion;
mod message;
mod queue;
mod run_context;

pub use completion::{CompletionConfig, ToolSpec};
pub use message::{
    CompletionUsage, ContentBlock, Message, Role, StopReason, ToolCallRequest,
};
pub use queue::{AsyncQueue, Queue, QueueError};
pub use run_context::{RunContext, KEY_PROJECT_ID, KEY_TRACE_ID, KEY_USER_ID};

use std::sync::Arc;

/// Shared handle to the consumer-owned message queue.
pub type QueueRef = Arc<dyn Queue<Message>>;
