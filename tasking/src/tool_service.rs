//! External tool service boundary.
//!
//! The runtime consumes an opaque transport: `call_tool(name, args)` returns
//! content blocks, optional structured content, and a tool-reported error
//! flag. Transport-level failures (network, protocol) must surface as `Err`
//! — `is_error` is reserved for failures the tool itself reports. Concrete
//! transports live outside this crate; [`MockToolService`] covers tests.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::RuntimeError;
use crate::model::ContentBlock;

/// Normalised result of one tool invocation.
#[derive(Debug, Clone)]
pub struct ToolCallResult {
    /// Ordered result blocks.
    pub content: Vec<ContentBlock>,
    /// Structured side-channel, when the tool returns one.
    pub structured_content: Option<Value>,
    /// Tool-reported failure. Transport failures raise instead.
    pub is_error: bool,
}

impl ToolCallResult {
    /// Successful single-text result.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            structured_content: None,
            is_error: false,
        }
    }

    /// Tool-reported failure carrying the error text.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentBlock::text(text)],
            structured_content: None,
            is_error: true,
        }
    }

    pub fn with_structured(mut self, value: Value) -> Self {
        self.structured_content = Some(value);
        self
    }
}

/// Opaque transport to an external tool registry.
#[async_trait]
pub trait ToolService: Send + Sync {
    /// Invokes a tool by name. `Err` is reserved for transport failures.
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallResult, RuntimeError>;
}

type MockToolFn =
    Arc<dyn Fn(Map<String, Value>) -> Result<ToolCallResult, RuntimeError> + Send + Sync>;

/// In-process tool service for tests: named closures over JSON arguments.
#[derive(Default)]
pub struct MockToolService {
    tools: HashMap<String, MockToolFn>,
}

impl MockToolService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a tool body under a name.
    pub fn with_tool(
        mut self,
        name: impl Into<String>,
        body: impl Fn(Map<String, Value>) -> Result<ToolCallResult, RuntimeError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        self.tools.insert(name.into(), Arc::new(body));
        self
    }

    /// Registers a tool that always returns the same text.
    pub fn with_text_tool(self, name: impl Into<String>, text: impl Into<String>) -> Self {
        let text = text.into();
        self.with_tool(name, move |_args| Ok(ToolCallResult::text(text.clone())))
    }
}

#[async_trait]
impl ToolService for MockToolService {
    async fn call_tool(
        &self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<ToolCallResult, RuntimeError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| RuntimeError::ToolNotFound(name.to_string()))?;
        tool(arguments)
    }
}
