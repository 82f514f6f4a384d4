//! LLM completion configuration and its two wire serialisations.
//!
//! [`CompletionConfig`] is the per-stage carrier for sampling parameters,
//! tools, stop words and streaming flags. [`CompletionConfig::to_openai`] and
//! [`CompletionConfig::to_anthropic`] produce the request fragments for the
//! two supported provider dialects; the HTTP client itself lives outside this
//! crate.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Tool specification visible to the LLM: name, description, JSON schema.
///
/// Injected dependency parameters (task, workflow, ...) never appear in
/// `input_schema`; they are supplied by the dispatcher at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: Option<String>,
    /// JSON Schema for the LLM-visible arguments.
    pub input_schema: Value,
}

/// Configuration for one LLM completion call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionConfig {
    // Tool parameters
    pub tools: Vec<ToolSpec>,
    pub tool_choice: Option<String>,
    pub exclude_tools: Vec<String>,

    // Generation parameters
    pub top_p: f64,
    pub max_tokens: u32,
    pub frequency_penalty: f64,
    pub temperature: f64,

    // Format parameters
    pub format_json: bool,
    // Thinking parameters
    pub allow_thinking: bool,
    // Streaming parameters
    pub stream: bool,
    pub stream_interval: f64,
    // Stop parameters
    pub stop_words: Vec<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            tool_choice: None,
            exclude_tools: Vec::new(),
            top_p: 1.0,
            max_tokens: 8192,
            frequency_penalty: 1.0,
            temperature: 0.9,
            format_json: false,
            allow_thinking: true,
            stream: false,
            stream_interval: 1.0,
            stop_words: Vec::new(),
        }
    }
}

impl CompletionConfig {
    /// Tools minus the excluded names, in registration order.
    fn effective_tools(&self) -> impl Iterator<Item = &ToolSpec> {
        self.tools
            .iter()
            .filter(|t| !self.exclude_tools.contains(&t.name))
    }

    /// OpenAI-compatible request fragment.
    ///
    /// When `format_json` is set, only the sampling parameters and
    /// `response_format` are emitted; tool parameters are suppressed.
    pub fn to_openai(&self) -> Map<String, Value> {
        let mut kwargs = Map::new();
        kwargs.insert("top_p".into(), json!(self.top_p));
        kwargs.insert("max_tokens".into(), json!(self.max_tokens));
        kwargs.insert("frequency_penalty".into(), json!(self.frequency_penalty));
        kwargs.insert("temperature".into(), json!(self.temperature));

        if self.format_json {
            kwargs.insert("response_format".into(), json!({ "type": "json_object" }));
            return kwargs;
        }

        kwargs.insert(
            "extra_body".into(),
            json!({ "enable_thinking": self.allow_thinking }),
        );

        let tools: Vec<Value> = self.effective_tools().map(openai_tool_schema).collect();
        if !tools.is_empty() {
            if let Some(choice) = &self.tool_choice {
                if let Some(chosen) = self.effective_tools().find(|t| &t.name == choice) {
                    kwargs.insert("tool_choice".into(), openai_tool_schema(chosen));
                }
            }
            kwargs.insert("tools".into(), Value::Array(tools));
        }

        kwargs
    }

    /// Anthropic-compatible request fragment. Stop words travel here as
    /// `stop_sequences`; the OpenAI dialect does not carry them.
    pub fn to_anthropic(&self) -> Map<String, Value> {
        let mut kwargs = Map::new();
        kwargs.insert("top_p".into(), json!(self.top_p));
        kwargs.insert("max_tokens".into(), json!(self.max_tokens));
        kwargs.insert("temperature".into(), json!(self.temperature));

        if !self.stop_words.is_empty() {
            kwargs.insert("stop_sequences".into(), json!(self.stop_words));
        }

        if self.format_json {
            kwargs.insert("response_format".into(), json!({ "type": "json_object" }));
        }

        let tools: Vec<Value> = self
            .effective_tools()
            .map(|t| {
                json!({
                    "name": t.name,
                    "description": t.description.clone().unwrap_or_default(),
                    "input_schema": t.input_schema,
                })
            })
            .collect();
        if !tools.is_empty() {
            if let Some(choice) = &self.tool_choice {
                if self.effective_tools().any(|t| &t.name == choice) {
                    kwargs.insert(
                        "tool_choice".into(),
                        json!({ "type": "tool", "name": choice }),
                    );
                }
            }
            kwargs.insert("tools".into(), Value::Array(tools));
        }

        kwargs
    }
}

fn openai_tool_schema(tool: &ToolSpec) -> Value {
    json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description.clone().unwrap_or_default(),
            "strict": true,
            "parameters": tool.input_schema,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tool(name: &str) -> ToolSpec {
        ToolSpec {
            name: name.to_string(),
            description: Some(format!("{name} tool")),
            input_schema: json!({ "type": "object", "properties": {} }),
        }
    }

    /// **Scenario**: format_json truncates the OpenAI fragment to sampling
    /// parameters plus response_format; tools are suppressed.
    #[test]
    fn to_openai_format_json_suppresses_tools() {
        let config = CompletionConfig {
            format_json: true,
            tools: vec![sample_tool("get_time")],
            ..CompletionConfig::default()
        };
        let out = config.to_openai();
        assert_eq!(
            out.get("response_format"),
            Some(&json!({ "type": "json_object" }))
        );
        assert!(!out.contains_key("tools"));
        assert!(!out.contains_key("extra_body"));
    }

    /// **Scenario**: OpenAI tools are function objects with parameters;
    /// excluded tools are dropped; tool_choice picks the named tool schema.
    #[test]
    fn to_openai_tools_and_tool_choice() {
        let config = CompletionConfig {
            tools: vec![sample_tool("get_time"), sample_tool("excluded")],
            exclude_tools: vec!["excluded".to_string()],
            tool_choice: Some("get_time".to_string()),
            stop_words: vec!["</finish>".to_string()],
            ..CompletionConfig::default()
        };
        let out = config.to_openai();
        let tools = out.get("tools").and_then(Value::as_array).expect("tools");
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["function"]["name"], json!("get_time"));
        assert_eq!(out["tool_choice"]["function"]["name"], json!("get_time"));
        assert_eq!(out["extra_body"]["enable_thinking"], json!(true));
        // Stop words are an Anthropic-dialect concern.
        assert!(!out.contains_key("stop"));
        assert!(!out.contains_key("stop_sequences"));
    }

    /// **Scenario**: Anthropic fragment uses input_schema, stop_sequences and
    /// the {type: tool, name} tool_choice shape.
    #[test]
    fn to_anthropic_tools_and_stop_sequences() {
        let config = CompletionConfig {
            tools: vec![sample_tool("end_workflow")],
            tool_choice: Some("end_workflow".to_string()),
            stop_words: vec!["</finish>".to_string()],
            ..CompletionConfig::default()
        };
        let out = config.to_anthropic();
        assert_eq!(out["stop_sequences"], json!(["</finish>"]));
        let tools = out.get("tools").and_then(Value::as_array).expect("tools");
        assert_eq!(tools[0]["name"], json!("end_workflow"));
        assert!(tools[0]["input_schema"].is_object());
        assert_eq!(
            out["tool_choice"],
            json!({ "type": "tool", "name": "end_workflow" })
        );
    }
}
