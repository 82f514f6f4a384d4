//! The agent: per-stage LLM handles, a workflow, tool access, and the
//! observe–think–act primitives.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde_json::{Map, Value};
use tracing::debug;
use uuid::Uuid;

use crate::error::RuntimeError;
use crate::llm::Llm;
use crate::machine::{EventName, StageName};
use crate::middleware::HumanClient;
use crate::model::{Message, QueueRef, RunContext, Role};
use crate::task::{TaskLike, TaskRef};
use crate::tool_service::{ToolCallResult, ToolService};
use crate::workflow::{ObserveFn, Workflow};

use super::hooks::{ActHook, AgentHooks, MessageHook, MessagesHook, ObserveHook, RunHook};

/// Converts a tool-call result into a tool-role message.
///
/// Content stays empty; the payload rides in the multimodal blocks and the
/// structured content lands in metadata.
pub(crate) fn tool_result_message(result: ToolCallResult) -> Message {
    let metadata = match result.structured_content {
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("value".to_string(), other);
            map
        }
        None => Map::new(),
    };
    Message {
        role: Role::Tool,
        content: String::new(),
        multimodal_content: result.content,
        tool_calls: Vec::new(),
        tool_call_id: None,
        is_error: result.is_error,
        stop_reason: None,
        metadata,
        usage: None,
    }
}

/// An LLM-driven actor: binds per-stage LLMs, one workflow, an optional
/// external tool service, and an optional human client.
///
/// The workflow slot is interior-mutable so builders can wire actions that
/// hold a `Weak` reference back to the agent, then attach the finished
/// workflow. `run_task_stream` clones the workflow per run, keeping
/// concurrent runs from sharing stage state.
pub struct Agent<WS, WE, T> {
    id: String,
    name: String,
    agent_type: String,
    llms: HashMap<WS, Arc<dyn Llm>>,
    workflow: RwLock<Option<Workflow<WS, WE, T>>>,
    tool_service: Option<Arc<dyn ToolService>>,
    human_client: Option<Arc<dyn HumanClient>>,
    hooks: RwLock<AgentHooks<T>>,
}

impl<WS, WE, T> std::fmt::Debug for Agent<WS, WE, T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("agent_type", &self.agent_type)
            .finish_non_exhaustive()
    }
}

impl<WS: StageName, WE: EventName, T: TaskLike> Agent<WS, WE, T> {
    pub fn new(
        name: impl Into<String>,
        agent_type: impl Into<String>,
        llms: HashMap<WS, Arc<dyn Llm>>,
        tool_service: Option<Arc<dyn ToolService>>,
        human_client: Option<Arc<dyn HumanClient>>,
    ) -> Self {
        Self {
            id: format!("agent_{}", Uuid::new_v4().simple()),
            name: name.into(),
            agent_type: agent_type.into(),
            llms,
            workflow: RwLock::new(None),
            tool_service,
            human_client,
            hooks: RwLock::new(AgentHooks::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn agent_type(&self) -> &str {
        &self.agent_type
    }

    pub fn human_client(&self) -> Option<Arc<dyn HumanClient>> {
        self.human_client.clone()
    }

    pub fn tool_service(&self) -> Option<Arc<dyn ToolService>> {
        self.tool_service.clone()
    }

    /// Attaches (or replaces) the workflow.
    pub fn set_workflow(&self, workflow: Workflow<WS, WE, T>) {
        if let Ok(mut slot) = self.workflow.write() {
            *slot = Some(workflow);
        }
    }

    /// A clone of the attached workflow.
    pub fn workflow(&self) -> Result<Workflow<WS, WE, T>, RuntimeError> {
        self.workflow
            .read()
            .ok()
            .and_then(|slot| slot.clone())
            .ok_or(RuntimeError::WorkflowNotSet)
    }

    /// The LLM bound to a stage.
    pub fn llm_for(&self, stage: &WS) -> Result<Arc<dyn Llm>, RuntimeError> {
        self.llms
            .get(stage)
            .cloned()
            .ok_or_else(|| RuntimeError::MissingStageBinding {
                stage: stage.name().to_string(),
                kind: "llm",
            })
    }

    // ---- hook registration (append order is execution order) ----

    pub fn add_pre_run_once_hook(&self, hook: RunHook<T>) {
        if let Ok(mut hooks) = self.hooks.write() {
            hooks.pre_run_once.push(hook);
        }
    }

    pub fn add_post_run_once_hook(&self, hook: RunHook<T>) {
        if let Ok(mut hooks) = self.hooks.write() {
            hooks.post_run_once.push(hook);
        }
    }

    pub fn add_pre_observe_hook(&self, hook: RunHook<T>) {
        if let Ok(mut hooks) = self.hooks.write() {
            hooks.pre_observe.push(hook);
        }
    }

    pub fn add_post_observe_hook(&self, hook: ObserveHook<T>) {
        if let Ok(mut hooks) = self.hooks.write() {
            hooks.post_observe.push(hook);
        }
    }

    pub fn add_pre_think_hook(&self, hook: MessagesHook) {
        if let Ok(mut hooks) = self.hooks.write() {
            hooks.pre_think.push(hook);
        }
    }

    pub fn add_post_think_hook(&self, hook: MessageHook) {
        if let Ok(mut hooks) = self.hooks.write() {
            hooks.post_think.push(hook);
        }
    }

    pub fn add_pre_act_hook(&self, hook: RunHook<T>) {
        if let Ok(mut hooks) = self.hooks.write() {
            hooks.pre_act.push(hook);
        }
    }

    pub fn add_post_act_hook(&self, hook: ActHook<T>) {
        if let Ok(mut hooks) = self.hooks.write() {
            hooks.post_act.push(hook);
        }
    }

    fn run_hooks(&self, pick: impl Fn(&AgentHooks<T>) -> Vec<RunHook<T>>) -> Vec<RunHook<T>> {
        self.hooks.read().map(|h| pick(&h)).unwrap_or_default()
    }

    // ---- primitives ----

    /// Observes the task: formats one observation message via `observe_fn`,
    /// appends it to the current state's context, and returns the full
    /// context including it.
    pub async fn observe(
        &self,
        ctx: &RunContext,
        queue: &QueueRef,
        task: &TaskRef<T>,
        observe_fn: ObserveFn<T>,
        opts: Map<String, Value>,
    ) -> Result<Vec<Message>, RuntimeError> {
        for hook in self.run_hooks(|h| h.pre_observe.clone()) {
            hook.call(ctx, queue, task).await;
        }

        let observation = observe_fn(Arc::clone(task), opts).await?;
        let observed = {
            let mut guard = task.lock().await;
            guard.append_context(observation);
            guard.context().data().to_vec()
        };

        let post_hooks = self
            .hooks
            .read()
            .map(|h| h.post_observe.clone())
            .unwrap_or_default();
        for hook in post_hooks {
            hook.call(ctx, queue, task, &observed).await;
        }
        Ok(observed)
    }

    /// Thinks over the observation with the stage's LLM.
    pub async fn think(
        &self,
        ctx: &RunContext,
        queue: &QueueRef,
        stage: &WS,
        observed: &[Message],
        config: &crate::model::CompletionConfig,
    ) -> Result<Message, RuntimeError> {
        let pre_hooks = self
            .hooks
            .read()
            .map(|h| h.pre_think.clone())
            .unwrap_or_default();
        for hook in pre_hooks {
            hook.call(ctx, queue, observed).await;
        }

        let llm = self.llm_for(stage)?;
        let reply = llm.completion(observed, config).await?;

        let post_hooks = self
            .hooks
            .read()
            .map(|h| h.post_think.clone())
            .unwrap_or_default();
        for hook in post_hooks {
            hook.call(ctx, queue, &reply).await;
        }
        Ok(reply)
    }

    /// Acts on one tool call and returns the tool-role result message.
    pub async fn act(
        &self,
        ctx: &RunContext,
        queue: &QueueRef,
        tool_call: &crate::model::ToolCallRequest,
        task: &TaskRef<T>,
        inject: Map<String, Value>,
    ) -> Result<Message, RuntimeError> {
        for hook in self.run_hooks(|h| h.pre_act.clone()) {
            hook.call(ctx, queue, task).await;
        }

        let mut result = self
            .call_tool(
                ctx,
                &tool_call.name,
                task,
                inject,
                tool_call.arguments.clone(),
            )
            .await?;
        result.tool_call_id = Some(tool_call.id.clone());

        let post_hooks = self
            .hooks
            .read()
            .map(|h| h.post_act.clone())
            .unwrap_or_default();
        for hook in post_hooks {
            hook.call(ctx, queue, task, &result).await;
        }
        Ok(result)
    }

    /// Resolves and runs one tool.
    ///
    /// Workflow-local tools win; their tag gate is checked against the task
    /// and a violation fails without consulting the external service. When
    /// the workflow has no such tool, the external service is called with
    /// the runtime context injected under `context`. Transport errors
    /// propagate; any other service failure becomes an `is_error` message.
    pub async fn call_tool(
        &self,
        ctx: &RunContext,
        name: &str,
        task: &TaskRef<T>,
        inject: Map<String, Value>,
        args: Map<String, Value>,
    ) -> Result<Message, RuntimeError> {
        let workflow = self.workflow()?;

        if let Some(tool) = workflow.tool(name) {
            let task_tags = { task.lock().await.tags().clone() };
            if !tool.required_tags.is_subset(&task_tags) {
                let mut required: Vec<&str> =
                    tool.required_tags.iter().map(String::as_str).collect();
                required.sort_unstable();
                let mut actual: Vec<&str> = task_tags.iter().map(String::as_str).collect();
                actual.sort_unstable();
                return Err(RuntimeError::TagMismatch {
                    tool: name.to_string(),
                    required: required.join(", "),
                    actual: actual.join(", "),
                });
            }
            let result = workflow.call_tool(name, task, inject, args).await?;
            return Ok(tool_result_message(result));
        }

        if let Some(service) = &self.tool_service {
            let mut args = args;
            args.insert("context".to_string(), Value::Object(ctx.to_json()));
            let result = match service.call_tool(name, args).await {
                Ok(result) => result,
                Err(err @ RuntimeError::ToolTransport(_)) => return Err(err),
                Err(err) => ToolCallResult::error(err.to_string()),
            };
            return Ok(tool_result_message(result));
        }

        Err(RuntimeError::ToolNotFound(name.to_string()))
    }

    /// Drives one task through the workflow until the terminal event.
    ///
    /// The workflow is cloned so concurrent runs do not share stage state.
    /// Each round consumes the entry event, advances through the events the
    /// stage actions return, and closes when an action hands back the entry
    /// event; the terminal event ends the run. No action runs in the
    /// terminal stage.
    pub async fn run_task_stream(
        &self,
        ctx: &RunContext,
        queue: &QueueRef,
        task: TaskRef<T>,
    ) -> Result<TaskRef<T>, RuntimeError> {
        let mut workflow = self.workflow()?;
        let chain = workflow.event_chain().to_vec();
        let (first, last) = match (chain.first(), chain.last()) {
            (Some(first), Some(last)) => (first.clone(), last.clone()),
            // A built workflow always has a chain; an empty one means the
            // workflow was never compiled.
            _ => return Err(RuntimeError::NotCompiled),
        };

        let mut event = first.clone();
        let mut finished = false;
        while !finished {
            for hook in self.run_hooks(|h| h.pre_run_once.clone()) {
                hook.call(ctx, queue, &task).await;
            }

            loop {
                workflow.handle_event(event.clone()).await?;
                if event == last {
                    finished = true;
                    break;
                }
                let action = workflow.action()?;
                event = action(
                    workflow.clone(),
                    ctx.clone(),
                    Arc::clone(queue),
                    Arc::clone(&task),
                )
                .await?;
                debug!(
                    agent = %self.id,
                    workflow = %workflow.id(),
                    stage = %workflow.current_stage().name(),
                    event = %event.name(),
                    "stage action returned event"
                );
                if event == first {
                    break;
                }
            }

            for hook in self.run_hooks(|h| h.post_run_once.clone()) {
                hook.call(ctx, queue, &task).await;
            }
        }

        Ok(task)
    }
}
