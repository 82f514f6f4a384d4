//! Workflow: a stage-level state machine encoding an agent's inner loop.
//!
//! Each stage binds a prompt, an observe function, an action, and a
//! completion config; a fixed ordered **event chain** (first = entry event,
//! last = terminal event) tells the agent how to drive rounds. Workflows also
//! carry tag-gated local tools that the dispatcher resolves before falling
//! back to the external tool service.
//!
//! Build with [`WorkflowBuilder`]; `build()` compiles the stage machine
//! (reachability included) and enforces non-empty actions, prompts, observe
//! functions, and event chain. A built workflow is `Clone`: stage-immutable
//! parts are shared, so an agent clones a fresh one per run to keep
//! concurrent runs from sharing stage state.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::{Map, Value};

use crate::error::{CompileError, RuntimeError};
use crate::machine::{
    EventName, StageName, StateMachine, Transition, TransitionTable,
};
use crate::model::{CompletionConfig, Message, QueueRef, RunContext, ToolSpec};
use crate::task::{TaskLike, TaskRef};
use crate::tool_service::ToolCallResult;

/// Builds one observation message from the task (e.g. a requirement view).
pub type ObserveFn<T> = Arc<
    dyn Fn(TaskRef<T>, Map<String, Value>) -> BoxFuture<'static, Result<Message, RuntimeError>>
        + Send
        + Sync,
>;

/// One stage's action: observe, think, act, and return the next workflow
/// event.
///
/// Receives its own clone of the workflow (stage-immutable parts are shared)
/// plus owned handles, so the returned future is `'static`.
pub type ActionFn<WS, WE, T> = Arc<
    dyn Fn(
            Workflow<WS, WE, T>,
            RunContext,
            QueueRef,
            TaskRef<T>,
        ) -> BoxFuture<'static, Result<WE, RuntimeError>>
        + Send
        + Sync,
>;

/// Dependencies injected into a workflow-local tool at call time. These never
/// appear in the LLM-visible schema.
pub struct ToolDeps<T> {
    /// The task the tool acts on.
    pub task: TaskRef<T>,
    /// Extra injected arguments from the caller.
    pub inject: Map<String, Value>,
}

/// Workflow-local tool body.
pub type ToolHandler<T> = Arc<
    dyn Fn(Map<String, Value>, ToolDeps<T>) -> BoxFuture<'static, Result<ToolCallResult, RuntimeError>>
        + Send
        + Sync,
>;

/// A tool registered on a workflow, gated by the caller task's tags.
pub struct WorkflowTool<T> {
    pub spec: ToolSpec,
    /// Tags the task must carry (superset check) before the tool may run.
    pub required_tags: HashSet<String>,
    pub handler: ToolHandler<T>,
}

impl<T> Clone for WorkflowTool<T> {
    fn clone(&self) -> Self {
        Self {
            spec: self.spec.clone(),
            required_tags: self.required_tags.clone(),
            handler: Arc::clone(&self.handler),
        }
    }
}

/// Stage machine plus per-stage bindings and local tools.
pub struct Workflow<WS, WE, T> {
    name: String,
    machine: StateMachine<WS, WE>,
    prompts: HashMap<WS, String>,
    observe_fns: HashMap<WS, ObserveFn<T>>,
    actions: HashMap<WS, ActionFn<WS, WE, T>>,
    completion_configs: HashMap<WS, CompletionConfig>,
    event_chain: Vec<WE>,
    tools: HashMap<String, WorkflowTool<T>>,
}

impl<WS: StageName, WE: EventName, T: TaskLike> Clone for Workflow<WS, WE, T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            machine: self.machine.clone(),
            prompts: self.prompts.clone(),
            observe_fns: self.observe_fns.clone(),
            actions: self.actions.clone(),
            completion_configs: self.completion_configs.clone(),
            event_chain: self.event_chain.clone(),
            tools: self.tools.clone(),
        }
    }
}

impl<WS: StageName, WE: EventName, T: TaskLike> Workflow<WS, WE, T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &str {
        self.machine.id()
    }

    pub fn current_stage(&self) -> &WS {
        self.machine.current_state()
    }

    pub fn has_stage(&self, stage: &WS) -> bool {
        self.machine.valid_states().contains(stage)
    }

    /// The event chain: first entry event, last terminal event.
    pub fn event_chain(&self) -> &[WE] {
        &self.event_chain
    }

    /// The current stage's prompt.
    pub fn prompt(&self) -> Result<&str, RuntimeError> {
        let stage = self.machine.current_state();
        self.prompts
            .get(stage)
            .map(String::as_str)
            .ok_or_else(|| missing(stage, "prompt"))
    }

    /// The current stage's observe function.
    pub fn observe_fn(&self) -> Result<ObserveFn<T>, RuntimeError> {
        let stage = self.machine.current_state();
        self.observe_fns
            .get(stage)
            .cloned()
            .ok_or_else(|| missing(stage, "observe function"))
    }

    /// The current stage's action.
    pub fn action(&self) -> Result<ActionFn<WS, WE, T>, RuntimeError> {
        let stage = self.machine.current_state();
        self.actions
            .get(stage)
            .cloned()
            .ok_or_else(|| missing(stage, "action"))
    }

    /// The current stage's completion config.
    pub fn completion_config(&self) -> Result<&CompletionConfig, RuntimeError> {
        let stage = self.machine.current_state();
        self.completion_configs
            .get(stage)
            .ok_or_else(|| missing(stage, "completion config"))
    }

    /// Registers a local tool. The schema describes only the LLM-visible
    /// arguments; injected dependencies arrive via [`ToolDeps`].
    pub fn add_tool(
        &mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        required_tags: HashSet<String>,
        handler: ToolHandler<T>,
    ) {
        let name = name.into();
        self.tools.insert(
            name.clone(),
            WorkflowTool {
                spec: ToolSpec {
                    name,
                    description: Some(description.into()),
                    input_schema,
                },
                required_tags,
                handler,
            },
        );
    }

    pub fn tool(&self, name: &str) -> Option<&WorkflowTool<T>> {
        self.tools.get(name)
    }

    pub fn tools(&self) -> &HashMap<String, WorkflowTool<T>> {
        &self.tools
    }

    /// Runs a local tool and normalises the outcome.
    ///
    /// A handler error becomes an `is_error` result carrying the error text,
    /// except transport errors, which propagate.
    pub async fn call_tool(
        &self,
        name: &str,
        task: &TaskRef<T>,
        inject: Map<String, Value>,
        args: Map<String, Value>,
    ) -> Result<ToolCallResult, RuntimeError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| RuntimeError::ToolNotFound(name.to_string()))?;
        let deps = ToolDeps {
            task: Arc::clone(task),
            inject,
        };
        match (tool.handler)(args, deps).await {
            Ok(result) => Ok(result),
            Err(err @ RuntimeError::ToolTransport(_)) => Err(err),
            Err(err) => Ok(ToolCallResult::error(err.to_string())),
        }
    }

    /// Advances the stage machine by one event.
    pub async fn handle_event(&mut self, event: WE) -> Result<(), RuntimeError> {
        self.machine.handle_event(event).await
    }

    /// Back to the initial stage.
    pub fn reset(&mut self) -> Result<(), RuntimeError> {
        self.machine.reset()
    }
}

fn missing<WS: StageName>(stage: &WS, kind: &'static str) -> RuntimeError {
    RuntimeError::MissingStageBinding {
        stage: stage.name().to_string(),
        kind,
    }
}

/// Builder for [`Workflow`]; `build()` compiles and validates.
pub struct WorkflowBuilder<WS, WE, T> {
    name: String,
    valid_stages: HashSet<WS>,
    initial_stage: Option<WS>,
    transitions: TransitionTable<WS, WE>,
    prompts: HashMap<WS, String>,
    observe_fns: HashMap<WS, ObserveFn<T>>,
    actions: HashMap<WS, ActionFn<WS, WE, T>>,
    completion_configs: HashMap<WS, CompletionConfig>,
    event_chain: Vec<WE>,
    tools: HashMap<String, WorkflowTool<T>>,
}

impl<WS: StageName, WE: EventName, T: TaskLike> WorkflowBuilder<WS, WE, T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            valid_stages: HashSet::new(),
            initial_stage: None,
            transitions: TransitionTable::new(),
            prompts: HashMap::new(),
            observe_fns: HashMap::new(),
            actions: HashMap::new(),
            completion_configs: HashMap::new(),
            event_chain: Vec::new(),
            tools: HashMap::new(),
        }
    }

    /// Sets the stage set and the initial stage.
    pub fn stages(mut self, stages: HashSet<WS>, initial: WS) -> Self {
        self.valid_stages = stages;
        self.initial_stage = Some(initial);
        self
    }

    /// Adds one transition rule.
    pub fn transition(mut self, from: WS, event: WE, transition: Transition<WS>) -> Self {
        self.transitions.insert((from, event), transition);
        self
    }

    /// Sets the ordered event chain (entry first, terminal last).
    pub fn event_chain(mut self, chain: Vec<WE>) -> Self {
        self.event_chain = chain;
        self
    }

    /// Binds prompt, observe function, action, and completion config to a
    /// stage. Terminal stages are typically left unbound.
    pub fn stage_binding(
        mut self,
        stage: WS,
        prompt: impl Into<String>,
        observe_fn: ObserveFn<T>,
        action: ActionFn<WS, WE, T>,
        completion_config: CompletionConfig,
    ) -> Self {
        self.prompts.insert(stage.clone(), prompt.into());
        self.observe_fns.insert(stage.clone(), observe_fn);
        self.actions.insert(stage.clone(), action);
        self.completion_configs.insert(stage, completion_config);
        self
    }

    /// Registers a local tool (see [`Workflow::add_tool`]).
    pub fn tool(
        mut self,
        name: impl Into<String>,
        description: impl Into<String>,
        input_schema: Value,
        required_tags: HashSet<String>,
        handler: ToolHandler<T>,
    ) -> Self {
        let name = name.into();
        self.tools.insert(
            name.clone(),
            WorkflowTool {
                spec: ToolSpec {
                    name,
                    description: Some(description.into()),
                    input_schema,
                },
                required_tags,
                handler,
            },
        );
        self
    }

    /// Compiles the stage machine and validates the workflow bindings.
    pub fn build(self) -> Result<Workflow<WS, WE, T>, CompileError> {
        let initial = self.initial_stage.ok_or(CompileError::EmptyStates)?;
        let mut machine = StateMachine::new(self.valid_stages, initial, self.transitions);
        machine.compile()?;

        if self.event_chain.is_empty() {
            return Err(CompileError::EmptyEventChain);
        }
        if self.actions.is_empty() {
            return Err(CompileError::EmptyActions);
        }
        if self.prompts.is_empty() {
            return Err(CompileError::EmptyPrompts);
        }
        if self.observe_fns.is_empty() {
            return Err(CompileError::EmptyObserveFns);
        }

        Ok(Workflow {
            name: self.name,
            machine,
            prompts: self.prompts,
            observe_fns: self.observe_fns,
            actions: self.actions,
            completion_configs: self.completion_configs,
            event_chain: self.event_chain,
            tools: self.tools,
        })
    }
}
