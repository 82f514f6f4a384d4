//! Error types for the runtime.
//!
//! Two families: [`CompileError`] for construction-time validation failures
//! (state machines, workflows, schedulers) and [`RuntimeError`] for everything
//! that can go wrong while driving a task. Tool-reported failures are *not*
//! errors here: they are materialised as `is_error` tool messages and fed back
//! into the task context.

use thiserror::Error;

use crate::model::QueueError;

/// Validation failure while compiling a state machine, workflow, or scheduler.
///
/// Compile errors are fatal to the object being built: the constructor returns
/// `Err` and the half-built value is dropped.
#[derive(Debug, Error)]
pub enum CompileError {
    /// `compile()` was called a second time on the same machine.
    #[error("state machine has already been compiled")]
    AlreadyCompiled,

    /// The valid-state set is empty.
    #[error("valid states must be set before compilation")]
    EmptyStates,

    /// The initial state is not a member of the valid-state set.
    #[error("initial state {0} is not in valid states")]
    InvalidInitialState(String),

    /// No transition rules were provided.
    #[error("at least one transition rule must be set before compilation")]
    EmptyTransitions,

    /// Some valid states cannot be reached from the initial state.
    #[error("unreachable states detected from initial state {initial}: {states}")]
    UnreachableStates { initial: String, states: String },

    /// The workflow event chain is empty.
    #[error("event chain must be set before compilation")]
    EmptyEventChain,

    /// The workflow has no stage actions.
    #[error("actions must be set before compilation")]
    EmptyActions,

    /// The workflow has no stage prompts.
    #[error("prompts must be set before compilation")]
    EmptyPrompts,

    /// The workflow has no stage observe functions.
    #[error("observe functions must be set before compilation")]
    EmptyObserveFns,

    /// The scheduler has no end states.
    #[error("no end states configured, schedule can never terminate")]
    NoEndStates,

    /// An end state does not appear in any scheduler transition.
    #[error("end state {0} does not participate in any transition")]
    EndStateNotInTransitions(String),

    /// Some states cannot reach an end state under the configured revisit mode.
    #[error("states cannot reach an end state ({mode} mode): {states}")]
    UnreachableEndState { states: String, mode: &'static str },
}

/// Failure while driving a compiled machine, workflow, agent, or scheduler.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// Operation requires a compiled machine.
    #[error("state machine is not compiled")]
    NotCompiled,

    /// `handle_event` on a `(state, event)` pair with no transition rule.
    #[error("no transition defined for state {state} with event {event}")]
    NoTransition { state: String, event: String },

    /// A state was entered more often than the task's revisit limit allows.
    #[error("state {state} has been visited {count} times, exceeding the limit of {limit}")]
    RevisitExceeded { state: String, count: u32, limit: u32 },

    /// `handle_event` on a task whose revisit limit was never set above zero.
    #[error("max revisit limit must be greater than 0")]
    RevisitLimitUnset,

    /// A step or token counter hit its budget.
    #[error("budget exceeded: current {current}, limit {limit}")]
    BudgetExceeded { current: u64, limit: u64 },

    /// The counter variant does not support this operation.
    #[error("not supported: {0}")]
    NotSupported(&'static str),

    /// Tool name resolves neither in the workflow nor in the tool service.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// The task's tag set does not cover the tool's required tags.
    #[error("tool {tool} requires tags {required}, but task has tags {actual}")]
    TagMismatch {
        tool: String,
        required: String,
        actual: String,
    },

    /// Transport-level tool failure (network, protocol). Never tool-reported.
    #[error("tool transport error: {0}")]
    ToolTransport(String),

    /// The human user explicitly rejected a requested action.
    #[error("human interfere: {0}")]
    HumanInterfere(String),

    /// LLM call failed; propagated as-is.
    #[error("llm error: {0}")]
    Llm(String),

    /// The scheduler reached a state with no registered handler.
    #[error("no state handler registered for state {0}")]
    MissingStateHandler(String),

    /// A workflow stage is missing a prompt, observe function, action, or
    /// completion config.
    #[error("no {kind} registered for stage {stage}")]
    MissingStageBinding { stage: String, kind: &'static str },

    /// Attaching a tree task would exceed its depth bound.
    #[error("cannot set parent: depth {depth} exceeds max depth {max}")]
    DepthExceeded { depth: u32, max: u32 },

    /// A tree task may never become its own ancestor.
    #[error("a task may not be its own ancestor")]
    CyclicTask,

    /// The agent has no workflow attached.
    #[error("workflow is not set for this agent")]
    WorkflowNotSet,

    /// A workflow action outlived its owning agent.
    #[error("agent has been dropped")]
    AgentDropped,

    /// `pop_sub_task` on a node that is not a child.
    #[error("sub task not found in the sub task list")]
    SubTaskNotFound,

    /// A required runtime-context key (user_id / project_id / trace_id) is absent.
    #[error("missing runtime context key: {0}")]
    MissingContextKey(&'static str),

    /// Message queue failure.
    #[error(transparent)]
    Queue(#[from] QueueError),

    /// No settings entry for the named agent.
    #[error("no settings found for agent {0}")]
    MissingAgentSettings(String),

    /// A compile failure surfaced while building components at run time.
    #[error(transparent)]
    Compile(#[from] CompileError),
}
