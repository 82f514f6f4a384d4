//! Agents: per-stage LLMs bound to a workflow, with observe/think/act
//! primitives and pre/post hooks around every step.
//!
//! [`Agent`] is the generic engine; [`react`] and [`supervise`] provide the
//! two standard workflows (execution and intent clarification) plus their
//! builders.

mod base;
mod hooks;
pub mod react;
pub mod supervise;

pub use base::Agent;
pub use hooks::{ActHook, AgentHooks, MessageHook, MessagesHook, ObserveHook, RunHook};
pub use react::{
    build_react_agent, build_react_agent_from_settings, build_react_workflow,
    react_event_chain, react_stages, react_transitions, requirement_observe_fn, ReactEvent,
    ReactStage, BLOCKED_TOOL_CALL_TEXT, END_WORKFLOW_TOOL, REFLECT_STOP_WORDS,
};
pub use supervise::{
    build_supervise_agent, build_supervise_workflow, supervise_event_chain, supervise_stages,
    supervise_transitions, SuperviseEvent, SuperviseStage,
};
