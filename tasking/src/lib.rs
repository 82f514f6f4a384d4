//! # Tasking
//!
//! An orchestration runtime for LLM-driven agent tasks: given a request, it
//! drives one or more model sessions through a disciplined
//! **observe → think → act** cycle until a terminal condition is reached,
//! coordinating tool dispatch, stage transitions, hierarchical sub-task
//! decomposition, retry policy, and streaming of intermediate messages to a
//! consumer queue.
//!
//! ## Architecture
//!
//! Three interlocking state machines, leaves first:
//!
//! - [`machine`]: the generic FSM — validated states, event-driven
//!   transitions, compile-time reachability.
//! - [`task`]: [`Task`] specialises the FSM for work units (tags, typed I/O,
//!   per-state message contexts, revisit accounting); [`TreeTask`] adds
//!   parent/child links with a depth bound; [`task::views`] renders tasks.
//! - [`workflow`]: a stage-level FSM encoding an agent's inner loop; each
//!   stage binds a prompt, observe function, action, and completion config;
//!   a fixed event chain paces the rounds.
//! - [`agent`]: binds per-stage LLMs + tools + one workflow; exposes the
//!   observe/think/act primitives with pre/post hooks and
//!   [`Agent::run_task_stream`] ("repeat the event chain until terminal").
//!   [`agent::react`] and [`agent::supervise`] are the standard workflows.
//! - [`scheduler`]: the outer loop driving a task's lifecycle states via
//!   per-state handlers, with retry/cancel policy and subtask recursion
//!   ([`build_simple_scheduler`], [`build_tree_scheduler`]).
//!
//! Around them: [`model`] (messages, completion config with the OpenAI- and
//! Anthropic-compatible serialisations, queues, run context), [`llm`] and
//! [`tool_service`] (the external interfaces the core consumes, with mocks),
//! [`middleware`] (step/token budget counters, human-in-the-loop client),
//! and [`utils`] (label extraction from model output).
//!
//! The runtime is a single-process cooperative scheduler: every LLM call,
//! tool invocation, queue operation, and human rendezvous is a suspension
//! point; tasks are owned by one coroutine at a time; only the counters and
//! the human rendezvous map are shared across threads.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::collections::{HashMap, HashSet};
//! use std::sync::Arc;
//!
//! use tasking::{
//!     base_task_states, base_task_transitions, build_react_agent,
//!     build_simple_scheduler, AsyncQueue, Llm, MockLlm, ReactStage, RunContext,
//!     Task, TaskEvent, TaskState,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let llm: Arc<dyn Llm> = Arc::new(MockLlm::with_text("<finish>\nTRUE\n</finish>"));
//! let llms = HashMap::from([
//!     (ReactStage::Reasoning, Arc::clone(&llm)),
//!     (ReactStage::Reflecting, llm),
//! ]);
//! let prompts = HashMap::from([
//!     (ReactStage::Reasoning, "Work on the task.".to_string()),
//!     (ReactStage::Reflecting, "Is the task done?".to_string()),
//! ]);
//! let executor = build_react_agent("executor", llms, prompts, None, None)?;
//! let scheduler = build_simple_scheduler(executor, 3)?;
//!
//! let task = Arc::new(tokio::sync::Mutex::new(Task::new(
//!     base_task_states(),
//!     TaskState::Inited,
//!     base_task_transitions(),
//!     "reply with a greeting",
//!     HashSet::new(),
//!     "demo",
//! )?));
//! let queue = AsyncQueue::shared();
//! scheduler
//!     .schedule(RunContext::with_identity("u", "p", "t"), queue, task)
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod context;
pub mod error;
pub mod llm;
pub mod machine;
pub mod middleware;
pub mod model;
pub mod scheduler;
pub mod task;
pub mod tool_service;
pub mod utils;
pub mod workflow;

pub use agent::{
    build_react_agent, build_react_agent_from_settings, build_react_workflow,
    build_supervise_agent, build_supervise_workflow, Agent, ReactEvent, ReactStage,
    SuperviseEvent, SuperviseStage,
};
pub use context::Context;
pub use error::{CompileError, RuntimeError};
pub use llm::{Llm, MockLlm};
pub use machine::{
    EventName, StageName, StateMachine, StateName, Transition, TransitionCtx, TransitionHook,
    TransitionTable,
};
pub use middleware::{
    BaseStepCounter, ChannelHumanClient, HumanClient, MaxStepCounter, StepCounter,
    TokenStepCounter,
};
pub use model::{
    AsyncQueue, CompletionConfig, CompletionUsage, ContentBlock, Message, Queue, QueueError,
    QueueRef, Role, RunContext, StopReason, ToolCallRequest, ToolSpec,
};
pub use scheduler::{build_simple_scheduler, build_tree_scheduler, Scheduler, StateHandler};
pub use task::{
    base_task_states, base_task_transitions, Task, TaskEvent, TaskLike, TaskPayload, TaskRef,
    TaskState, TreeTask, TreeTaskRef,
};
pub use tool_service::{MockToolService, ToolCallResult, ToolService};
pub use workflow::{ObserveFn, ToolDeps, ToolHandler, Workflow, WorkflowBuilder, WorkflowTool};
