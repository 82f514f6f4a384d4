//! Work units: state-machine-backed tasks, task trees, and views.
//!
//! A [`Task`] specialises the generic state machine with revisit accounting,
//! per-state message contexts, tags, typed I/O, and an error flag that is
//! independent of the state. [`TreeTask`] adds parent/child links with a
//! depth bound. [`TaskLike`] is the seam the workflow, agent, and scheduler
//! layers program against.

mod base;
mod states;
mod tree;
pub mod views;

pub use base::{Task, TaskHook, TaskTransition, TaskTransitions};
pub use states::{base_task_states, base_task_transitions, TaskEvent, TaskState};
pub use tree::{TreeTask, TreeTaskRef};

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::context::Context;
use crate::error::RuntimeError;
use crate::machine::{EventName, StateName};
use crate::model::Message;

/// Shared handle to a task: one cooperative owner at a time by convention.
pub type TaskRef<T> = Arc<tokio::sync::Mutex<T>>;

/// Task protocol or input payload: plain text or structured JSON.
#[derive(Debug, Clone)]
pub enum TaskPayload {
    Text(String),
    Structured(Value),
}

impl TaskPayload {
    pub fn empty() -> Self {
        Self::Text(String::new())
    }
}

impl fmt::Display for TaskPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Structured(v) => f.write_str(&v.to_string()),
        }
    }
}

impl From<String> for TaskPayload {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for TaskPayload {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Value> for TaskPayload {
    fn from(value: Value) -> Self {
        Self::Structured(value)
    }
}

/// The task surface the workflow, agent, and scheduler layers depend on.
///
/// Implemented by [`Task`] and, by delegation, [`TreeTask`]. All state is
/// mutated through this interface by the single coroutine that currently owns
/// the task.
pub trait TaskLike: Send + 'static {
    type State: StateName;
    type Event: EventName;

    fn id(&self) -> &str;
    fn current_state(&self) -> &Self::State;

    fn tags(&self) -> &HashSet<String>;
    fn task_type(&self) -> &str;
    fn title(&self) -> &str;
    fn set_title(&mut self, title: String);

    fn protocol(&self) -> &TaskPayload;
    fn input(&self) -> &TaskPayload;
    fn set_input(&mut self, input: TaskPayload);

    fn output(&self) -> &str;
    fn is_completed(&self) -> bool;
    /// Stores the output and marks the task completed. Does not change state.
    fn set_completed(&mut self, output: String);

    /// Error flag, independent of the current state.
    fn is_error(&self) -> bool;
    fn error_info(&self) -> &str;
    fn set_error(&mut self, info: String);
    fn clear_error(&mut self);

    /// The current state's message context.
    fn context(&self) -> &Context;
    /// Appends a message to the current state's context.
    fn append_context(&mut self, message: Message);

    fn state_visit_count(&self, state: &Self::State) -> u32;
    fn max_revisit_limit(&self) -> u32;
    fn set_max_revisit_limit(&mut self, limit: u32);

    /// Handles one event with revisit accounting.
    fn handle_event(&mut self, event: Self::Event) -> Result<(), RuntimeError>;
    /// Back to the initial state; contexts and visit counts recreated.
    fn reset(&mut self) -> Result<(), RuntimeError>;
}
