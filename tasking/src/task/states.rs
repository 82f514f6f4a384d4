//! Canonical task lifecycle: states, events, and the default transition
//! table used by the schedulers.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::info;

use crate::machine::{EventName, StateName};

use super::{Task, TaskLike, TaskTransition, TaskTransitions};

/// Lifecycle states of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Inited,
    Created,
    Running,
    Finished,
    Failed,
    Canceled,
}

impl StateName for TaskState {
    fn name(&self) -> &str {
        match self {
            TaskState::Inited => "INITED",
            TaskState::Created => "CREATED",
            TaskState::Running => "RUNNING",
            TaskState::Finished => "FINISHED",
            TaskState::Failed => "FAILED",
            TaskState::Canceled => "CANCELED",
        }
    }
}

/// Lifecycle events of a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskEvent {
    /// Back to the initial state for re-planning.
    Init,
    /// Goal confirmed.
    Identified,
    /// Planning finished.
    Planned,
    /// Execution succeeded.
    Done,
    /// Execution failed.
    Error,
    /// Retry after a failure.
    Retry,
    /// Terminal cancellation.
    Cancel,
}

impl EventName for TaskEvent {
    fn name(&self) -> &str {
        match self {
            TaskEvent::Init => "INIT",
            TaskEvent::Identified => "IDENTIFIED",
            TaskEvent::Planned => "PLANNED",
            TaskEvent::Done => "DONE",
            TaskEvent::Error => "ERROR",
            TaskEvent::Retry => "RETRY",
            TaskEvent::Cancel => "CANCEL",
        }
    }
}

/// The full lifecycle state set.
pub fn base_task_states() -> HashSet<TaskState> {
    [
        TaskState::Inited,
        TaskState::Created,
        TaskState::Running,
        TaskState::Finished,
        TaskState::Failed,
        TaskState::Canceled,
    ]
    .into_iter()
    .collect()
}

/// The canonical transition table:
///
/// - Inited + Identified -> Created
/// - Created + Planned -> Running (clears error)
/// - Running + Done -> Finished
/// - Running + Error -> Failed
/// - Running + Init -> Inited (clears error)
/// - Failed + Retry -> Running (clears error)
/// - Failed + Cancel -> Canceled
/// - Inited / Created / Running + Cancel -> Canceled
///
/// The Cancel edges from non-failed states let a scheduler cancel a subtask
/// wherever its lifecycle stopped.
pub fn base_task_transitions() -> TaskTransitions<TaskState, TaskEvent> {
    let mut transitions = TaskTransitions::new();

    transitions.insert(
        (TaskState::Inited, TaskEvent::Identified),
        TaskTransition::with_hook(
            TaskState::Created,
            Arc::new(|task: &mut Task<TaskState, TaskEvent>| {
                info!(task = %task.id(), "task goal identified");
            }),
        ),
    );
    transitions.insert(
        (TaskState::Created, TaskEvent::Planned),
        TaskTransition::with_hook(
            TaskState::Running,
            Arc::new(|task: &mut Task<TaskState, TaskEvent>| {
                task.clear_error();
                info!(task = %task.id(), "task planned, entering execution");
            }),
        ),
    );
    transitions.insert(
        (TaskState::Running, TaskEvent::Done),
        TaskTransition::to(TaskState::Finished),
    );
    transitions.insert(
        (TaskState::Running, TaskEvent::Error),
        TaskTransition::to(TaskState::Failed),
    );
    transitions.insert(
        (TaskState::Running, TaskEvent::Init),
        TaskTransition::with_hook(
            TaskState::Inited,
            Arc::new(|task: &mut Task<TaskState, TaskEvent>| {
                task.clear_error();
                info!(task = %task.id(), "task sent back to initial state");
            }),
        ),
    );
    transitions.insert(
        (TaskState::Failed, TaskEvent::Retry),
        TaskTransition::with_hook(
            TaskState::Running,
            Arc::new(|task: &mut Task<TaskState, TaskEvent>| {
                task.clear_error();
                info!(task = %task.id(), "task retrying execution");
            }),
        ),
    );
    transitions.insert(
        (TaskState::Failed, TaskEvent::Cancel),
        TaskTransition::to(TaskState::Canceled),
    );
    transitions.insert(
        (TaskState::Inited, TaskEvent::Cancel),
        TaskTransition::to(TaskState::Canceled),
    );
    transitions.insert(
        (TaskState::Created, TaskEvent::Cancel),
        TaskTransition::to(TaskState::Canceled),
    );
    transitions.insert(
        (TaskState::Running, TaskEvent::Cancel),
        TaskTransition::to(TaskState::Canceled),
    );

    transitions
}
