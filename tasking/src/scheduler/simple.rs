//! Simple scheduler: one executor agent, no clarification or planning
//! stages, retry-then-cancel on failure.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::agent::Agent;
use crate::error::CompileError;
use crate::machine::{EventName, StageName};
use crate::task::{TaskEvent, TaskLike, TaskState};

use super::base::{Scheduler, StateHandler};

/// Builds a scheduler that walks Inited -> Created -> Running directly and
/// runs `executor` in the Running state. A failed run retries until the
/// Failed state has been visited `max_error_retry` times, then cancels.
pub fn build_simple_scheduler<WS, WE, T>(
    executor: Arc<Agent<WS, WE, T>>,
    max_error_retry: i32,
) -> Result<Arc<Scheduler<T>>, CompileError>
where
    WS: StageName,
    WE: EventName,
    T: TaskLike<State = TaskState, Event = TaskEvent>,
{
    let mut on_state: HashMap<TaskState, StateHandler<T>> = HashMap::new();
    let mut on_state_changed: HashMap<(TaskState, TaskState), StateHandler<T>> = HashMap::new();

    // Intent and planning stages are skipped: straight to execution.
    on_state.insert(
        TaskState::Inited,
        Arc::new(|_scheduler, _ctx, _queue, _task| {
            Box::pin(async { Ok(Some(TaskEvent::Identified)) })
        }),
    );
    on_state.insert(
        TaskState::Created,
        Arc::new(|_scheduler, _ctx, _queue, _task| {
            Box::pin(async { Ok(Some(TaskEvent::Planned)) })
        }),
    );

    let running_executor = Arc::clone(&executor);
    on_state.insert(
        TaskState::Running,
        Arc::new(move |_scheduler, ctx, queue, task| {
            let executor = Arc::clone(&running_executor);
            Box::pin(async move {
                executor.run_task_stream(&ctx, &queue, Arc::clone(&task)).await?;
                if task.lock().await.is_error() {
                    Ok(Some(TaskEvent::Error))
                } else {
                    Ok(Some(TaskEvent::Done))
                }
            })
        }),
    );

    // Retry while the Failed state has budget left, then cancel.
    on_state_changed.insert(
        (TaskState::Running, TaskState::Failed),
        Arc::new(|scheduler, _ctx, _queue, task| {
            Box::pin(async move {
                let failed_count = task
                    .lock()
                    .await
                    .state_visit_count(&TaskState::Failed);
                if failed_count as i32 >= scheduler.max_revisit_count() {
                    Ok(Some(TaskEvent::Cancel))
                } else {
                    Ok(Some(TaskEvent::Retry))
                }
            })
        }),
    );
    // Graph edges to the terminal states; side-effect free.
    on_state_changed.insert(
        (TaskState::Failed, TaskState::Canceled),
        Arc::new(|_scheduler, _ctx, _queue, _task| Box::pin(async { Ok(None) })),
    );
    on_state_changed.insert(
        (TaskState::Running, TaskState::Finished),
        Arc::new(|_scheduler, _ctx, _queue, _task| Box::pin(async { Ok(None) })),
    );

    let end_states: HashSet<TaskState> = [
        TaskState::Finished,
        TaskState::Failed,
        TaskState::Canceled,
    ]
    .into_iter()
    .collect();

    Scheduler::new(end_states, on_state, on_state_changed, max_error_retry)
}
