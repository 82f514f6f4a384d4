//! Tree scheduler: the full lifecycle over a task tree.
//!
//! Inited clarifies intent (supervisor), Created plans (planner), Running
//! first drives every subtask to its end, then executes the task itself.
//! A canceled subtask sends the parent back to Inited for re-planning;
//! re-entering Inited cancels whatever is still unfinished and detaches the
//! canceled subtasks so planning starts from a clean tree.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::agent::Agent;
use crate::error::CompileError;
use crate::machine::{EventName, StageName};
use crate::task::{TaskEvent, TaskLike, TaskState, TreeTask};

use super::base::{Scheduler, StateHandler};

type TreeNode = TreeTask<TaskState, TaskEvent>;

/// Builds the standard tree scheduler around three agents: `supervisor`
/// (intent clarification), `planner` (decomposition), `executor` (the work).
/// Supervisor and planner are optional; their stages degrade to plain
/// transitions.
pub fn build_tree_scheduler<SupWS, SupWE, PlanWS, PlanWE, ExecWS, ExecWE>(
    supervisor: Option<Arc<Agent<SupWS, SupWE, TreeNode>>>,
    planner: Option<Arc<Agent<PlanWS, PlanWE, TreeNode>>>,
    executor: Arc<Agent<ExecWS, ExecWE, TreeNode>>,
    max_error_retry: i32,
) -> Result<Arc<Scheduler<TreeNode>>, CompileError>
where
    SupWS: StageName,
    SupWE: EventName,
    PlanWS: StageName,
    PlanWE: EventName,
    ExecWS: StageName,
    ExecWE: EventName,
{
    let mut on_state: HashMap<TaskState, StateHandler<TreeNode>> = HashMap::new();
    let mut on_state_changed: HashMap<(TaskState, TaskState), StateHandler<TreeNode>> =
        HashMap::new();

    // Inited: clarify, then restart the lifecycle from a clean slate.
    on_state.insert(
        TaskState::Inited,
        Arc::new(move |_scheduler, ctx, queue, task| {
            let supervisor = supervisor.clone();
            Box::pin(async move {
                if let Some(supervisor) = supervisor {
                    supervisor
                        .run_task_stream(&ctx, &queue, Arc::clone(&task))
                        .await?;
                }

                let sub_tasks = {
                    let mut guard = task.lock().await;
                    guard.reset()?;
                    guard.clear_error();
                    guard.sub_tasks()
                };
                // Cancel whatever has not reached an end, then drop the
                // canceled nodes so re-planning starts from a clean tree.
                for sub_task in &sub_tasks {
                    let state = { *sub_task.lock().await.current_state() };
                    if state != TaskState::Finished && state != TaskState::Canceled {
                        sub_task.lock().await.handle_event(TaskEvent::Cancel)?;
                    }
                }
                for sub_task in &sub_tasks {
                    let state = { *sub_task.lock().await.current_state() };
                    if state == TaskState::Canceled {
                        TreeTask::pop_sub_task(&task, sub_task).await?;
                    }
                }

                Ok(Some(TaskEvent::Identified))
            })
        }),
    );

    // Created: plan the decomposition.
    on_state.insert(
        TaskState::Created,
        Arc::new(move |_scheduler, ctx, queue, task| {
            let planner = planner.clone();
            Box::pin(async move {
                if let Some(planner) = planner {
                    planner
                        .run_task_stream(&ctx, &queue, Arc::clone(&task))
                        .await?;
                }
                Ok(Some(TaskEvent::Planned))
            })
        }),
    );

    // Running: subtasks first, then the task itself.
    on_state.insert(
        TaskState::Running,
        Arc::new(move |scheduler, ctx, queue, task| {
            let executor = Arc::clone(&executor);
            Box::pin(async move {
                let sub_tasks = { task.lock().await.sub_tasks() };
                for sub_task in &sub_tasks {
                    scheduler
                        .schedule(ctx.clone(), Arc::clone(&queue), Arc::clone(sub_task))
                        .await?;
                }

                // A canceled subtask invalidates the plan: back to Inited.
                for sub_task in &sub_tasks {
                    if *sub_task.lock().await.current_state() == TaskState::Canceled {
                        return Ok(Some(TaskEvent::Init));
                    }
                }

                executor
                    .run_task_stream(&ctx, &queue, Arc::clone(&task))
                    .await?;
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

    let end_states: HashSet<TaskState> =
        [TaskState::Finished, TaskState::Canceled].into_iter().collect();

    Scheduler::new(end_states, on_state, on_state_changed, max_error_retry)
}
