//! Integration test for the tree scheduler: subtasks run before the parent,
//! and a canceled subtask sends the parent back to Inited for re-planning.

mod init_logging;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::json;

use tasking::workflow::ActionFn;
use tasking::{
    base_task_states, base_task_transitions, build_tree_scheduler, Agent, AsyncQueue,
    CompletionConfig, EventName, Message, QueueRef, RunContext, StageName, StateName, TaskEvent,
    TaskLike, TaskState, Transition, TreeTask, TreeTaskRef, WorkflowBuilder,
};

type TreeNode = TreeTask<TaskState, TaskEvent>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StubStage {
    Work,
    Done,
}

impl StateName for StubStage {
    fn name(&self) -> &str {
        match self {
            StubStage::Work => "WORK",
            StubStage::Done => "DONE",
        }
    }
}

impl StageName for StubStage {
    fn list_stages() -> Vec<Self> {
        vec![StubStage::Work, StubStage::Done]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum StubEvent {
    Go,
    Finish,
}

impl EventName for StubEvent {
    fn name(&self) -> &str {
        match self {
            StubEvent::Go => "GO",
            StubEvent::Finish => "FINISH",
        }
    }
}

type StubBehavior =
    Arc<dyn Fn(tasking::TaskRef<TreeNode>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Builds an agent whose single-stage workflow runs `behavior` once per
/// `run_task_stream` call. No LLM involved.
fn stub_agent(
    name: &str,
    behavior: StubBehavior,
) -> Arc<Agent<StubStage, StubEvent, TreeNode>> {
    let agent = Arc::new(Agent::new(name, "stub", HashMap::new(), None, None));
    let action: ActionFn<StubStage, StubEvent, TreeNode> =
        Arc::new(move |_workflow, _ctx, _queue, task| {
            let behavior = Arc::clone(&behavior);
            Box::pin(async move {
                behavior(task).await;
                Ok(StubEvent::Finish)
            })
        });
    let workflow = WorkflowBuilder::new(name)
        .stages(
            [StubStage::Work, StubStage::Done].into_iter().collect(),
            StubStage::Work,
        )
        .transition(StubStage::Work, StubEvent::Go, Transition::to(StubStage::Work))
        .transition(
            StubStage::Work,
            StubEvent::Finish,
            Transition::to(StubStage::Done),
        )
        .event_chain(vec![StubEvent::Go, StubEvent::Finish])
        .stage_binding(
            StubStage::Work,
            "work",
            Arc::new(|_task, _opts| Box::pin(async { Ok(Message::user("observe")) })),
            action,
            CompletionConfig::default(),
        )
        .build()
        .expect("valid stub workflow");
    agent.set_workflow(workflow);
    agent
}

fn tree_node(title: &str) -> TreeTaskRef<TaskState, TaskEvent> {
    let node = TreeTask::new(
        base_task_states(),
        TaskState::Inited,
        base_task_transitions(),
        json!({"goal": title}),
        HashSet::new(),
        "tree",
        3,
    )
    .expect("valid node");
    {
        let mut guard = node.try_lock().expect("fresh node is uncontended");
        guard.set_title(title.to_string());
    }
    node
}

/// **Scenario**: root with subtasks A (succeeds) and B (fails, retries,
/// cancels). The canceled subtask sends the root back to Inited, where the
/// supervisor runs a second time seeing the doubled visit count; the canceled
/// subtask is detached and the second pass finishes the root.
#[tokio::test]
async fn canceled_subtask_restarts_planning() {
    let root = tree_node("root");
    let a = tree_node("A");
    let b = tree_node("B");

    // The supervisor records, per invocation, the task title and its Inited
    // visit count at that moment (the reset happens afterwards).
    let supervisor_log: Arc<std::sync::Mutex<Vec<(String, u32)>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));
    let log = Arc::clone(&supervisor_log);
    let supervisor = stub_agent(
        "supervisor",
        Arc::new(move |task| {
            let log = Arc::clone(&log);
            Box::pin(async move {
                let guard = task.lock().await;
                if let Ok(mut entries) = log.lock() {
                    entries.push((
                        guard.title().to_string(),
                        guard.state_visit_count(&TaskState::Inited),
                    ));
                }
            })
        }),
    );

    // The planner attaches A and B to the root on its first pass; later
    // passes (and subtasks) plan nothing.
    let plan_children = Arc::new(tokio::sync::Mutex::new(Some((a.clone(), b.clone()))));
    let planner = stub_agent(
        "planner",
        Arc::new(move |task| {
            let plan_children = Arc::clone(&plan_children);
            Box::pin(async move {
                let is_root = { task.lock().await.title() == "root" };
                if !is_root {
                    return;
                }
                if let Some((a, b)) = plan_children.lock().await.take() {
                    TreeTask::add_sub_task(&task, &a).await.expect("attach A");
                    TreeTask::add_sub_task(&task, &b).await.expect("attach B");
                }
            })
        }),
    );

    // The executor finishes everything except B, which always fails.
    let executor = stub_agent(
        "executor",
        Arc::new(|task| {
            Box::pin(async move {
                let mut guard = task.lock().await;
                if guard.title() == "B" {
                    guard.set_error("B cannot be executed".to_string());
                } else {
                    let output = format!("{} finished", guard.title());
                    guard.set_completed(output);
                }
            })
        }),
    );

    let scheduler = build_tree_scheduler(Some(supervisor), Some(planner), executor, 2)
        .expect("valid scheduler");

    let queue: QueueRef = Arc::new(AsyncQueue::new());
    scheduler
        .schedule(
            RunContext::with_identity("u", "p", "t"),
            queue,
            Arc::clone(&root),
        )
        .await
        .expect("schedule terminates");

    // Root finished on the second pass.
    {
        let guard = root.lock().await;
        assert_eq!(*guard.current_state(), TaskState::Finished);
        assert!(guard.is_completed());
        assert_eq!(guard.output(), "root finished");
        // B was detached during re-planning; only A remains.
        assert_eq!(guard.sub_tasks().len(), 1);
        assert!(Arc::ptr_eq(&guard.sub_tasks()[0], &a));
    }

    // A finished, B retried once then canceled with its error kept.
    {
        let guard = a.lock().await;
        assert_eq!(*guard.current_state(), TaskState::Finished);
        assert!(guard.is_completed());
    }
    {
        let guard = b.lock().await;
        assert_eq!(*guard.current_state(), TaskState::Canceled);
        assert!(guard.is_error());
        assert_eq!(guard.state_visit_count(&TaskState::Failed), 2);
        assert!(guard.is_root(), "popped subtask is detached");
    }

    // The supervisor ran twice on the root; on re-entry the Inited visit
    // count had doubled.
    let entries = supervisor_log.lock().expect("no poison");
    let root_entries: Vec<&(String, u32)> =
        entries.iter().filter(|(title, _)| title == "root").collect();
    assert_eq!(root_entries.len(), 2, "supervisor re-invoked after restart");
    assert_eq!(root_entries[0].1, 1);
    assert_eq!(root_entries[1].1, 2);
}

/// **Scenario**: a childless tree task runs straight through the lifecycle.
#[tokio::test]
async fn leaf_tree_task_finishes_without_subtasks() {
    let root = tree_node("solo");
    let executor = stub_agent(
        "executor",
        Arc::new(|task| {
            Box::pin(async move {
                let mut guard = task.lock().await;
                let output = format!("{} finished", guard.title());
                guard.set_completed(output);
            })
        }),
    );
    let scheduler =
        build_tree_scheduler::<StubStage, StubEvent, StubStage, StubEvent, StubStage, StubEvent>(
            None, None, executor, 2,
        )
        .expect("valid scheduler");

    let queue: QueueRef = Arc::new(AsyncQueue::new());
    scheduler
        .schedule(
            RunContext::with_identity("u", "p", "t"),
            queue,
            Arc::clone(&root),
        )
        .await
        .expect("schedule terminates");

    let guard = root.lock().await;
    assert_eq!(*guard.current_state(), TaskState::Finished);
    assert_eq!(guard.output(), "solo finished");
    assert!(guard.is_leaf());
}
