//! Integration test: building a ReAct agent from loaded settings.

mod init_logging;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::Mutex;

use tasking::{
    base_task_states, base_task_transitions, build_react_agent_from_settings, AsyncQueue, Llm,
    MockLlm, QueueRef, ReactStage, RunContext, RuntimeError, Task, TaskEvent, TaskLike, TaskRef,
    TaskState,
};

type TestTask = Task<TaskState, TaskEvent>;

const SETTINGS: &str = r#"
[agents.executor]
agent_type = "react"

[agents.executor.stages.REASONING]
model = "test-model"
base_url = "http://localhost:9999/v1"
api_key = "sk-local"
temperature = 0.3
max_tokens = 1024

[agents.executor.stages.REFLECTING]
model = "test-model"
"#;

/// **Scenario**: the settings loader supplies agent type and per-stage LLM
/// parameters; the factory sees the stage model and the agent runs.
#[tokio::test]
async fn react_agent_from_settings_runs() {
    let settings = env_config::Settings::from_toml_str(SETTINGS).expect("valid settings");
    let seen_models: Arc<std::sync::Mutex<Vec<String>>> =
        Arc::new(std::sync::Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen_models);

    let factory = move |stage: &env_config::LlmSettings| -> Arc<dyn Llm> {
        if let Ok(mut models) = sink.lock() {
            models.push(stage.model.clone().unwrap_or_default());
        }
        Arc::new(MockLlm::with_text("<finish>\nTRUE\n</finish>"))
    };

    let prompts = HashMap::from([
        (ReactStage::Reasoning, "Work on the task.".to_string()),
        (ReactStage::Reflecting, "Is the task done?".to_string()),
    ]);
    let agent = build_react_agent_from_settings::<TestTask>(
        "executor",
        &settings,
        &factory,
        prompts,
        None,
        None,
    )
    .expect("valid agent");
    assert_eq!(agent.agent_type(), "react");
    assert_eq!(
        seen_models.lock().expect("no poison").as_slice(),
        ["test-model", "test-model"]
    );

    let task: TaskRef<TestTask> = Arc::new(Mutex::new(
        Task::new(
            base_task_states(),
            TaskState::Inited,
            base_task_transitions(),
            "p",
            HashSet::new(),
            "settings-test",
        )
        .expect("valid task"),
    ));
    let queue: QueueRef = Arc::new(AsyncQueue::new());
    agent
        .run_task_stream(
            &RunContext::with_identity("u", "p", "t"),
            &queue,
            Arc::clone(&task),
        )
        .await
        .expect("run succeeds");
    assert!(task.lock().await.is_completed());
}

/// **Scenario**: an unknown agent name is rejected with a settings error.
#[test]
fn unknown_agent_name_is_rejected() {
    let settings = env_config::Settings::from_toml_str(SETTINGS).expect("valid settings");
    let factory =
        |_stage: &env_config::LlmSettings| -> Arc<dyn Llm> { Arc::new(MockLlm::with_text("x")) };
    let err = build_react_agent_from_settings::<TestTask>(
        "ghost",
        &settings,
        &factory,
        HashMap::new(),
        None,
        None,
    )
    .unwrap_err();
    assert!(matches!(err, RuntimeError::MissingAgentSettings(_)));
}
