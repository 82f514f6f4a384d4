//! Supervise workflow: clarify the task intent with the user until the goal
//! is understood.
//!
//! A single working stage loops on itself: each round prompts the LLM to
//! restate or question the task goal. When a human interjection arrives
//! (explicit rejection surfaces as a `HumanInterfere` error from the think
//! step, typically raised by a hook that consulted the human client), the
//! interjection is fed back into the context as a user message and the stage
//! loops; otherwise the workflow finishes.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use serde_json::Map;
use tracing::debug;

use crate::error::{CompileError, RuntimeError};
use crate::machine::{
    EventName, StageName, StateName, Transition, TransitionCtx, TransitionTable,
};
use crate::model::{CompletionConfig, Message};
use crate::task::TaskLike;
use crate::workflow::{ActionFn, ObserveFn, Workflow, WorkflowBuilder};

use super::base::Agent;
use super::react::requirement_observe_fn;

/// Supervise workflow stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuperviseStage {
    Clarifying,
    Finished,
}

impl StateName for SuperviseStage {
    fn name(&self) -> &str {
        match self {
            SuperviseStage::Clarifying => "CLARIFYING",
            SuperviseStage::Finished => "FINISHED",
        }
    }
}

impl StageName for SuperviseStage {
    fn list_stages() -> Vec<Self> {
        vec![SuperviseStage::Clarifying, SuperviseStage::Finished]
    }
}

/// Supervise workflow events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuperviseEvent {
    Clarify,
    Finish,
}

impl EventName for SuperviseEvent {
    fn name(&self) -> &str {
        match self {
            SuperviseEvent::Clarify => "CLARIFY",
            SuperviseEvent::Finish => "FINISH",
        }
    }
}

/// The supervise stage set.
pub fn supervise_stages() -> HashSet<SuperviseStage> {
    [SuperviseStage::Clarifying, SuperviseStage::Finished]
        .into_iter()
        .collect()
}

/// The supervise event chain: `[Clarify, Finish]`.
pub fn supervise_event_chain() -> Vec<SuperviseEvent> {
    vec![SuperviseEvent::Clarify, SuperviseEvent::Finish]
}

fn logged(next: SuperviseStage) -> Transition<SuperviseStage> {
    Transition::with_hook(
        next,
        Arc::new(|ctx: TransitionCtx<SuperviseStage>| {
            debug!(
                workflow = %ctx.machine_id,
                from = %ctx.from.name(),
                to = %ctx.to.name(),
                "workflow transition"
            );
            Box::pin(async {})
        }),
    )
}

/// Clarifying loops on Clarify and exits on Finish.
pub fn supervise_transitions() -> TransitionTable<SuperviseStage, SuperviseEvent> {
    let mut transitions = TransitionTable::new();
    transitions.insert(
        (SuperviseStage::Clarifying, SuperviseEvent::Clarify),
        logged(SuperviseStage::Clarifying),
    );
    transitions.insert(
        (SuperviseStage::Clarifying, SuperviseEvent::Finish),
        logged(SuperviseStage::Finished),
    );
    transitions
}

/// The clarifying action: prompt, observe, think; a human interjection loops
/// the stage, anything else finishes.
fn clarify_action<T: TaskLike>(
    agent: Weak<Agent<SuperviseStage, SuperviseEvent, T>>,
) -> ActionFn<SuperviseStage, SuperviseEvent, T> {
    Arc::new(move |workflow, ctx, queue, task| {
        let agent = agent.clone();
        Box::pin(async move {
            let agent = agent.upgrade().ok_or(RuntimeError::AgentDropped)?;

            let prompt = workflow.prompt()?.to_string();
            {
                task.lock().await.append_context(Message::user(prompt));
            }
            let observed = agent
                .observe(&ctx, &queue, &task, workflow.observe_fn()?, Map::new())
                .await?;
            let config = workflow.completion_config()?.clone();
            match agent
                .think(&ctx, &queue, workflow.current_stage(), &observed, &config)
                .await
            {
                Ok(reply) => {
                    task.lock().await.append_context(reply);
                    Ok(SuperviseEvent::Finish)
                }
                Err(RuntimeError::HumanInterfere(info)) => {
                    // The interjection re-enters the loop as user input.
                    task.lock().await.append_context(Message::user(info));
                    Ok(SuperviseEvent::Clarify)
                }
                Err(other) => Err(other),
            }
        })
    })
}

/// Builds the supervise workflow against an existing agent.
pub fn build_supervise_workflow<T: TaskLike>(
    agent: &Arc<Agent<SuperviseStage, SuperviseEvent, T>>,
    prompt: impl Into<String>,
    observe_fn: Option<ObserveFn<T>>,
    completion_config: Option<CompletionConfig>,
) -> Result<Workflow<SuperviseStage, SuperviseEvent, T>, CompileError> {
    let mut builder = WorkflowBuilder::new("supervise")
        .stages(supervise_stages(), SuperviseStage::Clarifying)
        .event_chain(supervise_event_chain())
        .stage_binding(
            SuperviseStage::Clarifying,
            prompt,
            observe_fn.unwrap_or_else(requirement_observe_fn),
            clarify_action(Arc::downgrade(agent)),
            completion_config.unwrap_or_default(),
        );
    for ((from, event), transition) in supervise_transitions() {
        builder = builder.transition(from, event, transition);
    }
    builder.build()
}

/// Builds a supervise agent: one clarifying LLM plus the standard workflow.
pub fn build_supervise_agent<T: TaskLike>(
    name: &str,
    llms: HashMap<SuperviseStage, Arc<dyn crate::llm::Llm>>,
    prompt: &str,
    human_client: Option<Arc<dyn crate::middleware::HumanClient>>,
) -> Result<Arc<Agent<SuperviseStage, SuperviseEvent, T>>, CompileError> {
    let agent = Arc::new(Agent::new(name, "supervise", llms, None, human_client));
    let workflow = build_supervise_workflow(&agent, prompt, None, None)?;
    agent.set_workflow(workflow);
    Ok(agent)
}
