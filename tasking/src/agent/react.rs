//! ReAct workflow: reason over the task, execute tool calls, reflect, and
//! either finish or loop back to reasoning.
//!
//! Stages `Reasoning -> Reflecting -> Finished`, driven by the event chain
//! `[Reason, Reflect, Finish]`. The reflecting stage offers the
//! `end_workflow` tool and stop-words around the finish flag, so the model
//! either calls the tool or emits `<finish>TRUE</finish>` and lets the action
//! finish the workflow manually.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{CompileError, RuntimeError};
use crate::machine::{
    EventName, StageName, StateName, Transition, TransitionCtx, TransitionTable,
};
use crate::model::{
    CompletionConfig, ContentBlock, Message, QueueRef, Role, RunContext, StopReason,
};
use crate::task::views::RequirementView;
use crate::task::{TaskLike, TaskRef};
use crate::utils::extract_by_label;
use crate::workflow::{ActionFn, ObserveFn, ToolHandler, Workflow, WorkflowBuilder};

use super::base::Agent;

/// Name of the workflow-local tool that completes the task.
pub const END_WORKFLOW_TOOL: &str = "end_workflow";

/// Fixed text of the tool messages that replace calls blocked by an earlier
/// failure in the same turn.
pub const BLOCKED_TOOL_CALL_TEXT: &str =
    "since a previous tool call failed, subsequent tool calls are disallowed";

/// Stop words that cut generation right after the finish flag closes.
pub const REFLECT_STOP_WORDS: [&str; 4] =
    ["</final_flag>", "</finish>", "</finish_flag>", "</end_flag>"];

const FINISH_LABELS: [&str; 3] = ["finish", "finish_flag", "finish_workflow"];

/// ReAct workflow stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactStage {
    Reasoning,
    Reflecting,
    Finished,
}

impl StateName for ReactStage {
    fn name(&self) -> &str {
        match self {
            ReactStage::Reasoning => "REASONING",
            ReactStage::Reflecting => "REFLECTING",
            ReactStage::Finished => "FINISHED",
        }
    }
}

impl StageName for ReactStage {
    fn list_stages() -> Vec<Self> {
        vec![
            ReactStage::Reasoning,
            ReactStage::Reflecting,
            ReactStage::Finished,
        ]
    }
}

/// ReAct workflow events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactEvent {
    Reason,
    Reflect,
    Finish,
}

impl EventName for ReactEvent {
    fn name(&self) -> &str {
        match self {
            ReactEvent::Reason => "REASON",
            ReactEvent::Reflect => "REFLECT",
            ReactEvent::Finish => "FINISH",
        }
    }
}

/// The ReAct stage set.
pub fn react_stages() -> HashSet<ReactStage> {
    [
        ReactStage::Reasoning,
        ReactStage::Reflecting,
        ReactStage::Finished,
    ]
    .into_iter()
    .collect()
}

/// The ReAct event chain: `[Reason, Reflect, Finish]`.
pub fn react_event_chain() -> Vec<ReactEvent> {
    vec![ReactEvent::Reason, ReactEvent::Reflect, ReactEvent::Finish]
}

fn logged(next: ReactStage) -> Transition<ReactStage> {
    Transition::with_hook(
        next,
        Arc::new(|ctx: TransitionCtx<ReactStage>| {
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

/// The ReAct transitions:
/// Reasoning + Reflect -> Reflecting, Reflecting + Finish -> Finished,
/// Reflecting + Reason -> Reasoning, plus the Reason self-loop on Reasoning
/// that absorbs the chain's entry event at the start of every round.
pub fn react_transitions() -> TransitionTable<ReactStage, ReactEvent> {
    let mut transitions = TransitionTable::new();
    transitions.insert(
        (ReactStage::Reasoning, ReactEvent::Reason),
        logged(ReactStage::Reasoning),
    );
    transitions.insert(
        (ReactStage::Reasoning, ReactEvent::Reflect),
        logged(ReactStage::Reflecting),
    );
    transitions.insert(
        (ReactStage::Reflecting, ReactEvent::Finish),
        logged(ReactStage::Finished),
    );
    transitions.insert(
        (ReactStage::Reflecting, ReactEvent::Reason),
        logged(ReactStage::Reasoning),
    );
    transitions
}

/// Observe function that renders the task as a requirement sheet in a user
/// message.
pub fn requirement_observe_fn<T: TaskLike>() -> ObserveFn<T> {
    Arc::new(|task, _opts| {
        Box::pin(async move {
            let guard = task.lock().await;
            Ok(Message::user(RequirementView::render(&*guard)))
        })
    })
}

/// Handler of `end_workflow`: extracts `<output>…</output>` from the message
/// argument (falling back to the whole message) and completes the task.
fn end_workflow_handler<T: TaskLike>() -> ToolHandler<T> {
    Arc::new(|args, deps| {
        Box::pin(async move {
            let message = args
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let extracted = extract_by_label(&message, &["output"]);
            let output = if extracted.is_empty() {
                message
            } else {
                extracted
            };
            deps.task.lock().await.set_completed(output);
            Ok(crate::tool_service::ToolCallResult::text(
                "workflow finished, task output stored",
            ))
        })
    })
}

/// Executes an assistant turn's tool calls sequentially.
///
/// The first `is_error` result sets the task error and blocks the remaining
/// calls, which are materialised as error tool messages so every tool call
/// still gets exactly one tool-role reply in the context.
pub(crate) async fn run_tool_calls<WS, WE, T>(
    agent: &Agent<WS, WE, T>,
    ctx: &RunContext,
    queue: &QueueRef,
    task: &TaskRef<T>,
    message: &Message,
) -> Result<(), RuntimeError>
where
    WS: StageName,
    WE: EventName,
    T: TaskLike,
{
    if message.stop_reason != Some(StopReason::ToolCall) {
        return Ok(());
    }

    let mut allow_tool = true;
    for tool_call in &message.tool_calls {
        let result = if allow_tool {
            agent.act(ctx, queue, tool_call, task, Map::new()).await?
        } else {
            Message::tool_result(
                tool_call.id.clone(),
                vec![ContentBlock::text(BLOCKED_TOOL_CALL_TEXT)],
                true,
                Map::new(),
            )
        };
        debug!(tool = %tool_call.name, is_error = result.is_error, "tool call result");

        let failed = result.is_error;
        let text = result.text();
        {
            let mut guard = task.lock().await;
            guard.append_context(result);
            if failed && allow_tool {
                guard.set_error(text);
            }
        }
        if failed {
            allow_tool = false;
        }
    }
    Ok(())
}

/// The reasoning action: prompt, observe, think, then run any tool calls.
fn reason_action<T: TaskLike>(
    agent: Weak<Agent<ReactStage, ReactEvent, T>>,
) -> ActionFn<ReactStage, ReactEvent, T> {
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
            let message = agent
                .think(&ctx, &queue, workflow.current_stage(), &observed, &config)
                .await?;
            {
                task.lock().await.append_context(message.clone());
            }

            run_tool_calls(&agent, &ctx, &queue, &task, &message).await?;
            Ok(ReactEvent::Reflect)
        })
    })
}

/// The reflecting action: prompt, observe, think with the `end_workflow`
/// tool and finish stop-words, then decide the next event.
///
/// With no tool calls and the finish flag TRUE, `end_workflow` is invoked
/// manually with the last assistant message before the reflection. With no
/// tool calls and no TRUE flag, the workflow loops back to reasoning, as it
/// does when the task is flagged errored.
fn reflect_action<T: TaskLike>(
    agent: Weak<Agent<ReactStage, ReactEvent, T>>,
) -> ActionFn<ReactStage, ReactEvent, T> {
    Arc::new(move |workflow, ctx, queue, task| {
        let agent = agent.clone();
        Box::pin(async move {
            let agent = agent.upgrade().ok_or(RuntimeError::AgentDropped)?;

            let mut config = workflow.completion_config()?.clone();
            if let Some(end_tool) = workflow.tool(END_WORKFLOW_TOOL) {
                config.tools = vec![end_tool.spec.clone()];
            }
            config.stop_words = REFLECT_STOP_WORDS
                .iter()
                .map(|s| s.to_string())
                .collect();

            let prompt = workflow.prompt()?.to_string();
            {
                task.lock().await.append_context(Message::user(prompt));
            }
            let observed = agent
                .observe(&ctx, &queue, &task, workflow.observe_fn()?, Map::new())
                .await?;
            let message = agent
                .think(&ctx, &queue, workflow.current_stage(), &observed, &config)
                .await?;
            {
                task.lock().await.append_context(message.clone());
            }

            let finish_flag = extract_by_label(&message.content, &FINISH_LABELS);
            let finished_by_flag = finish_flag.trim().eq_ignore_ascii_case("true");
            let has_tool_calls = message.stop_reason == Some(StopReason::ToolCall);

            if has_tool_calls {
                run_tool_calls(&agent, &ctx, &queue, &task, &message).await?;
            } else if finished_by_flag {
                // The model signalled completion without calling the tool:
                // complete with the last assistant reply before this
                // reflection.
                let previous = {
                    let guard = task.lock().await;
                    let data = guard.context().data();
                    data.iter()
                        .rev()
                        .skip(1)
                        .find(|m| m.role == Role::Assistant)
                        .map(|m| m.content.clone())
                        .unwrap_or_default()
                };
                let mut args = Map::new();
                args.insert("message".to_string(), Value::String(previous));
                workflow
                    .call_tool(END_WORKFLOW_TOOL, &task, Map::new(), args)
                    .await?;
            }

            if task.lock().await.is_error() {
                return Ok(ReactEvent::Reason);
            }
            if has_tool_calls || finished_by_flag {
                Ok(ReactEvent::Finish)
            } else {
                Ok(ReactEvent::Reason)
            }
        })
    })
}

/// Builds the ReAct workflow against an existing agent.
///
/// `prompts` must cover Reasoning and Reflecting; observe functions default
/// to the requirement sheet, completion configs to
/// [`CompletionConfig::default`]. The `end_workflow` tool is registered with
/// no required tags.
pub fn build_react_workflow<T: TaskLike>(
    agent: &Arc<Agent<ReactStage, ReactEvent, T>>,
    prompts: HashMap<ReactStage, String>,
    observe_fns: Option<HashMap<ReactStage, ObserveFn<T>>>,
    completion_configs: Option<HashMap<ReactStage, CompletionConfig>>,
) -> Result<Workflow<ReactStage, ReactEvent, T>, CompileError> {
    let mut observe_fns = observe_fns.unwrap_or_default();
    let mut completion_configs = completion_configs.unwrap_or_default();

    let mut builder = WorkflowBuilder::new("react")
        .stages(react_stages(), ReactStage::Reasoning)
        .event_chain(react_event_chain())
        .tool(
            END_WORKFLOW_TOOL,
            "Finish the workflow and store the task output. Pass the final \
             answer in `message`, wrapped in <output></output> labels.",
            json!({
                "type": "object",
                "properties": {
                    "message": {
                        "type": "string",
                        "description": "final output, wrapped in <output></output>"
                    }
                },
                "required": ["message"]
            }),
            HashSet::new(),
            end_workflow_handler(),
        );

    for ((from, event), transition) in react_transitions() {
        builder = builder.transition(from, event, transition);
    }

    for (stage, action) in [
        (
            ReactStage::Reasoning,
            reason_action(Arc::downgrade(agent)),
        ),
        (
            ReactStage::Reflecting,
            reflect_action(Arc::downgrade(agent)),
        ),
    ] {
        let prompt = prompts.get(&stage).cloned().unwrap_or_default();
        let observe_fn = observe_fns
            .remove(&stage)
            .unwrap_or_else(requirement_observe_fn);
        let config = completion_configs.remove(&stage).unwrap_or_default();
        builder = builder.stage_binding(stage, prompt, observe_fn, action, config);
    }

    builder.build()
}

/// Builds a ReAct agent from loaded settings.
///
/// Each bound stage's `temperature` and `max_tokens` flow into its completion
/// config; `llm_factory` turns the stage settings (model, base_url, api_key)
/// into a client.
pub fn build_react_agent_from_settings<T: TaskLike>(
    name: &str,
    settings: &env_config::Settings,
    llm_factory: &dyn Fn(&env_config::LlmSettings) -> Arc<dyn crate::llm::Llm>,
    prompts: HashMap<ReactStage, String>,
    tool_service: Option<Arc<dyn crate::tool_service::ToolService>>,
    human_client: Option<Arc<dyn crate::middleware::HumanClient>>,
) -> Result<Arc<Agent<ReactStage, ReactEvent, T>>, RuntimeError> {
    let agent_settings = settings
        .agent(name)
        .ok_or_else(|| RuntimeError::MissingAgentSettings(name.to_string()))?;

    let mut llms = HashMap::new();
    let mut configs = HashMap::new();
    for stage in [ReactStage::Reasoning, ReactStage::Reflecting] {
        let stage_settings = agent_settings
            .stage(stage.name())
            .cloned()
            .unwrap_or_default();
        llms.insert(stage, llm_factory(&stage_settings));
        let mut config = CompletionConfig::default();
        if let Some(temperature) = stage_settings.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = stage_settings.max_tokens {
            config.max_tokens = max_tokens;
        }
        configs.insert(stage, config);
    }

    let agent = Arc::new(Agent::new(
        name,
        agent_settings.agent_type.clone(),
        llms,
        tool_service,
        human_client,
    ));
    let workflow = build_react_workflow(&agent, prompts, None, Some(configs))?;
    agent.set_workflow(workflow);
    Ok(agent)
}

/// Builds a ReAct agent: per-stage LLMs plus the standard workflow.
pub fn build_react_agent<T: TaskLike>(
    name: &str,
    llms: HashMap<ReactStage, Arc<dyn crate::llm::Llm>>,
    prompts: HashMap<ReactStage, String>,
    tool_service: Option<Arc<dyn crate::tool_service::ToolService>>,
    human_client: Option<Arc<dyn crate::middleware::HumanClient>>,
) -> Result<Arc<Agent<ReactStage, ReactEvent, T>>, CompileError> {
    let agent = Arc::new(Agent::new(
        name,
        "react",
        llms,
        tool_service,
        human_client,
    ));
    let workflow = build_react_workflow(&agent, prompts, None, None)?;
    agent.set_workflow(workflow);
    Ok(agent)
}
