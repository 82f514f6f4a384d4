//! Base task: a state machine carrying work-unit attributes.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use tracing::info;

use crate::context::Context;
use crate::error::{CompileError, RuntimeError};
use crate::machine::{EventName, StateMachine, StateName, Transition, TransitionTable};
use crate::model::Message;

use super::{TaskLike, TaskPayload};

/// Synchronous side-effect invoked when a task transition fires, before the
/// state switch. Receives the task so it can touch error info and I/O.
pub type TaskHook<S, E> = Arc<dyn Fn(&mut Task<S, E>) + Send + Sync>;

/// Task transition target plus optional callback.
#[derive(Clone)]
pub struct TaskTransition<S, E> {
    pub next: S,
    pub hook: Option<TaskHook<S, E>>,
}

impl<S, E> TaskTransition<S, E> {
    pub fn to(next: S) -> Self {
        Self { next, hook: None }
    }

    pub fn with_hook(next: S, hook: TaskHook<S, E>) -> Self {
        Self {
            next,
            hook: Some(hook),
        }
    }
}

/// Task transition table: `(state, event) -> transition`.
pub type TaskTransitions<S, E> = HashMap<(S, E), TaskTransition<S, E>>;

/// A work unit backed by a state machine.
///
/// Adds to the plain machine: per-state visit counting against a revisit
/// limit, a lazily-created message [`Context`] per state, tags, typed
/// protocol/input/output, and a completion/error pair that lives outside the
/// state graph.
pub struct Task<S, E> {
    machine: StateMachine<S, E>,
    transitions: TaskTransitions<S, E>,

    state_visit_counts: HashMap<S, u32>,
    max_revisit_limit: u32,

    tags: HashSet<String>,
    task_type: String,
    title: String,

    protocol: TaskPayload,
    input: TaskPayload,
    output: String,
    is_completed: bool,

    is_error: bool,
    error_info: String,

    contexts: HashMap<S, Context>,
}

impl<S: StateName, E: EventName> Task<S, E> {
    /// Builds and compiles a task. The machine is validated eagerly, visit
    /// counts start at zero with the initial state at one, and every valid
    /// state gets an empty context.
    pub fn new(
        valid_states: HashSet<S>,
        initial_state: S,
        transitions: TaskTransitions<S, E>,
        protocol: impl Into<TaskPayload>,
        tags: HashSet<String>,
        task_type: impl Into<String>,
    ) -> Result<Self, CompileError> {
        // The machine gets a hook-free copy of the table; task hooks run in
        // this type's handle_event so they can mutate the task itself.
        let edge_table: TransitionTable<S, E> = transitions
            .iter()
            .map(|((from, event), t)| {
                (
                    (from.clone(), event.clone()),
                    Transition::to(t.next.clone()),
                )
            })
            .collect();
        let mut machine = StateMachine::new(valid_states, initial_state, edge_table);
        machine.compile()?;

        let mut state_visit_counts: HashMap<S, u32> = machine
            .valid_states()
            .iter()
            .map(|s| (s.clone(), 0))
            .collect();
        state_visit_counts.insert(machine.initial_state().clone(), 1);
        let contexts = machine
            .valid_states()
            .iter()
            .map(|s| (s.clone(), Context::new()))
            .collect();

        Ok(Self {
            machine,
            transitions,
            state_visit_counts,
            max_revisit_limit: 1,
            tags,
            task_type: task_type.into(),
            title: String::new(),
            protocol: protocol.into(),
            input: TaskPayload::empty(),
            output: String::new(),
            is_completed: false,
            is_error: false,
            error_info: String::new(),
            contexts,
        })
    }

    /// All per-state contexts, keyed by state.
    pub fn contexts(&self) -> &HashMap<S, Context> {
        &self.contexts
    }
}

impl<S: StateName, E: EventName> fmt::Debug for Task<S, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.machine.id())
            .field("state", &self.machine.current_state())
            .field("tags", &self.tags)
            .field("is_completed", &self.is_completed)
            .field("is_error", &self.is_error)
            .finish()
    }
}

impl<S: StateName, E: EventName> TaskLike for Task<S, E> {
    type State = S;
    type Event = E;

    fn id(&self) -> &str {
        self.machine.id()
    }

    fn current_state(&self) -> &S {
        self.machine.current_state()
    }

    fn tags(&self) -> &HashSet<String> {
        &self.tags
    }

    fn task_type(&self) -> &str {
        &self.task_type
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn set_title(&mut self, title: String) {
        self.title = title;
    }

    fn protocol(&self) -> &TaskPayload {
        &self.protocol
    }

    fn input(&self) -> &TaskPayload {
        &self.input
    }

    fn set_input(&mut self, input: TaskPayload) {
        self.input = input;
    }

    fn output(&self) -> &str {
        &self.output
    }

    fn is_completed(&self) -> bool {
        self.is_completed
    }

    fn set_completed(&mut self, output: String) {
        self.output = output;
        self.is_completed = true;
        info!(task = %self.id(), "task marked completed");
    }

    fn is_error(&self) -> bool {
        self.is_error
    }

    fn error_info(&self) -> &str {
        &self.error_info
    }

    fn set_error(&mut self, info: String) {
        self.error_info = info;
        self.is_error = true;
        info!(task = %self.id(), "task error info updated");
    }

    fn clear_error(&mut self) {
        self.error_info.clear();
        self.is_error = false;
    }

    fn context(&self) -> &Context {
        // Every valid state gets a context at construction and the machine
        // only ever sits on valid states, so the lookup cannot miss.
        match self.contexts.get(self.machine.current_state()) {
            Some(ctx) => ctx,
            None => unreachable!("context exists for every valid state"),
        }
    }

    fn append_context(&mut self, message: Message) {
        let state = self.machine.current_state().clone();
        match self.contexts.get_mut(&state) {
            Some(ctx) => ctx.append(message),
            None => unreachable!("context exists for every valid state"),
        }
    }

    fn state_visit_count(&self, state: &S) -> u32 {
        self.state_visit_counts.get(state).copied().unwrap_or(0)
    }

    fn max_revisit_limit(&self) -> u32 {
        self.max_revisit_limit
    }

    fn set_max_revisit_limit(&mut self, limit: u32) {
        self.max_revisit_limit = limit;
    }

    /// Handles one event: bumps the target state's visit count against the
    /// revisit limit, runs the transition hook, then switches.
    ///
    /// The count check happens before the increment, so a rejected transition
    /// leaves both the state and the counters untouched.
    fn handle_event(&mut self, event: E) -> Result<(), RuntimeError> {
        if self.max_revisit_limit == 0 {
            return Err(RuntimeError::RevisitLimitUnset);
        }

        let planned = self.machine.plan(&event)?;
        let next = planned.next;

        let count = self.state_visit_counts.get(&next).copied().unwrap_or(0);
        if count + 1 > self.max_revisit_limit {
            return Err(RuntimeError::RevisitExceeded {
                state: next.name().to_string(),
                count: count + 1,
                limit: self.max_revisit_limit,
            });
        }
        self.state_visit_counts.insert(next.clone(), count + 1);

        let hook = self
            .transitions
            .get(&(self.machine.current_state().clone(), event))
            .and_then(|t| t.hook.clone());
        if let Some(hook) = hook {
            hook(self);
        }
        self.machine.commit(next);
        Ok(())
    }

    /// Back to the initial state: all contexts recreated empty, visit counts
    /// zeroed with the initial state at one.
    fn reset(&mut self) -> Result<(), RuntimeError> {
        self.machine.reset()?;
        for ctx in self.contexts.values_mut() {
            ctx.clear();
        }
        for count in self.state_visit_counts.values_mut() {
            *count = 0;
        }
        self.state_visit_counts
            .insert(self.machine.initial_state().clone(), 1);
        Ok(())
    }
}
