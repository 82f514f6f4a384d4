//! The scheduler: an outer loop driving a task through its lifecycle states.
//!
//! Built from per-state handlers (`on_state`), per-transition handlers
//! (`on_state_changed`), a terminal state set, and a revisit budget.
//! Construction compiles the configuration: end states must be reachable
//! from every non-end state, under either the acyclic rule
//! (`max_revisit_count <= 0`: every state at most once on any walk) or the
//! bounded rule (each state at most `max_revisit_count` times).

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, info};

use crate::error::{CompileError, RuntimeError};
use crate::machine::StateName;
use crate::model::{QueueRef, RunContext};
use crate::task::{TaskLike, TaskRef};

/// Handler invoked on entering a state or after a transition. Returning
/// `Some(event)` advances the task; `None` means progress by side effects
/// only.
#[allow(type_alias_bounds)]
pub type StateHandler<T: TaskLike> = Arc<
    dyn Fn(
            Arc<Scheduler<T>>,
            RunContext,
            QueueRef,
            TaskRef<T>,
        ) -> BoxFuture<'static, Result<Option<T::Event>, RuntimeError>>
        + Send
        + Sync,
>;

/// Drives a task to a terminal state by invoking per-state handlers.
pub struct Scheduler<T: TaskLike> {
    end_states: HashSet<T::State>,
    on_state: HashMap<T::State, StateHandler<T>>,
    on_state_changed: HashMap<(T::State, T::State), StateHandler<T>>,
    max_revisit_count: i32,
}

impl<T: TaskLike> Scheduler<T> {
    /// Builds and compiles a scheduler. Compile failures name the offending
    /// states.
    pub fn new(
        end_states: HashSet<T::State>,
        on_state: HashMap<T::State, StateHandler<T>>,
        on_state_changed: HashMap<(T::State, T::State), StateHandler<T>>,
        max_revisit_count: i32,
    ) -> Result<Arc<Self>, CompileError> {
        let scheduler = Self {
            end_states,
            on_state,
            on_state_changed,
            max_revisit_count,
        };
        scheduler.compile()?;
        Ok(Arc::new(scheduler))
    }

    pub fn max_revisit_count(&self) -> i32 {
        self.max_revisit_count
    }

    pub fn end_states(&self) -> &HashSet<T::State> {
        &self.end_states
    }

    /// Validates the state graph spanned by the `on_state_changed` keys.
    fn compile(&self) -> Result<(), CompileError> {
        if self.end_states.is_empty() {
            return Err(CompileError::NoEndStates);
        }

        let mut all_states: HashSet<T::State> = HashSet::new();
        for (from, to) in self.on_state_changed.keys() {
            all_states.insert(from.clone());
            all_states.insert(to.clone());
        }
        if all_states.is_empty() {
            return Err(CompileError::EmptyTransitions);
        }

        for end_state in &self.end_states {
            if !all_states.contains(end_state) {
                return Err(CompileError::EndStateNotInTransitions(
                    end_state.name().to_string(),
                ));
            }
        }

        let mut adjacency: HashMap<T::State, HashSet<T::State>> = HashMap::new();
        for (from, to) in self.on_state_changed.keys() {
            adjacency.entry(from.clone()).or_default().insert(to.clone());
        }

        let acyclic = self.max_revisit_count <= 0;
        let mode = if acyclic { "acyclic" } else { "bounded" };
        let mut invalid: Vec<String> = Vec::new();
        for state in &all_states {
            if self.end_states.contains(state) {
                continue;
            }
            let valid = if acyclic {
                self.reaches_end_acyclic(state, &adjacency)
            } else {
                self.reaches_end_bounded(state, &adjacency)
            };
            if !valid {
                invalid.push(state.name().to_string());
            }
        }

        if !invalid.is_empty() {
            invalid.sort_unstable();
            return Err(CompileError::UnreachableEndState {
                states: invalid.join(", "),
                mode,
            });
        }

        info!(mode, max_revisit_count = self.max_revisit_count, "scheduler compiled");
        Ok(())
    }

    /// Acyclic walk: every state at most once; any repeat visit fails.
    fn reaches_end_acyclic(
        &self,
        start: &T::State,
        adjacency: &HashMap<T::State, HashSet<T::State>>,
    ) -> bool {
        let mut visited: HashSet<T::State> = HashSet::new();
        visited.insert(start.clone());
        let mut queue: VecDeque<T::State> = VecDeque::new();
        queue.push_back(start.clone());

        while let Some(current) = queue.pop_front() {
            if self.end_states.contains(&current) {
                return true;
            }
            if let Some(next_states) = adjacency.get(&current) {
                for next in next_states {
                    if visited.contains(next) {
                        return false;
                    }
                    visited.insert(next.clone());
                    queue.push_back(next.clone());
                }
            }
        }
        false
    }

    /// Bounded walk: each state visited at most `max_revisit_count` times on
    /// the way to an end state.
    fn reaches_end_bounded(
        &self,
        start: &T::State,
        adjacency: &HashMap<T::State, HashSet<T::State>>,
    ) -> bool {
        let limit = self.max_revisit_count as u32;
        let mut visit_count: HashMap<T::State, u32> = HashMap::new();
        visit_count.insert(start.clone(), 1);
        let mut queue: VecDeque<T::State> = VecDeque::new();
        queue.push_back(start.clone());

        while let Some(current) = queue.pop_front() {
            if self.end_states.contains(&current) {
                return true;
            }
            if visit_count.get(&current).copied().unwrap_or(0) > limit {
                continue;
            }
            if let Some(next_states) = adjacency.get(&current) {
                for next in next_states {
                    let next_count = visit_count.get(next).copied().unwrap_or(0) + 1;
                    if next_count <= limit {
                        visit_count.insert(next.clone(), next_count);
                        queue.push_back(next.clone());
                    }
                }
            }
        }
        false
    }

    /// Drives the task until it sits in an end state.
    ///
    /// Per iteration: the current state's handler runs (missing handler is a
    /// configuration error) and its event, if any, advances the task; then
    /// the `(previous, current)` transition handler runs the same way (a
    /// missing entry is skipped). The task's revisit limit is set to
    /// `max(1, max_revisit_count)` up front, so acyclic mode still permits
    /// the single visit each state is entitled to.
    pub fn schedule(
        self: &Arc<Self>,
        ctx: RunContext,
        queue: QueueRef,
        task: TaskRef<T>,
    ) -> BoxFuture<'static, Result<(), RuntimeError>> {
        let scheduler = Arc::clone(self);
        Box::pin(async move {
            let (task_id, current) = {
                let guard = task.lock().await;
                (guard.id().to_string(), guard.current_state().clone())
            };
            if scheduler.end_states.contains(&current) {
                info!(task = %task_id, state = %current.name(), "task already terminal");
                return Ok(());
            }

            {
                let mut guard = task.lock().await;
                guard.set_max_revisit_limit(scheduler.max_revisit_count.max(1) as u32);
            }

            loop {
                let state = { task.lock().await.current_state().clone() };
                if scheduler.end_states.contains(&state) {
                    break;
                }
                info!(task = %task_id, state = %state.name(), "scheduling task state");

                let handler = scheduler
                    .on_state
                    .get(&state)
                    .cloned()
                    .ok_or_else(|| RuntimeError::MissingStateHandler(state.name().to_string()))?;
                let event = handler(
                    Arc::clone(&scheduler),
                    ctx.clone(),
                    Arc::clone(&queue),
                    Arc::clone(&task),
                )
                .await?;
                if let Some(event) = event {
                    task.lock().await.handle_event(event)?;
                }

                let next_state = { task.lock().await.current_state().clone() };
                match scheduler
                    .on_state_changed
                    .get(&(state.clone(), next_state.clone()))
                    .cloned()
                {
                    Some(handler) => {
                        let event = handler(
                            Arc::clone(&scheduler),
                            ctx.clone(),
                            Arc::clone(&queue),
                            Arc::clone(&task),
                        )
                        .await?;
                        if let Some(event) = event {
                            task.lock().await.handle_event(event)?;
                        }
                    }
                    None => {
                        debug!(
                            from = %state.name(),
                            to = %next_state.name(),
                            "no state-change handler, skipping"
                        );
                    }
                }
            }

            info!(task = %task_id, "schedule finished");
            Ok(())
        })
    }
}
