//! Generic finite state machine with compile-time reachability checking.
//!
//! [`StateMachine`] is the bottom layer everything else builds on: tasks
//! specialise it with revisit accounting and per-state contexts, workflows
//! drive it over stages. States and events are small enum-like types with a
//! stable `name` for diagnostics ([`StateName`] / [`EventName`]); workflow
//! stages additionally enumerate themselves ([`StageName`]).
//!
//! A machine is built uncompiled, validated once with [`StateMachine::compile`]
//! (initial state valid, transitions non-empty, every state reachable via
//! BFS), and only then accepts events. Re-compiling is an error.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::error::{CompileError, RuntimeError};

/// A state: hashable, comparable, with a stable diagnostic name.
pub trait StateName: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    fn name(&self) -> &str;
}

/// An event: comparable, with a stable diagnostic name.
pub trait EventName: Clone + Eq + Hash + Debug + Send + Sync + 'static {
    fn name(&self) -> &str;
}

/// A workflow stage: a state that can also enumerate all stages.
pub trait StageName: StateName {
    fn list_stages() -> Vec<Self>;
}

/// Snapshot handed to a transition callback: machine id plus the states
/// involved. Side-effect only; the state switch happens after the callback.
pub struct TransitionCtx<S> {
    pub machine_id: String,
    pub from: S,
    pub to: S,
}

/// Async side-effect invoked when a transition fires.
pub type TransitionHook<S> =
    Arc<dyn Fn(TransitionCtx<S>) -> BoxFuture<'static, ()> + Send + Sync>;

/// Transition target plus optional callback.
#[derive(Clone)]
pub struct Transition<S> {
    pub next: S,
    pub hook: Option<TransitionHook<S>>,
}

impl<S> Transition<S> {
    /// Transition with no callback.
    pub fn to(next: S) -> Self {
        Self { next, hook: None }
    }

    /// Transition with an async side-effect callback.
    pub fn with_hook(next: S, hook: TransitionHook<S>) -> Self {
        Self {
            next,
            hook: Some(hook),
        }
    }
}

/// Transition table: `(state, event) -> transition`.
pub type TransitionTable<S, E> = HashMap<(S, E), Transition<S>>;

/// Event-driven state machine over validated states.
///
/// Clone shares the transition hooks (`Arc`) and copies the current state, so
/// a cloned machine advances independently.
#[derive(Clone)]
pub struct StateMachine<S, E> {
    id: String,
    compiled: bool,
    valid_states: HashSet<S>,
    initial_state: S,
    current_state: S,
    transitions: TransitionTable<S, E>,
}

impl<S: StateName, E: EventName> StateMachine<S, E> {
    /// Creates an uncompiled machine. Call [`compile`](Self::compile) before
    /// handling events.
    pub fn new(
        valid_states: HashSet<S>,
        initial_state: S,
        transitions: TransitionTable<S, E>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            compiled: false,
            valid_states,
            current_state: initial_state.clone(),
            initial_state,
            transitions,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn is_compiled(&self) -> bool {
        self.compiled
    }

    pub fn valid_states(&self) -> &HashSet<S> {
        &self.valid_states
    }

    pub fn current_state(&self) -> &S {
        &self.current_state
    }

    pub fn initial_state(&self) -> &S {
        &self.initial_state
    }

    pub fn transitions(&self) -> &TransitionTable<S, E> {
        &self.transitions
    }

    /// One-shot validation: initial state valid, transitions non-empty, and
    /// every valid state reachable from the initial state (cycles allowed).
    pub fn compile(&mut self) -> Result<(), CompileError> {
        if self.compiled {
            return Err(CompileError::AlreadyCompiled);
        }
        if self.valid_states.is_empty() {
            return Err(CompileError::EmptyStates);
        }
        if !self.valid_states.contains(&self.initial_state) {
            return Err(CompileError::InvalidInitialState(
                self.initial_state.name().to_string(),
            ));
        }
        if self.transitions.is_empty() {
            return Err(CompileError::EmptyTransitions);
        }

        // BFS from the initial state over the transition table.
        let mut reachable: HashSet<S> = HashSet::new();
        reachable.insert(self.initial_state.clone());
        let mut queue: VecDeque<S> = VecDeque::new();
        queue.push_back(self.initial_state.clone());
        while let Some(current) = queue.pop_front() {
            for ((from, _event), transition) in &self.transitions {
                if *from == current && !reachable.contains(&transition.next) {
                    reachable.insert(transition.next.clone());
                    queue.push_back(transition.next.clone());
                }
            }
        }

        let mut unreachable: Vec<&S> = self.valid_states.difference(&reachable).collect();
        if !unreachable.is_empty() {
            unreachable.sort_by_key(|s| s.name().to_string());
            return Err(CompileError::UnreachableStates {
                initial: self.initial_state.name().to_string(),
                states: unreachable
                    .iter()
                    .map(|s| s.name())
                    .collect::<Vec<_>>()
                    .join(", "),
            });
        }

        self.compiled = true;
        self.current_state = self.initial_state.clone();
        Ok(())
    }

    /// Looks up the transition for an event without firing it.
    pub(crate) fn plan(&self, event: &E) -> Result<Transition<S>, RuntimeError> {
        if !self.compiled {
            return Err(RuntimeError::NotCompiled);
        }
        self.transitions
            .get(&(self.current_state.clone(), event.clone()))
            .cloned()
            .ok_or_else(|| RuntimeError::NoTransition {
                state: self.current_state.name().to_string(),
                event: event.name().to_string(),
            })
    }

    /// Switches to the planned state. Used by the layers that run their own
    /// bookkeeping between planning and switching.
    pub(crate) fn commit(&mut self, next: S) {
        self.current_state = next;
    }

    /// Handles one event: runs the transition callback (side-effect only),
    /// then switches state. Missing rule is `NoTransition`; no partial update.
    pub async fn handle_event(&mut self, event: E) -> Result<(), RuntimeError> {
        let transition = self.plan(&event)?;
        if let Some(hook) = &transition.hook {
            hook(TransitionCtx {
                machine_id: self.id.clone(),
                from: self.current_state.clone(),
                to: transition.next.clone(),
            })
            .await;
        }
        self.current_state = transition.next;
        Ok(())
    }

    /// Back to the initial state. Forbidden before compile.
    pub fn reset(&mut self) -> Result<(), RuntimeError> {
        if !self.compiled {
            return Err(RuntimeError::NotCompiled);
        }
        self.current_state = self.initial_state.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    enum Light {
        Red,
        Green,
        Orphan,
    }

    impl StateName for Light {
        fn name(&self) -> &str {
            match self {
                Light::Red => "RED",
                Light::Green => "GREEN",
                Light::Orphan => "ORPHAN",
            }
        }
    }

    #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
    enum Switch {
        Go,
        Stop,
    }

    impl EventName for Switch {
        fn name(&self) -> &str {
            match self {
                Switch::Go => "GO",
                Switch::Stop => "STOP",
            }
        }
    }

    fn two_state_table() -> TransitionTable<Light, Switch> {
        let mut t = TransitionTable::new();
        t.insert((Light::Red, Switch::Go), Transition::to(Light::Green));
        t.insert((Light::Green, Switch::Stop), Transition::to(Light::Red));
        t
    }

    fn two_state_machine() -> StateMachine<Light, Switch> {
        StateMachine::new(
            [Light::Red, Light::Green].into_iter().collect(),
            Light::Red,
            two_state_table(),
        )
    }

    /// **Scenario**: compile succeeds for a reachable cycle and handle_event
    /// walks the table.
    #[tokio::test]
    async fn compile_then_handle_events() {
        let mut sm = two_state_machine();
        sm.compile().expect("valid machine");
        assert_eq!(*sm.current_state(), Light::Red);
        sm.handle_event(Switch::Go).await.expect("red -> green");
        assert_eq!(*sm.current_state(), Light::Green);
        sm.handle_event(Switch::Stop).await.expect("green -> red");
        assert_eq!(*sm.current_state(), Light::Red);
    }

    /// **Scenario**: an event with no rule in the current state errors and
    /// leaves the state untouched.
    #[tokio::test]
    async fn handle_event_without_rule_is_no_transition() {
        let mut sm = two_state_machine();
        sm.compile().expect("valid machine");
        let err = sm.handle_event(Switch::Stop).await.unwrap_err();
        assert!(matches!(err, RuntimeError::NoTransition { .. }));
        assert_eq!(*sm.current_state(), Light::Red);
    }

    /// **Scenario**: compile fails when a valid state is unreachable from the
    /// initial state.
    #[test]
    fn compile_fails_on_unreachable_state() {
        let mut sm = StateMachine::new(
            [Light::Red, Light::Green, Light::Orphan]
                .into_iter()
                .collect(),
            Light::Red,
            two_state_table(),
        );
        match sm.compile() {
            Err(CompileError::UnreachableStates { states, .. }) => {
                assert!(states.contains("ORPHAN"), "{}", states)
            }
            other => panic!("expected UnreachableStates, got {:?}", other.err()),
        }
    }

    /// **Scenario**: compiling twice is forbidden.
    #[test]
    fn compile_twice_is_rejected() {
        let mut sm = two_state_machine();
        sm.compile().expect("first compile");
        assert!(matches!(sm.compile(), Err(CompileError::AlreadyCompiled)));
    }

    /// **Scenario**: handle_event and reset before compile are rejected.
    #[tokio::test]
    async fn uncompiled_machine_rejects_events_and_reset() {
        let mut sm = two_state_machine();
        assert!(matches!(
            sm.handle_event(Switch::Go).await,
            Err(RuntimeError::NotCompiled)
        ));
        assert!(matches!(sm.reset(), Err(RuntimeError::NotCompiled)));
    }

    /// **Scenario**: the transition callback fires before the state switch.
    #[tokio::test]
    async fn transition_hook_runs_on_transition() {
        let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let observed = Arc::clone(&fired);
        let mut table = two_state_table();
        table.insert(
            (Light::Red, Switch::Go),
            Transition::with_hook(
                Light::Green,
                Arc::new(move |ctx: TransitionCtx<Light>| {
                    let fired = Arc::clone(&observed);
                    assert_eq!(ctx.from.name(), "RED");
                    assert_eq!(ctx.to.name(), "GREEN");
                    Box::pin(async move {
                        fired.store(true, std::sync::atomic::Ordering::SeqCst);
                    })
                }),
            ),
        );
        let mut sm = StateMachine::new(
            [Light::Red, Light::Green].into_iter().collect(),
            Light::Red,
            table,
        );
        sm.compile().expect("valid machine");
        sm.handle_event(Switch::Go).await.expect("transition");
        assert!(fired.load(std::sync::atomic::Ordering::SeqCst));
    }

    /// **Scenario**: reset returns to the initial state; replaying the same
    /// events yields the same final state.
    #[tokio::test]
    async fn reset_then_replay_reaches_same_state() {
        let mut sm = two_state_machine();
        sm.compile().expect("valid machine");
        sm.handle_event(Switch::Go).await.expect("go");
        sm.reset().expect("reset");
        assert_eq!(*sm.current_state(), Light::Red);
        sm.handle_event(Switch::Go).await.expect("go again");
        assert_eq!(*sm.current_state(), Light::Green);
    }
}
