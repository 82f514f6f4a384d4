//! Task trees: parent/child relations with a depth bound.
//!
//! A [`TreeTask`] is a [`Task`] plus a non-owning back-reference to its
//! parent (`Weak`) and an owned list of subtasks. Depth strictly increases
//! downward, which rules out cycles; attaching a node re-derives its depth
//! from the parent and enforces the bound. Relations are edited through the
//! associated functions ([`TreeTask::set_parent`], [`TreeTask::add_sub_task`],
//! [`TreeTask::pop_sub_task`]), which keep both sides consistent.

use std::collections::HashSet;
use std::sync::{Arc, Weak};

use tokio::sync::Mutex;

use crate::context::Context;
use crate::error::{CompileError, RuntimeError};
use crate::machine::{EventName, StateName};
use crate::model::Message;

use super::{Task, TaskLike, TaskPayload, TaskTransitions};

/// Shared handle to a tree task node.
pub type TreeTaskRef<S, E> = Arc<Mutex<TreeTask<S, E>>>;

type WeakTreeTaskRef<S, E> = Weak<Mutex<TreeTask<S, E>>>;

/// A task with parent/child links and a depth bound.
pub struct TreeTask<S, E> {
    inner: Task<S, E>,
    parent: Option<WeakTreeTaskRef<S, E>>,
    sub_tasks: Vec<TreeTaskRef<S, E>>,
    current_depth: u32,
    max_depth: u32,
}

impl<S, E> std::fmt::Debug for TreeTask<S, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeTask")
            .field("current_depth", &self.current_depth)
            .field("max_depth", &self.max_depth)
            .field("sub_tasks", &self.sub_tasks.len())
            .finish_non_exhaustive()
    }
}

impl<S: StateName, E: EventName> TreeTask<S, E> {
    /// Builds and compiles a tree task node, returning the shared handle the
    /// relation editors work on. The node starts as a root at depth 0.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        valid_states: HashSet<S>,
        initial_state: S,
        transitions: TaskTransitions<S, E>,
        protocol: impl Into<TaskPayload>,
        tags: HashSet<String>,
        task_type: impl Into<String>,
        max_depth: u32,
    ) -> Result<TreeTaskRef<S, E>, CompileError> {
        let inner = Task::new(
            valid_states,
            initial_state,
            transitions,
            protocol,
            tags,
            task_type,
        )?;
        Ok(Arc::new(Mutex::new(Self {
            inner,
            parent: None,
            sub_tasks: Vec::new(),
            current_depth: 0,
            max_depth,
        })))
    }

    /// True when the node has no subtasks.
    pub fn is_leaf(&self) -> bool {
        self.sub_tasks.is_empty()
    }

    /// True when the node has no parent and sits at depth 0.
    pub fn is_root(&self) -> bool {
        self.parent.is_none() && self.current_depth == 0
    }

    pub fn current_depth(&self) -> u32 {
        self.current_depth
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// The parent handle, when the parent is still alive.
    pub fn parent(&self) -> Option<TreeTaskRef<S, E>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// A copy of the subtask handles, in attach order.
    pub fn sub_tasks(&self) -> Vec<TreeTaskRef<S, E>> {
        self.sub_tasks.clone()
    }

    /// Attaches `node` under `parent`.
    ///
    /// Detaches from any previous parent, enforces
    /// `parent.depth + 1 <= node.max_depth` (error leaves everything
    /// untouched), updates the depth, and adds the node to the parent's
    /// subtask list without double-adding. Attaching a node to itself is
    /// rejected; deeper cycles are ruled out by depth monotonicity.
    pub async fn set_parent(
        node: &TreeTaskRef<S, E>,
        parent: &TreeTaskRef<S, E>,
    ) -> Result<(), RuntimeError> {
        if Arc::ptr_eq(node, parent) {
            return Err(RuntimeError::CyclicTask);
        }

        let new_depth = parent.lock().await.current_depth + 1;

        let old_parent = {
            let mut n = node.lock().await;
            let already_attached = n
                .parent
                .as_ref()
                .is_some_and(|w| w.ptr_eq(&Arc::downgrade(parent)));
            if already_attached {
                return Ok(());
            }
            if new_depth > n.max_depth {
                return Err(RuntimeError::DepthExceeded {
                    depth: new_depth,
                    max: n.max_depth,
                });
            }
            let old = n.parent.take();
            n.parent = Some(Arc::downgrade(parent));
            n.current_depth = new_depth;
            old
        };

        if let Some(old) = old_parent.as_ref().and_then(Weak::upgrade) {
            let mut o = old.lock().await;
            o.sub_tasks.retain(|s| !Arc::ptr_eq(s, node));
        }

        let mut p = parent.lock().await;
        if !p.sub_tasks.iter().any(|s| Arc::ptr_eq(s, node)) {
            p.sub_tasks.push(Arc::clone(node));
        }
        Ok(())
    }

    /// Detaches `node` from its parent (if any) and resets its depth to 0.
    pub async fn remove_parent(node: &TreeTaskRef<S, E>) {
        let old_parent = {
            let mut n = node.lock().await;
            n.current_depth = 0;
            n.parent.take()
        };
        if let Some(old) = old_parent.as_ref().and_then(Weak::upgrade) {
            let mut o = old.lock().await;
            o.sub_tasks.retain(|s| !Arc::ptr_eq(s, node));
        }
    }

    /// Adds `child` under `parent`; idempotent when already attached.
    pub async fn add_sub_task(
        parent: &TreeTaskRef<S, E>,
        child: &TreeTaskRef<S, E>,
    ) -> Result<(), RuntimeError> {
        Self::set_parent(child, parent).await
    }

    /// Removes `child` from `parent` and returns it detached at depth 0.
    pub async fn pop_sub_task(
        parent: &TreeTaskRef<S, E>,
        child: &TreeTaskRef<S, E>,
    ) -> Result<TreeTaskRef<S, E>, RuntimeError> {
        {
            let mut p = parent.lock().await;
            let position = p
                .sub_tasks
                .iter()
                .position(|s| Arc::ptr_eq(s, child))
                .ok_or(RuntimeError::SubTaskNotFound)?;
            p.sub_tasks.remove(position);
        }
        {
            let mut c = child.lock().await;
            c.parent = None;
            c.current_depth = 0;
        }
        Ok(Arc::clone(child))
    }
}

impl<S: StateName, E: EventName> TaskLike for TreeTask<S, E> {
    type State = S;
    type Event = E;

    fn id(&self) -> &str {
        self.inner.id()
    }

    fn current_state(&self) -> &S {
        self.inner.current_state()
    }

    fn tags(&self) -> &HashSet<String> {
        self.inner.tags()
    }

    fn task_type(&self) -> &str {
        self.inner.task_type()
    }

    fn title(&self) -> &str {
        self.inner.title()
    }

    fn set_title(&mut self, title: String) {
        self.inner.set_title(title);
    }

    fn protocol(&self) -> &TaskPayload {
        self.inner.protocol()
    }

    fn input(&self) -> &TaskPayload {
        self.inner.input()
    }

    fn set_input(&mut self, input: TaskPayload) {
        self.inner.set_input(input);
    }

    fn output(&self) -> &str {
        self.inner.output()
    }

    fn is_completed(&self) -> bool {
        self.inner.is_completed()
    }

    fn set_completed(&mut self, output: String) {
        self.inner.set_completed(output);
    }

    fn is_error(&self) -> bool {
        self.inner.is_error()
    }

    fn error_info(&self) -> &str {
        self.inner.error_info()
    }

    fn set_error(&mut self, info: String) {
        self.inner.set_error(info);
    }

    fn clear_error(&mut self) {
        self.inner.clear_error();
    }

    fn context(&self) -> &Context {
        self.inner.context()
    }

    fn append_context(&mut self, message: Message) {
        self.inner.append_context(message);
    }

    fn state_visit_count(&self, state: &S) -> u32 {
        self.inner.state_visit_count(state)
    }

    fn max_revisit_limit(&self) -> u32 {
        self.inner.max_revisit_limit()
    }

    fn set_max_revisit_limit(&mut self, limit: u32) {
        self.inner.set_max_revisit_limit(limit);
    }

    fn handle_event(&mut self, event: E) -> Result<(), RuntimeError> {
        self.inner.handle_event(event)
    }

    fn reset(&mut self) -> Result<(), RuntimeError> {
        self.inner.reset()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{base_task_states, base_task_transitions, TaskEvent, TaskState};

    fn node(max_depth: u32) -> TreeTaskRef<TaskState, TaskEvent> {
        TreeTask::new(
            base_task_states(),
            TaskState::Inited,
            base_task_transitions(),
            "protocol",
            HashSet::new(),
            "tree",
            max_depth,
        )
        .expect("valid node")
    }

    /// **Scenario**: attaching a child sets depth = parent.depth + 1 and
    /// records the child in the parent's subtask list.
    #[tokio::test]
    async fn set_parent_updates_depth_and_membership() {
        let root = node(3);
        let child = node(3);
        TreeTask::set_parent(&child, &root).await.expect("attach");
        {
            let c = child.lock().await;
            assert_eq!(c.current_depth(), 1);
            assert!(!c.is_root());
        }
        let r = root.lock().await;
        assert_eq!(r.sub_tasks().len(), 1);
        assert!(Arc::ptr_eq(&r.sub_tasks()[0], &child));
    }

    /// **Scenario**: re-attaching to the same parent is a no-op; no duplicate
    /// list entries appear.
    #[tokio::test]
    async fn set_parent_is_idempotent() {
        let root = node(3);
        let child = node(3);
        TreeTask::set_parent(&child, &root).await.expect("attach");
        TreeTask::set_parent(&child, &root).await.expect("again");
        TreeTask::add_sub_task(&root, &child).await.expect("again");
        assert_eq!(root.lock().await.sub_tasks().len(), 1);
    }

    /// **Scenario**: an attach that would exceed max_depth fails and leaves
    /// depth and membership untouched.
    #[tokio::test]
    async fn set_parent_beyond_max_depth_fails_without_change() {
        let root = node(1);
        let mid = node(1);
        let leaf = node(1);
        TreeTask::set_parent(&mid, &root).await.expect("depth 1 ok");
        let err = TreeTask::set_parent(&leaf, &mid).await.unwrap_err();
        assert!(matches!(err, RuntimeError::DepthExceeded { .. }));
        assert_eq!(leaf.lock().await.current_depth(), 0);
        assert!(mid.lock().await.is_leaf());
    }

    /// **Scenario**: moving a child to a new parent detaches it from the old
    /// parent's list.
    #[tokio::test]
    async fn set_parent_moves_between_parents() {
        let first = node(3);
        let second = node(3);
        let child = node(3);
        TreeTask::set_parent(&child, &first).await.expect("attach");
        TreeTask::set_parent(&child, &second).await.expect("move");
        assert!(first.lock().await.is_leaf());
        assert_eq!(second.lock().await.sub_tasks().len(), 1);
        assert_eq!(child.lock().await.current_depth(), 1);
    }

    /// **Scenario**: pop_sub_task removes the child and resets it to a root;
    /// popping a non-child fails.
    #[tokio::test]
    async fn pop_sub_task_detaches_child() {
        let root = node(3);
        let child = node(3);
        let stranger = node(3);
        TreeTask::add_sub_task(&root, &child).await.expect("attach");
        let popped = TreeTask::pop_sub_task(&root, &child).await.expect("pop");
        assert!(Arc::ptr_eq(&popped, &child));
        assert!(root.lock().await.is_leaf());
        assert!(child.lock().await.is_root());
        let err = TreeTask::pop_sub_task(&root, &stranger).await.unwrap_err();
        assert!(matches!(err, RuntimeError::SubTaskNotFound));
    }

    /// **Scenario**: a node cannot become its own parent.
    #[tokio::test]
    async fn self_parent_is_rejected() {
        let root = node(3);
        let err = TreeTask::set_parent(&root, &root).await.unwrap_err();
        assert!(matches!(err, RuntimeError::CyclicTask));
    }
}
