//! Task views: pure renderers from tasks to strings.
//!
//! Flat views format a single task (todo line, document, requirement sheet,
//! JSON). Tree views recurse over subtasks with an optional `recursive_limit`
//! (-1 unlimited, 0 none, n > 0 levels) and demote child markdown headings by
//! one level so nested output reads as a single document.

use futures::future::BoxFuture;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_json::{json, Value};

use crate::machine::{EventName, StateName};

use super::{TaskLike, TreeTask};

static HEADING: Lazy<Regex> = Lazy::new(|| {
    // (?m) multi-line: every run of '#' followed by whitespace is a heading.
    Regex::new(r"(?m)(#+)(\s)").unwrap_or_else(|_| unreachable!("valid literal regex"))
});

/// Demotes every markdown heading by one level (`#` -> `##`).
fn demote_headings(text: &str) -> String {
    HEADING
        .replace_all(text, |caps: &Captures<'_>| {
            format!("{}#{}", &caps[1], &caps[2])
        })
        .into_owned()
}

/// Indents every line by one tab.
fn indent_lines(text: &str) -> String {
    text.lines()
        .map(|line| format!("\t{line}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// `- [ ] title` todo line.
pub struct TodoView;

impl TodoView {
    pub fn render<T: TaskLike>(task: &T) -> String {
        let status = if task.is_completed() { "x" } else { " " };
        format!("- [{}] {}", status, task.title())
    }
}

/// `# title` plus the task output.
pub struct DocumentView;

impl DocumentView {
    pub fn render<T: TaskLike>(task: &T) -> String {
        format!("# {}\n{}", task.title(), task.output())
    }
}

/// Task type plus protocol, for prompt-side contract display.
pub struct ProtocolView;

impl ProtocolView {
    pub fn render<T: TaskLike>(task: &T) -> String {
        format!("# {}\n{}", task.task_type(), task.protocol())
    }
}

/// Requirement sheet: title, type, tags, completion, protocol, input.
pub struct RequirementView;

impl RequirementView {
    pub fn render<T: TaskLike>(task: &T) -> String {
        let mut tags: Vec<&str> = task.tags().iter().map(String::as_str).collect();
        tags.sort_unstable();
        format!(
            "# Task: {title}\n- Type: {task_type}\n- Tags: {tags}\n- Completed: {completed}\n## Execution Protocol\n{protocol}\n## Task Input\n{input}",
            title = task.title(),
            task_type = task.task_type(),
            tags = tags.join(", "),
            completed = task.is_completed(),
            protocol = task.protocol(),
            input = task.input(),
        )
    }
}

/// Structured `{title, task_type, tags}` JSON for machine checks.
pub struct JsonView;

impl JsonView {
    pub fn render<T: TaskLike>(task: &T) -> String {
        serde_json::to_string_pretty(&Self::value(task))
            .unwrap_or_else(|_| unreachable!("plain strings always serialize"))
    }

    fn value<T: TaskLike>(task: &T) -> Value {
        let mut tags: Vec<&str> = task.tags().iter().map(String::as_str).collect();
        tags.sort_unstable();
        json!({
            "title": task.title(),
            "task_type": task.task_type(),
            "tags": tags,
        })
    }
}

/// Requirement sheet for a tree node followed by each direct child's
/// document, headings demoted. Children render non-recursively: the parent
/// runs only after its subtasks finished, so their outputs stand alone.
pub struct RequirementTreeView;

impl RequirementTreeView {
    pub async fn render<S: StateName, E: EventName>(task: &TreeTask<S, E>) -> String {
        let mut parts = vec![RequirementView::render(task)];
        for sub in task.sub_tasks() {
            let sub = sub.lock().await;
            parts.push(demote_headings(&DocumentView::render(&*sub)));
        }
        parts.join("\n\n")
    }
}

/// Document of the node plus recursively rendered subtask documents.
pub struct DocumentTreeView;

impl DocumentTreeView {
    pub fn render<S: StateName, E: EventName>(
        task: &TreeTask<S, E>,
        recursive_limit: i32,
    ) -> BoxFuture<'_, String> {
        Box::pin(async move {
            let view = DocumentView::render(task);
            if recursive_limit == 0 {
                return view;
            }
            let next_limit = if recursive_limit > 0 {
                recursive_limit - 1
            } else {
                recursive_limit
            };
            let mut parts = vec![view];
            for sub in task.sub_tasks() {
                let sub = sub.lock().await;
                let sub_view = Self::render(&sub, next_limit).await;
                parts.push(demote_headings(&sub_view));
            }
            parts.join("\n\n")
        })
    }
}

/// Todo line of the node plus recursively indented subtask todo lines.
pub struct TodoTreeView;

impl TodoTreeView {
    pub fn render<S: StateName, E: EventName>(
        task: &TreeTask<S, E>,
        recursive_limit: i32,
    ) -> BoxFuture<'_, String> {
        Box::pin(async move {
            let view = TodoView::render(task);
            if recursive_limit == 0 {
                return view;
            }
            let next_limit = if recursive_limit > 0 {
                recursive_limit - 1
            } else {
                recursive_limit
            };
            let mut parts = vec![view];
            for sub in task.sub_tasks() {
                let sub = sub.lock().await;
                let sub_view = Self::render(&sub, next_limit).await;
                parts.push(indent_lines(&sub_view));
            }
            parts.join("\n")
        })
    }
}

/// Structured JSON of the node with a recursive `sub_tasks` array.
pub struct JsonTreeView;

impl JsonTreeView {
    pub async fn render<S: StateName, E: EventName>(
        task: &TreeTask<S, E>,
        recursive_limit: i32,
    ) -> String {
        serde_json::to_string_pretty(&Self::value(task, recursive_limit).await)
            .unwrap_or_else(|_| unreachable!("plain strings always serialize"))
    }

    fn value<S: StateName, E: EventName>(
        task: &TreeTask<S, E>,
        recursive_limit: i32,
    ) -> BoxFuture<'_, Value> {
        Box::pin(async move {
            let mut view = JsonView::value(task);
            let mut sub_views: Vec<Value> = Vec::new();
            if recursive_limit != 0 {
                let next_limit = if recursive_limit > 0 {
                    recursive_limit - 1
                } else {
                    recursive_limit
                };
                for sub in task.sub_tasks() {
                    let sub = sub.lock().await;
                    sub_views.push(Self::value(&sub, next_limit).await);
                }
            }
            if let Value::Object(map) = &mut view {
                map.insert("sub_tasks".to_string(), Value::Array(sub_views));
            }
            view
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::task::{
        base_task_states, base_task_transitions, TaskEvent, TaskState, TreeTaskRef,
    };

    fn node(title: &str) -> TreeTaskRef<TaskState, TaskEvent> {
        let n = TreeTask::new(
            base_task_states(),
            TaskState::Inited,
            base_task_transitions(),
            "protocol",
            HashSet::new(),
            "view",
            3,
        )
        .expect("valid node");
        {
            let mut guard = n.try_lock().expect("fresh node is uncontended");
            guard.set_title(title.to_string());
        }
        n
    }

    async fn tree() -> TreeTaskRef<TaskState, TaskEvent> {
        let root = node("root");
        let child = node("child");
        let grandchild = node("grandchild");
        TreeTask::add_sub_task(&root, &child).await.expect("attach");
        TreeTask::add_sub_task(&child, &grandchild)
            .await
            .expect("attach");
        root
    }

    /// **Scenario**: todo view marks completion with an x.
    #[tokio::test]
    async fn todo_view_marks_completion() {
        let n = node("do it");
        assert_eq!(TodoView::render(&*n.lock().await), "- [ ] do it");
        n.lock().await.set_completed("done".to_string());
        assert_eq!(TodoView::render(&*n.lock().await), "- [x] do it");
    }

    /// **Scenario**: document tree view demotes child headings one level per
    /// depth.
    #[tokio::test]
    async fn document_tree_view_demotes_child_headings() {
        let root = tree().await;
        let guard = root.lock().await;
        let out = DocumentTreeView::render(&guard, -1).await;
        assert!(out.contains("# root"), "{}", out);
        assert!(out.contains("## child"), "{}", out);
        assert!(out.contains("### grandchild"), "{}", out);
    }

    /// **Scenario**: recursive_limit 0 renders only the node, 1 stops after
    /// direct children.
    #[tokio::test]
    async fn document_tree_view_respects_recursive_limit() {
        let root = tree().await;
        let guard = root.lock().await;
        let only_root = DocumentTreeView::render(&guard, 0).await;
        assert!(!only_root.contains("child"), "{}", only_root);
        let one_level = DocumentTreeView::render(&guard, 1).await;
        assert!(one_level.contains("## child"), "{}", one_level);
        assert!(!one_level.contains("grandchild"), "{}", one_level);
    }

    /// **Scenario**: todo tree view indents children with tabs, one per
    /// level.
    #[tokio::test]
    async fn todo_tree_view_indents_children() {
        let root = tree().await;
        let guard = root.lock().await;
        let out = TodoTreeView::render(&guard, -1).await;
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "- [ ] root");
        assert_eq!(lines[1], "\t- [ ] child");
        assert_eq!(lines[2], "\t\t- [ ] grandchild");
    }

    /// **Scenario**: json tree view nests sub_tasks arrays recursively.
    #[tokio::test]
    async fn json_tree_view_nests_sub_tasks() {
        let root = tree().await;
        let guard = root.lock().await;
        let out = JsonTreeView::render(&guard, -1).await;
        let value: Value = serde_json::from_str(&out).expect("valid json");
        assert_eq!(value["title"], json!("root"));
        assert_eq!(value["sub_tasks"][0]["title"], json!("child"));
        assert_eq!(
            value["sub_tasks"][0]["sub_tasks"][0]["title"],
            json!("grandchild")
        );
    }

    /// **Scenario**: requirement view lists type, tags and both sections.
    #[tokio::test]
    async fn requirement_view_lists_sections() {
        let n = node("req");
        let guard = n.lock().await;
        let out = RequirementView::render(&*guard);
        assert!(out.contains("# Task: req"), "{}", out);
        assert!(out.contains("## Execution Protocol"), "{}", out);
        assert!(out.contains("## Task Input"), "{}", out);
    }
}
