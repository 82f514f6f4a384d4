//! Hook types for the agent loop.
//!
//! Each agent primitive (`run_once`, `observe`, `think`, `act`) carries a
//! pre- and post-hook list, run in append order. A hook is either synchronous
//! (runs to completion without yielding) or asynchronous (a suspension
//! point); the sum type lets the agent dispatch statically instead of
//! inspecting callables at run time.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::model::{Message, QueueRef, RunContext};
use crate::task::TaskRef;

/// Hook over (context, queue, task): pre/post run-once, pre-observe, pre-act.
pub enum RunHook<T> {
    Sync(Arc<dyn Fn(&RunContext, &QueueRef, &TaskRef<T>) + Send + Sync>),
    Async(Arc<dyn Fn(RunContext, QueueRef, TaskRef<T>) -> BoxFuture<'static, ()> + Send + Sync>),
}

impl<T> RunHook<T> {
    pub async fn call(&self, ctx: &RunContext, queue: &QueueRef, task: &TaskRef<T>) {
        match self {
            Self::Sync(f) => f(ctx, queue, task),
            Self::Async(f) => f(ctx.clone(), Arc::clone(queue), Arc::clone(task)).await,
        }
    }
}

impl<T> Clone for RunHook<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

/// Post-observe hook: additionally receives the collected context messages.
pub enum ObserveHook<T> {
    Sync(Arc<dyn Fn(&RunContext, &QueueRef, &TaskRef<T>, &[Message]) + Send + Sync>),
    Async(
        Arc<
            dyn Fn(RunContext, QueueRef, TaskRef<T>, Vec<Message>) -> BoxFuture<'static, ()>
                + Send
                + Sync,
        >,
    ),
}

impl<T> ObserveHook<T> {
    pub async fn call(
        &self,
        ctx: &RunContext,
        queue: &QueueRef,
        task: &TaskRef<T>,
        observed: &[Message],
    ) {
        match self {
            Self::Sync(f) => f(ctx, queue, task, observed),
            Self::Async(f) => {
                f(
                    ctx.clone(),
                    Arc::clone(queue),
                    Arc::clone(task),
                    observed.to_vec(),
                )
                .await
            }
        }
    }
}

impl<T> Clone for ObserveHook<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

/// Pre-think hook: receives the observation that is about to be sent.
#[derive(Clone)]
pub enum MessagesHook {
    Sync(Arc<dyn Fn(&RunContext, &QueueRef, &[Message]) + Send + Sync>),
    Async(
        Arc<dyn Fn(RunContext, QueueRef, Vec<Message>) -> BoxFuture<'static, ()> + Send + Sync>,
    ),
}

impl MessagesHook {
    pub async fn call(&self, ctx: &RunContext, queue: &QueueRef, messages: &[Message]) {
        match self {
            Self::Sync(f) => f(ctx, queue, messages),
            Self::Async(f) => f(ctx.clone(), Arc::clone(queue), messages.to_vec()).await,
        }
    }
}

/// Post-think hook: receives the assistant reply.
#[derive(Clone)]
pub enum MessageHook {
    Sync(Arc<dyn Fn(&RunContext, &QueueRef, &Message) + Send + Sync>),
    Async(Arc<dyn Fn(RunContext, QueueRef, Message) -> BoxFuture<'static, ()> + Send + Sync>),
}

impl MessageHook {
    pub async fn call(&self, ctx: &RunContext, queue: &QueueRef, message: &Message) {
        match self {
            Self::Sync(f) => f(ctx, queue, message),
            Self::Async(f) => f(ctx.clone(), Arc::clone(queue), message.clone()).await,
        }
    }
}

/// Post-act hook: receives the tool-role result message.
pub enum ActHook<T> {
    Sync(Arc<dyn Fn(&RunContext, &QueueRef, &TaskRef<T>, &Message) + Send + Sync>),
    Async(
        Arc<
            dyn Fn(RunContext, QueueRef, TaskRef<T>, Message) -> BoxFuture<'static, ()>
                + Send
                + Sync,
        >,
    ),
}

impl<T> ActHook<T> {
    pub async fn call(
        &self,
        ctx: &RunContext,
        queue: &QueueRef,
        task: &TaskRef<T>,
        result: &Message,
    ) {
        match self {
            Self::Sync(f) => f(ctx, queue, task, result),
            Self::Async(f) => {
                f(
                    ctx.clone(),
                    Arc::clone(queue),
                    Arc::clone(task),
                    result.clone(),
                )
                .await
            }
        }
    }
}

impl<T> Clone for ActHook<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Sync(f) => Self::Sync(Arc::clone(f)),
            Self::Async(f) => Self::Async(Arc::clone(f)),
        }
    }
}

/// The eight hook lists of one agent.
pub struct AgentHooks<T> {
    pub pre_run_once: Vec<RunHook<T>>,
    pub post_run_once: Vec<RunHook<T>>,
    pub pre_observe: Vec<RunHook<T>>,
    pub post_observe: Vec<ObserveHook<T>>,
    pub pre_think: Vec<MessagesHook>,
    pub post_think: Vec<MessageHook>,
    pub pre_act: Vec<RunHook<T>>,
    pub post_act: Vec<ActHook<T>>,
}

impl<T> Default for AgentHooks<T> {
    fn default() -> Self {
        Self {
            pre_run_once: Vec::new(),
            post_run_once: Vec::new(),
            pre_observe: Vec::new(),
            post_observe: Vec::new(),
            pre_think: Vec::new(),
            post_think: Vec::new(),
            pre_act: Vec::new(),
            post_act: Vec::new(),
        }
    }
}
