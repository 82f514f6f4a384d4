//! Human-in-the-loop client.
//!
//! An agent that needs human input publishes a message to the outbound queue
//! and suspends on a rendezvous keyed `"user_id:trace_id"`. External
//! transport code posts the reply via `handle_human_response`, which resumes
//! the waiting agent. A reply whose key has no waiter (e.g. a late second
//! reply after the first was consumed) is logged and dropped.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::oneshot;
use tracing::warn;

use crate::error::RuntimeError;
use crate::model::{Message, QueueRef, RunContext};

/// Bridge between agents and a human operator.
#[async_trait]
pub trait HumanClient: Send + Sync {
    /// Publishes `message` for the human and waits for exactly one reply.
    ///
    /// `Err(HumanInterfere)` when the human explicitly rejects the requested
    /// action (the reply arrives flagged `is_error`).
    async fn ask_human(
        &self,
        ctx: &RunContext,
        queue: &QueueRef,
        message: Message,
    ) -> Result<Message, RuntimeError>;

    /// Posts an inbound human reply to the matching rendezvous.
    async fn handle_human_response(
        &self,
        ctx: &RunContext,
        message: Message,
    ) -> Result<(), RuntimeError>;
}

/// Rendezvous-based human client: one pending question per
/// `"user_id:trace_id"` key.
#[derive(Default)]
pub struct ChannelHumanClient {
    pending: DashMap<String, oneshot::Sender<Message>>,
}

impl ChannelHumanClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HumanClient for ChannelHumanClient {
    async fn ask_human(
        &self,
        ctx: &RunContext,
        queue: &QueueRef,
        message: Message,
    ) -> Result<Message, RuntimeError> {
        let key = ctx.rendezvous_key()?;
        let (tx, rx) = oneshot::channel();
        // Registering before the publish means a fast reply cannot race past
        // the rendezvous.
        self.pending.insert(key.clone(), tx);
        queue.put(message).await;

        let reply = rx.await.map_err(|_| {
            RuntimeError::HumanInterfere("human response channel closed".to_string())
        })?;
        if reply.is_error {
            return Err(RuntimeError::HumanInterfere(reply.text()));
        }
        Ok(reply)
    }

    async fn handle_human_response(
        &self,
        ctx: &RunContext,
        message: Message,
    ) -> Result<(), RuntimeError> {
        let key = ctx.rendezvous_key()?;
        match self.pending.remove(&key) {
            Some((_, tx)) => {
                if tx.send(message).is_err() {
                    warn!(key = %key, "human reply dropped, asker is gone");
                }
                Ok(())
            }
            None => {
                // Late or duplicate reply: dropped by design.
                warn!(key = %key, "human reply dropped, no pending question");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::model::AsyncQueue;

    fn ctx() -> RunContext {
        RunContext::with_identity("u", "p", "t")
    }

    fn queue() -> QueueRef {
        Arc::new(AsyncQueue::new())
    }

    /// **Scenario**: ask_human publishes the question, suspends, and resumes
    /// with the posted reply.
    #[tokio::test]
    async fn ask_human_rendezvous_roundtrip() {
        let client = Arc::new(ChannelHumanClient::new());
        let queue = queue();
        let asker = {
            let client = Arc::clone(&client);
            let queue = Arc::clone(&queue);
            tokio::spawn(async move {
                client
                    .ask_human(&ctx(), &queue, Message::assistant("need approval"))
                    .await
            })
        };

        // The question reaches the outbound queue first.
        let question = queue.get().await;
        assert_eq!(question.content, "need approval");

        client
            .handle_human_response(&ctx(), Message::user("approved"))
            .await
            .expect("delivered");
        let reply = asker.await.expect("join").expect("no interfere");
        assert_eq!(reply.content, "approved");
    }

    /// **Scenario**: a second reply for the same key after the first was
    /// consumed is dropped without error.
    #[tokio::test]
    async fn late_second_reply_is_dropped() {
        let client = Arc::new(ChannelHumanClient::new());
        let queue = queue();
        let asker = {
            let client = Arc::clone(&client);
            let queue = Arc::clone(&queue);
            tokio::spawn(
                async move { client.ask_human(&ctx(), &queue, Message::user("q")).await },
            )
        };
        let _question = queue.get().await;
        client
            .handle_human_response(&ctx(), Message::user("first"))
            .await
            .expect("delivered");
        assert_eq!(asker.await.expect("join").expect("reply").content, "first");

        client
            .handle_human_response(&ctx(), Message::user("second"))
            .await
            .expect("dropped silently");
    }

    /// **Scenario**: a reply flagged is_error resolves into HumanInterfere.
    #[tokio::test]
    async fn rejection_reply_raises_human_interfere() {
        let client = Arc::new(ChannelHumanClient::new());
        let queue = queue();
        let asker = {
            let client = Arc::clone(&client);
            let queue = Arc::clone(&queue);
            tokio::spawn(
                async move { client.ask_human(&ctx(), &queue, Message::user("q")).await },
            )
        };
        let _question = queue.get().await;
        let mut rejection = Message::user("do not do that");
        rejection.is_error = true;
        client
            .handle_human_response(&ctx(), rejection)
            .await
            .expect("delivered");
        let err = asker.await.expect("join").unwrap_err();
        assert!(matches!(err, RuntimeError::HumanInterfere(_)));
    }

    /// **Scenario**: ask_human without the reserved context keys fails before
    /// publishing anything.
    #[tokio::test]
    async fn missing_context_keys_fail_fast() {
        let client = ChannelHumanClient::new();
        let queue = queue();
        let err = client
            .ask_human(&RunContext::new(), &queue, Message::user("q"))
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::MissingContextKey(_)));
        assert!(queue.is_empty().await);
    }
}
