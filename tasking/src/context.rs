//! Per-state message history.
//!
//! Each task state owns one [`Context`]: an append-only, ordered sequence of
//! messages. Switching states never moves messages between contexts, and a
//! task reset recreates every context empty.

use crate::model::Message;

/// Append-only ordered message history for one task state.
#[derive(Debug, Clone, Default)]
pub struct Context {
    data: Vec<Message>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// The messages in append order.
    pub fn data(&self) -> &[Message] {
        &self.data
    }

    /// Appends one message. Appends are in program order and never reordered.
    pub fn append(&mut self, message: Message) {
        self.data.push(message);
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: appends keep program order; clear empties the context.
    #[test]
    fn context_appends_in_order_and_clears() {
        let mut ctx = Context::new();
        ctx.append(Message::user("first"));
        ctx.append(Message::assistant("second"));
        assert_eq!(ctx.len(), 2);
        assert_eq!(ctx.data()[0].content, "first");
        assert_eq!(ctx.data()[1].content, "second");
        ctx.clear();
        assert!(ctx.is_empty());
    }
}
