//! Async FIFO queue used to stream messages out of the runtime.
//!
//! The core produces [`Message`](crate::model::Message) values into a
//! consumer-owned queue; framing, completion sentinels and backpressure
//! policy belong to the caller. [`AsyncQueue`] is the default concrete form:
//! bounded or unbounded, safe for one producer and many cooperative
//! consumers.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{Mutex, Notify};

/// Queue operation failure.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Non-blocking put on a full bounded queue.
    #[error("queue is full")]
    Full,
    /// Non-blocking get on an empty queue.
    #[error("queue is empty")]
    Empty,
}

/// Abstract FIFO of values flowing from the runtime to a consumer.
#[async_trait]
pub trait Queue<T: Send>: Send + Sync {
    /// Appends an item, waiting for capacity on a bounded queue.
    async fn put(&self, item: T);

    /// Appends an item without waiting; `Err(Full)` when bounded and full.
    async fn put_nowait(&self, item: T) -> Result<(), QueueError>;

    /// Removes and returns the oldest item, waiting until one is available.
    async fn get(&self) -> T;

    /// Removes and returns the oldest item; `Err(Empty)` when none queued.
    async fn get_nowait(&self) -> Result<T, QueueError>;

    /// True when no items are queued.
    async fn is_empty(&self) -> bool;

    /// True when a bounded queue is at capacity; always false when unbounded.
    async fn is_full(&self) -> bool;
}

/// Cooperative FIFO on tokio primitives.
pub struct AsyncQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: Option<usize>,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> AsyncQueue<T> {
    /// Creates an unbounded queue.
    pub fn new() -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: None,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Creates a bounded queue with the given capacity.
    pub fn bounded(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            capacity: Some(capacity),
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Shared unbounded queue, the shape every runtime entry point takes.
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    fn has_room(&self, len: usize) -> bool {
        self.capacity.map_or(true, |cap| len < cap)
    }
}

impl<T> Default for AsyncQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send> Queue<T> for AsyncQueue<T> {
    async fn put(&self, item: T) {
        loop {
            {
                let mut items = self.items.lock().await;
                if self.has_room(items.len()) {
                    items.push_back(item);
                    self.not_empty.notify_one();
                    return;
                }
            }
            // notify_one stores a permit when no task is waiting, so a wakeup
            // between the lock release and this await is not lost.
            self.not_full.notified().await;
        }
    }

    async fn put_nowait(&self, item: T) -> Result<(), QueueError> {
        let mut items = self.items.lock().await;
        if !self.has_room(items.len()) {
            return Err(QueueError::Full);
        }
        items.push_back(item);
        self.not_empty.notify_one();
        Ok(())
    }

    async fn get(&self) -> T {
        loop {
            {
                let mut items = self.items.lock().await;
                if let Some(item) = items.pop_front() {
                    self.not_full.notify_one();
                    return item;
                }
            }
            self.not_empty.notified().await;
        }
    }

    async fn get_nowait(&self) -> Result<T, QueueError> {
        let mut items = self.items.lock().await;
        let item = items.pop_front().ok_or(QueueError::Empty)?;
        self.not_full.notify_one();
        Ok(item)
    }

    async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    async fn is_full(&self) -> bool {
        let items = self.items.lock().await;
        !self.has_room(items.len())
    }
}
