//! Bounded FIFO queue between the callback tasks and the dispatch task.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::{Error, Result};

struct Inner<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity async queue.
///
/// `push` waits while the queue is full and `pop` waits while it is empty.
/// After [`close`](Self::close) every waiter wakes up, pushes fail with
/// [`Error::Closed`], and `pop` drains what is left before returning `None`.
///
/// # Example
///
/// ```
/// use tradelink_rs::session::EventQueue;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let queue = EventQueue::new(2);
/// queue.push(1).await.unwrap();
/// queue.push(2).await.unwrap();
/// assert!(queue.try_push(3).is_err());
///
/// queue.close();
/// assert_eq!(queue.pop().await, Some(1));
/// assert_eq!(queue.pop().await, Some(2));
/// assert_eq!(queue.pop().await, None);
/// # }
/// ```
pub struct EventQueue<T> {
    inner: Mutex<Inner<T>>,
    capacity: usize,
    not_empty: Notify,
    not_full: Notify,
}

impl<T> EventQueue<T> {
    /// Create a queue holding at most `capacity` items (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Mutex::new(Inner {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            not_empty: Notify::new(),
            not_full: Notify::new(),
        }
    }

    /// Append an item, waiting for room if the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the queue is closed before the item fits.
    pub async fn push(&self, item: T) -> Result<()> {
        loop {
            let notified = self.not_full.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                if inner.closed {
                    return Err(Error::Closed);
                }
                if inner.items.len() < self.capacity {
                    inner.items.push_back(item);
                    drop(inner);
                    self.not_empty.notify_one();
                    return Ok(());
                }
            }

            notified.await;
        }
    }

    /// Append an item without waiting; hands the item back if the queue is
    /// full or closed.
    pub fn try_push(&self, item: T) -> std::result::Result<(), T> {
        let mut inner = self.inner.lock();
        if inner.closed || inner.items.len() >= self.capacity {
            return Err(item);
        }
        inner.items.push_back(item);
        drop(inner);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the oldest item, waiting while the queue is empty.
    ///
    /// Returns `None` once the queue is closed and drained.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut inner = self.inner.lock();
                if let Some(item) = inner.items.pop_front() {
                    drop(inner);
                    self.not_full.notify_one();
                    return Some(item);
                }
                if inner.closed {
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Remove the oldest item without waiting.
    pub fn try_pop(&self) -> Option<T> {
        let item = self.inner.lock().items.pop_front();
        if item.is_some() {
            self.not_full.notify_one();
        }
        item
    }

    /// Close the queue and wake every waiter.
    pub fn close(&self) {
        self.inner.lock().closed = true;
        self.not_empty.notify_waiters();
        self.not_full.notify_waiters();
    }

    /// Returns `true` after [`close`](Self::close).
    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    /// Number of queued items.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    /// Returns `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of queued items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
