//! Event dispatch task.
//!
//! Callback tasks publish events into an [`EventQueue`]; a single dispatch
//! task pops them and runs the subscribed handlers in subscription order.
//! Handlers therefore never run on a transport callback task.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::queue::EventQueue;
use crate::{Error, Result};

/// Event handler registered with [`Dispatcher::subscribe`].
pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type Handlers<E> = Arc<RwLock<Vec<(SubscriptionId, Handler<E>)>>>;

/// Owns the event queue, the handler list and the dispatch task.
pub struct Dispatcher<E> {
    name: &'static str,
    capacity: usize,
    log_events: bool,
    handlers: Handlers<E>,
    next_id: AtomicU64,
    queue: Mutex<Option<Arc<EventQueue<E>>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<E> Dispatcher<E>
where
    E: fmt::Debug + Send + Sync + 'static,
{
    /// Create a stopped dispatcher.
    pub fn new(name: &'static str, capacity: usize, log_events: bool) -> Self {
        Self {
            name,
            capacity,
            log_events,
            handlers: Arc::new(RwLock::new(Vec::new())),
            next_id: AtomicU64::new(1),
            queue: Mutex::new(None),
            task: Mutex::new(None),
        }
    }

    /// Register a handler; it sees every event dispatched from now on.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.write().push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if the id is unknown.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers.read().len()
    }

    /// Open a fresh queue and spawn the dispatch task.
    ///
    /// Does nothing if the dispatcher is already running.
    pub fn start(&self) {
        let mut slot = self.queue.lock();
        if slot.as_ref().is_some_and(|queue| !queue.is_closed()) {
            return;
        }

        let queue = Arc::new(EventQueue::new(self.capacity));
        *slot = Some(queue.clone());
        drop(slot);

        let handlers = self.handlers.clone();
        let name = self.name;
        let log_events = self.log_events;
        let handle = tokio::spawn(async move {
            Self::run(name, log_events, queue, handlers).await;
        });
        *self.task.lock() = Some(handle);
    }

    /// Queue an event for dispatch, waiting while the queue is full.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Closed`] if the dispatcher is not running.
    pub async fn publish(&self, event: E) -> Result<()> {
        let queue = self.queue.lock().clone().ok_or(Error::Closed)?;
        queue.push(event).await
    }

    /// Returns `true` while the queue accepts events.
    pub fn is_running(&self) -> bool {
        self.queue
            .lock()
            .as_ref()
            .is_some_and(|queue| !queue.is_closed())
    }

    /// Close the queue without waiting; the task drains it and exits.
    pub fn close(&self) {
        if let Some(queue) = self.queue.lock().as_ref() {
            queue.close();
        }
        self.task.lock().take();
    }

    /// Close the queue, let the task drain it, and wait for the task.
    pub async fn shutdown(&self) {
        let queue = self.queue.lock().clone();
        if let Some(queue) = queue {
            queue.close();
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(dispatcher = self.name, error = %e, "Dispatch task ended abnormally");
            }
        }
    }

    async fn run(
        name: &'static str,
        log_events: bool,
        queue: Arc<EventQueue<E>>,
        handlers: Handlers<E>,
    ) {
        debug!(dispatcher = name, "Dispatch task started");

        while let Some(event) = queue.pop().await {
            if log_events {
                debug!(dispatcher = name, event = ?event, "Dispatching event");
            }

            let snapshot: Vec<(SubscriptionId, Handler<E>)> = handlers.read().clone();
            for (id, handler) in snapshot {
                if catch_unwind(AssertUnwindSafe(|| handler(&event))).is_err() {
                    error!(
                        dispatcher = name,
                        subscription = %id,
                        event = ?event,
                        "Event handler panicked"
                    );
                }
            }
        }

        debug!(dispatcher = name, "Dispatch task stopped");
    }
}

impl<E> fmt::Debug for Dispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("handlers", &self.handlers.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn test_handlers_run_in_subscription_order() {
        let dispatcher = Dispatcher::new("test", 8, true);
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["first", "second"] {
            let seen = seen.clone();
            dispatcher.subscribe(move |event: &u32| seen.lock().push((tag, *event)));
        }

        dispatcher.start();
        dispatcher.publish(1).await.unwrap();
        dispatcher.publish(2).await.unwrap();
        dispatcher.shutdown().await;

        assert_eq!(
            *seen.lock(),
            vec![("first", 1), ("second", 1), ("first", 2), ("second", 2)]
        );
    }

    #[tokio::test]
    async fn test_unsubscribe() {
        let dispatcher = Dispatcher::new("test", 8, false);
        let count = Arc::new(AtomicUsize::new(0));
        let id = {
            let count = count.clone();
            dispatcher.subscribe(move |_: &u32| {
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        assert!(dispatcher.unsubscribe(id));
        assert!(!dispatcher.unsubscribe(id));
        assert_eq!(dispatcher.handler_count(), 0);

        dispatcher.start();
        dispatcher.publish(7).await.unwrap();
        dispatcher.shutdown().await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panicking_handler_is_isolated() {
        let dispatcher = Dispatcher::new("test", 8, false);
        let count = Arc::new(AtomicUsize::new(0));

        dispatcher.subscribe(|event: &u32| {
            if *event == 1 {
                panic!("handler failure");
            }
        });
        {
            let count = count.clone();
            dispatcher.subscribe(move |_: &u32| {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }

        dispatcher.start();
        for i in 0..3 {
            dispatcher.publish(i).await.unwrap();
        }
        dispatcher.shutdown().await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_publish_requires_running_dispatcher() {
        let dispatcher: Dispatcher<u32> = Dispatcher::new("test", 8, false);
        assert_eq!(dispatcher.publish(1).await, Err(Error::Closed));

        dispatcher.start();
        assert!(dispatcher.is_running());
        dispatcher.shutdown().await;
        assert!(!dispatcher.is_running());
        assert_eq!(dispatcher.publish(1).await, Err(Error::Closed));

        dispatcher.start();
        assert!(dispatcher.publish(2).await.is_ok());
        dispatcher.shutdown().await;
    }
}
