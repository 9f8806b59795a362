//! Debounce queue for reconcile triggers.
//!
//! Producers (watch events, resync ticks, retry requests) call [`DebounceQueue::add`]
//! from any task. The single consumer pulls with [`DebounceQueue::get`] and acknowledges
//! with [`DebounceQueue::done`].
//!
//! An item is either *pending* (queued, waiting for `get`) or *in flight*
//! (handed out, waiting for `done`). Adding an item that is already pending
//! is a no-op. Adding an item that is in flight marks it dirty; it is queued
//! again when `done` is called, never handed out twice at the same time.

use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::hash::Hash;
use tokio::sync::Notify;
use tracing::{debug, trace};

/// Opaque "something may have changed" token.
///
/// Carries no payload: each pass re-lists the full state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ReconcileTrigger;

struct QueueState<T> {
    /// Items waiting for `get`, in arrival order
    queue: VecDeque<T>,
    /// Items that need processing (pending, or re-added while in flight)
    dirty: HashSet<T>,
    /// Items handed out and not yet acknowledged
    processing: HashSet<T>,
    shutting_down: bool,
}

/// Coalescing work queue with blocking pull, ack and shutdown.
pub struct DebounceQueue<T> {
    state: Mutex<QueueState<T>>,
    notify: Notify,
}

impl<T> DebounceQueue<T>
where
    T: Clone + Eq + Hash + std::fmt::Debug,
{
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                dirty: HashSet::new(),
                processing: HashSet::new(),
                shutting_down: false,
            }),
            notify: Notify::new(),
        }
    }

    /// Mark `item` as needing processing.
    ///
    /// Ignored after shutdown.
    pub fn add(&self, item: T) {
        {
            let mut state = self.state.lock();
            if state.shutting_down {
                trace!(item = ?item, "Queue shut down, dropping add");
                return;
            }
            if !state.dirty.insert(item.clone()) {
                trace!(item = ?item, "Item already pending, coalesced");
                return;
            }
            if state.processing.contains(&item) {
                trace!(item = ?item, "Item in flight, will be redelivered after done");
                return;
            }
            state.queue.push_back(item);
        }
        self.notify.notify_one();
    }

    /// Wait for the next item.
    ///
    /// Returns `None` once the queue is shut down and drained.
    pub async fn get(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking state so a concurrent add or
            // shutdown cannot slip between the check and the wait.
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.queue.pop_front() {
                    state.dirty.remove(&item);
                    state.processing.insert(item.clone());
                    return Some(item);
                }
                if state.shutting_down {
                    debug!("Queue shut down and drained");
                    return None;
                }
            }

            notified.await;
        }
    }

    /// Acknowledge `item`; re-queue it if it was added while in flight.
    pub fn done(&self, item: &T) {
        let requeued = {
            let mut state = self.state.lock();
            state.processing.remove(item);
            if state.dirty.contains(item) {
                state.queue.push_back(item.clone());
                true
            } else {
                false
            }
        };

        if requeued {
            trace!(item = ?item, "Redelivering item added while in flight");
            self.notify.notify_one();
        }
    }

    /// Stop accepting items and wake the consumer.
    pub fn shut_down(&self) {
        self.state.lock().shutting_down = true;
        debug!("Shutting down queue");
        self.notify.notify_waiters();
    }

    /// Number of pending items.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for DebounceQueue<T>
where
    T: Clone + Eq + Hash + std::fmt::Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_adds_collapse() {
        let queue = Arc::new(DebounceQueue::new());
        let start = Arc::new(tokio::sync::Barrier::new(32));

        let handles: Vec<_> = (0..32)
            .map(|_| {
                let queue = Arc::clone(&queue);
                let start = Arc::clone(&start);
                tokio::spawn(async move {
                    start.wait().await;
                    for _ in 0..100 {
                        queue.add(ReconcileTrigger);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(queue.len(), 1);
        let item = queue.get().await;
        assert_eq!(item, Some(ReconcileTrigger));
        assert!(queue.is_empty());

        // Nothing else was queued
        assert!(timeout(Duration::from_millis(50), queue.get()).await.is_err());
    }

    #[tokio::test]
    async fn test_add_during_processing_redelivered_after_done() {
        let queue = DebounceQueue::new();
        queue.add(ReconcileTrigger);

        let item = queue.get().await.unwrap();
        queue.add(ReconcileTrigger);
        queue.add(ReconcileTrigger);

        // Still in flight, so not handed out again
        assert!(queue.is_empty());
        assert!(timeout(Duration::from_millis(50), queue.get()).await.is_err());

        queue.done(&item);
        assert_eq!(queue.len(), 1);
        let again = timeout(Duration::from_millis(50), queue.get()).await.unwrap();
        assert_eq!(again, Some(ReconcileTrigger));
    }

    #[tokio::test]
    async fn test_done_without_readd_does_not_requeue() {
        let queue = DebounceQueue::new();
        queue.add(ReconcileTrigger);
        let item = queue.get().await.unwrap();
        queue.done(&item);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_get_wakes_on_add() {
        let queue = Arc::new(DebounceQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.add(ReconcileTrigger);

        let item = timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert_eq!(item, Some(ReconcileTrigger));
    }

    #[tokio::test]
    async fn test_shutdown_wakes_blocked_consumer() {
        let queue: Arc<DebounceQueue<ReconcileTrigger>> = Arc::new(DebounceQueue::new());
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.shut_down();

        let item = timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert_eq!(item, None);
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_then_quits() {
        let queue = DebounceQueue::new();
        queue.add(1u32);
        queue.add(2u32);
        queue.shut_down();
        queue.add(3u32);

        assert_eq!(queue.get().await, Some(1));
        assert_eq!(queue.get().await, Some(2));
        assert_eq!(queue.get().await, None);
    }

    #[tokio::test]
    async fn test_distinct_items_keep_order() {
        let queue = DebounceQueue::new();
        queue.add("a");
        queue.add("b");
        queue.add("a");
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.get().await, Some("a"));
        assert_eq!(queue.get().await, Some("b"));
    }
}
