//! Command Queue
//!
//! Unbounded FIFO between the public subscribe/unsubscribe calls and the
//! stream writer task. Any thread may enqueue; one task dequeues.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::domain::subscription::SubscriptionCommand;

/// The queue no longer accepts commands.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("command queue is closed")]
pub struct QueueClosed;

/// Thread-safe FIFO of subscription commands.
#[derive(Debug, Default)]
pub struct CommandQueue {
    items: Mutex<VecDeque<SubscriptionCommand>>,
    notify: Notify,
    closed: AtomicBool,
}

impl CommandQueue {
    /// Create an empty, open queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command. Never blocks and never fails for capacity.
    ///
    /// # Errors
    ///
    /// Returns [`QueueClosed`] once [`close`](Self::close) has been called.
    pub fn enqueue(&self, command: SubscriptionCommand) -> Result<(), QueueClosed> {
        {
            let mut items = self.items.lock();
            // Checked under the lock so nothing lands after close() drains.
            if self.closed.load(Ordering::Acquire) {
                return Err(QueueClosed);
            }
            items.push_back(command);
        }
        self.notify.notify_one();
        Ok(())
    }

    /// Take the oldest command without waiting.
    #[must_use]
    pub fn try_dequeue(&self) -> Option<SubscriptionCommand> {
        self.items.lock().pop_front()
    }

    /// Take the oldest command, waiting up to `timeout` for one to arrive.
    ///
    /// Returns `None` on timeout, or immediately if the queue is closed and
    /// empty.
    pub async fn dequeue(&self, timeout: Duration) -> Option<SubscriptionCommand> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(command) = self.try_dequeue() {
                return Some(command);
            }
            if self.is_closed() {
                return None;
            }
            if tokio::time::timeout_at(deadline, self.notify.notified())
                .await
                .is_err()
            {
                return self.try_dequeue();
            }
        }
    }

    /// Stop accepting commands. Queued commands remain dequeuable.
    pub fn close(&self) {
        {
            let _items = self.items.lock();
            self.closed.store(true, Ordering::Release);
        }
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Check whether the queue has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Drop every queued command, returning how many were dropped.
    pub fn clear(&self) -> usize {
        let mut items = self.items.lock();
        let count = items.len();
        items.clear();
        count
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Check whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use proptest::prelude::*;

    use super::*;

    fn command(id: impl Into<String>) -> SubscriptionCommand {
        SubscriptionCommand::UnsubscribeOrderTrade {
            request_id: id.into(),
        }
    }

    #[test]
    fn fifo_order() {
        let queue = CommandQueue::new();
        queue.enqueue(command("a")).unwrap();
        queue.enqueue(command("b")).unwrap();
        queue.enqueue(command("c")).unwrap();

        assert_eq!(queue.len(), 3);
        let ids: Vec<_> = std::iter::from_fn(|| queue.try_dequeue())
            .map(|c| c.request_id().to_string())
            .collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn duplicates_are_kept() {
        let queue = CommandQueue::new();
        queue.enqueue(command("same")).unwrap();
        queue.enqueue(command("same")).unwrap();
        assert_eq!(queue.len(), 2);
    }

    #[test]
    fn enqueue_after_close_fails() {
        let queue = CommandQueue::new();
        queue.enqueue(command("before")).unwrap();
        queue.close();

        assert_eq!(queue.enqueue(command("after")), Err(QueueClosed));
        assert!(queue.is_closed());
        assert_eq!(queue.try_dequeue().unwrap().request_id(), "before");
    }

    #[test]
    fn clear_reports_dropped_count() {
        let queue = CommandQueue::new();
        queue.enqueue(command("a")).unwrap();
        queue.enqueue(command("b")).unwrap();
        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn dequeue_times_out_without_error() {
        let queue = CommandQueue::new();
        assert!(queue.dequeue(Duration::from_millis(30)).await.is_none());
    }

    #[tokio::test]
    async fn dequeue_wakes_on_enqueue() {
        let queue = Arc::new(CommandQueue::new());
        let producer = Arc::clone(&queue);

        let waiter = tokio::spawn(async move { queue.dequeue(Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        producer.enqueue(command("late")).unwrap();

        let received = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.unwrap().request_id(), "late");
    }

    #[tokio::test]
    async fn dequeue_returns_immediately_when_closed_and_empty() {
        let queue = CommandQueue::new();
        queue.close();
        let result = tokio::time::timeout(
            Duration::from_millis(100),
            queue.dequeue(Duration::from_secs(60)),
        )
        .await
        .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn concurrent_producers_keep_their_own_order() {
        const PRODUCERS: usize = 4;
        const PER_PRODUCER: usize = 250;

        let queue = Arc::new(CommandQueue::new());
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for i in 0..PER_PRODUCER {
                        queue.enqueue(command(format!("{p}:{i}"))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut next = [0usize; PRODUCERS];
        while let Some(cmd) = queue.try_dequeue() {
            let (p, i) = cmd.request_id().split_once(':').unwrap();
            let p: usize = p.parse().unwrap();
            let i: usize = i.parse().unwrap();
            assert_eq!(i, next[p], "producer {p} out of order");
            next[p] += 1;
        }
        assert!(next.iter().all(|&n| n == PER_PRODUCER));
    }

    proptest! {
        #[test]
        fn dequeue_order_matches_arrival_order(producers in prop::collection::vec(0u8..4, 0..64)) {
            let queue = CommandQueue::new();
            let mut counters = [0u32; 4];
            let mut arrival = Vec::with_capacity(producers.len());

            for p in producers {
                let id = format!("{p}:{}", counters[p as usize]);
                counters[p as usize] += 1;
                queue.enqueue(command(id.clone())).unwrap();
                arrival.push(id);
            }

            let drained: Vec<String> = std::iter::from_fn(|| queue.try_dequeue())
                .map(|c| c.request_id().to_string())
                .collect();
            prop_assert_eq!(drained, arrival);
        }
    }
}
