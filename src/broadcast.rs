//! Fan-out of engine output to any number of bounded subscriber queues.
//!
//! Publishing never waits: a full subscriber misses the item, a closed one
//! is pruned. Producers see the result as a [`PublishReport`].

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::debug;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

impl PublishReport {
    pub fn absorb(&mut self, other: PublishReport) {
        self.delivered += other.delivered;
        self.dropped += other.dropped;
    }
}

/// Lifetime counters, served by the API.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BroadcastStats {
    pub subscribers: usize,
    pub published: u64,
    pub delivered: u64,
    pub dropped: u64,
}

pub struct Broadcaster<T> {
    subscribers: RwLock<Vec<mpsc::Sender<T>>>,
    capacity: usize,
    published: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

impl<T: Clone + Send> Broadcaster<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            capacity: capacity.max(1),
            published: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// New bounded queue. Only items published after this call are received.
    pub fn subscribe(&self) -> mpsc::Receiver<T> {
        let (tx, rx) = mpsc::channel(self.capacity);
        self.subscribers.write().push(tx);
        debug!(capacity = self.capacity, "[FABRIC] subscriber added");
        rx
    }

    pub fn publish(&self, item: &T) -> PublishReport {
        let mut report = PublishReport::default();
        let mut saw_closed = false;
        {
            let subscribers = self.subscribers.read();
            for tx in subscribers.iter() {
                match tx.try_send(item.clone()) {
                    Ok(()) => report.delivered += 1,
                    Err(TrySendError::Full(_)) => report.dropped += 1,
                    Err(TrySendError::Closed(_)) => saw_closed = true,
                }
            }
        }
        if saw_closed {
            self.prune_closed();
        }

        self.published.fetch_add(1, Ordering::Relaxed);
        self.delivered.fetch_add(report.delivered as u64, Ordering::Relaxed);
        self.dropped.fetch_add(report.dropped as u64, Ordering::Relaxed);
        report
    }

    pub fn publish_all<'a, I>(&self, items: I) -> PublishReport
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        let mut report = PublishReport::default();
        for item in items {
            report.absorb(self.publish(item));
        }
        if report.dropped > 0 {
            debug!(dropped = report.dropped, "[FABRIC] slow subscriber(s) missed items");
        }
        report
    }

    fn prune_closed(&self) {
        let mut subscribers = self.subscribers.write();
        let before = subscribers.len();
        subscribers.retain(|tx| !tx.is_closed());
        debug!(removed = before - subscribers.len(), "[FABRIC] pruned closed subscribers");
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            subscribers: self.subscriber_count(),
            published: self.published.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn full_queue_drops_without_blocking() {
        let fabric: Broadcaster<u32> = Broadcaster::new(100);
        let mut rx = fabric.subscribe();

        let items: Vec<u32> = (0..101).collect();
        let report = fabric.publish_all(&items);
        assert_eq!(report, PublishReport { delivered: 100, dropped: 1 });

        let mut received = Vec::new();
        while let Ok(v) = rx.try_recv() {
            received.push(v);
        }
        assert_eq!(received, (0..100).collect::<Vec<_>>());
        assert_eq!(fabric.stats().dropped, 1);
    }

    #[tokio::test]
    async fn slow_subscriber_does_not_starve_others() {
        let fabric: Broadcaster<u32> = Broadcaster::new(2);
        let _slow = fabric.subscribe();
        let mut fast = fabric.subscribe();

        for i in 0..5 {
            fabric.publish(&i);
            assert_eq!(fast.recv().await, Some(i));
        }
        let stats = fabric.stats();
        assert_eq!(stats.published, 5);
        assert_eq!(stats.delivered, 7);
        assert_eq!(stats.dropped, 3);
    }

    #[tokio::test]
    async fn closed_subscribers_are_pruned() {
        let fabric: Broadcaster<u32> = Broadcaster::new(4);
        let rx = fabric.subscribe();
        let mut live = fabric.subscribe();
        drop(rx);
        assert_eq!(fabric.subscriber_count(), 2);

        let report = fabric.publish(&7);
        assert_eq!(report, PublishReport { delivered: 1, dropped: 0 });
        assert_eq!(fabric.subscriber_count(), 1);
        assert_eq!(live.recv().await, Some(7));
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_no_op() {
        let fabric: Broadcaster<u32> = Broadcaster::new(4);
        assert_eq!(fabric.publish(&1), PublishReport::default());
        assert_eq!(fabric.stats().published, 1);
    }

    #[tokio::test]
    async fn late_subscriber_sees_only_new_items() {
        let fabric: Broadcaster<u32> = Broadcaster::new(4);
        fabric.publish(&1);
        let mut rx = fabric.subscribe();
        fabric.publish(&2);
        assert_eq!(rx.recv().await, Some(2));
        assert!(rx.try_recv().is_err());
    }
}
