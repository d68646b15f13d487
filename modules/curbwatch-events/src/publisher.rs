//! Bounded domain-event publisher.
//!
//! A fixed-capacity queue feeds a small worker pool that delivers events to
//! subscribers. `publish` never blocks and never fails the caller: a full
//! queue drops the event with a warning. `shutdown` closes the queue and
//! waits for the workers to drain what was already enqueued.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use curbwatch_common::events::DomainEvent;

use crate::subscribers::EventSubscriber;

pub struct EventPublisher {
    /// Taken on shutdown to close the queue.
    tx: std::sync::Mutex<Option<mpsc::Sender<DomainEvent>>>,
    depth: Arc<AtomicUsize>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl EventPublisher {
    /// Start the worker pool. `capacity` bounds the queue; `worker_count`
    /// workers deliver concurrently.
    pub fn start(
        subscribers: Vec<Arc<dyn EventSubscriber>>,
        capacity: usize,
        worker_count: usize,
    ) -> Self {
        let (tx, rx) = mpsc::channel::<DomainEvent>(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let depth = Arc::new(AtomicUsize::new(0));
        let subscribers = Arc::new(subscribers);

        let workers = (0..worker_count.max(1))
            .map(|worker| {
                let rx = Arc::clone(&rx);
                let depth = Arc::clone(&depth);
                let subscribers = Arc::clone(&subscribers);
                tokio::spawn(async move {
                    loop {
                        // Take one event at a time so the pool shares the queue.
                        let event = { rx.lock().await.recv().await };
                        let Some(event) = event else {
                            break; // queue closed and drained
                        };
                        depth.fetch_sub(1, Ordering::Relaxed);
                        deliver(&subscribers, &event, worker).await;
                    }
                })
            })
            .collect();

        info!(capacity, worker_count, "Event publisher started");
        Self {
            tx: std::sync::Mutex::new(Some(tx)),
            depth,
            workers: Mutex::new(workers),
        }
    }

    /// Enqueue an event for delivery. Non-blocking; a full queue drops the
    /// event, since publication is best-effort relative to the committed
    /// transaction that produced it.
    pub fn publish(&self, event: DomainEvent) {
        let guard = self.tx.lock().unwrap_or_else(|e| e.into_inner());
        let Some(tx) = guard.as_ref() else {
            warn!(
                event_type = event.event_type(),
                "Event publisher already shut down, dropping event"
            );
            return;
        };
        match tx.try_send(event) {
            Ok(()) => {
                let depth = self.depth.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(queue_depth = depth, "Domain event enqueued");
            }
            Err(mpsc::error::TrySendError::Full(event))
            | Err(mpsc::error::TrySendError::Closed(event)) => {
                warn!(
                    event_type = event.event_type(),
                    queue_depth = self.depth.load(Ordering::Relaxed),
                    "Event queue full, dropping event"
                );
            }
        }
    }

    pub fn publish_all(&self, events: impl IntoIterator<Item = DomainEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    /// Events currently waiting in the queue.
    pub fn queue_depth(&self) -> usize {
        self.depth.load(Ordering::Relaxed)
    }

    /// Close the queue and wait for the workers to deliver everything that
    /// was already enqueued. Safe to call once; later publishes are dropped.
    pub async fn shutdown(&self) {
        let tx = self
            .tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(tx);

        let workers = {
            let mut workers = self.workers.lock().await;
            std::mem::take(&mut *workers)
        };
        for handle in workers {
            if let Err(e) = handle.await {
                warn!(error = %e, "Event worker exited abnormally");
            }
        }
        info!(
            remaining = self.depth.load(Ordering::Relaxed),
            "Event publisher drained"
        );
    }
}

async fn deliver(subscribers: &[Arc<dyn EventSubscriber>], event: &DomainEvent, worker: usize) {
    for subscriber in subscribers {
        if let Err(e) = subscriber.handle(event).await {
            warn!(
                subscriber = subscriber.name(),
                event_type = event.event_type(),
                worker,
                error = %e,
                "Subscriber failed, event skipped for this subscriber"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use curbwatch_common::types::{IssueStatus, ReportStatus};
    use std::time::Duration;
    use uuid::Uuid;

    struct Counting {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSubscriber for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn handle(&self, _event: &DomainEvent) -> anyhow::Result<()> {
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl EventSubscriber for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn handle(&self, _event: &DomainEvent) -> anyhow::Result<()> {
            Err(anyhow!("subscriber exploded"))
        }
    }

    struct Slow {
        seen: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl EventSubscriber for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }

        async fn handle(&self, _event: &DomainEvent) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(50)).await;
            self.seen.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn status_event() -> DomainEvent {
        DomainEvent::IssueStatusChanged {
            issue_id: Uuid::new_v4(),
            previous: IssueStatus::Pending,
            new: IssueStatus::InProgress,
        }
    }

    fn report_event() -> DomainEvent {
        DomainEvent::ReportValidated {
            report_id: Uuid::new_v4(),
            status: ReportStatus::Approved,
            issue_id: Some(Uuid::new_v4()),
        }
    }

    #[tokio::test]
    async fn published_events_reach_all_subscribers() {
        let a = Arc::new(AtomicUsize::new(0));
        let b = Arc::new(AtomicUsize::new(0));
        let publisher = EventPublisher::start(
            vec![
                Arc::new(Counting { seen: a.clone() }),
                Arc::new(Counting { seen: b.clone() }),
            ],
            16,
            2,
        );

        for _ in 0..5 {
            publisher.publish(status_event());
        }
        publisher.shutdown().await;

        assert_eq!(a.load(Ordering::SeqCst), 5);
        assert_eq!(b.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn shutdown_drains_enqueued_events() {
        let seen = Arc::new(AtomicUsize::new(0));
        let publisher =
            EventPublisher::start(vec![Arc::new(Slow { seen: seen.clone() })], 64, 1);

        for _ in 0..4 {
            publisher.publish(report_event());
        }
        publisher.shutdown().await;

        assert_eq!(seen.load(Ordering::SeqCst), 4, "drain delivers everything enqueued");
    }

    #[tokio::test]
    async fn failing_subscriber_does_not_block_others() {
        let seen = Arc::new(AtomicUsize::new(0));
        let publisher = EventPublisher::start(
            vec![Arc::new(Failing), Arc::new(Counting { seen: seen.clone() })],
            16,
            1,
        );

        publisher.publish(status_event());
        publisher.shutdown().await;

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn full_queue_drops_instead_of_blocking() {
        let seen = Arc::new(AtomicUsize::new(0));
        // Capacity 1 and a slow worker: most publishes find the queue full.
        let publisher =
            EventPublisher::start(vec![Arc::new(Slow { seen: seen.clone() })], 1, 1);

        for _ in 0..20 {
            publisher.publish(report_event());
        }
        publisher.shutdown().await;

        let delivered = seen.load(Ordering::SeqCst);
        assert!(delivered >= 1, "at least the enqueued events are delivered");
        assert!(delivered < 20, "overflow was dropped, not queued");
    }

    #[tokio::test]
    async fn depth_gauge_returns_to_zero_after_drain() {
        let seen = Arc::new(AtomicUsize::new(0));
        let publisher =
            EventPublisher::start(vec![Arc::new(Counting { seen: seen.clone() })], 16, 2);

        for _ in 0..8 {
            publisher.publish(status_event());
        }
        publisher.shutdown().await;

        assert_eq!(publisher.queue_depth(), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 8);
    }

    #[tokio::test]
    async fn publish_after_shutdown_is_dropped() {
        let seen = Arc::new(AtomicUsize::new(0));
        let publisher =
            EventPublisher::start(vec![Arc::new(Counting { seen: seen.clone() })], 16, 1);

        publisher.shutdown().await;
        publisher.publish(status_event());

        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
