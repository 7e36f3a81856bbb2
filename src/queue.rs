//! Single-flight FIFO scheduler that spaces task dispatches by a fixed interval.
//!
//! All outbound reference lookups go through one queue, so at most one network
//! operation is in flight and consecutive dispatches start at least `interval`
//! apart. Tasks settle in the order they were enqueued.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, warn};

type Job = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queued task was dropped before it settled")]
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// No drain loop is running.
    Idle,
    /// A drain loop is pulling tasks.
    Draining,
}

struct Inner {
    tasks: VecDeque<Job>,
    state: QueueState,
    last_dispatch: Option<Instant>,
}

/// Cheap-to-clone handle; clones share one task list and one drain loop.
#[derive(Clone)]
pub struct RateLimitedQueue {
    interval: Duration,
    inner: Arc<Mutex<Inner>>,
}

impl RateLimitedQueue {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            inner: Arc::new(Mutex::new(Inner {
                tasks: VecDeque::new(),
                state: QueueState::Idle,
                last_dispatch: None,
            })),
        }
    }

    pub fn state(&self) -> QueueState {
        self.lock().state
    }

    /// Number of tasks waiting for dispatch (excludes the one in flight).
    pub fn pending(&self) -> usize {
        self.lock().tasks.len()
    }

    /// Append `operation` to the tail of the queue.
    ///
    /// The task is queued immediately, before the returned future is polled.
    /// If the queue was idle a drain loop is spawned on the current runtime.
    pub fn enqueue<T, F, Fut>(&self, operation: F) -> Pending<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::new(move || {
            async move {
                // Receiver may be gone; the task still ran.
                let _ = tx.send(operation().await);
            }
            .boxed()
        });

        let start_drain = {
            let mut inner = self.lock();
            inner.tasks.push_back(job);
            if inner.state == QueueState::Idle {
                inner.state = QueueState::Draining;
                true
            } else {
                false
            }
        };

        if start_drain {
            debug!("queue draining");
            tokio::spawn(self.clone().drain());
        }

        Pending(rx)
    }

    async fn drain(self) {
        loop {
            let (job, wait) = {
                let mut inner = self.lock();
                let Some(job) = inner.tasks.pop_front() else {
                    inner.state = QueueState::Idle;
                    debug!("queue idle");
                    return;
                };
                let wait = inner
                    .last_dispatch
                    .map(|last| self.interval.saturating_sub(last.elapsed()))
                    .unwrap_or_default();
                (job, wait)
            };

            if !wait.is_zero() {
                debug!(wait_ms = wait.as_millis() as u64, "rate limit wait");
                tokio::time::sleep(wait).await;
            }

            self.lock().last_dispatch = Some(Instant::now());
            if AssertUnwindSafe(job()).catch_unwind().await.is_err() {
                warn!("queued task panicked; continuing with next task");
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Settles with the output of an enqueued operation.
#[must_use = "dropping the handle discards the task's result"]
pub struct Pending<T>(oneshot::Receiver<T>);

impl<T> Future for Pending<T> {
    type Output = Result<T, QueueError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.0)
            .poll(cx)
            .map(|r| r.map_err(|_| QueueError::Dropped))
    }
}
