//! Dispatch queue
//!
//! A bounded, multi-worker queue that hands each admitted unit of work to
//! exactly one worker. Workers invoke an injected [`Executor`]; executor
//! errors and panics are logged and never stop a worker.
//!
//! Lifecycle: `new` -> `start` -> (`enqueue`)* -> `shutdown`. Cancelling the
//! parent token given to `start` shuts the queue down as well.

use async_trait::async_trait;
use sluice_core::dto::queue::QueueStats;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

/// Something the queue can carry
pub trait WorkItem: Send + 'static {
    /// Identifier used in logs; an empty key is rejected at enqueue.
    fn key(&self) -> String;
}

/// Runs one unit of work
///
/// The token is cancelled when the queue shuts down; treat it as a request
/// to stop, not as a guarantee that the caller has stopped waiting.
#[async_trait]
pub trait Executor<T>: Send + Sync + 'static {
    async fn execute(&self, cancel: CancellationToken, unit: T) -> anyhow::Result<()>;
}

/// Queue lifecycle misuse and enqueue failures
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("dispatch queue has not been started")]
    NotStarted,

    #[error("dispatch queue is closed")]
    Closed,

    #[error("worker count must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    #[error("invalid work item: {0}")]
    InvalidArgument(String),

    #[error("enqueue cancelled by caller")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Running,
    Closed,
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    processed: AtomicU64,
    in_flight: AtomicUsize,
}

struct Inner<T> {
    lifecycle: Mutex<Lifecycle>,
    workers: AtomicUsize,
    sender: Mutex<Option<mpsc::Sender<T>>>,
    receiver: Mutex<Option<mpsc::Receiver<T>>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
    counters: Counters,
}

/// Bounded multi-worker dispatch queue
pub struct DispatchQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for DispatchQueue<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

fn lock<V>(mutex: &Mutex<V>) -> MutexGuard<'_, V> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<T: WorkItem> DispatchQueue<T> {
    /// Allocates a buffer of `capacity` slots (at least one).
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                lifecycle: Mutex::new(Lifecycle::Idle),
                workers: AtomicUsize::new(0),
                sender: Mutex::new(Some(sender)),
                receiver: Mutex::new(Some(receiver)),
                shutdown: CancellationToken::new(),
                tracker: TaskTracker::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Spawns `workers` workers and a supervisor watching `parent`.
    ///
    /// Calling it again once started is a no-op.
    pub fn start(
        &self,
        parent: CancellationToken,
        workers: usize,
        executor: Arc<dyn Executor<T>>,
    ) -> Result<(), QueueError> {
        if workers == 0 {
            return Err(QueueError::InvalidWorkerCount(workers));
        }

        let receiver = {
            let mut lifecycle = lock(&self.inner.lifecycle);
            match *lifecycle {
                Lifecycle::Running => return Ok(()),
                Lifecycle::Closed => return Err(QueueError::Closed),
                Lifecycle::Idle => {}
            }
            let receiver = lock(&self.inner.receiver)
                .take()
                .ok_or(QueueError::Closed)?;
            *lifecycle = Lifecycle::Running;
            receiver
        };

        self.inner.workers.store(workers, Ordering::SeqCst);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        for worker_id in 0..workers {
            let inner = Arc::clone(&self.inner);
            let receiver = Arc::clone(&receiver);
            let executor = Arc::clone(&executor);
            self.inner
                .tracker
                .spawn(worker_loop(worker_id, inner, receiver, executor));
        }

        let queue = self.clone();
        self.inner.tracker.spawn(async move {
            tokio::select! {
                _ = parent.cancelled() => {
                    info!("parent context cancelled, shutting down dispatch queue");
                    queue.begin_shutdown();
                }
                _ = queue.inner.shutdown.cancelled() => {}
            }
        });

        info!(workers, "dispatch queue started");
        Ok(())
    }

    /// Waits for a free buffer slot and hands `unit` to the queue.
    ///
    /// Returns [`QueueError::Cancelled`] if `cancel` fires first and
    /// [`QueueError::Closed`] if the queue shuts down first.
    pub async fn enqueue(&self, cancel: &CancellationToken, unit: T) -> Result<(), QueueError> {
        let sender = {
            let lifecycle = lock(&self.inner.lifecycle);
            match *lifecycle {
                Lifecycle::Closed => return Err(QueueError::Closed),
                Lifecycle::Idle => return Err(QueueError::NotStarted),
                Lifecycle::Running => {}
            }
            lock(&self.inner.sender)
                .clone()
                .ok_or(QueueError::Closed)?
        };

        let key = unit.key();
        if key.is_empty() {
            return Err(QueueError::InvalidArgument(
                "work item has an empty key".to_string(),
            ));
        }

        tokio::select! {
            biased;
            _ = self.inner.shutdown.cancelled() => Err(QueueError::Closed),
            _ = cancel.cancelled() => Err(QueueError::Cancelled),
            sent = sender.send(unit) => {
                sent.map_err(|_| QueueError::Closed)?;
                self.inner.counters.enqueued.fetch_add(1, Ordering::SeqCst);
                debug!(unit = %key, "unit enqueued");
                Ok(())
            }
        }
    }

    /// Snapshot of the queue counters; safe to call at any time.
    pub fn stats(&self) -> QueueStats {
        let counters = &self.inner.counters;
        let enqueued = counters.enqueued.load(Ordering::SeqCst);
        let dequeued = counters.dequeued.load(Ordering::SeqCst);

        QueueStats {
            running: *lock(&self.inner.lifecycle) == Lifecycle::Running,
            workers: self.inner.workers.load(Ordering::SeqCst),
            depth: enqueued.saturating_sub(dequeued) as usize,
            in_flight: counters.in_flight.load(Ordering::SeqCst),
            enqueued,
            processed: counters.processed.load(Ordering::SeqCst),
        }
    }

    /// Stops accepting work and waits for the workers to drain and exit.
    ///
    /// Units already buffered are still delivered, with a cancelled token.
    /// Only the first call changes anything; later calls just wait.
    pub async fn shutdown(&self) {
        if self.begin_shutdown() {
            info!("dispatch queue shutting down");
        }
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
        debug!("dispatch queue drained");
    }

    /// Returns true for the call that actually closed the queue.
    fn begin_shutdown(&self) -> bool {
        {
            let mut lifecycle = lock(&self.inner.lifecycle);
            if *lifecycle == Lifecycle::Closed {
                return false;
            }
            *lifecycle = Lifecycle::Closed;
        }
        self.inner.shutdown.cancel();
        // Dropping the last sender closes the buffer once it is drained.
        lock(&self.inner.sender).take();
        true
    }
}

async fn worker_loop<T: WorkItem>(
    worker_id: usize,
    inner: Arc<Inner<T>>,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<T>>>,
    executor: Arc<dyn Executor<T>>,
) {
    debug!(worker_id, "worker started");

    loop {
        let next = {
            let mut receiver = receiver.lock().await;
            receiver.recv().await
        };
        let Some(unit) = next else {
            break;
        };

        let counters = &inner.counters;
        counters.dequeued.fetch_add(1, Ordering::SeqCst);
        counters.in_flight.fetch_add(1, Ordering::SeqCst);

        let key = unit.key();
        let cancel = inner.shutdown.clone();
        let executor = Arc::clone(&executor);
        let handle = tokio::spawn(async move { executor.execute(cancel, unit).await });

        match handle.await {
            Ok(Ok(())) => debug!(worker_id, unit = %key, "unit executed"),
            Ok(Err(e)) => error!(worker_id, unit = %key, "unit execution failed: {:#}", e),
            Err(e) => warn!(worker_id, unit = %key, "unit execution panicked: {}", e),
        }

        counters.in_flight.fetch_sub(1, Ordering::SeqCst);
        counters.processed.fetch_add(1, Ordering::SeqCst);
    }

    debug!(worker_id, "worker stopped");
}
