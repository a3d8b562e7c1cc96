//! Bounded worker pool for storage operations.
//!
//! Callers hand a unit of work to [`TaskGateway::submit`] and get back a
//! [`TaskHandle`] that resolves to the unit's result. Admission follows a
//! fixed order:
//!
//! 1. `core_pool_size` workers are started with the gateway and live as
//!    long as it does. Submitted units wait in a FIFO backlog of
//!    `queue_capacity` entries for one of them.
//! 2. When the backlog is full, an overflow worker is started for the unit,
//!    as long as fewer than `max_pool_size` workers are alive. Overflow
//!    workers drain the backlog and retire once it is empty.
//! 3. Otherwise the unit is refused with [`DocstoreError::Overloaded`].
//!
//! A unit that panics resolves to [`DocstoreError::TaskFailed`]; the worker
//! running it carries on.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::runtime::Handle;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, info, warn};

use crate::config::ExecutorConfig;
use crate::{DocstoreError, Result};

type Job = BoxFuture<'static, ()>;

/// State shared between the gateway and its workers.
struct Shared {
    backlog: Mutex<mpsc::Receiver<Job>>,
    live_workers: AtomicUsize,
    next_worker_id: AtomicUsize,
}

/// Entry point for running storage operations on the worker pool.
///
/// Cloning is cheap; clones share the same pool. Core workers exit once
/// every clone is dropped and the backlog is drained.
#[derive(Clone)]
pub struct TaskGateway {
    sender: mpsc::Sender<Job>,
    shared: Arc<Shared>,
    runtime: Handle,
    max_pool_size: usize,
}

impl TaskGateway {
    /// Create a gateway and start its core workers.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: &ExecutorConfig) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|e| {
            DocstoreError::Config(format!("worker pool needs a Tokio runtime: {e}"))
        })?;

        let (sender, receiver) = mpsc::channel(config.queue_capacity);
        let shared = Arc::new(Shared {
            backlog: Mutex::new(receiver),
            live_workers: AtomicUsize::new(0),
            next_worker_id: AtomicUsize::new(0),
        });

        let gateway = Self {
            sender,
            shared,
            runtime,
            max_pool_size: config.max_pool_size,
        };

        for _ in 0..config.core_pool_size {
            gateway.shared.live_workers.fetch_add(1, Ordering::SeqCst);
            gateway.spawn_worker(WorkerKind::Core, None);
        }

        info!(
            core = config.core_pool_size,
            max = config.max_pool_size,
            queue = config.queue_capacity,
            "Worker pool started"
        );

        Ok(gateway)
    }

    /// Submit a unit of work.
    ///
    /// Returns immediately. The unit runs on a worker; its result is
    /// delivered through the returned handle. Fails with
    /// [`DocstoreError::Overloaded`] when the backlog and the pool are both
    /// full, in which case the unit never runs.
    pub fn submit<F, Fut, T>(&self, operation: &'static str, work: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::pin(async move {
            let outcome = AssertUnwindSafe(async move { work().await })
                .catch_unwind()
                .await;

            let result = match outcome {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    warn!(operation, %message, "Storage operation panicked");
                    Err(DocstoreError::TaskFailed(format!(
                        "{operation} panicked: {message}"
                    )))
                }
            };

            // The caller may have stopped waiting.
            let _ = tx.send(result);
        });

        match self.sender.try_send(job) {
            Ok(()) => {
                debug!(operation, "Storage operation queued");
                Ok(TaskHandle { receiver: rx })
            }
            Err(TrySendError::Full(job)) => {
                if self.reserve_overflow_worker() {
                    debug!(operation, "Backlog full, starting overflow worker");
                    self.spawn_worker(WorkerKind::Overflow, Some(job));
                    Ok(TaskHandle { receiver: rx })
                } else {
                    warn!(operation, "Storage operation rejected, pool saturated");
                    Err(DocstoreError::Overloaded(format!(
                        "{operation}: backlog and worker pool are full"
                    )))
                }
            }
            Err(TrySendError::Closed(_)) => Err(DocstoreError::Overloaded(format!(
                "{operation}: worker pool is shut down"
            ))),
        }
    }

    /// Number of workers currently alive.
    pub fn live_workers(&self) -> usize {
        self.shared.live_workers.load(Ordering::SeqCst)
    }

    /// Number of units waiting in the backlog.
    pub fn queued(&self) -> usize {
        self.sender.max_capacity() - self.sender.capacity()
    }

    fn reserve_overflow_worker(&self) -> bool {
        self.shared
            .live_workers
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |live| {
                (live < self.max_pool_size).then_some(live + 1)
            })
            .is_ok()
    }

    fn spawn_worker(&self, kind: WorkerKind, first: Option<Job>) {
        let id = self.shared.next_worker_id.fetch_add(1, Ordering::SeqCst);
        let shared = Arc::clone(&self.shared);
        self.runtime.spawn(run_worker(shared, id, kind, first));
    }
}

impl std::fmt::Debug for TaskGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskGateway")
            .field("live_workers", &self.live_workers())
            .field("queued", &self.queued())
            .field("max_pool_size", &self.max_pool_size)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WorkerKind {
    Core,
    Overflow,
}

async fn run_worker(shared: Arc<Shared>, id: usize, kind: WorkerKind, first: Option<Job>) {
    debug!(worker = id, ?kind, "Worker started");

    if let Some(job) = first {
        job.await;
    }

    loop {
        let next = match kind {
            WorkerKind::Core => shared.backlog.lock().await.recv().await,
            // Another worker holding the lock is already draining the backlog.
            WorkerKind::Overflow => match shared.backlog.try_lock() {
                Ok(mut backlog) => backlog.try_recv().ok(),
                Err(_) => None,
            },
        };

        match next {
            Some(job) => job.await,
            None => break,
        }
    }

    shared.live_workers.fetch_sub(1, Ordering::SeqCst);
    debug!(worker = id, ?kind, "Worker retired");
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Pending result of a submitted unit of work.
///
/// Resolves to the unit's own result, or to [`DocstoreError::TaskFailed`]
/// if the unit panicked or was dropped before it ran.
#[must_use = "a task handle does nothing unless awaited"]
pub struct TaskHandle<T> {
    receiver: oneshot::Receiver<Result<T>>,
}

impl<T> Future for TaskHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(DocstoreError::TaskFailed(
                    "operation was dropped before completing".to_string(),
                ))
            })
        })
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}
