//! Bounded pool of blocking fetch workers.
//!
//! Jobs run on a dedicated tokio runtime's blocking threads. A semaphore with
//! one permit per worker bounds how many run at once; a job holds its permit
//! until it returns. Submitting never waits: when no permit is free the job is
//! handed back and the caller tries again next frame.
//!
//! Dropping the pool waits at most [`SHUTDOWN_GRACE`] for running jobs; jobs
//! still blocked on I/O after that finish on detached threads.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

/// Default number of concurrent fetch workers.
pub const DEFAULT_WORKER_THREADS: usize = 8;

/// How long dropping the pool waits for running jobs.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

/// Errors creating the pool.
#[derive(Debug, thiserror::Error)]
#[error("Failed to start worker runtime: {0}")]
pub struct WorkerPoolError(#[from] std::io::Error);

/// Fixed-size pool running blocking jobs.
pub struct WorkerPool {
    runtime: Option<Runtime>,
    permits: Arc<Semaphore>,
    workers: usize,
    running: Arc<AtomicUsize>,
    shutdown: CancellationToken,
}

impl WorkerPool {
    /// Starts a pool with `workers` concurrent jobs (at least one).
    pub fn new(workers: usize) -> Result<Self, WorkerPoolError> {
        let workers = workers.max(1);
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(workers)
            .thread_name("globelayer-fetch")
            .enable_time()
            .build()?;

        tracing::info!(workers, "Started fetch worker pool");

        Ok(Self {
            runtime: Some(runtime),
            permits: Arc::new(Semaphore::new(workers)),
            workers,
            running: Arc::new(AtomicUsize::new(0)),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Free worker slots.
    pub fn available(&self) -> usize {
        if self.shutdown.is_cancelled() {
            0
        } else {
            self.permits.available_permits()
        }
    }

    /// Jobs currently executing.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::Acquire)
    }

    /// Runs `job` on a worker if one is free, otherwise returns it.
    pub fn try_spawn<F>(&self, job: F) -> Result<(), F>
    where
        F: FnOnce() + Send + 'static,
    {
        let Some(runtime) = self.runtime.as_ref().filter(|_| !self.shutdown.is_cancelled()) else {
            return Err(job);
        };
        let permit = match Arc::clone(&self.permits).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => return Err(job),
        };

        let running = RunningGuard::enter(&self.running);
        runtime.spawn_blocking(move || {
            let _permit = permit;
            let _running = running;
            job();
        });
        Ok(())
    }

    /// Refuses new jobs. Jobs already running finish normally.
    pub fn shutdown(&self) {
        if !self.shutdown.is_cancelled() {
            tracing::info!(running = self.running(), "Shutting down fetch worker pool");
            self.shutdown.cancel();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Token cancelled by [`shutdown`](Self::shutdown).
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(SHUTDOWN_GRACE);
        }
    }
}

/// Counts a job as running until dropped, including when the job panics.
struct RunningGuard(Arc<AtomicUsize>);

impl RunningGuard {
    fn enter(running: &Arc<AtomicUsize>) -> Self {
        running.fetch_add(1, Ordering::AcqRel);
        Self(Arc::clone(running))
    }
}

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("workers", &self.workers)
            .field("available", &self.available())
            .field("running", &self.running())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
