//! Fetch scheduling.
//!
//! The traversal files requests with [`Scheduler::request`] while it walks the
//! pyramid. After the walk, [`Scheduler::drain`] hands the most urgent tasks
//! to the worker pool and discards the rest: a tile still visible next frame
//! is requested again with a fresh priority, so stale requests for tiles the
//! viewer has moved away from never pile up.
//!
//! A key is never queued twice, and never queued while a worker is already
//! fetching it. Keys the absent tracker is holding back are refused.
//!
//! # Task lifecycle
//!
//! ```text
//! request ──► Pending ──drain──► Fetching ──complete──► (Succeeded | Failed)
//!                │
//!                └── not drained this frame: discarded
//! ```

mod queue;
mod workers;

pub use queue::{FetchQueue, FetchTask};
pub use workers::{WorkerPool, WorkerPoolError, DEFAULT_WORKER_THREADS};

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::absent::AbsentResourceTracker;
use crate::tile::{Tile, TileKey};

/// Default number of tasks dispatched per frame.
pub const DEFAULT_MAX_DISPATCH_PER_FRAME: usize = 16;

/// What happened to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    Queued,
    /// Already queued this frame.
    Duplicate,
    /// A worker is already fetching the key.
    InFlight,
    /// Held back by the absent tracker.
    Absent,
}

/// Where a key is in the task lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Fetching,
}

/// Completes an in-flight key on drop.
#[must_use]
#[derive(Debug)]
pub struct CompletionGuard {
    scheduler: Arc<Scheduler>,
    key: TileKey,
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        self.scheduler.complete(&self.key);
    }
}

#[derive(Debug, Default)]
struct SchedulerState {
    queue: FetchQueue,
    in_flight: HashSet<TileKey>,
}

/// Deduplicating request queue shared by the traversal and the workers.
#[derive(Debug)]
pub struct Scheduler {
    state: Mutex<SchedulerState>,
    absent: Arc<AbsentResourceTracker>,
}

impl Scheduler {
    pub fn new(absent: Arc<AbsentResourceTracker>) -> Self {
        Self {
            state: Mutex::new(SchedulerState::default()),
            absent,
        }
    }

    /// Files a fetch request for `tile`.
    pub fn request(&self, tile: &Tile, priority: f64) -> RequestOutcome {
        let key = tile.key();
        let mut state = self.state.lock();
        if state.in_flight.contains(key) {
            return RequestOutcome::InFlight;
        }
        if state.queue.contains(key) {
            return RequestOutcome::Duplicate;
        }
        if !self.absent.should_attempt(key) {
            return RequestOutcome::Absent;
        }
        state.queue.push(FetchTask::new(tile.clone(), priority));
        RequestOutcome::Queued
    }

    /// Takes up to `max` tasks in priority order, marks them in flight and
    /// discards the rest of the queue.
    pub fn drain(&self, max: usize) -> Vec<FetchTask> {
        let mut state = self.state.lock();
        let mut tasks = Vec::with_capacity(max.min(state.queue.len()));
        while tasks.len() < max {
            let Some(task) = state.queue.pop() else {
                break;
            };
            state.in_flight.insert(task.key().clone());
            tasks.push(task);
        }
        let discarded = state.queue.len();
        state.queue.clear();
        if discarded > 0 {
            tracing::trace!(dispatched = tasks.len(), discarded, "Drained fetch queue");
        }
        tasks
    }

    /// Returns a drained task that could not be handed to a worker.
    pub fn release(&self, key: &TileKey) {
        self.state.lock().in_flight.remove(key);
    }

    /// Marks a dispatched task finished, whatever its outcome.
    pub fn complete(&self, key: &TileKey) {
        self.state.lock().in_flight.remove(key);
    }

    /// Guard that calls [`complete`](Self::complete) for `key` when dropped,
    /// so a worker that unwinds still frees the key.
    pub fn completion_guard(self: &Arc<Self>, key: TileKey) -> CompletionGuard {
        CompletionGuard {
            scheduler: Arc::clone(self),
            key,
        }
    }

    pub fn state_of(&self, key: &TileKey) -> Option<TaskState> {
        let state = self.state.lock();
        if state.in_flight.contains(key) {
            Some(TaskState::Fetching)
        } else if state.queue.contains(key) {
            Some(TaskState::Pending)
        } else {
            None
        }
    }

    /// Tasks queued this frame.
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Tasks dispatched and not yet completed.
    pub fn in_flight(&self) -> usize {
        self.state.lock().in_flight.len()
    }

    /// Drops every queued task. In-flight tasks are unaffected.
    pub fn clear(&self) {
        self.state.lock().queue.clear();
    }
}
