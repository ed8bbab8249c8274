//! Priority queue of fetch tasks.
//!
//! Tasks are ordered by priority ascending (the distance from the viewer, so
//! closer tiles come first), then by [`TileKey`] order so that equal
//! priorities still pop in a stable, reproducible order.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};

use crate::tile::{Tile, TileKey};

/// A request to make one tile's texture resident.
#[derive(Debug, Clone)]
pub struct FetchTask {
    pub tile: Tile,
    /// Lower values are fetched first.
    pub priority: f64,
}

impl FetchTask {
    pub fn new(tile: Tile, priority: f64) -> Self {
        Self { tile, priority }
    }

    pub fn key(&self) -> &TileKey {
        self.tile.key()
    }
}

impl PartialEq for FetchTask {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FetchTask {}

impl PartialOrd for FetchTask {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FetchTask {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: reverse both keys so the smallest
        // priority, then the smallest key, is on top
        other
            .priority
            .total_cmp(&self.priority)
            .then_with(|| other.key().cmp(self.key()))
    }
}

/// Heap of pending tasks with at most one entry per key.
///
/// Not thread-safe; the scheduler wraps it in a mutex.
#[derive(Debug, Default)]
pub struct FetchQueue {
    heap: BinaryHeap<FetchTask>,
    keys: HashSet<TileKey>,
}

impl FetchQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task. Returns `false` and drops the task when its key is
    /// already queued.
    pub fn push(&mut self, task: FetchTask) -> bool {
        if !self.keys.insert(task.key().clone()) {
            return false;
        }
        self.heap.push(task);
        true
    }

    /// Removes and returns the most urgent task.
    pub fn pop(&mut self) -> Option<FetchTask> {
        let task = self.heap.pop()?;
        self.keys.remove(task.key());
        Some(task)
    }

    pub fn peek(&self) -> Option<&FetchTask> {
        self.heap.peek()
    }

    pub fn contains(&self, key: &TileKey) -> bool {
        self.keys.contains(key)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.keys.clear();
    }
}
