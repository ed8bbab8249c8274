//! Persistent local storage for fetched tile resources.
//!
//! The fetch pipeline writes every successfully fetched resource through to a
//! [`LocalStore`] keyed by the tile's relative resource path, and reads from it
//! before touching the network.
//!
//! Two implementations are provided:
//!
//! - [`FileStore`] - files under a root directory, with a per-path mutex so
//!   concurrent fetch workers never interleave a read and a write of the same
//!   file
//! - [`MemoryStore`] - a process-local map, used when persistence is disabled
//!   and in tests

mod file;
mod memory;

pub use file::{clear_store, store_stats, ClearResult, FileStore};
pub use memory::MemoryStore;

use std::time::{Duration, SystemTime};

use bytes::Bytes;
use thiserror::Error;

/// Errors from the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// I/O error while accessing the store.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The relative path escapes the store root.
    #[error("Invalid store path: {0}")]
    InvalidPath(String),
}

/// Storage for resource bytes keyed by relative path.
pub trait LocalStore: Send + Sync {
    /// Reads the resource, `Ok(None)` when it does not exist.
    fn read(&self, path: &str) -> Result<Option<Bytes>, StoreError>;

    /// Writes the resource, replacing any previous content.
    fn write(&self, path: &str, data: &[u8]) -> Result<(), StoreError>;

    /// Deletes the resource, returning whether it existed.
    fn delete(&self, path: &str) -> Result<bool, StoreError>;

    /// Last modification time, `None` when the resource does not exist.
    fn modified(&self, path: &str) -> Result<Option<SystemTime>, StoreError>;
}

/// True when the stored resource is older than `expiry`.
///
/// Resources without a modification time, and levels without an expiry, are
/// never expired.
pub fn is_expired(store: &dyn LocalStore, path: &str, expiry: Option<Duration>) -> bool {
    let Some(expiry) = expiry else {
        return false;
    };
    match store.modified(path) {
        Ok(Some(modified)) => SystemTime::now()
            .duration_since(modified)
            .map(|age| age > expiry)
            .unwrap_or(false),
        _ => false,
    }
}
