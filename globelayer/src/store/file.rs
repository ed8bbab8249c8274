//! File-backed local store.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::{LocalStore, StoreError};

/// Resources stored as files under a root directory.
///
/// Every operation on a path holds that path's mutex, so a worker reading a
/// file never observes a half-written one from another worker. Writes go to a
/// temporary sibling file and are renamed into place.
#[derive(Debug)]
pub struct FileStore {
    root: PathBuf,
    locks: DashMap<PathBuf, Arc<Mutex<()>>>,
}

impl FileStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: DashMap::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(path);
        let valid = relative
            .components()
            .all(|component| matches!(component, Component::Normal(_)));
        if path.is_empty() || !valid {
            return Err(StoreError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    /// Runs `op` while holding the mutex for `full`.
    fn with_lock<T>(&self, full: &Path, op: impl FnOnce() -> T) -> T {
        let lock = Arc::clone(
            self.locks
                .entry(full.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .value(),
        );
        let result = {
            let _guard = lock.lock();
            op()
        };
        drop(lock);
        self.locks
            .remove_if(full, |_, lock| Arc::strong_count(lock) == 1);
        result
    }
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl LocalStore for FileStore {
    fn read(&self, path: &str) -> Result<Option<Bytes>, StoreError> {
        let full = self.resolve(path)?;
        self.with_lock(&full, || match fs::read(&full) {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&full, e)),
        })
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        let full = self.resolve(path)?;
        self.with_lock(&full, || {
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
            let mut tmp = full.clone().into_os_string();
            tmp.push(".tmp");
            let tmp = PathBuf::from(tmp);
            fs::write(&tmp, data).map_err(|e| io_error(&tmp, e))?;
            fs::rename(&tmp, &full).map_err(|e| io_error(&full, e))
        })
    }

    fn delete(&self, path: &str) -> Result<bool, StoreError> {
        let full = self.resolve(path)?;
        self.with_lock(&full, || match fs::remove_file(&full) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_error(&full, e)),
        })
    }

    fn modified(&self, path: &str) -> Result<Option<SystemTime>, StoreError> {
        let full = self.resolve(path)?;
        match fs::metadata(&full) {
            Ok(meta) => meta.modified().map(Some).map_err(|e| io_error(&full, e)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(&full, e)),
        }
    }
}

/// Result of clearing a store directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearResult {
    pub files_deleted: u64,
    pub bytes_freed: u64,
}

fn walk_files(dir: &Path, visit: &mut dyn FnMut(&Path, u64) -> std::io::Result<()>) -> std::io::Result<()> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_files(&entry.path(), visit)?;
        } else if file_type.is_file() {
            let len = entry.metadata()?.len();
            visit(&entry.path(), len)?;
        }
    }
    Ok(())
}

/// Counts files and bytes under a store directory.
pub fn store_stats(dir: &Path) -> Result<(u64, u64), StoreError> {
    let mut files = 0;
    let mut bytes = 0;
    walk_files(dir, &mut |_, len| {
        files += 1;
        bytes += len;
        Ok(())
    })
    .map_err(|e| io_error(dir, e))?;
    Ok((files, bytes))
}

/// Deletes every file under a store directory, keeping the directory itself.
pub fn clear_store(dir: &Path) -> Result<ClearResult, StoreError> {
    let mut result = ClearResult::default();
    walk_files(dir, &mut |path, len| {
        fs::remove_file(path)?;
        result.files_deleted += 1;
        result.bytes_freed += len;
        Ok(())
    })
    .map_err(|e| io_error(dir, e))?;

    if let Ok(entries) = fs::read_dir(dir) {
        for entry in entries.flatten() {
            if entry.path().is_dir() {
                fs::remove_dir_all(entry.path()).map_err(|e| io_error(&entry.path(), e))?;
            }
        }
    }
    tracing::info!(
        dir = %dir.display(),
        files = result.files_deleted,
        bytes = result.bytes_freed,
        "Cleared local store"
    );
    Ok(result)
}
