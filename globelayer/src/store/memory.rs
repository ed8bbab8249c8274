//! Process-local store.

use std::time::SystemTime;

use bytes::Bytes;
use dashmap::DashMap;

use super::{LocalStore, StoreError};

/// In-memory [`LocalStore`], for running without a disk cache.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: DashMap<String, (Bytes, SystemTime)>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl LocalStore for MemoryStore {
    fn read(&self, path: &str) -> Result<Option<Bytes>, StoreError> {
        Ok(self.entries.get(path).map(|entry| entry.0.clone()))
    }

    fn write(&self, path: &str, data: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(
            path.to_string(),
            (Bytes::copy_from_slice(data), SystemTime::now()),
        );
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<bool, StoreError> {
        Ok(self.entries.remove(path).is_some())
    }

    fn modified(&self, path: &str) -> Result<Option<SystemTime>, StoreError> {
        Ok(self.entries.get(path).map(|entry| entry.1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_and_delete() {
        let store = MemoryStore::new();
        assert!(store.is_empty());
        store.write("a/b", b"hello").unwrap();
        assert_eq!(store.read("a/b").unwrap(), Some(Bytes::from_static(b"hello")));
        assert!(store.modified("a/b").unwrap().is_some());
        assert!(store.delete("a/b").unwrap());
        assert!(!store.delete("a/b").unwrap());
        assert_eq!(store.len(), 0);
    }
}
