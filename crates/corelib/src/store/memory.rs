//! In-memory backend.

use crate::error::{Error, Result};
use crate::store::{Backend, BatchOp};
use std::collections::BTreeMap;
use std::sync::Mutex;

/// A sorted map behind a mutex.
///
/// Satisfies the full backend contract trivially: the mutex serializes
/// writers, and a batch applies under one lock acquisition so no reader
/// observes it half-done. Suited to tests and to one-shot pipelines that
/// never reopen the ring.
pub struct MemoryBackend {
    map: Mutex<Option<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        MemoryBackend {
            map: Mutex::new(Some(BTreeMap::new())),
        }
    }

    fn with_map<T>(
        &self,
        f: impl FnOnce(&mut BTreeMap<Vec<u8>, Vec<u8>>) -> T,
    ) -> Result<T> {
        let mut guard = self.map.lock().unwrap_or_else(|e| e.into_inner());
        match guard.as_mut() {
            Some(map) => Ok(f(map)),
            None => Err(Error::Store("backend is closed".to_string())),
        }
    }
}

impl Backend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.with_map(|map| map.get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        self.with_map(|map| {
            map.insert(key.to_vec(), value.to_vec());
        })
    }

    fn delete(&self, key: &[u8]) -> Result<()> {
        self.with_map(|map| {
            map.remove(key);
        })
    }

    fn batch(&self, ops: Vec<BatchOp>) -> Result<()> {
        self.with_map(|map| {
            for op in ops {
                match op {
                    BatchOp::Put { key, value } => {
                        map.insert(key, value);
                    }
                    BatchOp::Delete { key } => {
                        map.remove(&key);
                    }
                }
            }
        })
    }

    fn close(&self) -> Result<()> {
        let mut guard = self.map.lock().unwrap_or_else(|e| e.into_inner());
        *guard = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_operations() {
        let backend = MemoryBackend::new();
        assert_eq!(backend.get(b"k").unwrap(), None);
        backend.put(b"k", b"v").unwrap();
        assert_eq!(backend.get(b"k").unwrap(), Some(b"v".to_vec()));
        backend.delete(b"k").unwrap();
        assert_eq!(backend.get(b"k").unwrap(), None);
    }

    #[test]
    fn test_batch_applies_all_ops() {
        let backend = MemoryBackend::new();
        backend.put(b"gone", b"x").unwrap();
        backend
            .batch(vec![
                BatchOp::put(b"a".to_vec(), b"1".to_vec()),
                BatchOp::put(b"b".to_vec(), b"2".to_vec()),
                BatchOp::delete(b"gone".to_vec()),
            ])
            .unwrap();
        assert_eq!(backend.get(b"a").unwrap(), Some(b"1".to_vec()));
        assert_eq!(backend.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(backend.get(b"gone").unwrap(), None);
    }

    #[test]
    fn test_use_after_close() {
        let backend = MemoryBackend::new();
        backend.close().unwrap();
        assert!(matches!(backend.get(b"k"), Err(Error::Store(_))));
    }
}
