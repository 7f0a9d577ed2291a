//! Durable storage for rings.
//!
//! The ring is layered on an ordered key-value engine through the
//! [`Backend`] trait: point reads and writes plus an atomic multi-key
//! batch. Anything with those semantics will do; two engines ship here —
//! an in-memory sorted map and an append-only log file.
//!
//! [`RingStore`] owns the schema: which keys exist, the creation write
//! order, and how each mutation becomes a single atomic batch.

pub mod adapter;
pub mod log;
pub mod memory;
pub mod schema;

pub use adapter::RingStore;
pub use log::LogBackend;
pub use memory::MemoryBackend;

use crate::error::Result;
use std::path::PathBuf;

/// One write in an atomic batch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Vec<u8>, value: Vec<u8> },
    Delete { key: Vec<u8> },
}

impl BatchOp {
    pub fn put(key: Vec<u8>, value: Vec<u8>) -> Self {
        BatchOp::Put { key, value }
    }

    pub fn delete(key: Vec<u8>) -> Self {
        BatchOp::Delete { key }
    }
}

/// An ordered key-value engine with atomic batches.
///
/// `batch` is all-or-nothing: a reader through the same handle sees either
/// none of the batch or all of it, including across a crash for durable
/// implementations.
pub trait Backend: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;
    fn put(&self, key: &[u8], value: &[u8]) -> Result<()>;
    fn delete(&self, key: &[u8]) -> Result<()>;
    fn batch(&self, ops: Vec<BatchOp>) -> Result<()>;
    /// Releases the engine. Further use of the handle is an error.
    fn close(&self) -> Result<()>;
}

/// Which engine to put a ring on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendOptions {
    /// Sorted map in process memory. Gone when the ring is dropped.
    Memory,
    /// Durable append-only log under the given directory.
    Log { location: PathBuf },
}

impl BackendOptions {
    pub(crate) fn open(&self) -> Result<Box<dyn Backend>> {
        match self {
            BackendOptions::Memory => Ok(Box::new(MemoryBackend::new())),
            BackendOptions::Log { location } => Ok(Box::new(LogBackend::open(location)?)),
        }
    }
}
