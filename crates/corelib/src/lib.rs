//! Core library for the consistent hashing ring.
//!
//! This crate provides the fundamental pieces of the ring system:
//! - Hash engine: key → vnode mapping over a fixed hash space
//! - Ring model: vnode→pnode assignment, per-vnode data, lookups
//! - Mutation protocol: remap, remove-pnode, add-data with change-sets
//! - Durable store adapter: schema, atomic batched commits, recovery
//! - Canonical serialization and topology diff

pub mod diff;
pub mod error;
pub mod hasher;
pub mod ring;
pub mod store;
pub mod topology;

pub use diff::diff;
pub use error::{Error, Result};
pub use hasher::{HashAlgorithm, HashSpace};
pub use ring::{ChangeSet, Placement, PnodeDelta, Ring, RingConfig, RingState, VnodeMeta};
pub use store::{Backend, BackendOptions, BatchOp, LogBackend, MemoryBackend};
pub use topology::{AlgorithmInfo, Topology, VnodeData};

/// Schema version written to stores and snapshots.
pub const SCHEMA_VERSION: &str = "2.1.0";
