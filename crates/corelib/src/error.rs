//! Error types for the core library.

use std::fmt;

/// Result type alias for the core library.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the core library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Bad creation parameters: unknown algorithm, zero vnode count,
    /// empty pnode list, malformed arguments.
    ConfigInvalid(String),
    /// Vnode id outside `[0, vnode_count)`.
    VnodeOutOfRange { vnode: u32, vnode_count: u32 },
    /// Remap where a vnode already belongs to the target pnode.
    VnodeAlreadyOnTarget { pnode: String, vnode: u32 },
    /// Operation on a pnode that is not in the ring.
    PnodeUnknown(String),
    /// Removal of a pnode that still owns vnodes.
    PnodeStillInUse { pnode: String, owned: usize },
    /// The store has no completion marker; creation was torn.
    RingIncomplete,
    /// The persisted schema version is not one this library understands.
    RingVersionMismatch(String),
    /// Underlying key-value store failure (I/O, corruption).
    Store(String),
    /// Malformed input topology.
    Serialization(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::ConfigInvalid(msg) => write!(f, "invalid configuration: {}", msg),
            Error::VnodeOutOfRange { vnode, vnode_count } => {
                write!(f, "vnode {} out of range [0, {})", vnode, vnode_count)
            }
            Error::VnodeAlreadyOnTarget { pnode, vnode } => {
                write!(f, "vnode {} already belongs to pnode {}", vnode, pnode)
            }
            Error::PnodeUnknown(pnode) => write!(f, "unknown pnode: {}", pnode),
            Error::PnodeStillInUse { pnode, owned } => {
                write!(f, "pnode {} still owns {} vnode(s)", pnode, owned)
            }
            Error::RingIncomplete => write!(f, "ring store has no completion marker"),
            Error::RingVersionMismatch(version) => {
                write!(f, "unsupported ring version: {}", version)
            }
            Error::Store(msg) => write!(f, "store error: {}", msg),
            Error::Serialization(msg) => write!(f, "malformed topology: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Store(err.to_string())
    }
}
