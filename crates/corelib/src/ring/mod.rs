//! The consistent hash ring.
//!
//! [`Ring`] is the public handle: the in-memory [`RingState`] behind a
//! reader/writer lock, plus the [`RingStore`](crate::store::RingStore)
//! that makes every mutation durable. Lookups take the read lock and never
//! touch the store; mutations take the write lock, validate, commit one
//! atomic batch, and only then return. Two lookups straddling a mutation
//! both see the old topology or both see the new one — never a mix.

pub mod change;
pub mod state;

pub use change::{ChangeSet, PnodeDelta};
pub use state::{Placement, RingState, VnodeMeta};

use crate::error::{Error, Result};
use crate::hasher::{HashAlgorithm, HashSpace};
use crate::store::{Backend, BackendOptions, RingStore};
use crate::topology::Topology;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::warn;

/// Creation parameters for a fresh ring.
#[derive(Clone, Debug)]
pub struct RingConfig {
    pub algorithm: HashAlgorithm,
    /// Vnode count, fixed for the ring's lifetime.
    pub vnodes: u32,
    /// Initial pnodes; vnode `i` goes to `pnodes[i mod n]`.
    pub pnodes: Vec<String>,
}

/// A consistent hash ring bound to a durable store.
pub struct Ring {
    store: RingStore,
    state: RwLock<RingState>,
}

impl Ring {
    /// Creates a fresh ring with the canonical even distribution.
    pub fn create(config: RingConfig, backend: BackendOptions) -> Result<Ring> {
        Self::create_with(config, backend.open()?)
    }

    /// `create` on a caller-supplied engine.
    pub fn create_with(config: RingConfig, backend: Box<dyn Backend>) -> Result<Ring> {
        let space = HashSpace::new(config.algorithm, config.vnodes)?;
        let state = RingState::with_even_distribution(space, &config.pnodes)?;
        let store = RingStore::create(backend, &state)?;
        Ok(Ring {
            store,
            state: RwLock::new(state),
        })
    }

    /// Opens a ring previously created on this backend.
    pub fn open(backend: BackendOptions) -> Result<Ring> {
        Self::open_with(backend.open()?)
    }

    /// `open` on a caller-supplied engine.
    pub fn open_with(backend: Box<dyn Backend>) -> Result<Ring> {
        let (store, state) = RingStore::open(backend)?;
        Ok(Ring {
            store,
            state: RwLock::new(state),
        })
    }

    /// Reconstitutes a ring from a canonical snapshot.
    pub fn deserialize(topology_json: &str, backend: BackendOptions) -> Result<Ring> {
        Self::deserialize_with(topology_json, backend.open()?)
    }

    /// `deserialize` on a caller-supplied engine.
    pub fn deserialize_with(topology_json: &str, backend: Box<dyn Backend>) -> Result<Ring> {
        let topology = Topology::from_json(topology_json)?;
        let state = RingState::from_topology(&topology)?;
        let store = RingStore::deserialize(backend, &state)?;
        Ok(Ring {
            store,
            state: RwLock::new(state),
        })
    }

    fn read_state(&self) -> RwLockReadGuard<'_, RingState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, RingState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolves a key to its owning pnode, vnode, and data.
    pub fn get_node(&self, key: &[u8]) -> Placement {
        self.read_state().node_for_key(key)
    }

    /// Vnodes owned by `pnode`, ascending.
    pub fn get_vnodes(&self, pnode: &str) -> Result<Vec<u32>> {
        self.read_state().vnodes_of(pnode)
    }

    /// The pnode set, in insertion order of first appearance.
    pub fn get_pnodes(&self) -> Vec<String> {
        self.read_state().pnode_names()
    }

    /// Vnodes carrying non-sentinel data, ascending.
    pub fn get_data_vnodes(&self) -> Vec<u32> {
        self.read_state().data_vnodes()
    }

    /// Owner and data of one vnode.
    pub fn get_vnode_pnode_and_data(&self, vnode: u32) -> Result<VnodeMeta> {
        self.read_state().vnode_meta(vnode)
    }

    pub fn vnode_count(&self) -> u32 {
        self.read_state().vnode_count()
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.read_state().space().algorithm()
    }

    /// Moves `vnodes` to `target_pnode` and commits the move atomically.
    ///
    /// Returns the per-pnode delta covering every affected pnode. On a
    /// failed commit the in-memory state is thrown away and re-read from
    /// the store — the store is the authority.
    pub fn remap(&self, target_pnode: &str, vnodes: &[u32]) -> Result<ChangeSet> {
        let mut state = self.write_state();
        let target_is_new = !state.contains_pnode(target_pnode);
        let change = state.remap(target_pnode, vnodes)?;
        if let Err(err) = self
            .store
            .remap_batch(&state, &change, target_pnode, target_is_new)
            .and_then(|ops| self.store.commit(ops))
        {
            self.recover(&mut state, &err);
            return Err(err);
        }
        Ok(change)
    }

    /// Removes an empty pnode from the pnode set.
    pub fn remove_pnode(&self, pnode: &str) -> Result<()> {
        let mut state = self.write_state();
        state.remove_pnode(pnode)?;
        if let Err(err) = self
            .store
            .remove_pnode_batch(&state, pnode)
            .and_then(|ops| self.store.commit(ops))
        {
            self.recover(&mut state, &err);
            return Err(err);
        }
        Ok(())
    }

    /// Attaches data to a vnode, or clears it with `None` (or the literal
    /// string `"null"`).
    pub fn add_data(&self, vnode: u32, value: Option<&str>) -> Result<()> {
        let mut state = self.write_state();
        state.add_data(vnode, value)?;
        if let Err(err) = self
            .store
            .add_data_batch(&state, vnode)
            .and_then(|ops| self.store.commit(ops))
        {
            self.recover(&mut state, &err);
            return Err(err);
        }
        Ok(())
    }

    /// The canonical snapshot of the current topology.
    pub fn topology(&self) -> Topology {
        self.read_state().to_topology()
    }

    /// The canonical JSON form of the current topology.
    pub fn serialize(&self) -> Result<String> {
        self.topology().to_json()
    }

    /// Releases the backend. The ring is unusable afterwards.
    pub fn close(self) -> Result<()> {
        self.store.close()
    }

    fn recover(&self, state: &mut RingState, err: &Error) {
        warn!(error = %err, "mutation commit failed; reloading ring from store");
        match self.store.load_state() {
            Ok(fresh) => *state = fresh,
            Err(reload) => {
                warn!(error = %reload, "reload after failed commit also failed");
            }
        }
    }
}
