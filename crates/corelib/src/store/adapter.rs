//! Ring ↔ store translation.
//!
//! [`RingStore`] is the only code that touches the key schema. Creation
//! lays the full key set down in a fixed order ending with the `COMPLETE`
//! marker — creation is not atomic, the marker is what makes it count.
//! Every mutation afterwards commits as one atomic batch, so a crash
//! between batches can lose a mutation but never tear one.

use crate::error::{Error, Result};
use crate::hasher::{HashAlgorithm, HashSpace};
use crate::ring::change::ChangeSet;
use crate::ring::state::RingState;
use crate::store::schema::{
    pad_width, pnode_key, pnode_vnode_key, vnode_key, KEY_ALGORITHM, KEY_COMPLETE,
    KEY_PNODE_SET, KEY_VERSION, KEY_VNODE_COUNT, KEY_VNODE_DATA,
};
use crate::store::{Backend, BatchOp};
use crate::topology::VnodeData;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Upper bound on writes per batch during the bulk creation phases.
const BATCH_LIMIT: usize = 1000;

/// The durable face of one ring.
pub struct RingStore {
    backend: Box<dyn Backend>,
    pad: usize,
}

impl RingStore {
    /// Lays a fresh ring down on an empty backend.
    ///
    /// Refuses a backend that already holds a complete ring; a torn
    /// earlier creation (keys but no `COMPLETE`) is overwritten, which is
    /// what makes creation retryable after a crash.
    pub fn create(backend: Box<dyn Backend>, state: &RingState) -> Result<RingStore> {
        if backend.get(KEY_COMPLETE)?.is_some() {
            return Err(Error::ConfigInvalid(
                "backend already holds a complete ring".to_string(),
            ));
        }
        let pad = write_full(&*backend, state, false)?;
        info!(
            vnodes = state.vnode_count(),
            pnodes = state.pnode_names().len(),
            algorithm = %state.space().algorithm(),
            "ring created"
        );
        Ok(RingStore { backend, pad })
    }

    /// Writes a deserialized ring's full vnode/pnode key set.
    ///
    /// Unlike `create` this tolerates an existing ring (reconstituting
    /// over it) and skips the `ALGORITHM`/`VERSION`/`COMPLETE` markers
    /// when they are already present.
    pub fn deserialize(backend: Box<dyn Backend>, state: &RingState) -> Result<RingStore> {
        let pad = write_full(&*backend, state, true)?;
        info!(
            vnodes = state.vnode_count(),
            pnodes = state.pnode_names().len(),
            "ring deserialized"
        );
        Ok(RingStore { backend, pad })
    }

    /// Opens an existing ring: verifies the markers, then loads the state.
    pub fn open(backend: Box<dyn Backend>) -> Result<(RingStore, RingState)> {
        let space = verify(&*backend)?;
        let store = RingStore {
            backend,
            pad: pad_width(space.vnode_count()),
        };
        let state = store.read_state(space)?;
        debug!(
            vnodes = state.vnode_count(),
            pnodes = state.pnode_names().len(),
            "ring opened"
        );
        Ok((store, state))
    }

    /// Re-reads the state from the backend. The store is the authority
    /// after a failed commit.
    pub fn load_state(&self) -> Result<RingState> {
        let space = verify(&*self.backend)?;
        self.read_state(space)
    }

    /// Commits one mutation's batch atomically.
    pub fn commit(&self, ops: Vec<BatchOp>) -> Result<()> {
        debug!(writes = ops.len(), "committing mutation batch");
        self.backend.batch(ops)
    }

    pub fn close(&self) -> Result<()> {
        self.backend.close()
    }

    /// Batch for a remap, against the already-mutated state.
    ///
    /// Every affected key lands in one batch: the per-vnode data keys move
    /// from each prior owner to the target, `/VNODE/%d` is repointed, the
    /// `/PNODE/%s` arrays of every affected pnode are rewritten, and the
    /// pnode set is rewritten when the target is new.
    pub fn remap_batch(
        &self,
        state: &RingState,
        change: &ChangeSet,
        target_pnode: &str,
        target_is_new: bool,
    ) -> Result<Vec<BatchOp>> {
        let mut ops = Vec::new();
        for (pnode, delta) in change.iter() {
            if pnode == target_pnode {
                continue;
            }
            for &vnode in &delta.removed {
                ops.push(BatchOp::delete(pnode_vnode_key(self.pad, pnode, vnode)));
            }
            ops.push(BatchOp::put(pnode_key(pnode), json_bytes(&state.vnodes_of(pnode)?)?));
        }
        let added = change
            .get(target_pnode)
            .map(|delta| delta.added.as_slice())
            .unwrap_or_default();
        for &vnode in added {
            ops.push(BatchOp::put(
                pnode_vnode_key(self.pad, target_pnode, vnode),
                state.data_of(vnode).to_store_bytes()?,
            ));
            ops.push(BatchOp::put(
                vnode_key(self.pad, vnode),
                target_pnode.as_bytes().to_vec(),
            ));
        }
        ops.push(BatchOp::put(
            pnode_key(target_pnode),
            json_bytes(&state.vnodes_of(target_pnode)?)?,
        ));
        if target_is_new {
            ops.push(BatchOp::put(KEY_PNODE_SET.to_vec(), json_bytes(&state.pnode_names())?));
        }
        Ok(ops)
    }

    /// Batch for a data change on one vnode.
    pub fn add_data_batch(&self, state: &RingState, vnode: u32) -> Result<Vec<BatchOp>> {
        let owner = state.owner_of(vnode)?;
        Ok(vec![
            BatchOp::put(
                pnode_vnode_key(self.pad, owner, vnode),
                state.data_of(vnode).to_store_bytes()?,
            ),
            BatchOp::put(KEY_VNODE_DATA.to_vec(), json_bytes(&state.data_vnodes())?),
        ])
    }

    /// Batch for removing an (empty) pnode from the pnode set.
    pub fn remove_pnode_batch(&self, state: &RingState, pnode: &str) -> Result<Vec<BatchOp>> {
        Ok(vec![
            BatchOp::delete(pnode_key(pnode)),
            BatchOp::put(KEY_PNODE_SET.to_vec(), json_bytes(&state.pnode_names())?),
        ])
    }

    fn read_state(&self, space: HashSpace) -> Result<RingState> {
        let vnode_count = space.vnode_count();
        let pnode_names: Vec<String> = json_value(&*self.backend, KEY_PNODE_SET)?;
        let mut owners: Vec<Option<String>> = vec![None; vnode_count as usize];
        for pnode in &pnode_names {
            let vnodes: Vec<u32> = json_value(&*self.backend, &pnode_key(pnode))?;
            for vnode in vnodes {
                if vnode >= vnode_count {
                    return Err(Error::Store(format!(
                        "pnode {} claims vnode {} outside the ring",
                        pnode, vnode
                    )));
                }
                let slot = &mut owners[vnode as usize];
                if slot.is_some() {
                    return Err(Error::Store(format!("vnode {} owned twice", vnode)));
                }
                *slot = Some(pnode.clone());
            }
        }
        let owners = owners
            .into_iter()
            .enumerate()
            .map(|(vnode, owner)| {
                owner.ok_or_else(|| Error::Store(format!("vnode {} unowned", vnode)))
            })
            .collect::<Result<Vec<String>>>()?;

        let data_vnodes: Vec<u32> = match self.backend.get(KEY_VNODE_DATA)? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map_err(|e| Error::Store(format!("corrupt VNODE_DATA: {}", e)))?,
            None => Vec::new(),
        };
        let mut data = BTreeMap::new();
        for vnode in data_vnodes {
            if vnode >= vnode_count {
                return Err(Error::Store(format!(
                    "VNODE_DATA lists vnode {} outside the ring",
                    vnode
                )));
            }
            let key = pnode_vnode_key(self.pad, &owners[vnode as usize], vnode);
            let bytes = self.backend.get(&key)?.ok_or_else(|| {
                Error::Store(format!("missing data value for vnode {}", vnode))
            })?;
            if let VnodeData::Value(value) = VnodeData::from_store_bytes(&bytes)? {
                data.insert(vnode, value);
            }
        }

        RingState::from_parts(space, pnode_names, owners, data)
            .map_err(|e| Error::Store(format!("corrupt ring layout: {}", e)))
    }
}

/// Checks the markers and returns the persisted hash space.
fn verify(backend: &dyn Backend) -> Result<HashSpace> {
    match backend.get(KEY_COMPLETE)? {
        None => return Err(Error::RingIncomplete),
        Some(marker) if marker != b"1" => {
            return Err(Error::Store("corrupt COMPLETE marker".to_string()))
        }
        Some(_) => {}
    }
    let version = string_value(backend, KEY_VERSION)?;
    if version != crate::SCHEMA_VERSION {
        return Err(Error::RingVersionMismatch(version));
    }
    let algorithm: HashAlgorithm = string_value(backend, KEY_ALGORITHM)?.parse()?;
    let vnode_count: u32 = string_value(backend, KEY_VNODE_COUNT)?
        .parse()
        .map_err(|_| Error::Store("corrupt VNODE_COUNT".to_string()))?;
    HashSpace::new(algorithm, vnode_count)
}

/// Writes the complete key set for `state` in the creation order.
///
/// Returns the vnode key pad width. With `skip_existing_markers`, the
/// trailing `ALGORITHM`/`VERSION`/`COMPLETE` writes are elided when the
/// keys are already present (the deserialize path).
fn write_full(backend: &dyn Backend, state: &RingState, skip_existing_markers: bool) -> Result<usize> {
    let vnode_count = state.vnode_count();
    let pad = pad_width(vnode_count);
    backend.put(KEY_VNODE_COUNT, vnode_count.to_string().as_bytes())?;

    // Bulk phases go out in bounded batches.
    let mut ops: Vec<BatchOp> = Vec::with_capacity(BATCH_LIMIT);
    let flush = |backend: &dyn Backend, ops: &mut Vec<BatchOp>, force: bool| -> Result<()> {
        if ops.len() >= BATCH_LIMIT || (force && !ops.is_empty()) {
            backend.batch(std::mem::take(ops))?;
        }
        Ok(())
    };

    for vnode in 0..vnode_count {
        let owner = state.owner_of(vnode)?;
        ops.push(BatchOp::put(
            vnode_key(pad, vnode),
            owner.as_bytes().to_vec(),
        ));
        flush(backend, &mut ops, false)?;
    }
    flush(backend, &mut ops, true)?;

    let pnode_names = state.pnode_names();
    for pnode in &pnode_names {
        for vnode in state.vnodes_of(pnode)? {
            ops.push(BatchOp::put(
                pnode_vnode_key(pad, pnode, vnode),
                state.data_of(vnode).to_store_bytes()?,
            ));
            flush(backend, &mut ops, false)?;
        }
    }
    flush(backend, &mut ops, true)?;

    for pnode in &pnode_names {
        ops.push(BatchOp::put(pnode_key(pnode), json_bytes(&state.vnodes_of(pnode)?)?));
    }
    ops.push(BatchOp::put(KEY_PNODE_SET.to_vec(), json_bytes(&pnode_names)?));
    ops.push(BatchOp::put(KEY_VNODE_DATA.to_vec(), json_bytes(&state.data_vnodes())?));
    backend.batch(std::mem::take(&mut ops))?;

    let markers: [(&[u8], String); 3] = [
        (KEY_ALGORITHM, state.space().algorithm().name().to_string()),
        (KEY_VERSION, crate::SCHEMA_VERSION.to_string()),
        (KEY_COMPLETE, "1".to_string()),
    ];
    for (key, value) in markers {
        if skip_existing_markers && backend.get(key)?.is_some() {
            continue;
        }
        backend.put(key, value.as_bytes())?;
    }
    Ok(pad)
}

fn json_bytes<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| Error::Serialization(e.to_string()))
}

fn json_value<T: serde::de::DeserializeOwned>(backend: &dyn Backend, key: &[u8]) -> Result<T> {
    let bytes = backend.get(key)?.ok_or_else(|| {
        Error::Store(format!("missing key: {}", String::from_utf8_lossy(key)))
    })?;
    serde_json::from_slice(&bytes).map_err(|e| {
        Error::Store(format!(
            "corrupt value at {}: {}",
            String::from_utf8_lossy(key),
            e
        ))
    })
}

fn string_value(backend: &dyn Backend, key: &[u8]) -> Result<String> {
    let bytes = backend.get(key)?.ok_or_else(|| {
        Error::Store(format!("missing key: {}", String::from_utf8_lossy(key)))
    })?;
    String::from_utf8(bytes).map_err(|_| {
        Error::Store(format!(
            "non-UTF-8 value at {}",
            String::from_utf8_lossy(key)
        ))
    })
}
