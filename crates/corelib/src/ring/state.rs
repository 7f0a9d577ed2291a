//! The pure ring model.
//!
//! [`RingState`] holds the complete topology — the vnode→pnode assignment,
//! the pnode set, and per-vnode data — with no I/O attached. Mutations
//! validate fully before touching anything, so a failed call leaves the
//! state bit-for-bit unchanged; the durable commit is layered on top by
//! [`Ring`](crate::ring::Ring).
//!
//! # Invariants
//!
//! - Every vnode in `[0, V)` has exactly one owner.
//! - The pnode set contains every owner plus any pnode that was remapped
//!   down to zero vnodes and not yet removed.
//! - Data is keyed by vnode, never by owner, so it travels with the vnode
//!   across remaps.

use crate::error::{Error, Result};
use crate::hasher::HashSpace;
use crate::ring::change::ChangeSet;
use crate::topology::{Topology, VnodeData};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// Where a key lives: the owning pnode, the vnode it hashed into, and that
/// vnode's data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Placement {
    pub pnode: String,
    pub vnode: u32,
    pub data: VnodeData,
}

/// A vnode's owner and data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct VnodeMeta {
    pub pnode: String,
    pub data: VnodeData,
}

/// Complete in-memory ring topology.
#[derive(Clone, Debug)]
pub struct RingState {
    space: HashSpace,
    /// Pnode set in insertion order of first appearance.
    pnodes: Vec<Arc<str>>,
    /// Owner of each vnode; index is the vnode id.
    owner: Vec<Arc<str>>,
    /// Owned vnodes per pnode. Keys mirror `pnodes` as a set.
    owned: BTreeMap<Arc<str>, BTreeSet<u32>>,
    /// Operator data, present only for non-sentinel vnodes.
    data: BTreeMap<u32, String>,
}

impl RingState {
    /// Canonical even distribution: vnode `i` goes to `pnodes[i mod n]`.
    ///
    /// This layout must be byte-identical on every host, so it is the only
    /// creation path.
    pub fn with_even_distribution(space: HashSpace, pnodes: &[String]) -> Result<Self> {
        if pnodes.is_empty() {
            return Err(Error::ConfigInvalid("empty pnode list".to_string()));
        }
        let mut names: Vec<Arc<str>> = Vec::with_capacity(pnodes.len());
        let mut owned: BTreeMap<Arc<str>, BTreeSet<u32>> = BTreeMap::new();
        for pnode in pnodes {
            if pnode.is_empty() {
                return Err(Error::ConfigInvalid("empty pnode name".to_string()));
            }
            let name: Arc<str> = Arc::from(pnode.as_str());
            if owned.insert(name.clone(), BTreeSet::new()).is_some() {
                return Err(Error::ConfigInvalid(format!("duplicate pnode: {}", pnode)));
            }
            names.push(name);
        }
        let mut owner = Vec::with_capacity(space.vnode_count() as usize);
        for vnode in 0..space.vnode_count() {
            let name = names[vnode as usize % names.len()].clone();
            if let Some(set) = owned.get_mut(&name) {
                set.insert(vnode);
            }
            owner.push(name);
        }
        Ok(RingState {
            space,
            pnodes: names,
            owner,
            owned,
            data: BTreeMap::new(),
        })
    }

    /// Reassembles a state from persisted parts.
    ///
    /// `pnode_order` is the pnode set in enumeration order; `owners` names
    /// the owner of each vnode in id order. Used by store open and by
    /// topology deserialization; both feed it untrusted input, so it
    /// validates the full ownership function.
    pub fn from_parts(
        space: HashSpace,
        pnode_order: Vec<String>,
        owners: Vec<String>,
        data: BTreeMap<u32, String>,
    ) -> Result<Self> {
        if pnode_order.is_empty() {
            return Err(Error::Serialization("empty pnode set".to_string()));
        }
        if owners.len() != space.vnode_count() as usize {
            return Err(Error::Serialization(format!(
                "{} vnode assignments for a {}-vnode ring",
                owners.len(),
                space.vnode_count()
            )));
        }
        let mut names: Vec<Arc<str>> = Vec::with_capacity(pnode_order.len());
        let mut owned: BTreeMap<Arc<str>, BTreeSet<u32>> = BTreeMap::new();
        for pnode in &pnode_order {
            if pnode.is_empty() {
                return Err(Error::Serialization("empty pnode name".to_string()));
            }
            let name: Arc<str> = Arc::from(pnode.as_str());
            if owned.insert(name.clone(), BTreeSet::new()).is_some() {
                return Err(Error::Serialization(format!("duplicate pnode: {}", pnode)));
            }
            names.push(name);
        }
        let mut owner: Vec<Arc<str>> = Vec::with_capacity(owners.len());
        for (vnode, pnode) in owners.iter().enumerate() {
            let key = owned
                .get_key_value(pnode.as_str())
                .map(|(k, _)| k.clone())
                .ok_or_else(|| {
                    Error::Serialization(format!(
                        "vnode {} assigned to pnode {} outside the pnode set",
                        vnode, pnode
                    ))
                })?;
            if let Some(set) = owned.get_mut(&key) {
                set.insert(vnode as u32);
            }
            owner.push(key);
        }
        for vnode in data.keys() {
            if *vnode >= space.vnode_count() {
                return Err(Error::Serialization(format!(
                    "data attached to vnode {} outside the ring",
                    vnode
                )));
            }
        }
        Ok(RingState {
            space,
            pnodes: names,
            owner,
            owned,
            data,
        })
    }

    pub fn space(&self) -> &HashSpace {
        &self.space
    }

    pub fn vnode_count(&self) -> u32 {
        self.space.vnode_count()
    }

    fn check_vnode(&self, vnode: u32) -> Result<()> {
        if vnode >= self.vnode_count() {
            return Err(Error::VnodeOutOfRange {
                vnode,
                vnode_count: self.vnode_count(),
            });
        }
        Ok(())
    }

    /// Resolves a key to its owning pnode, vnode, and data.
    pub fn node_for_key(&self, key: &[u8]) -> Placement {
        let vnode = self.space.vnode_of(key);
        Placement {
            pnode: self.owner[vnode as usize].to_string(),
            vnode,
            data: self.data_of(vnode),
        }
    }

    /// Owner and data of one vnode.
    pub fn vnode_meta(&self, vnode: u32) -> Result<VnodeMeta> {
        self.check_vnode(vnode)?;
        Ok(VnodeMeta {
            pnode: self.owner[vnode as usize].to_string(),
            data: self.data_of(vnode),
        })
    }

    pub fn data_of(&self, vnode: u32) -> VnodeData {
        match self.data.get(&vnode) {
            Some(value) => VnodeData::Value(value.clone()),
            None => VnodeData::Default,
        }
    }

    pub fn owner_of(&self, vnode: u32) -> Result<&str> {
        self.check_vnode(vnode)?;
        Ok(&self.owner[vnode as usize])
    }

    /// Pnode set in insertion order of first appearance.
    pub fn pnode_names(&self) -> Vec<String> {
        self.pnodes.iter().map(|p| p.to_string()).collect()
    }

    pub fn contains_pnode(&self, pnode: &str) -> bool {
        self.owned.contains_key(pnode)
    }

    /// Vnodes owned by `pnode`, ascending. A copy, never a live view.
    pub fn vnodes_of(&self, pnode: &str) -> Result<Vec<u32>> {
        self.owned
            .get(pnode)
            .map(|set| set.iter().copied().collect())
            .ok_or_else(|| Error::PnodeUnknown(pnode.to_string()))
    }

    /// Vnodes carrying non-sentinel data, ascending.
    pub fn data_vnodes(&self) -> Vec<u32> {
        self.data.keys().copied().collect()
    }

    /// Moves `vnodes` to `target_pnode`, creating it if needed.
    ///
    /// Validation is complete before the first write: a returned error
    /// means nothing changed. Pnodes emptied by the move stay in the
    /// pnode set until `remove_pnode`.
    pub fn remap(&mut self, target_pnode: &str, vnodes: &[u32]) -> Result<ChangeSet> {
        if target_pnode.is_empty() {
            return Err(Error::ConfigInvalid("empty pnode name".to_string()));
        }
        if vnodes.is_empty() {
            return Err(Error::ConfigInvalid("no vnodes to remap".to_string()));
        }
        let mut moving = BTreeSet::new();
        for &vnode in vnodes {
            self.check_vnode(vnode)?;
            if !moving.insert(vnode) {
                return Err(Error::ConfigInvalid(format!(
                    "duplicate vnode in remap: {}",
                    vnode
                )));
            }
            if &*self.owner[vnode as usize] == target_pnode {
                return Err(Error::VnodeAlreadyOnTarget {
                    pnode: target_pnode.to_string(),
                    vnode,
                });
            }
        }

        let target = match self.owned.get_key_value(target_pnode) {
            Some((name, _)) => name.clone(),
            None => {
                let name: Arc<str> = Arc::from(target_pnode);
                self.pnodes.push(name.clone());
                self.owned.insert(name.clone(), BTreeSet::new());
                name
            }
        };

        let mut change = ChangeSet::new();
        for vnode in moving {
            let old = std::mem::replace(&mut self.owner[vnode as usize], target.clone());
            if let Some(set) = self.owned.get_mut(&old) {
                set.remove(&vnode);
            }
            if let Some(set) = self.owned.get_mut(&target) {
                set.insert(vnode);
            }
            change.note_removed(&old, vnode);
            change.note_added(&target, vnode);
        }
        Ok(change)
    }

    /// Drops an empty pnode from the pnode set.
    pub fn remove_pnode(&mut self, pnode: &str) -> Result<()> {
        let owned = self
            .owned
            .get(pnode)
            .ok_or_else(|| Error::PnodeUnknown(pnode.to_string()))?;
        if !owned.is_empty() {
            return Err(Error::PnodeStillInUse {
                pnode: pnode.to_string(),
                owned: owned.len(),
            });
        }
        self.owned.remove(pnode);
        self.pnodes.retain(|name| &**name != pnode);
        Ok(())
    }

    /// Attaches operator data to a vnode, or clears it.
    ///
    /// `None` — or the literal string `"null"`, the front-end's spelling
    /// of it — restores the sentinel.
    pub fn add_data(&mut self, vnode: u32, value: Option<&str>) -> Result<()> {
        self.check_vnode(vnode)?;
        match value {
            None | Some("null") => {
                self.data.remove(&vnode);
            }
            Some(value) => {
                self.data.insert(vnode, value.to_string());
            }
        }
        Ok(())
    }

    /// The canonical snapshot of this state.
    pub fn to_topology(&self) -> Topology {
        let mut map: BTreeMap<String, BTreeMap<String, VnodeData>> = BTreeMap::new();
        for (pnode, owned) in &self.owned {
            let inner = owned
                .iter()
                .map(|&vnode| (vnode.to_string(), self.data_of(vnode)))
                .collect();
            map.insert(pnode.to_string(), inner);
        }
        Topology {
            vnodes: self.vnode_count(),
            pnode_to_vnode_map: map,
            algorithm: Topology::algorithm_info(&self.space),
            version: crate::SCHEMA_VERSION.to_string(),
        }
    }

    /// Rebuilds a state from a snapshot, validating total vnode coverage.
    pub fn from_topology(topology: &Topology) -> Result<Self> {
        let space = topology.space()?;
        let vnode_count = space.vnode_count();
        let mut owners: Vec<Option<String>> = vec![None; vnode_count as usize];
        let mut data = BTreeMap::new();
        let mut pnode_order = Vec::with_capacity(topology.pnode_to_vnode_map.len());
        for (pnode, vnode_map) in &topology.pnode_to_vnode_map {
            pnode_order.push(pnode.clone());
            for (vnode_str, value) in vnode_map {
                let vnode: u32 = vnode_str.parse().map_err(|_| {
                    Error::Serialization(format!("bad vnode id: {}", vnode_str))
                })?;
                if vnode >= vnode_count {
                    return Err(Error::Serialization(format!(
                        "vnode {} outside [0, {})",
                        vnode, vnode_count
                    )));
                }
                let slot = &mut owners[vnode as usize];
                if slot.is_some() {
                    return Err(Error::Serialization(format!(
                        "vnode {} assigned twice",
                        vnode
                    )));
                }
                *slot = Some(pnode.clone());
                if let VnodeData::Value(value) = value {
                    data.insert(vnode, value.clone());
                }
            }
        }
        let owners = owners
            .into_iter()
            .enumerate()
            .map(|(vnode, owner)| {
                owner.ok_or_else(|| {
                    Error::Serialization(format!("vnode {} unassigned", vnode))
                })
            })
            .collect::<Result<Vec<String>>>()?;
        Self::from_parts(space, pnode_order, owners, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::HashAlgorithm;

    fn state(vnodes: u32, pnodes: &[&str]) -> RingState {
        let space = HashSpace::new(HashAlgorithm::Sha256, vnodes).unwrap();
        let pnodes: Vec<String> = pnodes.iter().map(|p| p.to_string()).collect();
        RingState::with_even_distribution(space, &pnodes).unwrap()
    }

    #[test]
    fn test_even_distribution() {
        let state = state(6, &["P1", "P2"]);
        assert_eq!(state.vnodes_of("P1").unwrap(), vec![0, 2, 4]);
        assert_eq!(state.vnodes_of("P2").unwrap(), vec![1, 3, 5]);
        assert_eq!(state.pnode_names(), vec!["P1", "P2"]);
    }

    #[test]
    fn test_creation_rejects_bad_input() {
        let space = HashSpace::new(HashAlgorithm::Sha256, 4).unwrap();
        assert!(matches!(
            RingState::with_even_distribution(space.clone(), &[]),
            Err(Error::ConfigInvalid(_))
        ));
        assert!(matches!(
            RingState::with_even_distribution(space.clone(), &["a".into(), "a".into()]),
            Err(Error::ConfigInvalid(_))
        ));
        assert!(matches!(
            RingState::with_even_distribution(space, &["".into()]),
            Err(Error::ConfigInvalid(_))
        ));
    }

    #[test]
    fn test_remap_moves_ownership_and_data() {
        let mut state = state(6, &["P1", "P2"]);
        state.add_data(4, Some("ro")).unwrap();
        let change = state.remap("P3", &[4, 0]).unwrap();

        assert_eq!(state.vnodes_of("P1").unwrap(), vec![2]);
        assert_eq!(state.vnodes_of("P3").unwrap(), vec![0, 4]);
        assert_eq!(state.pnode_names(), vec!["P1", "P2", "P3"]);
        // Data traveled with vnode 4.
        assert_eq!(
            state.vnode_meta(4).unwrap(),
            VnodeMeta {
                pnode: "P3".into(),
                data: VnodeData::Value("ro".into())
            }
        );
        // Change-set covers loser and target, ascending.
        assert_eq!(change.get("P1").unwrap().removed, vec![0, 4]);
        assert_eq!(change.get("P3").unwrap().added, vec![0, 4]);
        assert!(change.get("P2").is_none());
    }

    #[test]
    fn test_remap_validation_leaves_state_untouched() {
        let mut state = state(6, &["P1", "P2"]);
        assert!(matches!(
            state.remap("P1", &[]),
            Err(Error::ConfigInvalid(_))
        ));
        assert!(matches!(
            state.remap("P1", &[9]),
            Err(Error::VnodeOutOfRange { vnode: 9, .. })
        ));
        assert!(matches!(
            state.remap("P3", &[1, 1]),
            Err(Error::ConfigInvalid(_))
        ));
        // One offending vnode poisons the whole call, valid ones included.
        assert!(matches!(
            state.remap("P1", &[1, 0]),
            Err(Error::VnodeAlreadyOnTarget { vnode: 0, .. })
        ));
        assert_eq!(state.vnodes_of("P1").unwrap(), vec![0, 2, 4]);
        assert_eq!(state.vnodes_of("P2").unwrap(), vec![1, 3, 5]);
        assert!(!state.contains_pnode("P3"));
    }

    #[test]
    fn test_emptied_pnode_stays_in_set() {
        let mut state = state(2, &["P1", "P2"]);
        state.remap("P2", &[0]).unwrap();
        assert_eq!(state.vnodes_of("P1").unwrap(), Vec::<u32>::new());
        assert_eq!(state.pnode_names(), vec!["P1", "P2"]);
    }

    #[test]
    fn test_remove_pnode_guards() {
        let mut state = state(2, &["P1", "P2"]);
        assert!(matches!(
            state.remove_pnode("P9"),
            Err(Error::PnodeUnknown(_))
        ));
        assert!(matches!(
            state.remove_pnode("P1"),
            Err(Error::PnodeStillInUse { owned: 1, .. })
        ));
        state.remap("P2", &[0]).unwrap();
        state.remove_pnode("P1").unwrap();
        assert_eq!(state.pnode_names(), vec!["P2"]);
        assert!(matches!(
            state.vnodes_of("P1"),
            Err(Error::PnodeUnknown(_))
        ));
    }

    #[test]
    fn test_add_data_and_clear() {
        let mut state = state(4, &["P1"]);
        state.add_data(2, Some("ro")).unwrap();
        assert_eq!(state.data_vnodes(), vec![2]);
        assert_eq!(state.data_of(2), VnodeData::Value("ro".into()));

        // Both clearing spellings restore the sentinel.
        state.add_data(2, Some("null")).unwrap();
        assert_eq!(state.data_vnodes(), Vec::<u32>::new());
        state.add_data(3, Some("x")).unwrap();
        state.add_data(3, None).unwrap();
        assert_eq!(state.data_of(3), VnodeData::Default);

        assert!(matches!(
            state.add_data(4, Some("oops")),
            Err(Error::VnodeOutOfRange { .. })
        ));
    }

    #[test]
    fn test_topology_round_trip() {
        let mut state = state(6, &["P1", "P2"]);
        state.add_data(4, Some("ro")).unwrap();
        state.remap("P3", &[4]).unwrap();
        state.remap("P2", &[0, 2]).unwrap();
        state.remove_pnode("P1").unwrap();

        let topology = state.to_topology();
        let rebuilt = RingState::from_topology(&topology).unwrap();
        assert_eq!(rebuilt.to_topology(), topology);
        assert_eq!(rebuilt.vnodes_of("P3").unwrap(), vec![4]);
        assert_eq!(rebuilt.data_of(4), VnodeData::Value("ro".into()));
    }

    #[test]
    fn test_from_topology_rejects_gaps_and_overlaps() {
        let state = state(4, &["P1", "P2"]);
        let mut topology = state.to_topology();
        // Drop vnode 3 from P2.
        topology
            .pnode_to_vnode_map
            .get_mut("P2")
            .unwrap()
            .remove("3");
        assert!(matches!(
            RingState::from_topology(&topology),
            Err(Error::Serialization(_))
        ));

        let mut topology = state.to_topology();
        // Assign vnode 0 to P2 as well.
        topology
            .pnode_to_vnode_map
            .get_mut("P2")
            .unwrap()
            .insert("0".into(), VnodeData::Default);
        assert!(matches!(
            RingState::from_topology(&topology),
            Err(Error::Serialization(_))
        ));
    }

    #[test]
    fn test_node_for_key_is_consistent() {
        let state = state(6, &["P1", "P2"]);
        let a = state.node_for_key(b"consistent-key");
        let b = state.node_for_key(b"consistent-key");
        assert_eq!(a, b);
        assert!(a.vnode < 6);
        assert_eq!(a.pnode, state.owner_of(a.vnode).unwrap());
    }
}
