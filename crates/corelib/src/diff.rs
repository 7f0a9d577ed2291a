//! Topology diff.
//!
//! Compares two canonical snapshots and reports, per pnode, the vnodes it
//! lost and gained. Per-vnode data is ignored; the diff is purely about
//! ownership. Feeding the result back into `remap`, one target pnode at a
//! time, turns ring A into ring B.

use crate::error::{Error, Result};
use crate::ring::change::ChangeSet;
use crate::topology::Topology;
use std::collections::{BTreeMap, BTreeSet};

/// Per-pnode `{removed, added}` between snapshots `a` and `b`.
///
/// Pnodes with no delta are omitted. A pnode present only in `a` shows all
/// its vnodes as removed; present only in `b`, all as added.
pub fn diff(a: &Topology, b: &Topology) -> Result<ChangeSet> {
    let owned_a = vnode_sets(a)?;
    let owned_b = vnode_sets(b)?;
    let empty = BTreeSet::new();
    let mut change = ChangeSet::new();
    let pnodes: BTreeSet<&String> = owned_a.keys().chain(owned_b.keys()).collect();
    for pnode in pnodes {
        let in_a = owned_a.get(pnode).unwrap_or(&empty);
        let in_b = owned_b.get(pnode).unwrap_or(&empty);
        for &vnode in in_a.difference(in_b) {
            change.note_removed(pnode, vnode);
        }
        for &vnode in in_b.difference(in_a) {
            change.note_added(pnode, vnode);
        }
    }
    Ok(change)
}

fn vnode_sets(topology: &Topology) -> Result<BTreeMap<String, BTreeSet<u32>>> {
    let mut sets = BTreeMap::new();
    for (pnode, vnode_map) in &topology.pnode_to_vnode_map {
        let mut vnodes = BTreeSet::new();
        for vnode_str in vnode_map.keys() {
            let vnode: u32 = vnode_str
                .parse()
                .map_err(|_| Error::Serialization(format!("bad vnode id: {}", vnode_str)))?;
            vnodes.insert(vnode);
        }
        sets.insert(pnode.clone(), vnodes);
    }
    Ok(sets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hasher::{HashAlgorithm, HashSpace};
    use crate::ring::state::RingState;

    fn state(vnodes: u32, pnodes: &[&str]) -> RingState {
        let space = HashSpace::new(HashAlgorithm::Sha256, vnodes).unwrap();
        let pnodes: Vec<String> = pnodes.iter().map(|p| p.to_string()).collect();
        RingState::with_even_distribution(space, &pnodes).unwrap()
    }

    #[test]
    fn test_identical_rings_diff_empty() {
        let a = state(6, &["P1", "P2"]).to_topology();
        assert!(diff(&a, &a).unwrap().is_empty());
    }

    #[test]
    fn test_single_remap_diff() {
        let a = state(6, &["P1", "P2"]);
        let mut b = a.clone();
        b.remap("P1", &[1]).unwrap();

        let change = diff(&a.to_topology(), &b.to_topology()).unwrap();
        assert_eq!(change.get("P1").unwrap().added, vec![1]);
        assert!(change.get("P1").unwrap().removed.is_empty());
        assert_eq!(change.get("P2").unwrap().removed, vec![1]);
        assert!(change.get("P2").unwrap().added.is_empty());
        assert_eq!(change.0.len(), 2);
    }

    #[test]
    fn test_pnode_only_on_one_side() {
        let a = state(4, &["P1", "P2"]);
        let mut b = a.clone();
        b.remap("P3", &[1, 3]).unwrap();
        b.remove_pnode("P2").unwrap();

        let change = diff(&a.to_topology(), &b.to_topology()).unwrap();
        // P2 exists only in A: everything removed, nothing added.
        assert_eq!(change.get("P2").unwrap().removed, vec![1, 3]);
        assert!(change.get("P2").unwrap().added.is_empty());
        // P3 exists only in B: everything added.
        assert_eq!(change.get("P3").unwrap().added, vec![1, 3]);
        assert!(change.get("P3").unwrap().removed.is_empty());
        // P1 did not move.
        assert!(change.get("P1").is_none());
    }

    #[test]
    fn test_data_is_ignored() {
        let a = state(4, &["P1", "P2"]);
        let mut b = a.clone();
        b.add_data(0, Some("ro")).unwrap();
        assert!(diff(&a.to_topology(), &b.to_topology()).unwrap().is_empty());
    }
}
