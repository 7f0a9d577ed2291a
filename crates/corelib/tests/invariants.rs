//! Property tests for the ring's quantified invariants.
//!
//! Verifies vnode range, cross-host determinism, total coverage under
//! arbitrary remap sequences, serialization round-trips, data persistence
//! across remaps, and diff soundness.

use corelib::hasher::HashAlgorithm;
use corelib::{diff, BackendOptions, Ring, RingConfig};
use proptest::prelude::*;
use std::collections::BTreeSet;

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_algorithm() -> impl Strategy<Value = HashAlgorithm> {
    prop::sample::select(vec![
        HashAlgorithm::Sha1,
        HashAlgorithm::Sha256,
        HashAlgorithm::Sha512,
    ])
}

fn arb_config() -> impl Strategy<Value = RingConfig> {
    (arb_algorithm(), 1u32..64, 1usize..6).prop_map(|(algorithm, vnodes, pnodes)| RingConfig {
        algorithm,
        vnodes,
        pnodes: (0..pnodes)
            .map(|i| format!("tcp://node{}:2020", i))
            .collect(),
    })
}

/// Raw (vnode, target) move intents; applied modulo the ring's vnode
/// count, skipping moves that would land a vnode on its current owner.
fn arb_moves() -> impl Strategy<Value = Vec<(u32, u8)>> {
    prop::collection::vec((any::<u32>(), 0u8..8), 0..12)
}

fn target_name(index: u8) -> String {
    format!("tcp://node{}:2020", index)
}

fn fresh_ring(config: &RingConfig) -> Ring {
    Ring::create(config.clone(), BackendOptions::Memory).unwrap()
}

fn apply_moves(ring: &Ring, config: &RingConfig, moves: &[(u32, u8)]) {
    for &(vnode, target) in moves {
        let vnode = vnode % config.vnodes;
        let target = target_name(target);
        let owner = ring.get_vnode_pnode_and_data(vnode).unwrap().pnode;
        if owner != target {
            ring.remap(&target, &[vnode]).unwrap();
        }
    }
}

// ============================================================================
// Invariants
// ============================================================================

proptest! {
    /// Every key resolves to a vnode in [0, V) owned by a known pnode.
    #[test]
    fn prop_lookup_in_range(config in arb_config(), key in prop::collection::vec(any::<u8>(), 0..64)) {
        let ring = fresh_ring(&config);
        let placement = ring.get_node(&key);
        prop_assert!(placement.vnode < config.vnodes);
        prop_assert!(ring.get_pnodes().contains(&placement.pnode));
    }

    /// Two fresh rings with the same configuration serialize identically.
    #[test]
    fn prop_fresh_rings_serialize_identically(config in arb_config()) {
        let a = fresh_ring(&config);
        let b = fresh_ring(&config);
        prop_assert_eq!(a.serialize().unwrap(), b.serialize().unwrap());
    }

    /// After any remap sequence, every vnode has exactly one owner.
    #[test]
    fn prop_coverage_is_total(config in arb_config(), moves in arb_moves()) {
        let ring = fresh_ring(&config);
        apply_moves(&ring, &config, &moves);

        let mut seen = BTreeSet::new();
        let mut total = 0usize;
        for pnode in ring.get_pnodes() {
            let owned = ring.get_vnodes(&pnode).unwrap();
            total += owned.len();
            for vnode in owned {
                prop_assert!(vnode < config.vnodes);
                prop_assert!(seen.insert(vnode), "vnode {} owned twice", vnode);
            }
        }
        prop_assert_eq!(total, config.vnodes as usize);
    }

    /// serialize ∘ deserialize ∘ serialize is the identity on snapshots.
    #[test]
    fn prop_serialization_round_trips(
        config in arb_config(),
        moves in arb_moves(),
        data_vnode in any::<u32>(),
        value in "[a-z]{1,8}",
    ) {
        let ring = fresh_ring(&config);
        apply_moves(&ring, &config, &moves);
        ring.add_data(data_vnode % config.vnodes, Some(&value)).unwrap();

        let snapshot = ring.serialize().unwrap();
        let rebuilt = Ring::deserialize(&snapshot, BackendOptions::Memory).unwrap();
        prop_assert_eq!(rebuilt.serialize().unwrap(), snapshot);
    }

    /// Data attached to a vnode survives remapping that vnode.
    #[test]
    fn prop_data_survives_remap(
        config in arb_config(),
        vnode in any::<u32>(),
        target in 0u8..8,
        value in "[a-z]{1,8}".prop_filter("clear spelling", |v| v != "null"),
    ) {
        let ring = fresh_ring(&config);
        let vnode = vnode % config.vnodes;
        ring.add_data(vnode, Some(&value)).unwrap();

        let target = target_name(target);
        if ring.get_vnode_pnode_and_data(vnode).unwrap().pnode != target {
            ring.remap(&target, &[vnode]).unwrap();
        }

        let meta = ring.get_vnode_pnode_and_data(vnode).unwrap();
        prop_assert_eq!(meta.data, corelib::VnodeData::Value(value));
        prop_assert_eq!(ring.get_data_vnodes().contains(&vnode), true);
    }

    /// Applying diff(A, B) to A as remaps reproduces B's ownership map.
    #[test]
    fn prop_diff_is_a_remap_script(config in arb_config(), moves in arb_moves()) {
        let a = fresh_ring(&config);
        let b = fresh_ring(&config);
        apply_moves(&b, &config, &moves);

        let change = diff(&a.topology(), &b.topology()).unwrap();
        for (pnode, delta) in change.iter() {
            if !delta.added.is_empty() {
                a.remap(pnode, &delta.added).unwrap();
            }
        }

        for vnode in 0..config.vnodes {
            prop_assert_eq!(
                a.get_vnode_pnode_and_data(vnode).unwrap().pnode,
                b.get_vnode_pnode_and_data(vnode).unwrap().pnode
            );
        }
    }
}
