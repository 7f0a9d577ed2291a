//! Per-pnode ownership deltas.
//!
//! Mutations and the topology diff both speak in the same vocabulary: for
//! each affected pnode, which vnodes it lost and which it gained.

use serde::Serialize;
use std::collections::BTreeMap;

/// Vnodes one pnode lost and gained, both ascending.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PnodeDelta {
    pub removed: Vec<u32>,
    pub added: Vec<u32>,
}

impl PnodeDelta {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Deltas for every affected pnode, keyed by pnode name.
///
/// Returned by `remap` (covering the target and every prior owner) and by
/// the topology diff. The map is ordered so rendering is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ChangeSet(pub BTreeMap<String, PnodeDelta>);

impl ChangeSet {
    pub fn new() -> Self {
        ChangeSet::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, pnode: &str) -> Option<&PnodeDelta> {
        self.0.get(pnode)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &PnodeDelta)> {
        self.0.iter()
    }

    pub(crate) fn note_removed(&mut self, pnode: &str, vnode: u32) {
        self.0
            .entry(pnode.to_string())
            .or_default()
            .removed
            .push(vnode);
    }

    pub(crate) fn note_added(&mut self, pnode: &str, vnode: u32) {
        self.0
            .entry(pnode.to_string())
            .or_default()
            .added
            .push(vnode);
    }
}
