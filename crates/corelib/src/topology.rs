//! Canonical ring snapshots.
//!
//! A [`Topology`] is the interchange form of a ring: enough to reconstruct
//! the full vnode→pnode assignment and per-vnode data on another host. The
//! JSON rendering is canonical — struct field order fixes the top-level key
//! order, and the inner maps are `BTreeMap`s so object keys emit in a
//! deterministic order. `serialize(deserialize(s)) == s` byte-for-byte for
//! any `s` this module produced.

use crate::error::{Error, Result};
use crate::hasher::{HashAlgorithm, HashSpace};
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Per-vnode operator datum.
///
/// `Default` is the sentinel — the literal integer `1` in every persisted
/// form — and is distinguishable from any operator string, including `"1"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VnodeData {
    /// No operator data attached.
    Default,
    /// Operator-supplied opaque value, passed through unchanged.
    Value(String),
}

impl VnodeData {
    pub fn is_default(&self) -> bool {
        matches!(self, VnodeData::Default)
    }

    /// Store representation: JSON, so the integer sentinel and an operator
    /// string can never collide (`1` vs `"1"`).
    pub fn to_store_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn from_store_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::Store(format!("corrupt vnode data value: {}", e)))
    }
}

impl Serialize for VnodeData {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self {
            VnodeData::Default => serializer.serialize_u64(1),
            VnodeData::Value(v) => serializer.serialize_str(v),
        }
    }
}

impl<'de> Deserialize<'de> for VnodeData {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct DataVisitor;

        impl<'de> Visitor<'de> for DataVisitor {
            type Value = VnodeData;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("the integer 1 or a string")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<VnodeData, E> {
                if v == 1 {
                    Ok(VnodeData::Default)
                } else {
                    Err(E::custom(format!("unexpected vnode data integer: {}", v)))
                }
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<VnodeData, E> {
                if v == 1 {
                    Ok(VnodeData::Default)
                } else {
                    Err(E::custom(format!("unexpected vnode data integer: {}", v)))
                }
            }

            fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<VnodeData, E> {
                Ok(VnodeData::Value(v.to_owned()))
            }
        }

        deserializer.deserialize_any(DataVisitor)
    }
}

/// Algorithm parameters persisted with a snapshot.
///
/// `MAX` and `VNODE_HASH_INTERVAL` are redundant with `NAME` and the vnode
/// count; they are persisted so an independent implementation can verify
/// its arithmetic against ours.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmInfo {
    #[serde(rename = "NAME")]
    pub name: String,
    /// `2^B - 1`, uppercase hex.
    #[serde(rename = "MAX")]
    pub max: String,
    /// `2^B / V`, lowercase hex.
    #[serde(rename = "VNODE_HASH_INTERVAL")]
    pub vnode_hash_interval: String,
}

/// Canonical snapshot of a ring.
///
/// Field declaration order is the canonical top-level key order:
/// `vnodes`, `pnodeToVnodeMap`, `algorithm`, `version`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Topology {
    pub vnodes: u32,
    /// pnode → (vnode id, as a decimal string) → data value.
    #[serde(rename = "pnodeToVnodeMap")]
    pub pnode_to_vnode_map: BTreeMap<String, BTreeMap<String, VnodeData>>,
    pub algorithm: AlgorithmInfo,
    pub version: String,
}

impl Topology {
    pub fn from_json(s: &str) -> Result<Topology> {
        serde_json::from_str(s).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Validates the algorithm block and version, returning the hash space
    /// the snapshot was taken in.
    pub fn space(&self) -> Result<HashSpace> {
        if self.version != crate::SCHEMA_VERSION {
            return Err(Error::RingVersionMismatch(self.version.clone()));
        }
        let algorithm: HashAlgorithm = self.algorithm.name.parse()?;
        let space = HashSpace::new(algorithm, self.vnodes)?;
        if self.algorithm.max != space.max_hex() {
            return Err(Error::Serialization(format!(
                "MAX {} does not match algorithm {}",
                self.algorithm.max, self.algorithm.name
            )));
        }
        if self.algorithm.vnode_hash_interval != space.interval_hex() {
            return Err(Error::Serialization(format!(
                "VNODE_HASH_INTERVAL {} does not match algorithm {} with {} vnodes",
                self.algorithm.vnode_hash_interval, self.algorithm.name, self.vnodes
            )));
        }
        Ok(space)
    }

    /// The algorithm block for a hash space, as `serialize` persists it.
    pub fn algorithm_info(space: &HashSpace) -> AlgorithmInfo {
        AlgorithmInfo {
            name: space.algorithm().name().to_string(),
            max: space.max_hex(),
            vnode_hash_interval: space.interval_hex(),
        }
    }
}
