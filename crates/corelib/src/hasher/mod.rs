//! Key-to-vnode hashing.
//!
//! A ring is bound to one hash algorithm at creation. The algorithm fixes
//! the bit width `B` of the hash space; the space is cut into `V` slices of
//! width `INTERVAL = 2^B / V`, and a key lands in the slice its digest
//! falls into. All of it is integer arithmetic on big-endian scalars, so
//! two hosts with the same `(algorithm, V)` agree bit-for-bit.

pub mod scalar;

pub use scalar::Scalar;

use crate::error::{Error, Result};
use sha1::{Digest, Sha1};
use sha2::{Sha256, Sha512};
use std::fmt;
use std::str::FromStr;

/// Hash algorithm a ring can be bound to.
///
/// The lowercase name is stored verbatim in the ring and its snapshots so
/// deserialization picks the same function.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// The stored name of the algorithm.
    pub fn name(&self) -> &'static str {
        match self {
            HashAlgorithm::Sha1 => "sha1",
            HashAlgorithm::Sha256 => "sha256",
            HashAlgorithm::Sha512 => "sha512",
        }
    }

    /// Bit width `B` of the digest.
    pub fn bits(&self) -> u32 {
        match self {
            HashAlgorithm::Sha1 => 160,
            HashAlgorithm::Sha256 => 256,
            HashAlgorithm::Sha512 => 512,
        }
    }

    /// Digests `key` into an unsigned big-endian scalar of width `B`.
    pub fn digest(&self, key: &[u8]) -> Scalar {
        match self {
            HashAlgorithm::Sha1 => Scalar::from_be_bytes(&Sha1::digest(key)),
            HashAlgorithm::Sha256 => Scalar::from_be_bytes(&Sha256::digest(key)),
            HashAlgorithm::Sha512 => Scalar::from_be_bytes(&Sha512::digest(key)),
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = Error;

    fn from_str(name: &str) -> Result<Self> {
        match name {
            "sha1" => Ok(HashAlgorithm::Sha1),
            "sha256" => Ok(HashAlgorithm::Sha256),
            "sha512" => Ok(HashAlgorithm::Sha512),
            other => Err(Error::ConfigInvalid(format!(
                "unknown hash algorithm: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The hash space of one ring: an algorithm bound to a vnode count.
///
/// Precomputes `MAX = 2^B - 1` and `INTERVAL = 2^B / V` once; lookups are
/// then a digest plus one division.
#[derive(Clone, Debug)]
pub struct HashSpace {
    algorithm: HashAlgorithm,
    vnode_count: u32,
    max: Scalar,
    interval: Scalar,
}

impl HashSpace {
    pub fn new(algorithm: HashAlgorithm, vnode_count: u32) -> Result<Self> {
        if vnode_count == 0 {
            return Err(Error::ConfigInvalid(
                "vnode count must be positive".to_string(),
            ));
        }
        let interval = Scalar::pow2(algorithm.bits()).div_u64(vnode_count as u64);
        if interval.is_zero() {
            return Err(Error::ConfigInvalid(format!(
                "vnode count {} exceeds the {}-bit hash space",
                vnode_count,
                algorithm.bits()
            )));
        }
        Ok(HashSpace {
            algorithm,
            vnode_count,
            max: Scalar::max_of_bits(algorithm.bits()),
            interval,
        })
    }

    pub fn algorithm(&self) -> HashAlgorithm {
        self.algorithm
    }

    pub fn vnode_count(&self) -> u32 {
        self.vnode_count
    }

    /// Maps a key to its vnode.
    ///
    /// `digest / INTERVAL`, clamped to `V-1`: when `V` does not divide
    /// `2^B` the topmost sliver of the space would otherwise index one
    /// past the end.
    pub fn vnode_of(&self, key: &[u8]) -> u32 {
        let quotient = self.algorithm.digest(key).div(&self.interval);
        (quotient as u32).min(self.vnode_count - 1)
    }

    /// Uppercase hex of `MAX`, as persisted in snapshots.
    pub fn max_hex(&self) -> String {
        self.max.to_hex_upper()
    }

    /// Lowercase hex of `INTERVAL`, as persisted in snapshots.
    pub fn interval_hex(&self) -> String {
        self.interval.to_hex_lower()
    }

    /// The vnode interval itself.
    pub fn interval(&self) -> &Scalar {
        &self.interval
    }

    /// Lowercase hex of a key's digest.
    pub fn hash_hex(&self, key: &[u8]) -> String {
        self.algorithm.digest(key).to_hex_lower()
    }
}
