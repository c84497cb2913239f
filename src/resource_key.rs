//! [ResourceKey] and the default path hasher.
use std::hash::Hasher;

use fnv::FnvHasher;

use crate::PathHasher;

/// A stable hash of a logical resource path, used as the primary key of both the bundle table and the cache.
#[derive(
    Copy, Clone, Debug, Default, Ord, PartialOrd, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct ResourceKey(pub u32);

impl std::fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Hashes paths with 64-bit FNV-1a, folded down to 32 bits.
///
/// The result depends only on the bytes of the path, so keys written into a bundle table by a packaging tool stay
/// valid across runs and machines.
#[derive(Copy, Clone, Debug, Default)]
pub struct FnvPathHasher;

impl PathHasher for FnvPathHasher {
    fn hash_path(&self, path: &str) -> ResourceKey {
        let mut hasher = FnvHasher::default();
        hasher.write(path.as_bytes());
        let full = hasher.finish();
        ResourceKey((full ^ (full >> 32)) as u32)
    }
}
