//! A reference-counted resource cache layered over bundles of stored objects.
//!
//! Resources are packed into bundles ahead of time, and a bundle can depend on other bundles (shared textures, say).
//! Opening a bundle is expensive, so is extracting an object from it, and closing a bundle too early breaks every
//! resource that still needs it.  This crate keeps track of all of that:
//!
//! - [ResourceCache] is the entry point.  Acquire a resource by path and get back a [ResourceHandle]; release it when
//!   done.  Released resources stay warm until the cache needs the room.
//! - [BundleTable] maps each resource key to its bundle and that bundle's dependencies.  It is loaded once from a
//!   bincode-encoded [BundleManifest] written by whatever tool packed the bundles.
//! - [BundleLoader] counts references per bundle, so a bundle shared by many resources is opened once and closed when
//!   the last of them is evicted.
//! - [EvictionList] orders the unreferenced resources for eviction in O(1), and [ObjectPool] recycles the small
//!   bookkeeping records the cache churns through.
//!
//! To use this crate, implement [BundleStorage] for your storage backend, then construct a [ResourceCache] with your
//! table and a [ResourceCacheConfig].
mod bundle_loader;
mod bundle_table;
mod cache_entry;
mod eviction_list;
mod object_pool;
mod pending;
mod resource_cache;
mod resource_key;
mod traits;

#[cfg(test)]
mod test_support;

pub use bundle_loader::*;
pub use bundle_table::*;
pub use cache_entry::*;
pub use eviction_list::*;
pub use object_pool::*;
pub use pending::{CompletionCallback, CompletionParams, RequestId};
pub use resource_cache::*;
pub use resource_key::*;
pub use traits::*;
