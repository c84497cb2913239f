//! A cached resource, and the handle callers hold while they use it.
use std::sync::Arc;
use std::time::Instant;

use crate::{BundleDescriptor, BundleSet, ResourceKey};

/// One resolved resource, held in the cache from its first acquisition until it is evicted.
///
/// While `ref_count` is zero the entry is still cached and can be handed out again without touching storage.
#[derive(Debug)]
pub struct CacheEntry<O> {
    key: ResourceKey,
    asset_name: String,
    /// Our own copy of the bundles we hold, so that release stays balanced across table reloads.
    bundles: BundleSet,
    object: Arc<O>,
    ref_count: u32,
    last_used: Instant,
    evict_on_scene_change: bool,
}

impl<O> CacheEntry<O> {
    /// A freshly loaded entry.  It starts unreferenced; the caller acquires it.
    pub(crate) fn new(desc: &BundleDescriptor, object: O, evict_on_scene_change: bool) -> CacheEntry<O> {
        CacheEntry {
            key: desc.key,
            asset_name: desc.asset_name.clone(),
            bundles: desc.bundle_set(),
            object: Arc::new(object),
            ref_count: 0,
            last_used: Instant::now(),
            evict_on_scene_change,
        }
    }

    /// Take a reference, making the entry used and returning the object.
    pub(crate) fn acquire(&mut self) -> Arc<O> {
        self.ref_count += 1;
        self.last_used = Instant::now();
        self.object.clone()
    }

    /// Drop a reference.  Returns `false`, changing nothing, if there were none left to drop.
    #[must_use]
    pub(crate) fn release(&mut self) -> bool {
        match self.ref_count.checked_sub(1) {
            Some(x) => {
                self.ref_count = x;
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_evict_on_scene_change(&mut self, value: bool) {
        self.evict_on_scene_change = value;
    }

    pub(crate) fn into_parts(self) -> (Arc<O>, BundleSet) {
        (self.object, self.bundles)
    }

    pub fn key(&self) -> ResourceKey {
        self.key
    }

    pub fn asset_name(&self) -> &str {
        &self.asset_name
    }

    pub fn bundles(&self) -> &BundleSet {
        &self.bundles
    }

    pub fn object(&self) -> &Arc<O> {
        &self.object
    }

    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    pub fn last_used(&self) -> Instant {
        self.last_used
    }

    /// Whether [crate::ResourceCache::clear_scene_cache] may drop this entry once it is unreferenced.
    pub fn evict_on_scene_change(&self) -> bool {
        self.evict_on_scene_change
    }
}

/// A reference to an acquired resource.
///
/// Give it back with [crate::ResourceCache::release].  Dropping it without doing so leaks the cache's reference, and
/// the entry will never become eligible for eviction.
#[derive(Debug)]
#[must_use = "dropping a handle without releasing it pins the resource in the cache"]
pub struct ResourceHandle<O> {
    key: ResourceKey,
    object: Arc<O>,
}

impl<O> ResourceHandle<O> {
    pub(crate) fn new(key: ResourceKey, object: Arc<O>) -> ResourceHandle<O> {
        ResourceHandle { key, object }
    }

    pub fn key(&self) -> ResourceKey {
        self.key
    }

    pub fn object(&self) -> &Arc<O> {
        &self.object
    }
}

impl<O> std::ops::Deref for ResourceHandle<O> {
    type Target = O;

    fn deref(&self) -> &O {
        &self.object
    }
}
