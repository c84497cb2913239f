//! The [ResourceCache] resolves resource paths to loaded objects, counting references, and reclaims them lazily.
//!
//! A resource is loaded the first time it is acquired: its key is looked up in the [BundleTable], the [BundleLoader]
//! opens its bundle and the bundle's dependencies, and the object is extracted.  Later acquisitions of the same
//! resource just take another reference.
//!
//! Releasing the last reference does not unload anything.  The entry stays cached and its key goes to the head of an
//! [EvictionList], so a resource which is released and immediately wanted again costs nothing.  Once the eviction
//! list holds [ResourceCacheConfig::max_cache_count] keys, the next load washes out the oldest half of them in one
//! batch, closing their bundles as the bundle references drop to zero.
//!
//! Nothing here is thread safe.  The cache is meant to be owned by whatever single loop drives the application, which
//! also pumps [ResourceCache::process_pending] to complete queued asynchronous requests.
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ahash::RandomState;
use log::{debug, error, trace};

use crate::pending::PendingQueue;
use crate::*;

type EntryMap<O> = HashMap<ResourceKey, CacheEntry<O>, RandomState>;

const DEFAULT_MAX_CACHE_COUNT: usize = 500;
const DEFAULT_BUNDLE_POOL_SIZE: usize = 500;
const DEFAULT_EVICTION_NODE_CAPACITY: usize = 500;
const DEFAULT_PENDING_POOL_SIZE: usize = 50;
const DEFAULT_MAX_LOAD_TIME: Duration = Duration::from_millis(200);

#[derive(Clone, Debug, derive_builder::Builder)]
pub struct ResourceCacheConfig {
    /// Unreferenced entries allowed to pile up before a wash-out evicts half of them.
    #[builder(default = "DEFAULT_MAX_CACHE_COUNT")]
    pub max_cache_count: usize,
    /// Bundle handles allocated up front.  0 allocates on demand and keeps every recycled handle.
    #[builder(default = "DEFAULT_BUNDLE_POOL_SIZE")]
    pub bundle_pool_size: usize,
    /// Eviction list nodes allocated up front.  The list grows past this when more entries are unreferenced at once,
    /// and keeps the extra nodes until the list is cleared.
    #[builder(default = "DEFAULT_EVICTION_NODE_CAPACITY")]
    pub eviction_node_capacity: usize,
    /// Asynchronous request records allocated up front.
    #[builder(default = "DEFAULT_PENDING_POOL_SIZE")]
    pub pending_pool_size: usize,
    /// How long one call to [ResourceCache::process_pending] may keep loading.
    #[builder(default = "DEFAULT_MAX_LOAD_TIME")]
    pub max_load_time: Duration,
}

impl Default for ResourceCacheConfig {
    fn default() -> Self {
        ResourceCacheConfig {
            max_cache_count: DEFAULT_MAX_CACHE_COUNT,
            bundle_pool_size: DEFAULT_BUNDLE_POOL_SIZE,
            eviction_node_capacity: DEFAULT_EVICTION_NODE_CAPACITY,
            pending_pool_size: DEFAULT_PENDING_POOL_SIZE,
            max_load_time: DEFAULT_MAX_LOAD_TIME,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError<StorageError> {
    #[error("resource path is empty")]
    EmptyPath,
    #[error("resource {0} is not in the bundle table")]
    NotFound(ResourceKey),
    #[error("failed to load resource {key} from bundle {bundle}")]
    LoadFailure {
        key: ResourceKey,
        bundle: String,
        source: StorageError,
    },
    #[error("resource key {0} is already cached")]
    DuplicateKey(ResourceKey),
    /// `key` is `None` when releasing by object.
    #[error("resource was already released or never loaded (key {key:?})")]
    DoubleRelease { key: Option<ResourceKey> },
    #[error("reference count of resource {0} would drop below zero")]
    RefcountUnderflow(ResourceKey),
    #[error("bundle storage exhausted")]
    Exhausted(#[source] StorageError),
}

/// What to do with an entry whose last reference is released.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ReleaseMode {
    /// Keep it cached until a wash-out evicts it.
    Cache,
    /// Destroy it now, closing its bundles.
    Destroy,
}

impl Default for ReleaseMode {
    fn default() -> Self {
        ReleaseMode::Cache
    }
}

pub struct ResourceCache<S: BundleStorage, H: PathHasher = FnvPathHasher> {
    config: ResourceCacheConfig,
    hasher: H,
    table: BundleTable,
    /// Declared ahead of the loader so cached objects are dropped before their bundles are closed.
    entries: EntryMap<S::Object>,
    /// Keys of entries with no references, oldest at the tail.
    unreferenced: EvictionList<ResourceKey>,
    pending: PendingQueue<S::Object, S::Error>,
    loader: BundleLoader<S>,
}

impl<S: BundleStorage> ResourceCache<S, FnvPathHasher> {
    pub fn new(storage: S, table: BundleTable, config: ResourceCacheConfig) -> ResourceCache<S, FnvPathHasher> {
        Self::with_hasher(storage, table, config, FnvPathHasher)
    }
}

impl<S: BundleStorage, H: PathHasher> ResourceCache<S, H> {
    pub fn with_hasher(
        storage: S,
        table: BundleTable,
        config: ResourceCacheConfig,
        hasher: H,
    ) -> ResourceCache<S, H> {
        ResourceCache {
            hasher,
            table,
            loader: BundleLoader::new(storage, config.bundle_pool_size),
            entries: Default::default(),
            unreferenced: EvictionList::new(config.eviction_node_capacity),
            pending: PendingQueue::new(config.pending_pool_size),
            config,
        }
    }

    pub fn key_for(&self, path: &str) -> ResourceKey {
        self.hasher.hash_path(path)
    }

    fn key_for_nonempty(&self, path: &str) -> Result<ResourceKey, CacheError<S::Error>> {
        if path.is_empty() {
            error!("Resource path is empty");
            return Err(CacheError::EmptyPath);
        }
        Ok(self.key_for(path))
    }

    /// Get a resource, loading it if it isn't cached.
    pub fn acquire(&mut self, path: &str) -> Result<ResourceHandle<S::Object>, CacheError<S::Error>> {
        let key = self.key_for_nonempty(path)?;
        self.acquire_key(key)
    }

    pub fn acquire_key(&mut self, key: ResourceKey) -> Result<ResourceHandle<S::Object>, CacheError<S::Error>> {
        if !self.entries.contains_key(&key) {
            self.load_entry(key, true)?;
        }
        self.reference_cached(key).ok_or(CacheError::NotFound(key))
    }

    /// Take a reference on an entry which is already cached.
    fn reference_cached(&mut self, key: ResourceKey) -> Option<ResourceHandle<S::Object>> {
        let object = self.entries.get_mut(&key)?.acquire();
        if self.unreferenced.remove(&key) {
            trace!("Resource {} is referenced again", key);
        }
        Some(ResourceHandle::new(key, object))
    }

    /// Load a resource into the cache without referencing it.
    ///
    /// Preloaded entries survive [ResourceCache::clear_scene_cache], but are otherwise evicted like any other.
    pub fn preload(&mut self, path: &str) -> Result<(), CacheError<S::Error>> {
        let key = self.key_for_nonempty(path)?;
        match self.entries.get_mut(&key) {
            Some(entry) => entry.set_evict_on_scene_change(false),
            None => {
                self.load_entry(key, false)?;
                self.unreferenced.insert_at_head(key);
            }
        }
        Ok(())
    }

    /// Load an uncached resource and insert it with no references.
    ///
    /// Any failure leaves the cache and bundle references exactly as they were.
    fn load_entry(&mut self, key: ResourceKey, evict_on_scene_change: bool) -> Result<(), CacheError<S::Error>> {
        let desc = match self.table.get(key) {
            Some(d) => d.clone(),
            None => {
                error!("Resource {} is not in the bundle table", key);
                return Err(CacheError::NotFound(key));
            }
        };

        let bundles = desc.bundle_set();
        let object = self
            .loader
            .load_object(key, &bundles, &desc.asset_name)?;

        if self.entries.len() >= self.config.max_cache_count {
            self.wash_out();
        }

        // Callers only load keys they found uncached, and nothing since has inserted.
        debug_assert!(!self.entries.contains_key(&key));
        match self.entries.entry(key) {
            Entry::Occupied(_) => {
                error!("Resource {} ({}) is already cached", key, desc.asset_name);
                self.loader.release_set(&bundles);
                Err(CacheError::DuplicateKey(key))
            }
            Entry::Vacant(e) => {
                debug!("Cached resource {} ({})", key, desc.asset_name);
                e.insert(CacheEntry::new(&desc, object, evict_on_scene_change));
                Ok(())
            }
        }
    }

    /// Give back a reference obtained from [ResourceCache::acquire].
    pub fn release(&mut self, handle: ResourceHandle<S::Object>) -> Result<(), CacheError<S::Error>> {
        self.release_key_with(handle.key(), ReleaseMode::Cache)
    }

    pub fn release_path(&mut self, path: &str) -> Result<(), CacheError<S::Error>> {
        let key = self.key_for_nonempty(path)?;
        self.release_key_with(key, ReleaseMode::Cache)
    }

    pub fn release_key(&mut self, key: ResourceKey) -> Result<(), CacheError<S::Error>> {
        self.release_key_with(key, ReleaseMode::Cache)
    }

    /// Release by the object itself.
    ///
    /// This has to scan every cached entry for one holding the same allocation, so prefer releasing the handle.
    pub fn release_object(&mut self, object: &Arc<S::Object>) -> Result<(), CacheError<S::Error>> {
        let found = self
            .entries
            .values()
            .find(|e| Arc::ptr_eq(e.object(), object))
            .map(|e| e.key());
        match found {
            Some(key) => self.release_key_with(key, ReleaseMode::Cache),
            None => {
                error!("Released an object which isn't cached; already released or never loaded");
                Err(CacheError::DoubleRelease { key: None })
            }
        }
    }

    pub fn release_key_with(&mut self, key: ResourceKey, mode: ReleaseMode) -> Result<(), CacheError<S::Error>> {
        let entry = match self.entries.get_mut(&key) {
            Some(e) => e,
            None => {
                error!("Resource {} isn't cached; already released or never loaded", key);
                return Err(CacheError::DoubleRelease { key: Some(key) });
            }
        };

        if !entry.release() {
            error!(
                "Reference count of resource {} ({}) would drop below zero",
                key,
                entry.asset_name()
            );
            return Err(CacheError::RefcountUnderflow(key));
        }
        if entry.ref_count() > 0 {
            return Ok(());
        }

        match mode {
            ReleaseMode::Cache => {
                self.unreferenced.insert_at_head(key);
            }
            ReleaseMode::Destroy => {
                self.destroy_entry(key);
            }
        }
        Ok(())
    }

    /// Drop an unreferenced entry from the cache and release its bundles.  Referenced entries are left alone.
    fn destroy_entry(&mut self, key: ResourceKey) -> bool {
        match self.entries.get(&key) {
            Some(e) if e.ref_count() == 0 => {}
            _ => return false,
        }

        let entry = match self.entries.remove(&key) {
            Some(e) => e,
            None => return false,
        };
        self.unreferenced.remove(&key);

        // Our reference to the object goes before the bundles do.
        let (object, bundles) = entry.into_parts();
        drop(object);
        self.loader.release_set(&bundles);
        true
    }

    /// Evict the oldest unreferenced entries, in batches of half the cache count, until there are fewer than
    /// [ResourceCacheConfig::max_cache_count] left.
    ///
    /// Returns how many entries were evicted.
    pub fn wash_out(&mut self) -> usize {
        let max = self.config.max_cache_count;
        let batch = std::cmp::max(max / 2, 1);
        let mut evicted = 0;

        while !self.unreferenced.is_empty() && self.unreferenced.len() >= max {
            for _ in 0..batch {
                let key = match self.unreferenced.remove_oldest() {
                    Some(k) => k,
                    None => break,
                };
                if self.destroy_entry(key) {
                    evicted += 1;
                }
            }
        }

        if evicted > 0 {
            debug!(
                "Washed out {} resources, {} unreferenced left",
                evicted,
                self.unreferenced.len()
            );
        }
        evicted
    }

    /// Destroy every unreferenced entry which was loaded by [ResourceCache::acquire], keeping preloaded ones.
    pub fn clear_scene_cache(&mut self) -> usize {
        let doomed = self
            .unreferenced
            .iter()
            .copied()
            .filter(|k| {
                self.entries
                    .get(k)
                    .map_or(false, |e| e.evict_on_scene_change())
            })
            .collect::<Vec<_>>();

        let mut cleared = 0;
        for key in doomed {
            if self.destroy_entry(key) {
                cleared += 1;
            }
        }
        debug!("Cleared {} resources for scene change", cleared);
        cleared
    }

    /// Look up a cached entry without touching its references or recency.
    pub fn find_by_key(&self, key: ResourceKey) -> Option<&CacheEntry<S::Object>> {
        self.entries.get(&key)
    }

    /// Like [ResourceCache::find_by_key].  An empty path finds nothing.
    pub fn find_by_path(&self, path: &str) -> Option<&CacheEntry<S::Object>> {
        if path.is_empty() {
            return None;
        }
        self.find_by_key(self.key_for(path))
    }

    /// Swap in a new bundle table, returning the old one.
    ///
    /// Cached entries keep the bundles they were loaded with; only later loads see the new table.
    pub fn reload_table(&mut self, table: BundleTable) -> BundleTable {
        debug!("Reloading bundle table with {} records", table.len());
        std::mem::replace(&mut self.table, table)
    }

    /// Queue an acquisition to be completed by a later [ResourceCache::process_pending].
    pub fn request_async(
        &mut self,
        path: &str,
        callback: CompletionCallback<S::Object, S::Error>,
        params: CompletionParams,
    ) -> RequestId {
        self.pending.push(path, callback, params)
    }

    /// Complete queued requests in the order they were made, until the queue is empty or
    /// [ResourceCacheConfig::max_load_time] has passed.  At least one request is completed per call if any are
    /// queued.  Handles returned by callbacks are released straight away.
    ///
    /// Returns the number of requests completed.
    pub fn process_pending(&mut self) -> usize {
        let started = Instant::now();
        let mut completed = 0;

        while let Some(mut request) = self.pending.pop() {
            let result = self.acquire(&request.path);
            let discarded = match request.callback.take() {
                Some(cb) => cb(&request.path, result, std::mem::take(&mut request.params)),
                // Nobody to hand the reference to.
                None => result.ok(),
            };
            if let Some(handle) = discarded {
                trace!("Request for {} discarded its handle", request.path);
                if let Err(e) = self.release(handle) {
                    error!("Failed to release discarded handle for {}: {}", request.path, e);
                }
            }
            self.pending.finish(request);
            completed += 1;

            if started.elapsed() >= self.config.max_load_time {
                break;
            }
        }
        completed
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.pending.contains(id)
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Number of cached entries, referenced or not.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn unreferenced_len(&self) -> usize {
        self.unreferenced.len()
    }

    /// Is this entry cached with no references, waiting to be evicted?
    pub fn is_unreferenced(&self, key: ResourceKey) -> bool {
        self.unreferenced.contains(&key)
    }

    pub fn table(&self) -> &BundleTable {
        &self.table
    }

    pub fn loader(&self) -> &BundleLoader<S> {
        &self.loader
    }

    pub fn config(&self) -> &ResourceCacheConfig {
        &self.config
    }
}
