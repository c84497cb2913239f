//! The [BundleLoader] opens and closes storage bundles on behalf of the cache, counting references per bundle.
//!
//! Many resources share a bundle, and many bundles share dependencies, so the same bundle is requested over and over.
//! Only the first request opens it and only the last release closes it.  Resources always acquire and release their
//! whole [BundleSet] in one call, so a resource can't end up with its own bundle open but a dependency closed.
use std::collections::hash_map::Entry;
use std::collections::HashMap;

use ahash::RandomState;
use log::{debug, error, warn};

use crate::*;

/// A loaded bundle.  Recycled through an [ObjectPool] once the bundle is closed.
struct BundleHandle<B> {
    name: String,
    backing: Option<B>,
    ref_count: u32,
}

impl<B> Default for BundleHandle<B> {
    fn default() -> Self {
        BundleHandle {
            name: String::new(),
            backing: None,
            ref_count: 0,
        }
    }
}

impl<B> BundleHandle<B> {
    fn reset(&mut self) -> Option<B> {
        self.name.clear();
        self.ref_count = 0;
        self.backing.take()
    }
}

pub struct BundleLoader<S: BundleStorage> {
    storage: S,
    loaded: HashMap<String, BundleHandle<S::Bundle>, RandomState>,
    handle_pool: ObjectPool<BundleHandle<S::Bundle>>,
}

impl<S: BundleStorage> BundleLoader<S> {
    pub fn new(storage: S, pool_size: usize) -> BundleLoader<S> {
        BundleLoader {
            storage,
            loaded: Default::default(),
            handle_pool: ObjectPool::new(pool_size),
        }
    }

    /// Take a reference to a bundle, opening it if nobody else holds one.
    pub fn acquire(&mut self, name: &str) -> Result<(), S::Error> {
        let handle = match self.loaded.entry(name.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                let bundle = self.storage.load_bundle(name)?;
                let mut handle = self.handle_pool.spawn(true).unwrap_or_default();
                handle.name.push_str(name);
                handle.backing = Some(bundle);
                debug!("Loaded bundle {}", name);
                e.insert(handle)
            }
        };
        handle.ref_count += 1;
        Ok(())
    }

    /// Drop a reference to a bundle, closing it if this was the last one.
    ///
    /// Returns `false` if the bundle isn't loaded, which happens on double release and is otherwise harmless.
    pub fn release(&mut self, name: &str) -> bool {
        let handle = match self.loaded.get_mut(name) {
            Some(h) => h,
            None => {
                warn!("Releasing bundle {} which isn't loaded", name);
                return false;
            }
        };

        handle.ref_count = handle.ref_count.saturating_sub(1);
        if handle.ref_count > 0 {
            return true;
        }

        if let Some(mut handle) = self.loaded.remove(name) {
            if let Some(bundle) = handle.reset() {
                self.storage.unload_bundle(bundle, true);
            }
            self.handle_pool.recycle(handle);
            debug!("Unloaded bundle {}", name);
        }
        true
    }

    /// Acquire every bundle in a set, in load order.
    ///
    /// If any bundle fails to open, the ones already acquired by this call are released again before the error is
    /// returned.
    pub fn acquire_set(&mut self, key: ResourceKey, set: &BundleSet) -> Result<(), CacheError<S::Error>> {
        for (acquired, name) in set.load_order().enumerate() {
            if let Err(e) = self.acquire(name) {
                for done in set.load_order().take(acquired) {
                    self.release(done);
                }
                return Err(self.classify_error(key, name, e));
            }
        }
        Ok(())
    }

    pub fn release_set(&mut self, set: &BundleSet) {
        for name in set.release_order() {
            self.release(name);
        }
    }

    /// Acquire a resource's bundles and pull the resource out of the owning bundle.
    ///
    /// On failure, nothing stays acquired.
    pub fn load_object(
        &mut self,
        key: ResourceKey,
        set: &BundleSet,
        asset_name: &str,
    ) -> Result<S::Object, CacheError<S::Error>> {
        self.acquire_set(key, set)?;

        let bundle = self
            .loaded
            .get(&set.owner)
            .and_then(|h| h.backing.as_ref())
            .expect("Just acquired the owning bundle");
        match self.storage.extract_object(bundle, asset_name) {
            Ok(x) => Ok(x),
            Err(e) => {
                self.release_set(set);
                Err(self.classify_error(key, &set.owner, e))
            }
        }
    }

    /// Sort a storage error into a fatal exhaustion or a reportable load failure.
    pub(crate) fn classify_error(
        &self,
        key: ResourceKey,
        bundle: &str,
        e: S::Error,
    ) -> CacheError<S::Error> {
        if self.storage.is_exhausted(&e) {
            return CacheError::Exhausted(e);
        }
        error!("Failed to load resource {} from bundle {}: {}", key, bundle, e);
        CacheError::LoadFailure {
            key,
            bundle: bundle.to_string(),
            source: e,
        }
    }

    /// References currently held on a bundle, or `None` if it isn't loaded.
    pub fn ref_count(&self, name: &str) -> Option<u32> {
        self.loaded.get(name).map(|h| h.ref_count)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    pub fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    /// Number of idle bundle handles waiting in the pool.
    pub fn pooled_handles(&self) -> usize {
        self.handle_pool.available()
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    pub fn storage_mut(&mut self) -> &mut S {
        &mut self.storage
    }

    /// Close every bundle regardless of references.
    pub fn unload_all(&mut self) {
        for (name, mut handle) in self.loaded.drain() {
            if let Some(bundle) = handle.reset() {
                self.storage.unload_bundle(bundle, true);
            }
            self.handle_pool.recycle(handle);
            debug!("Unloaded bundle {} at teardown", name);
        }
    }
}

impl<S: BundleStorage> Drop for BundleLoader<S> {
    fn drop(&mut self) {
        self.unload_all();
    }
}
