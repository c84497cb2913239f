//! An in-memory [BundleStorage] for tests, which counts every open and close.
use std::collections::{HashMap, HashSet};

use crate::BundleStorage;

#[derive(Debug, thiserror::Error)]
pub(crate) enum MemoryStorageError {
    #[error("no bundle named {0}")]
    MissingBundle(String),
    #[error("no asset {asset} in bundle {bundle}")]
    MissingAsset { bundle: String, asset: String },
    #[error("out of memory opening {0}")]
    OutOfMemory(String),
}

#[derive(Default)]
pub(crate) struct MemoryStorage {
    /// Bundle name to asset name to contents.
    bundles: HashMap<String, HashMap<String, String>>,
    exhausted: HashSet<String>,
    loads: HashMap<String, usize>,
    unloads: HashMap<String, usize>,
    open: HashSet<String>,
}

impl MemoryStorage {
    pub(crate) fn new() -> MemoryStorage {
        Default::default()
    }

    pub(crate) fn with_bundle(mut self, name: &str, assets: &[(&str, &str)]) -> MemoryStorage {
        let contents = assets
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        self.bundles.insert(name.to_string(), contents);
        self
    }

    /// Opening this bundle fails as if storage had run out of memory.
    pub(crate) fn exhausted_on(mut self, name: &str) -> MemoryStorage {
        self.exhausted.insert(name.to_string());
        self
    }

    pub(crate) fn load_count(&self, name: &str) -> usize {
        self.loads.get(name).copied().unwrap_or(0)
    }

    pub(crate) fn unload_count(&self, name: &str) -> usize {
        self.unloads.get(name).copied().unwrap_or(0)
    }

    pub(crate) fn total_loads(&self) -> usize {
        self.loads.values().sum()
    }

    pub(crate) fn open_bundles(&self) -> &HashSet<String> {
        &self.open
    }
}

impl BundleStorage for MemoryStorage {
    type Bundle = String;
    type Object = String;
    type Error = MemoryStorageError;

    fn load_bundle(&mut self, name: &str) -> Result<String, MemoryStorageError> {
        if self.exhausted.contains(name) {
            return Err(MemoryStorageError::OutOfMemory(name.to_string()));
        }
        if !self.bundles.contains_key(name) {
            return Err(MemoryStorageError::MissingBundle(name.to_string()));
        }
        assert!(self.open.insert(name.to_string()), "Opened {} twice", name);
        *self.loads.entry(name.to_string()).or_insert(0) += 1;
        Ok(name.to_string())
    }

    fn unload_bundle(&mut self, bundle: String, _also_unload_contained_objects: bool) {
        assert!(self.open.remove(&bundle), "Closed {} while not open", bundle);
        *self.unloads.entry(bundle).or_insert(0) += 1;
    }

    fn extract_object(&mut self, bundle: &String, asset_name: &str) -> Result<String, MemoryStorageError> {
        self.bundles
            .get(bundle)
            .and_then(|x| x.get(asset_name))
            .cloned()
            .ok_or_else(|| MemoryStorageError::MissingAsset {
                bundle: bundle.clone(),
                asset: asset_name.to_string(),
            })
    }

    fn is_exhausted(&self, error: &MemoryStorageError) -> bool {
        matches!(error, MemoryStorageError::OutOfMemory(_))
    }
}
