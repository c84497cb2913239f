//! The [BundleTable] maps resource keys to the bundle holding the resource and the bundles that one depends on.
//!
//! The table is produced ahead of time by a packaging tool as a bincode-encoded [BundleManifest], and is read once at
//! startup.  It is immutable afterwards, except for being replaced wholesale on reload.
use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use ahash::RandomState;
use log::{debug, error};

use crate::ResourceKey;

/// One record of the persisted table.
#[derive(Clone, Debug, Eq, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct BundleDescriptor {
    pub key: ResourceKey,
    /// Name of the object inside its bundle.
    pub asset_name: String,
    pub bundle_name: String,
    /// Bundles which must stay loaded for objects from `bundle_name` to resolve, in load order.
    pub dependencies: Vec<String>,
}

impl BundleDescriptor {
    /// The complete set of bundles needed to extract this resource.
    pub fn bundle_set(&self) -> BundleSet {
        BundleSet {
            owner: self.bundle_name.clone(),
            dependencies: self.dependencies.clone(),
        }
    }
}

/// The serialized form of a [BundleTable].
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct BundleManifest {
    pub bundles: Vec<BundleDescriptor>,
}

impl BundleManifest {
    pub fn to_bytes(&self) -> Result<Vec<u8>, TableError> {
        Ok(bincode::serialize(self)?)
    }
}

/// A bundle together with its dependencies.  Always acquired and released as a unit.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct BundleSet {
    pub owner: String,
    pub dependencies: Vec<String>,
}

impl BundleSet {
    /// The order bundles are loaded in: the owner, then each dependency.
    pub fn load_order(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.owner.as_str()).chain(self.dependencies.iter().map(|x| x.as_str()))
    }

    /// The order bundles are released in: each dependency, then the owner.
    pub fn release_order(&self) -> impl Iterator<Item = &str> {
        self.dependencies
            .iter()
            .map(|x| x.as_str())
            .chain(std::iter::once(self.owner.as_str()))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("could not read bundle table: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not decode bundle table: {0}")]
    Decode(#[from] bincode::Error),
}

#[derive(Debug, Default)]
pub struct BundleTable {
    descriptors: HashMap<ResourceKey, BundleDescriptor, RandomState>,
}

impl BundleTable {
    pub fn new() -> BundleTable {
        Default::default()
    }

    /// Build a table from already decoded records.
    ///
    /// Records whose key was already seen are logged and dropped; the first record for a key wins.
    pub fn from_manifest(manifest: BundleManifest) -> BundleTable {
        let mut table = BundleTable::new();
        let total = manifest.bundles.len();
        for desc in manifest.bundles {
            let key = desc.key;
            if let Some(dropped) = table.insert(desc) {
                error!(
                    "Duplicate resource key {} for asset {} in bundle {}; dropping it",
                    key, dropped.asset_name, dropped.bundle_name
                );
            }
        }
        debug!(
            "Loaded bundle table with {} of {} records",
            table.len(),
            total
        );
        table
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<BundleTable, TableError> {
        let manifest: BundleManifest = bincode::deserialize(bytes)?;
        Ok(Self::from_manifest(manifest))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<BundleTable, TableError> {
        let manifest: BundleManifest = bincode::deserialize_from(reader)?;
        Ok(Self::from_manifest(manifest))
    }

    pub fn load_file(path: &Path) -> Result<BundleTable, TableError> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(std::io::BufReader::new(file))
    }

    /// Add a record.  If the key is taken, the table is left alone and the rejected record is handed back.
    pub fn insert(&mut self, desc: BundleDescriptor) -> Option<BundleDescriptor> {
        if self.descriptors.contains_key(&desc.key) {
            return Some(desc);
        }
        self.descriptors.insert(desc.key, desc);
        None
    }

    pub fn get(&self, key: ResourceKey) -> Option<&BundleDescriptor> {
        self.descriptors.get(&key)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn clear(&mut self) {
        self.descriptors.clear();
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn desc(key: u32, asset: &str, bundle: &str, deps: &[&str]) -> BundleDescriptor {
        BundleDescriptor {
            key: ResourceKey(key),
            asset_name: asset.to_string(),
            bundle_name: bundle.to_string(),
            dependencies: deps.iter().map(|x| x.to_string()).collect(),
        }
    }

    #[test]
    fn test_duplicates_are_dropped() {
        let manifest = BundleManifest {
            bundles: vec![
                desc(42, "Attack", "combat", &["shared"]),
                desc(7, "Music", "audio", &[]),
                desc(42, "Impostor", "other", &[]),
            ],
        };
        let table = BundleTable::from_bytes(&manifest.to_bytes().unwrap()).unwrap();

        assert_eq!(table.len(), 2);
        let attack = table.get(ResourceKey(42)).expect("Should be present");
        assert_eq!(attack.asset_name, "Attack");
        assert_eq!(attack.dependencies, vec!["shared".to_string()]);
        assert!(table.get(ResourceKey(8)).is_none());
    }

    #[test]
    fn test_load_file() {
        let manifest = BundleManifest {
            bundles: vec![desc(1, "a", "x", &["y", "z"])],
        };
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&manifest.to_bytes().unwrap()).unwrap();
        file.flush().unwrap();

        let mut table = BundleTable::load_file(file.path()).unwrap();
        assert_eq!(table.get(ResourceKey(1)), Some(&manifest.bundles[0]));

        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            BundleTable::from_bytes(&[0xff; 3]),
            Err(TableError::Decode(_))
        ));
        assert!(matches!(
            BundleTable::load_file(Path::new("/definitely/not/a/bundle/table")),
            Err(TableError::Io(_))
        ));
    }

    #[test]
    fn test_bundle_set_order() {
        let set = desc(1, "a", "owner", &["d1", "d2"]).bundle_set();
        assert_eq!(
            set.load_order().collect::<Vec<_>>(),
            vec!["owner", "d1", "d2"]
        );
        assert_eq!(
            set.release_order().collect::<Vec<_>>(),
            vec!["d1", "d2", "owner"]
        );
    }
}
