//! The collaborators the cache drives but doesn't implement.
//!
//! A [BundleStorage] knows how to open a bundle by name, pull a named object out of an open bundle, and close it
//! again.  A [PathHasher] turns a logical resource path into the [ResourceKey] the bundle table was built with.
use crate::ResourceKey;

/// Opens, reads from, and closes storage bundles.
pub trait BundleStorage {
    /// An open bundle.  Dropped only after being passed back to [BundleStorage::unload_bundle].
    type Bundle;
    /// An object extracted from a bundle.  The cache hands these out behind `Arc`.
    type Object;
    type Error: std::error::Error + 'static;

    /// Open a bundle.
    fn load_bundle(&mut self, name: &str) -> Result<Self::Bundle, Self::Error>;

    /// Close a bundle, optionally destroying every object which was extracted from it.
    fn unload_bundle(&mut self, bundle: Self::Bundle, also_unload_contained_objects: bool);

    /// Extract a named object from an open bundle.
    fn extract_object(
        &mut self,
        bundle: &Self::Bundle,
        asset_name: &str,
    ) -> Result<Self::Object, Self::Error>;

    /// Is this error the storage running out of resources, rather than a single load failing?
    ///
    /// Exhaustion is passed straight back to the caller instead of being reported as a load failure.
    fn is_exhausted(&self, _error: &Self::Error) -> bool {
        false
    }
}

/// Converts a resource path to its key.
///
/// Implementations must be deterministic and stable across runs, since bundle tables are persisted.
pub trait PathHasher {
    fn hash_path(&self, path: &str) -> ResourceKey;
}
