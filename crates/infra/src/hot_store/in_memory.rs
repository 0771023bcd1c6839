//! In-memory hot store for tests/dev.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, RwLock};

use strata_core::ObjectLocation;

use super::{HotStore, HotStoreError};

/// Map-backed object store.
///
/// Writes can be made to fail per key, to exercise retry paths.
#[derive(Debug, Default)]
pub struct InMemoryHotStore {
    objects: RwLock<BTreeMap<ObjectLocation, Vec<u8>>>,
    failing_puts: Mutex<HashSet<ObjectLocation>>,
}

impl InMemoryHotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored location, sorted by bucket then key.
    pub fn locations(&self) -> Vec<ObjectLocation> {
        self.objects
            .read()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Make `put` to `location` fail until cleared.
    pub fn fail_puts_to(&self, location: ObjectLocation) {
        if let Ok(mut failing) = self.failing_puts.lock() {
            failing.insert(location);
        }
    }

    pub fn clear_failures(&self) {
        if let Ok(mut failing) = self.failing_puts.lock() {
            failing.clear();
        }
    }
}

fn poisoned() -> HotStoreError {
    HotStoreError::Service("hot store lock poisoned".to_string())
}

impl HotStore for InMemoryHotStore {
    fn get(&self, location: &ObjectLocation) -> Result<Option<Vec<u8>>, HotStoreError> {
        let objects = self.objects.read().map_err(|_| poisoned())?;
        Ok(objects.get(location).cloned())
    }

    fn put(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<(), HotStoreError> {
        let failing = self.failing_puts.lock().map_err(|_| poisoned())?;
        if failing.contains(location) {
            return Err(HotStoreError::Service(format!("put to {location} refused")));
        }
        drop(failing);

        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects.insert(location.clone(), bytes);
        Ok(())
    }

    fn delete(&self, location: &ObjectLocation) -> Result<(), HotStoreError> {
        let mut objects = self.objects.write().map_err(|_| poisoned())?;
        objects.remove(location);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(key: &str) -> ObjectLocation {
        ObjectLocation::new("results", key)
    }

    #[test]
    fn put_get_delete() {
        let store = InMemoryHotStore::new();
        assert!(store.get(&loc("a")).unwrap().is_none());

        store.put(&loc("a"), b"data".to_vec()).unwrap();
        assert_eq!(store.get(&loc("a")).unwrap().as_deref(), Some(&b"data"[..]));
        assert!(store.exists(&loc("a")).unwrap());

        store.delete(&loc("a")).unwrap();
        assert!(!store.exists(&loc("a")).unwrap());
        // Delete-if-exists.
        store.delete(&loc("a")).unwrap();
    }

    #[test]
    fn buckets_are_separate_namespaces() {
        let store = InMemoryHotStore::new();
        store
            .put(&ObjectLocation::new("inputs", "k"), b"in".to_vec())
            .unwrap();
        assert!(store.get(&ObjectLocation::new("results", "k")).unwrap().is_none());
    }

    #[test]
    fn file_helpers_round_trip_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryHotStore::new();
        store.put(&loc("in.vcf"), b"#VCF".to_vec()).unwrap();

        let local = dir.path().join("nested/in.vcf");
        store.download_to(&loc("in.vcf"), &local).unwrap();
        assert_eq!(std::fs::read(&local).unwrap(), b"#VCF");

        store.upload_from(&local, &loc("copy.vcf")).unwrap();
        assert_eq!(store.locations().len(), 2);
    }

    #[test]
    fn downloading_missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = InMemoryHotStore::new();
        assert!(matches!(
            store.download_to(&loc("missing"), &dir.path().join("x")),
            Err(HotStoreError::NotFound(_))
        ));
    }

    #[test]
    fn injected_put_failure() {
        let store = InMemoryHotStore::new();
        store.fail_puts_to(loc("a"));
        assert!(matches!(
            store.put(&loc("a"), vec![1]),
            Err(HotStoreError::Service(_))
        ));
        store.clear_failures();
        store.put(&loc("a"), vec![1]).unwrap();
    }
}
