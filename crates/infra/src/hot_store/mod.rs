//! Hot object store: low-latency storage for inputs, results and logs.

pub mod in_memory;
#[cfg(feature = "aws")]
pub mod s3;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use strata_core::ObjectLocation;

pub use in_memory::InMemoryHotStore;
#[cfg(feature = "aws")]
pub use s3::S3HotStore;

#[derive(Debug, Error)]
pub enum HotStoreError {
    #[error("object not found: {0}")]
    NotFound(ObjectLocation),

    #[error("local file error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("object store error: {0}")]
    Service(String),
}

pub trait HotStore: Send + Sync {
    /// Object bytes, or `None` if nothing is stored at `location`.
    fn get(&self, location: &ObjectLocation) -> Result<Option<Vec<u8>>, HotStoreError>;

    /// Create or overwrite the object at `location`.
    fn put(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<(), HotStoreError>;

    /// Delete-if-exists: removing an absent object succeeds.
    fn delete(&self, location: &ObjectLocation) -> Result<(), HotStoreError>;

    fn exists(&self, location: &ObjectLocation) -> Result<bool, HotStoreError> {
        Ok(self.get(location)?.is_some())
    }

    /// Copy an object into a local file, creating parent directories.
    fn download_to(&self, location: &ObjectLocation, path: &Path) -> Result<(), HotStoreError> {
        let bytes = self
            .get(location)?
            .ok_or_else(|| HotStoreError::NotFound(location.clone()))?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| HotStoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(path, bytes).map_err(|source| HotStoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Upload a local file to `location`.
    fn upload_from(&self, path: &Path, location: &ObjectLocation) -> Result<(), HotStoreError> {
        let bytes = std::fs::read(path).map_err(|source| HotStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        self.put(location, bytes)
    }
}

impl<T> HotStore for Arc<T>
where
    T: HotStore + ?Sized,
{
    fn get(&self, location: &ObjectLocation) -> Result<Option<Vec<u8>>, HotStoreError> {
        (**self).get(location)
    }

    fn put(&self, location: &ObjectLocation, bytes: Vec<u8>) -> Result<(), HotStoreError> {
        (**self).put(location, bytes)
    }

    fn delete(&self, location: &ObjectLocation) -> Result<(), HotStoreError> {
        (**self).delete(location)
    }

    fn exists(&self, location: &ObjectLocation) -> Result<bool, HotStoreError> {
        (**self).exists(location)
    }
}
