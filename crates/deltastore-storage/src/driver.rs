//! Object-store driver abstraction
//!
//! A driver gives uniform blob-level access to a backup destination.
//! Drivers are keyed by URL scheme, registered process-wide once at
//! startup, and constructed lazily from the destination URL.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use lazy_static::lazy_static;
use url::Url;

use crate::error::{StorageError, StorageResult};

/// Boxed future returned by a [`DriverFactory`]
pub type DriverFuture =
    Pin<Box<dyn Future<Output = StorageResult<Arc<dyn ObjectStoreDriver>>> + Send>>;

/// Constructs a driver for a destination URL
pub type DriverFactory = fn(String) -> DriverFuture;

lazy_static! {
    static ref DRIVERS: RwLock<HashMap<String, DriverFactory>> = RwLock::new(HashMap::new());
}

/// Register a driver factory under a URL scheme.
///
/// Fails if the scheme is already taken.
pub fn register_driver(scheme: &str, factory: DriverFactory) -> StorageResult<()> {
    let mut drivers = DRIVERS.write().unwrap();
    if drivers.contains_key(scheme) {
        return Err(StorageError::DriverExists(scheme.to_string()));
    }
    drivers.insert(scheme.to_string(), factory);
    Ok(())
}

/// Resolve a driver for a destination URL by its scheme.
pub async fn get_driver(dest_url: &str) -> StorageResult<Arc<dyn ObjectStoreDriver>> {
    if dest_url.is_empty() {
        return Err(StorageError::InvalidConfig("empty destination URL".to_string()));
    }
    let parsed = Url::parse(dest_url).map_err(|e| StorageError::InvalidUrl {
        url: dest_url.to_string(),
        reason: e.to_string(),
    })?;
    let factory = {
        let drivers = DRIVERS.read().unwrap();
        drivers.get(parsed.scheme()).copied()
    };
    let factory = factory.ok_or_else(|| StorageError::InvalidUrl {
        url: dest_url.to_string(),
        reason: format!("no driver registered for scheme {:?}", parsed.scheme()),
    })?;
    factory(dest_url.to_string()).await
}

/// Blob-level access to a backup destination.
///
/// Paths are store-relative and `/`-separated.
#[async_trait]
pub trait ObjectStoreDriver: Send + Sync {
    /// Driver kind (its registered URL scheme)
    fn kind(&self) -> &str;

    /// Canonical destination URL
    fn url(&self) -> &str;

    /// Size of a stored object, or `None` when the path is absent or a
    /// directory. Cheap existence probe for the dedup check.
    async fn file_size(&self, path: &str) -> Option<u64>;

    /// Equivalent to `file_size(path).is_some()`
    async fn file_exists(&self, path: &str) -> bool {
        self.file_size(path).await.is_some()
    }

    /// Read an object in full. Fails when the object is missing.
    async fn read(&self, path: &str) -> StorageResult<Bytes>;

    /// Write an object atomically: temp file first, then rename over
    /// the destination. A failed write never leaves a corrupt object.
    async fn write(&self, path: &str, data: Bytes) -> StorageResult<()>;

    /// Names of the immediate children of `path`, sorted. Errors when
    /// `path` does not exist.
    async fn list(&self, path: &str) -> StorageResult<Vec<String>>;

    /// Recursively delete each path, then prune now-empty ancestor
    /// directories up to the backup-store base.
    async fn remove(&self, paths: &[String]) -> StorageResult<()>;

    /// Copy a local file into the store
    async fn upload(&self, local_src: &Path, remote_dst: &str) -> StorageResult<()>;

    /// Copy a stored object to a local file
    async fn download(&self, remote_src: &str, local_dst: &Path) -> StorageResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_factory(_dest: String) -> DriverFuture {
        Box::pin(async {
            Err(StorageError::InvalidConfig("dummy".to_string()))
        })
    }

    #[test]
    fn test_duplicate_scheme_rejected() {
        register_driver("testdup", dummy_factory).unwrap();
        match register_driver("testdup", dummy_factory) {
            Err(StorageError::DriverExists(scheme)) => assert_eq!(scheme, "testdup"),
            other => panic!("expected DriverExists, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_unknown_scheme_rejected() {
        match get_driver("nosuch:///tmp").await {
            Err(StorageError::InvalidUrl { .. }) => {}
            other => panic!("expected InvalidUrl, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_unparseable_url_rejected() {
        assert!(matches!(
            get_driver("not a url").await,
            Err(StorageError::InvalidUrl { .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_url_rejected() {
        assert!(matches!(
            get_driver("").await,
            Err(StorageError::InvalidConfig(_))
        ));
    }
}
