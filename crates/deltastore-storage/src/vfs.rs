//! Reference `vfs` driver over a local filesystem path
//!
//! Destination URLs take the form `vfs:///absolute/path` with an empty
//! authority. Writes go to a temp file renamed over the destination,
//! so readers never observe a half-written object.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};
use url::Url;

use crate::driver::{register_driver, DriverFuture, ObjectStoreDriver};
use crate::error::{StorageError, StorageResult};
use crate::layout::BACKUPSTORE_BASE;

/// Registered URL scheme
pub const KIND: &str = "vfs";

/// How many now-empty ancestor directories `remove` prunes per path
const MAX_CLEANUP_LEVEL: usize = 10;

/// Local-filesystem backup store driver
pub struct VfsDriver {
    dest_url: String,
    root: PathBuf,
}

impl VfsDriver {
    /// Open a driver for a `vfs:///path` destination URL. The path
    /// must name an existing directory.
    pub async fn new(dest_url: &str) -> StorageResult<Self> {
        let invalid = |reason: String| StorageError::InvalidUrl {
            url: dest_url.to_string(),
            reason,
        };

        let parsed = Url::parse(dest_url).map_err(|e| invalid(e.to_string()))?;
        if parsed.scheme() != KIND {
            return Err(invalid(format!("unexpected scheme {:?}", parsed.scheme())));
        }
        if parsed.host_str().is_some_and(|host| !host.is_empty()) {
            return Err(invalid("vfs path must follow vfs:///path format".to_string()));
        }
        let path = parsed.path();
        if path.is_empty() || path == "/" {
            return Err(invalid("cannot find vfs path".to_string()));
        }

        let root = PathBuf::from(path);
        if fs::read_dir(&root).await.is_err() {
            return Err(invalid(format!(
                "vfs path {} doesn't exist or is not a directory",
                path
            )));
        }

        let driver = Self {
            dest_url: format!("{}://{}", KIND, path),
            root,
        };
        debug!(url = %driver.dest_url, "loaded vfs driver");
        Ok(driver)
    }

    /// Register under the `vfs` scheme. Call once at startup.
    pub fn register() -> StorageResult<()> {
        fn factory(dest_url: String) -> DriverFuture {
            Box::pin(async move {
                let driver = VfsDriver::new(&dest_url).await?;
                Ok(Arc::new(driver) as Arc<dyn ObjectStoreDriver>)
            })
        }
        register_driver(KIND, factory)
    }

    fn local_path(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl ObjectStoreDriver for VfsDriver {
    fn kind(&self) -> &str {
        KIND
    }

    fn url(&self) -> &str {
        &self.dest_url
    }

    async fn file_size(&self, path: &str) -> Option<u64> {
        match fs::metadata(self.local_path(path)).await {
            Ok(md) if md.is_file() => Some(md.len()),
            _ => None,
        }
    }

    async fn read(&self, path: &str) -> StorageResult<Bytes> {
        match fs::read(self.local_path(path)).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self, data), fields(path = %path, size = data.len()))]
    async fn write(&self, path: &str, data: Bytes) -> StorageResult<()> {
        let dst = self.local_path(path);
        let tmp = self.local_path(&format!("{}.tmp", path));

        if fs::metadata(&tmp).await.is_ok() {
            fs::remove_file(&tmp).await?;
        }
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&tmp).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        // rename replaces any existing destination atomically
        fs::rename(&tmp, &dst).await?;
        Ok(())
    }

    async fn list(&self, path: &str) -> StorageResult<Vec<String>> {
        let mut entries = fs::read_dir(self.local_path(path)).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    #[instrument(skip(self, paths), fields(count = paths.len()))]
    async fn remove(&self, paths: &[String]) -> StorageResult<()> {
        for path in paths {
            let target = self.local_path(path);
            match fs::metadata(&target).await {
                Ok(md) if md.is_dir() => fs::remove_dir_all(&target).await?,
                Ok(_) => fs::remove_file(&target).await?,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(StorageError::Io(e)),
            }

            // Prune now-empty ancestors, never above the store base or
            // the driver root.
            let mut dir = target.clone();
            for _ in 0..MAX_CLEANUP_LEVEL {
                dir = match dir.parent() {
                    Some(parent) => parent.to_path_buf(),
                    None => break,
                };
                if dir.ends_with(BACKUPSTORE_BASE) || dir == self.root {
                    break;
                }
                if fs::remove_dir(&dir).await.is_err() {
                    break;
                }
            }
        }
        Ok(())
    }

    async fn upload(&self, local_src: &Path, remote_dst: &str) -> StorageResult<()> {
        let data = fs::read(local_src).await?;
        self.write(remote_dst, Bytes::from(data)).await
    }

    async fn download(&self, remote_src: &str, local_dst: &Path) -> StorageResult<()> {
        let data = self.read(remote_src).await?;
        if let Some(parent) = local_dst.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(local_dst, &data).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn open_driver(dir: &TempDir) -> VfsDriver {
        let url = format!("vfs://{}", dir.path().display());
        VfsDriver::new(&url).await.unwrap()
    }

    #[tokio::test]
    async fn test_rejects_non_empty_host() {
        match VfsDriver::new("vfs://host/path").await {
            Err(StorageError::InvalidUrl { .. }) => {}
            other => panic!("expected InvalidUrl, got {:?}", other.err()),
        }
    }

    #[tokio::test]
    async fn test_rejects_missing_path() {
        assert!(VfsDriver::new("vfs:///nonexistent-dir-for-test").await.is_err());
    }

    #[tokio::test]
    async fn test_write_read_roundtrip() {
        let dir = TempDir::new().unwrap();
        let driver = open_driver(&dir).await;

        let path = "backupstore/volumes/vo/l-/vol-a/volume.cfg";
        driver
            .write(path, Bytes::from_static(b"{\"name\":\"vol-a\"}"))
            .await
            .unwrap();

        assert_eq!(driver.file_size(path).await, Some(16));
        assert!(driver.file_exists(path).await);
        let data = driver.read(path).await.unwrap();
        assert_eq!(&data[..], b"{\"name\":\"vol-a\"}");

        // no temp file left behind
        assert!(!driver.file_exists(&format!("{}.tmp", path)).await);
    }

    #[tokio::test]
    async fn test_write_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let driver = open_driver(&dir).await;

        driver.write("backupstore/a.cfg", Bytes::from_static(b"old")).await.unwrap();
        driver.write("backupstore/a.cfg", Bytes::from_static(b"newer")).await.unwrap();
        assert_eq!(&driver.read("backupstore/a.cfg").await.unwrap()[..], b"newer");
    }

    #[tokio::test]
    async fn test_file_size_is_none_for_directory() {
        let dir = TempDir::new().unwrap();
        let driver = open_driver(&dir).await;

        driver.write("backupstore/sub/file", Bytes::from_static(b"x")).await.unwrap();
        assert_eq!(driver.file_size("backupstore/sub").await, None);
        assert!(!driver.file_exists("backupstore/sub").await);
        assert_eq!(driver.file_size("backupstore/absent").await, None);
    }

    #[tokio::test]
    async fn test_list_children() {
        let dir = TempDir::new().unwrap();
        let driver = open_driver(&dir).await;

        driver.write("backupstore/d/b.cfg", Bytes::from_static(b"1")).await.unwrap();
        driver.write("backupstore/d/a.cfg", Bytes::from_static(b"2")).await.unwrap();

        let names = driver.list("backupstore/d").await.unwrap();
        assert_eq!(names, vec!["a.cfg", "b.cfg"]);

        assert!(driver.list("backupstore/missing").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_prunes_empty_ancestors() {
        let dir = TempDir::new().unwrap();
        let driver = open_driver(&dir).await;

        let blk = "backupstore/volumes/vo/l-/vol-a/blocks/ab/cd/abcd.blk";
        driver.write(blk, Bytes::from_static(b"data")).await.unwrap();
        driver.remove(&[blk.to_string()]).await.unwrap();

        // shard and volume directories are gone, the base remains
        assert!(!dir.path().join("backupstore/volumes").exists());
        assert!(dir.path().join("backupstore").exists());
    }

    #[tokio::test]
    async fn test_remove_keeps_non_empty_ancestors() {
        let dir = TempDir::new().unwrap();
        let driver = open_driver(&dir).await;

        driver.write("backupstore/v/keep.cfg", Bytes::from_static(b"1")).await.unwrap();
        driver.write("backupstore/v/drop.cfg", Bytes::from_static(b"2")).await.unwrap();
        driver.remove(&["backupstore/v/drop.cfg".to_string()]).await.unwrap();

        assert!(driver.file_exists("backupstore/v/keep.cfg").await);
    }

    #[tokio::test]
    async fn test_remove_missing_path_is_ok() {
        let dir = TempDir::new().unwrap();
        let driver = open_driver(&dir).await;
        driver.remove(&["backupstore/nothing-here".to_string()]).await.unwrap();
    }

    #[tokio::test]
    async fn test_upload_download() {
        let dir = TempDir::new().unwrap();
        let driver = open_driver(&dir).await;

        let src = dir.path().join("local-src");
        tokio::fs::write(&src, b"payload").await.unwrap();

        driver.upload(&src, "backupstore/uploaded").await.unwrap();
        assert_eq!(&driver.read("backupstore/uploaded").await.unwrap()[..], b"payload");

        let dst = dir.path().join("local-dst");
        driver.download("backupstore/uploaded", &dst).await.unwrap();
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"payload");
    }
}
