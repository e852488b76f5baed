//! Metadata repository
//!
//! Loads and saves the volume and backup manifests as JSON objects
//! through the driver. Saves rely on the driver's atomic write, so a
//! reader never observes a half-written manifest.

use bytes::Bytes;
use tracing::{debug, instrument};

use deltastore_core::{Backup, Volume};

use crate::driver::ObjectStoreDriver;
use crate::error::{StorageError, StorageResult};
use crate::layout;

fn check_volume_name(volume: &str) -> StorageResult<()> {
    if !layout::check_volume_name(volume) {
        return Err(StorageError::InvalidConfig(format!(
            "invalid volume name {:?}",
            volume
        )));
    }
    Ok(())
}

/// Create the volume manifest if this is the first backup of the
/// volume; an existing manifest is left untouched.
pub async fn ensure_volume(volume: &Volume, driver: &dyn ObjectStoreDriver) -> StorageResult<()> {
    check_volume_name(&volume.name)?;
    let path = layout::volume_cfg_path(&volume.name);
    if driver.file_exists(&path).await {
        return Ok(());
    }
    debug!(volume = %volume.name, "initializing volume in backup store");
    save_volume(volume, driver).await
}

/// Load the volume manifest
pub async fn load_volume(name: &str, driver: &dyn ObjectStoreDriver) -> StorageResult<Volume> {
    check_volume_name(name)?;
    let path = layout::volume_cfg_path(name);
    if driver.file_size(&path).await.is_none() {
        return Err(StorageError::VolumeNotFound(name.to_string()));
    }
    let data = driver.read(&path).await?;
    Ok(Volume::from_json(&data)?)
}

/// Save the volume manifest (atomic replace)
#[instrument(skip(volume, driver), fields(volume = %volume.name))]
pub async fn save_volume(volume: &Volume, driver: &dyn ObjectStoreDriver) -> StorageResult<()> {
    check_volume_name(&volume.name)?;
    let path = layout::volume_cfg_path(&volume.name);
    let json = volume.to_json()?;
    driver.write(&path, Bytes::from(json)).await
}

/// Load a backup manifest
pub async fn load_backup(
    name: &str,
    volume_name: &str,
    driver: &dyn ObjectStoreDriver,
) -> StorageResult<Backup> {
    check_volume_name(volume_name)?;
    let path = layout::backup_cfg_path(volume_name, name);
    if driver.file_size(&path).await.is_none() {
        return Err(StorageError::BackupNotFound(name.to_string()));
    }
    let data = driver.read(&path).await?;
    Ok(Backup::from_json(&data)?)
}

/// Save a backup manifest (atomic write)
#[instrument(skip(backup, driver), fields(backup = %backup.name, volume = %backup.volume_name))]
pub async fn save_backup(backup: &Backup, driver: &dyn ObjectStoreDriver) -> StorageResult<()> {
    check_volume_name(&backup.volume_name)?;
    let path = layout::backup_cfg_path(&backup.volume_name, &backup.name);
    let json = backup.to_json()?;
    driver.write(&path, Bytes::from(json)).await
}

/// Remove a backup manifest. Block GC is the engine's job.
pub async fn remove_backup(backup: &Backup, driver: &dyn ObjectStoreDriver) -> StorageResult<()> {
    let path = layout::backup_cfg_path(&backup.volume_name, &backup.name);
    driver.remove(&[path]).await
}

/// Remove the entire volume subtree: manifest, backup manifests and
/// block directory. Only invoked once no backups remain.
pub async fn remove_volume(name: &str, driver: &dyn ObjectStoreDriver) -> StorageResult<()> {
    check_volume_name(name)?;
    driver.remove(&[layout::volume_dir(name)]).await
}

/// Names of the volume's remaining backups. The backups directory is
/// pruned together with its last manifest, so a missing directory
/// means no backups.
pub async fn list_backup_names(
    volume_name: &str,
    driver: &dyn ObjectStoreDriver,
) -> StorageResult<Vec<String>> {
    check_volume_name(volume_name)?;
    let dir = layout::backups_dir(volume_name);
    let entries = match driver.list(&dir).await {
        Ok(entries) => entries,
        Err(StorageError::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e),
    };
    Ok(entries
        .iter()
        .filter_map(|name| layout::backup_name_from_cfg(name))
        .collect())
}
