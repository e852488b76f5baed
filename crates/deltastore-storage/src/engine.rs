//! Delta block backup engine
//!
//! Orchestrates create, restore and delete against a backup
//! destination. Changed regions reported by the snapshot provider
//! become content-addressed compressed blocks, the backup manifest
//! merges them with the parent backup's block map, and deletion
//! garbage-collects blocks no longer referenced by any remaining
//! backup of the volume.

use std::collections::{HashMap, HashSet};
use std::io::SeekFrom;
use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use rand::RngCore;
use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};

use deltastore_core::{codec, Backup, BlockDigest, BlockMapping, Volume, BLOCK_SIZE};

use crate::backup_url::{decode_backup_url, encode_backup_url};
use crate::driver::{get_driver, ObjectStoreDriver};
use crate::error::{StorageError, StorageResult};
use crate::layout;
use crate::meta;
use crate::provider::SnapshotProvider;

/// Inputs for [`create_backup`]
#[derive(Debug, Clone)]
pub struct DeltaBackupConfig {
    pub volume: VolumeInfo,
    pub snapshot: SnapshotInfo,
    pub dest_url: String,
    pub labels: HashMap<String, String>,
}

/// Volume identity and geometry supplied by the caller
#[derive(Debug, Clone)]
pub struct VolumeInfo {
    pub name: String,
    pub size: u64,
    pub created_at: DateTime<Utc>,
}

/// Snapshot provenance supplied by the caller
#[derive(Debug, Clone)]
pub struct SnapshotInfo {
    pub name: String,
    pub created_at: DateTime<Utc>,
}

fn generate_backup_name() -> String {
    let mut id = [0u8; 8];
    rand::thread_rng().fill_bytes(&mut id);
    format!("backup-{}", hex::encode(id))
}

fn validate_config(config: &DeltaBackupConfig) -> StorageResult<()> {
    if config.dest_url.is_empty() {
        return Err(StorageError::InvalidConfig(
            "empty destination URL".to_string(),
        ));
    }
    if config.snapshot.name.is_empty() {
        return Err(StorageError::InvalidConfig(
            "empty snapshot name".to_string(),
        ));
    }
    if !layout::check_volume_name(&config.volume.name) {
        return Err(StorageError::InvalidConfig(format!(
            "invalid volume name {:?}",
            config.volume.name
        )));
    }
    Ok(())
}

/// Create a backup of `snapshot`, incremental against the volume's
/// last backup when possible, and return its backup URL.
#[instrument(skip(config, provider), fields(volume = %config.volume.name, snapshot = %config.snapshot.name))]
pub async fn create_backup(
    config: &DeltaBackupConfig,
    provider: &dyn SnapshotProvider,
) -> StorageResult<String> {
    validate_config(config)?;

    let driver = get_driver(&config.dest_url).await?;

    let initial = Volume {
        name: config.volume.name.clone(),
        size: config.volume.size,
        created_at: config.volume.created_at,
        last_backup_name: None,
        block_count: 0,
    };
    meta::ensure_volume(&initial, driver.as_ref()).await?;
    let volume = meta::load_volume(&config.volume.name, driver.as_ref()).await?;

    provider
        .open_snapshot(&config.snapshot.name, &volume.name)
        .await?;
    let result = run_backup(config, provider, driver.as_ref(), volume).await;
    if let Err(e) = provider
        .close_snapshot(&config.snapshot.name, &config.volume.name)
        .await
    {
        warn!(error = %e, snapshot = %config.snapshot.name, "failed to close snapshot");
    }
    result
}

async fn run_backup(
    config: &DeltaBackupConfig,
    provider: &dyn SnapshotProvider,
    driver: &dyn ObjectStoreDriver,
    volume: Volume,
) -> StorageResult<String> {
    let snapshot = &config.snapshot;

    // Resolve the dedup parent from the volume's last backup.
    let mut parent_backup = None;
    if let Some(last_name) = volume.last_backup_name.clone() {
        let last = meta::load_backup(&last_name, &volume.name, driver).await?;
        if last.snapshot_name == snapshot.name {
            // The snapshot was already backed up last time: redo as a
            // full backup.
            debug!("last backup used the same snapshot, creating full backup");
        } else if !provider.has_snapshot(&last.snapshot_name, &volume.name).await {
            debug!(
                parent = %last.snapshot_name,
                "parent snapshot not found locally, falling back to full backup"
            );
        } else {
            parent_backup = Some(last);
        }
    }
    let parent_snapshot = parent_backup.as_ref().map(|b| b.snapshot_name.as_str());

    debug!(parent = parent_snapshot.unwrap_or(""), "comparing snapshots");
    let delta = provider
        .compare_snapshot(&snapshot.name, parent_snapshot, &volume.name)
        .await?;
    if delta.block_size != BLOCK_SIZE {
        return Err(StorageError::UnsupportedBlockSize(delta.block_size));
    }

    let mut delta_blocks: Vec<BlockMapping> = Vec::new();
    let mut new_blocks = 0u64;
    let mut buf = vec![0u8; BLOCK_SIZE as usize];
    let segments = delta.mappings.len();
    for (m, mapping) in delta.mappings.iter().enumerate() {
        if mapping.offset % delta.block_size != 0 {
            return Err(StorageError::Alignment {
                what: "offset",
                value: mapping.offset,
                block_size: delta.block_size,
            });
        }
        if mapping.size % delta.block_size != 0 {
            return Err(StorageError::Alignment {
                what: "size",
                value: mapping.size,
                block_size: delta.block_size,
            });
        }
        let blocks = mapping.size / delta.block_size;
        for i in 0..blocks {
            let offset = mapping.offset + i * delta.block_size;
            debug!(
                "backing up segment {}/{}, block {}/{}",
                m + 1,
                segments,
                i + 1,
                blocks
            );
            provider
                .read_snapshot(&snapshot.name, &volume.name, offset, &mut buf)
                .await?;
            let digest = BlockDigest::from_data(&buf);
            let block_path = layout::block_path(&volume.name, &digest);

            if driver.file_size(&block_path).await.is_some() {
                debug!(block = %digest, "found existing block");
                delta_blocks.push(BlockMapping { offset, digest });
                continue;
            }

            let compressed = codec::compress(&buf)?;
            driver.write(&block_path, Bytes::from(compressed)).await?;
            new_blocks += 1;
            delta_blocks.push(BlockMapping { offset, digest });
        }
    }

    let merged = match &parent_backup {
        Some(parent) => merge_block_mappings(&delta_blocks, &parent.blocks),
        None => delta_blocks,
    };

    let backup = Backup {
        name: generate_backup_name(),
        volume_name: volume.name.clone(),
        snapshot_name: snapshot.name.clone(),
        snapshot_created_at: snapshot.created_at,
        created_at: Utc::now(),
        size: merged.len() as u64 * BLOCK_SIZE,
        blocks: merged,
        labels: config.labels.clone(),
    };
    meta::save_backup(&backup, driver).await?;

    // Reload for canonical state; the volume update strictly follows
    // the manifest write.
    let mut volume = meta::load_volume(&volume.name, driver).await?;
    volume.last_backup_name = Some(backup.name.clone());
    volume.block_count += new_blocks;
    meta::save_volume(&volume, driver).await?;

    info!(
        backup = %backup.name,
        new_blocks,
        total_blocks = backup.blocks.len(),
        "created backup"
    );
    encode_backup_url(&backup.name, &volume.name, &config.dest_url)
}

/// Merge offset-sorted delta mappings with the parent backup's block
/// map. On equal offsets the delta entry wins.
fn merge_block_mappings(delta: &[BlockMapping], parent: &[BlockMapping]) -> Vec<BlockMapping> {
    let mut merged = Vec::with_capacity(delta.len() + parent.len());
    let (mut d, mut l) = (0, 0);
    while d < delta.len() && l < parent.len() {
        let delta_block = &delta[d];
        let parent_block = &parent[l];
        if delta_block.offset == parent_block.offset {
            merged.push(delta_block.clone());
            d += 1;
            l += 1;
        } else if delta_block.offset < parent_block.offset {
            merged.push(delta_block.clone());
            d += 1;
        } else {
            merged.push(parent_block.clone());
            l += 1;
        }
    }
    merged.extend_from_slice(&delta[d..]);
    merged.extend_from_slice(&parent[l..]);
    merged
}

/// Restore the backup at `backup_url` onto the device or file at
/// `target`, block by block. Regular files are truncated to the
/// volume's logical size afterwards; block devices keep their length.
#[instrument(skip(target), fields(url = %backup_url))]
pub async fn restore_backup(backup_url: &str, target: impl AsRef<Path>) -> StorageResult<()> {
    let (backup_name, volume_name, dest_url) = decode_backup_url(backup_url)?;
    let driver = get_driver(&dest_url).await?;

    let volume = meta::load_volume(&volume_name, driver.as_ref()).await?;
    if volume.size == 0 || volume.size % BLOCK_SIZE != 0 {
        return Err(StorageError::InvalidConfig(format!(
            "invalid volume size {}",
            volume.size
        )));
    }

    let backup = meta::load_backup(&backup_name, &volume_name, driver.as_ref()).await?;

    let mut device = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .open(target.as_ref())
        .await?;
    let file_type = device.metadata().await?.file_type();

    let count = backup.blocks.len();
    for (i, block) in backup.blocks.iter().enumerate() {
        debug!(block = %block.digest, "restoring block {}/{}", i + 1, count);
        let block_path = layout::block_path(&volume_name, &block.digest);
        let data = driver.read(&block_path).await?;
        let raw = codec::decompress_and_verify(&data, &block.digest)?;
        device.seek(SeekFrom::Start(block.offset)).await?;
        device.write_all(&raw).await?;
    }
    device.flush().await?;

    if file_type.is_file() {
        debug!(size = volume.size, "truncating restored file to volume size");
        device.set_len(volume.size).await?;
    }

    info!(backup = %backup_name, volume = %volume_name, blocks = count, "restored backup");
    Ok(())
}

/// Delete the backup at `backup_url`, then garbage-collect every block
/// it referenced that no remaining backup of the volume still uses.
/// Deleting the last backup removes the whole volume subtree.
#[instrument(fields(url = %backup_url))]
pub async fn delete_backup(backup_url: &str) -> StorageResult<()> {
    let (backup_name, volume_name, dest_url) = decode_backup_url(backup_url)?;
    let driver = get_driver(&dest_url).await?;

    let mut volume = meta::load_volume(&volume_name, driver.as_ref()).await?;
    let backup = meta::load_backup(&backup_name, &volume_name, driver.as_ref()).await?;

    let mut candidates: HashSet<BlockDigest> =
        backup.blocks.iter().map(|block| block.digest).collect();

    // The manifest goes first: a crash between manifest removal and
    // block removal leaves orphan blocks, never dangling references.
    meta::remove_backup(&backup, driver.as_ref()).await?;

    if volume.last_backup_name.as_deref() == Some(backup.name.as_str()) {
        volume.last_backup_name = None;
        meta::save_volume(&volume, driver.as_ref()).await?;
    }

    let remaining = meta::list_backup_names(&volume_name, driver.as_ref()).await?;
    if remaining.is_empty() {
        debug!(volume = %volume_name, "no backups left, removing volume");
        if let Err(e) = meta::remove_volume(&volume_name, driver.as_ref()).await {
            warn!(error = %e, volume = %volume_name, "failed to remove volume");
        }
        return Ok(());
    }

    debug!(
        candidates = candidates.len(),
        remaining = remaining.len(),
        "scanning remaining backups for still-referenced blocks"
    );
    for name in &remaining {
        let sibling = meta::load_backup(name, &volume_name, driver.as_ref()).await?;
        for block in &sibling.blocks {
            candidates.remove(&block.digest);
        }
        if candidates.is_empty() {
            break;
        }
    }

    let orphans = candidates.len() as u64;
    if orphans > 0 {
        let paths: Vec<String> = candidates
            .iter()
            .map(|digest| layout::block_path(&volume_name, digest))
            .collect();
        driver.remove(&paths).await?;
    }
    info!(backup = %backup_name, removed_blocks = orphans, "deleted backup");

    let mut volume = meta::load_volume(&volume_name, driver.as_ref()).await?;
    volume.block_count = volume.block_count.saturating_sub(orphans);
    meta::save_volume(&volume, driver.as_ref()).await?;
    Ok(())
}
