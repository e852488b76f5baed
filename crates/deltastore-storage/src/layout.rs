//! On-store layout
//!
//! Pure functions computing store-relative paths for volumes, backups
//! and blocks. Volume and block directories are sharded two levels
//! deep to cap directory fan-out on filesystems with poor
//! large-directory performance.
//!
//! ```text
//! backupstore/volumes/<L1>/<L2>/<volume>/volume.cfg
//! backupstore/volumes/<L1>/<L2>/<volume>/backups/backup_<name>.cfg
//! backupstore/volumes/<L1>/<L2>/<volume>/blocks/<D1>/<D2>/<digest>.blk
//! ```

use deltastore_core::BlockDigest;

/// Root path component of everything the store writes. Ancestor
/// pruning in `remove` stops here.
pub const BACKUPSTORE_BASE: &str = "backupstore";

const VOLUMES_DIRECTORY: &str = "volumes";
const BACKUPS_DIRECTORY: &str = "backups";
const BLOCKS_DIRECTORY: &str = "blocks";

const VOLUME_CONFIG_FILE: &str = "volume.cfg";
const BACKUP_CONFIG_PREFIX: &str = "backup_";
const CFG_SUFFIX: &str = ".cfg";
const BLK_SUFFIX: &str = ".blk";

/// Volume names shorter than this cannot be sharded
pub const MIN_VOLUME_NAME_LEN: usize = 4;

/// Whether a volume name is usable with the sharded layout. Callers
/// must check before computing any volume path.
pub fn check_volume_name(volume: &str) -> bool {
    volume.len() >= MIN_VOLUME_NAME_LEN && volume.is_ascii()
}

/// Directory holding everything belonging to a volume
pub fn volume_dir(volume: &str) -> String {
    format!(
        "{}/{}/{}/{}/{}",
        BACKUPSTORE_BASE,
        VOLUMES_DIRECTORY,
        &volume[0..2],
        &volume[2..4],
        volume
    )
}

/// Path of the volume manifest
pub fn volume_cfg_path(volume: &str) -> String {
    format!("{}/{}", volume_dir(volume), VOLUME_CONFIG_FILE)
}

/// Directory holding a volume's backup manifests
pub fn backups_dir(volume: &str) -> String {
    format!("{}/{}", volume_dir(volume), BACKUPS_DIRECTORY)
}

/// Path of a backup manifest
pub fn backup_cfg_path(volume: &str, backup: &str) -> String {
    format!(
        "{}/{}{}{}",
        backups_dir(volume),
        BACKUP_CONFIG_PREFIX,
        backup,
        CFG_SUFFIX
    )
}

/// Directory holding a volume's block objects
pub fn blocks_dir(volume: &str) -> String {
    format!("{}/{}", volume_dir(volume), BLOCKS_DIRECTORY)
}

/// Path of a block object
pub fn block_path(volume: &str, digest: &BlockDigest) -> String {
    format!(
        "{}/{}/{}/{}{}",
        blocks_dir(volume),
        digest.shard_l1(),
        digest.shard_l2(),
        digest.to_hex(),
        BLK_SUFFIX
    )
}

/// Recover a backup name from its manifest file name, or `None` for
/// files that are not backup manifests.
pub fn backup_name_from_cfg(file_name: &str) -> Option<String> {
    file_name
        .strip_prefix(BACKUP_CONFIG_PREFIX)?
        .strip_suffix(CFG_SUFFIX)
        .map(|name| name.to_string())
}
