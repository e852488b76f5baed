//! Object-store drivers and the delta block backup engine
//!
//! This crate provides the storage-driver abstraction over a backup
//! destination URL, the reference `vfs` driver, the on-store layout,
//! the metadata repository, and the create/restore/delete engine.

pub mod backup_url;
pub mod driver;
pub mod engine;
pub mod error;
pub mod layout;
pub mod meta;
pub mod provider;
pub mod vfs;

pub use backup_url::{decode_backup_url, encode_backup_url};
pub use driver::{get_driver, register_driver, DriverFactory, ObjectStoreDriver};
pub use engine::{
    create_backup, delete_backup, restore_backup, DeltaBackupConfig, SnapshotInfo, VolumeInfo,
};
pub use error::{StorageError, StorageResult};
pub use provider::{Mapping, Mappings, SnapshotProvider};
pub use vfs::VfsDriver;
