//! Snapshot provider contract
//!
//! The engine delegates change enumeration and snapshot reads to its
//! caller, which knows the concrete volume backend. The engine's only
//! assumption is the block-aligned shape of the returned mappings.

use async_trait::async_trait;

use crate::error::StorageResult;

/// A contiguous region that may differ from the parent snapshot.
/// Offset and size are multiples of the provider's block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    pub offset: u64,
    pub size: u64,
}

/// Change list returned by [`SnapshotProvider::compare_snapshot`]
#[derive(Debug, Clone)]
pub struct Mappings {
    pub block_size: u64,
    pub mappings: Vec<Mapping>,
}

/// Operations the engine requires from its caller to read snapshots
/// and enumerate changed regions.
#[async_trait]
pub trait SnapshotProvider: Send + Sync {
    /// Does the named snapshot still exist locally?
    async fn has_snapshot(&self, snapshot: &str, volume: &str) -> bool;

    /// Enumerate the regions of `snapshot` that may differ from
    /// `parent`. With no parent the result must cover every populated
    /// region of the volume (a full backup).
    async fn compare_snapshot(
        &self,
        snapshot: &str,
        parent: Option<&str>,
        volume: &str,
    ) -> StorageResult<Mappings>;

    /// Acquire a stable read view of the snapshot
    async fn open_snapshot(&self, snapshot: &str, volume: &str) -> StorageResult<()>;

    /// Fill `buf` from the snapshot starting at `offset`. Offset and
    /// buffer length are block-aligned.
    async fn read_snapshot(
        &self,
        snapshot: &str,
        volume: &str,
        offset: u64,
        buf: &mut [u8],
    ) -> StorageResult<()>;

    /// Release the read view. The engine invokes this on every exit
    /// path after a successful open.
    async fn close_snapshot(&self, snapshot: &str, volume: &str) -> StorageResult<()>;
}
