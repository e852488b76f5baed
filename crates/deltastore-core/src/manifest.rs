//! Volume and backup manifests
//!
//! Manifests are small JSON objects persisted as single atomic blobs.
//! A backup manifest is immutable once written; only the volume
//! manifest is ever rewritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::block::{BlockMapping, BLOCK_SIZE};
use crate::error::Result;

/// Mutable per-volume manifest, singleton in the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    /// Logical volume size in bytes
    pub size: u64,
    pub created_at: DateTime<Utc>,
    /// Most recent backup, used to find the dedup parent on the next
    /// create. Absent when the volume has no backups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_backup_name: Option<String>,
    /// Distinct blocks ever uploaded for this volume, decremented by
    /// GC. Advisory only.
    #[serde(default)]
    pub block_count: u64,
}

/// Immutable backup manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Backup {
    pub name: String,
    pub volume_name: String,
    pub snapshot_name: String,
    pub snapshot_created_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    /// Populated bytes: `blocks.len() * BLOCK_SIZE`. Holes are not
    /// represented.
    pub size: u64,
    /// Offset-sorted, offset-unique block map
    pub blocks: Vec<BlockMapping>,
    /// Opaque caller-supplied labels
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub labels: HashMap<String, String>,
}

impl Volume {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }
}

impl Backup {
    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON
    pub fn from_json(data: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(data)?)
    }

    /// Check the block map ordering: offsets strictly increasing and
    /// block-aligned.
    pub fn blocks_well_formed(&self) -> bool {
        self.blocks.windows(2).all(|w| w[0].offset < w[1].offset)
            && self.blocks.iter().all(|b| b.offset % BLOCK_SIZE == 0)
    }
}
