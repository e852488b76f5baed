//! Block identity for content-addressable storage
//!
//! A volume is backed up as fixed-size blocks. Each block is identified
//! within its volume's namespace by the SHA-256 digest of its
//! uncompressed contents.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};

/// Fixed backup block size (2 MiB)
pub const BLOCK_SIZE: u64 = 2 * 1024 * 1024;

/// SHA-256 digest identifying a block
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockDigest([u8; 32]);

impl BlockDigest {
    /// Compute digest from uncompressed block data
    pub fn from_data(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        let result = hasher.finalize();
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&result);
        Self(digest)
    }

    /// Parse from hex string
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s).map_err(|e| Error::InvalidDigest(e.to_string()))?;
        if bytes.len() != 32 {
            return Err(Error::InvalidDigest(format!(
                "Expected 32 bytes, got {}",
                bytes.len()
            )));
        }
        let mut digest = [0u8; 32];
        digest.copy_from_slice(&bytes);
        Ok(Self(digest))
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First shard component (hex chars 0..2)
    pub fn shard_l1(&self) -> String {
        hex::encode(&self.0[..1])
    }

    /// Second shard component (hex chars 2..4)
    pub fn shard_l2(&self) -> String {
        hex::encode(&self.0[1..2])
    }
}

impl fmt::Display for BlockDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for BlockDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BlockDigest({})", &self.to_hex()[..16])
    }
}

// Digests travel as lowercase hex strings in manifests.
impl Serialize for BlockDigest {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for BlockDigest {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// A block's position in the volume: the block with `digest` occupies
/// byte `offset`. Offsets are multiples of [`BLOCK_SIZE`] and a
/// manifest's mappings are strictly offset-sorted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockMapping {
    pub offset: u64,
    pub digest: BlockDigest,
}
