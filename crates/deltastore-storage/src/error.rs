//! Storage error types

use thiserror::Error;

/// Storage error type
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid backup URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Volume not found: {0}")]
    VolumeNotFound(String),

    #[error("Backup not found: {0}")]
    BackupNotFound(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Unsupported block size {0}")]
    UnsupportedBlockSize(u64),

    #[error("Mapping {what} {value} is not a multiple of block size {block_size}")]
    Alignment {
        what: &'static str,
        value: u64,
        block_size: u64,
    },

    #[error("Driver already registered for scheme {0}")]
    DriverExists(String),

    #[error("Snapshot provider error: {0}")]
    Provider(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Core error: {0}")]
    Core(#[from] deltastore_core::Error),
}

impl StorageError {
    /// Whether this error is a stored-block integrity failure: the
    /// decompressed contents do not match the manifest digest, or the
    /// stored payload is not a decodable zstd frame at all.
    pub fn is_corrupt(&self) -> bool {
        matches!(
            self,
            StorageError::Core(
                deltastore_core::Error::DigestMismatch { .. }
                    | deltastore_core::Error::Decompression(_)
            )
        )
    }
}

/// Result type alias
pub type StorageResult<T> = Result<T, StorageError>;
