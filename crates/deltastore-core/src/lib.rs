//! Core data structures for the delta block backup store
//!
//! Volumes are backed up as fixed-size, content-addressed blocks. This
//! crate holds the block identity types, the volume and backup
//! manifests, and the block compression codec.

pub mod block;
pub mod codec;
pub mod error;
pub mod manifest;

pub use block::{BlockDigest, BlockMapping, BLOCK_SIZE};
pub use error::{Error, Result};
pub use manifest::{Backup, Volume};
