//! Block compression codec
//!
//! Blocks are stored zstd-compressed. The restore path verifies the
//! SHA-256 of the decompressed bytes against the manifest digest, so a
//! tampered or truncated block object never restores silently.

use zstd::stream::{decode_all, encode_all};

use crate::block::BlockDigest;
use crate::error::{Error, Result};

/// zstd compression level for block payloads
pub const COMPRESSION_LEVEL: i32 = 3;

/// Compress a block for storage
pub fn compress(data: &[u8]) -> Result<Vec<u8>> {
    encode_all(data, COMPRESSION_LEVEL).map_err(|e| Error::Compression(e.to_string()))
}

/// Decompress a stored block
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    decode_all(data).map_err(|e| Error::Decompression(e.to_string()))
}

/// Decompress a stored block and verify it against its manifest digest
pub fn decompress_and_verify(data: &[u8], expected: &BlockDigest) -> Result<Vec<u8>> {
    let raw = decompress(data)?;
    let actual = BlockDigest::from_data(&raw);
    if actual != *expected {
        return Err(Error::DigestMismatch {
            expected: expected.to_hex(),
            got: actual.to_hex(),
        });
    }
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compress_roundtrip() {
        let data = b"block payload that should compress well ".repeat(100);
        let compressed = compress(&data).unwrap();
        assert!(compressed.len() < data.len());
        let decompressed = decompress(&compressed).unwrap();
        assert_eq!(data, decompressed);
    }

    #[test]
    fn test_verify_accepts_matching_digest() {
        let data = vec![7u8; 4096];
        let digest = BlockDigest::from_data(&data);
        let compressed = compress(&data).unwrap();
        let raw = decompress_and_verify(&compressed, &digest).unwrap();
        assert_eq!(raw, data);
    }

    #[test]
    fn test_verify_rejects_wrong_digest() {
        let data = vec![7u8; 4096];
        let other = BlockDigest::from_data(b"something else");
        let compressed = compress(&data).unwrap();
        match decompress_and_verify(&compressed, &other) {
            Err(Error::DigestMismatch { .. }) => {}
            other => panic!("expected digest mismatch, got {:?}", other.map(|v| v.len())),
        }
    }

    #[test]
    fn test_decompress_rejects_garbage() {
        assert!(decompress(b"definitely not zstd").is_err());
    }
}
