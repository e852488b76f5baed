//! Backup URL codec
//!
//! A backup URL is the driver destination URL plus `backup` and
//! `volume` query parameters:
//!
//! ```text
//! vfs:///srv/backups?backup=backup-abc123&volume=vol-xyz
//! ```

use url::Url;

use crate::error::{StorageError, StorageResult};

fn invalid(url: &str, reason: impl Into<String>) -> StorageError {
    StorageError::InvalidUrl {
        url: url.to_string(),
        reason: reason.into(),
    }
}

/// Encode the canonical URL of a backup at a destination.
pub fn encode_backup_url(
    backup_name: &str,
    volume_name: &str,
    dest_url: &str,
) -> StorageResult<String> {
    let mut url = Url::parse(dest_url).map_err(|e| invalid(dest_url, e.to_string()))?;
    url.query_pairs_mut()
        .clear()
        .append_pair("backup", backup_name)
        .append_pair("volume", volume_name);
    Ok(url.to_string())
}

/// Decode a backup URL into `(backup_name, volume_name, dest_url)`.
/// The returned destination has the query stripped and is what the
/// driver registry resolves.
pub fn decode_backup_url(backup_url: &str) -> StorageResult<(String, String, String)> {
    let mut url = Url::parse(backup_url).map_err(|e| invalid(backup_url, e.to_string()))?;

    let mut backup_name = None;
    let mut volume_name = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "backup" => backup_name = Some(value.into_owned()),
            "volume" => volume_name = Some(value.into_owned()),
            _ => {}
        }
    }

    let backup_name = backup_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| invalid(backup_url, "missing backup parameter"))?;
    let volume_name = volume_name
        .filter(|name| !name.is_empty())
        .ok_or_else(|| invalid(backup_url, "missing volume parameter"))?;

    url.set_query(None);
    Ok((backup_name, volume_name, url.to_string()))
}
