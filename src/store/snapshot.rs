//! On-disk snapshot of the whole store.
//!
//! # Format
//!
//! ```text
//! {
//!   "users":     [User, ...],
//!   "pairCodes": [[code, userId, issuedAt], ...],
//!   "couples":   [Couple, ...],
//!   "revision":  n
//! }
//! ```
//!
//! Older files wrote `pairCodes` entries as `[code, userId]`; those still load.
//! `revision` increases by one on every write, so a process sharing the file
//! can tell whether someone else wrote since it last looked.
//!
//! The file is rewritten wholesale after every mutation: the temp file is
//! flushed to disk before it is renamed over the snapshot, so a crash
//! mid-write never leaves a truncated snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use super::model::{Couple, User};
use crate::error::{PairingError, PairingResult};

/// Serialized form of all entity maps.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// All users.
    #[serde(default)]
    pub users: Vec<User>,
    /// Outstanding pairing codes.
    #[serde(default)]
    pub pair_codes: Vec<StoredPairCode>,
    /// Committed couples.
    #[serde(default)]
    pub couples: Vec<Couple>,
    /// Write counter; absent in files from older versions.
    #[serde(default)]
    pub revision: u64,
}

/// One `pairCodes` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredPairCode {
    /// `[code, userId, issuedAt]`
    Timed(String, String, DateTime<Utc>),
    /// `[code, userId]` as written by older versions.
    Legacy(String, String),
}

/// Read a snapshot. A missing file yields `None`.
pub fn load(path: &Path) -> PairingResult<Option<Snapshot>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(PairingError::Persistence(format!(
                "Failed to read {}: {e}",
                path.display()
            )))
        }
    };

    serde_json::from_str(&content).map(Some).map_err(|e| {
        PairingError::Persistence(format!("Failed to parse {}: {e}", path.display()))
    })
}

/// Atomically replace the snapshot at `path`.
pub fn write(path: &Path, snapshot: &Snapshot) -> PairingResult<()> {
    let persistence = |what: &str, e: &dyn std::fmt::Display| {
        PairingError::Persistence(format!("Failed to {what} {}: {e}", path.display()))
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir).map_err(|e| persistence("create directory for", &e))?;
    }

    let json = serde_json::to_string_pretty(snapshot).map_err(|e| persistence("serialize", &e))?;

    let mut temp_path = path.as_os_str().to_owned();
    temp_path.push(".tmp");
    let temp_path = std::path::PathBuf::from(temp_path);

    let mut file = File::create(&temp_path).map_err(|e| persistence("create", &e))?;
    file.write_all(json.as_bytes())
        .map_err(|e| persistence("write", &e))?;
    file.sync_all().map_err(|e| persistence("sync", &e))?;
    drop(file);
    fs::rename(&temp_path, path).map_err(|e| persistence("replace", &e))?;
    Ok(())
}
