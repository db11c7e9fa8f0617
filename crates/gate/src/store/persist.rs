// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store snapshots: load and write a JSON file with atomic writes.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::store::StoreError;

/// One stored value with its absolute expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub value: String,
    /// Expiry as epoch millis. `None` never expires.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<u64>,
}

impl SnapshotEntry {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        self.expires_at.is_some_and(|at| at <= now_ms)
    }
}

/// Load a snapshot. A missing file is an empty snapshot.
pub fn load(path: &Path) -> Result<HashMap<String, SnapshotEntry>, StoreError> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_str(&contents)?)
}

/// Serialize entries into snapshot text.
pub fn encode(entries: &HashMap<String, SnapshotEntry>) -> Result<String, StoreError> {
    Ok(serde_json::to_string_pretty(entries)?)
}

/// Write snapshot text atomically (write tmp + rename).
///
/// The temp name carries PID + counter so concurrent saves never share a
/// partially written file.
pub fn write(path: &Path, json: &str) -> Result<(), StoreError> {
    use std::sync::atomic::{AtomicU32, Ordering};
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}
