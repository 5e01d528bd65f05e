//! Snapshot manifest
//!
//! The manifest is the authoritative descriptor of a persisted snapshot.
//!
//! Format:
//! ```json
//! {
//!   "snapshot_id": "20261019T113000Z-3f2a9c1b",
//!   "created_at": "2026-10-19T11:30:00Z",
//!   "offset_during_snapshot": 4211,
//!   "state_checksum": "crc32:deadbeef",
//!   "format_version": 1
//! }
//! ```

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::errors::{SnapshotError, SnapshotResult};

/// Current manifest format version
pub const MANIFEST_FORMAT_VERSION: u8 = 1;

/// Snapshot manifest
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotManifest {
    /// Snapshot identifier
    pub snapshot_id: String,

    /// Creation timestamp in RFC3339 format
    pub created_at: String,

    /// Events-stream offset the state corresponds to
    pub offset_during_snapshot: i64,

    /// CRC32 of the state payload (format: "crc32:XXXXXXXX")
    pub state_checksum: String,

    /// Manifest format version
    pub format_version: u8,
}

impl SnapshotManifest {
    /// Creates a new snapshot manifest.
    pub fn new(
        snapshot_id: impl Into<String>,
        created_at: impl Into<String>,
        offset_during_snapshot: i64,
        state_checksum: impl Into<String>,
    ) -> Self {
        Self {
            snapshot_id: snapshot_id.into(),
            created_at: created_at.into(),
            offset_during_snapshot,
            state_checksum: state_checksum.into(),
            format_version: MANIFEST_FORMAT_VERSION,
        }
    }

    /// Serializes the manifest to pretty-printed JSON.
    pub fn to_json(&self) -> SnapshotResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            SnapshotError::manifest_error(format!("Failed to serialize manifest: {}", e))
        })
    }

    /// Deserializes a manifest from JSON and checks its format version.
    pub fn from_json(json: &str) -> SnapshotResult<Self> {
        let manifest: Self = serde_json::from_str(json).map_err(|e| {
            SnapshotError::manifest_error(format!("Failed to parse manifest: {}", e))
        })?;

        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(SnapshotError::manifest_error(format!(
                "Unsupported manifest format version: {}",
                manifest.format_version
            )));
        }

        Ok(manifest)
    }

    /// Writes the manifest to a file with fsync.
    pub fn write_to_file(&self, path: &Path) -> SnapshotResult<()> {
        let json = self.to_json()?;

        let mut file = File::create(path).map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("Failed to create manifest file: {}", path.display()),
                e,
            )
        })?;

        file.write_all(json.as_bytes()).map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("Failed to write manifest: {}", path.display()),
                e,
            )
        })?;

        file.sync_all().map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("Failed to fsync manifest: {}", path.display()),
                e,
            )
        })?;

        Ok(())
    }

    /// Reads a manifest from a file.
    pub fn read_from_file(path: &Path) -> SnapshotResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SnapshotError::manifest_io_error(
                format!("Failed to read manifest: {}", path.display()),
                e,
            )
        })?;

        Self::from_json(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_manifest() -> SnapshotManifest {
        SnapshotManifest::new(
            "20261019T113000Z-3f2a9c1b",
            "2026-10-19T11:30:00Z",
            4211,
            "crc32:deadbeef",
        )
    }

    #[test]
    fn test_manifest_json_field_names() {
        let json = create_test_manifest().to_json().unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed["snapshot_id"], "20261019T113000Z-3f2a9c1b");
        assert_eq!(parsed["created_at"], "2026-10-19T11:30:00Z");
        assert_eq!(parsed["offset_during_snapshot"], 4211);
        assert_eq!(parsed["state_checksum"], "crc32:deadbeef");
        assert_eq!(parsed["format_version"], 1);
    }

    #[test]
    fn test_manifest_write_and_read_file() {
        let temp_dir = TempDir::new().unwrap();
        let manifest_path = temp_dir.path().join("manifest.json");

        let original = create_test_manifest();
        original.write_to_file(&manifest_path).unwrap();

        let loaded = SnapshotManifest::read_from_file(&manifest_path).unwrap();
        assert_eq!(original, loaded);
    }

    #[test]
    fn test_manifest_rejects_unknown_version() {
        let mut manifest = create_test_manifest();
        manifest.format_version = 9;
        let json = serde_json::to_string(&manifest).unwrap();
        assert!(SnapshotManifest::from_json(&json).is_err());
    }

    #[test]
    fn test_manifest_invalid_json() {
        assert!(SnapshotManifest::from_json("not valid json").is_err());
    }

    #[test]
    fn test_manifest_missing_file() {
        let path = Path::new("/nonexistent/path/manifest.json");
        assert!(SnapshotManifest::read_from_file(path).is_err());
    }
}
