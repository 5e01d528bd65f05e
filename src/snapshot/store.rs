//! On-disk snapshot store
//!
//! Write sequence:
//! 1. Write state.bin.tmp, fsync
//! 2. Write manifest.json.tmp, fsync
//! 3. Rename state.bin.tmp -> state.bin
//! 4. Rename manifest.json.tmp -> manifest.json
//! 5. fsync the snapshot directory
//!
//! A crash before step 4 leaves the previous manifest in place. Its
//! checksum no longer matches a replaced state.bin, so the load fails
//! loudly instead of returning mixed state.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::checksum::{compute_checksum, format_checksum, parse_checksum};
use super::errors::{SnapshotError, SnapshotResult};
use super::manifest::SnapshotManifest;
use super::{SnapshotInfo, SnapshotStore};

const STATE_FILE: &str = "state.bin";
const MANIFEST_FILE: &str = "manifest.json";

/// A `SnapshotStore` keeping the latest snapshot in a directory
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
}

impl FileSnapshotStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> SnapshotResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|e| SnapshotError::io_error_at_path(&dir, e))?;
        Ok(Self { dir })
    }

    /// The directory holding the snapshot.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self) -> PathBuf {
        self.dir.join(STATE_FILE)
    }

    fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }
}

fn write_with_fsync(path: &Path, bytes: &[u8]) -> SnapshotResult<()> {
    let mut file = File::create(path).map_err(|e| SnapshotError::io_error_at_path(path, e))?;
    file.write_all(bytes)
        .map_err(|e| SnapshotError::io_error_at_path(path, e))?;
    file.sync_all()
        .map_err(|e| SnapshotError::io_error_at_path(path, e))
}

fn fsync_dir(path: &Path) -> SnapshotResult<()> {
    let dir = OpenOptions::new()
        .read(true)
        .open(path)
        .map_err(|e| SnapshotError::io_error_at_path(path, e))?;
    dir.sync_all()
        .map_err(|e| SnapshotError::io_error_at_path(path, e))
}

impl SnapshotStore for FileSnapshotStore {
    fn serialize(&mut self, snapshot: &SnapshotInfo) -> SnapshotResult<()> {
        let state_tmp = self.dir.join(format!("{}.tmp", STATE_FILE));
        let manifest_tmp = self.dir.join(format!("{}.tmp", MANIFEST_FILE));

        write_with_fsync(&state_tmp, &snapshot.state)?;

        let manifest = SnapshotManifest::new(
            snapshot.snapshot_id.clone(),
            snapshot.created_at.to_rfc3339(),
            snapshot.offset_during_snapshot,
            format_checksum(compute_checksum(&snapshot.state)),
        );
        manifest.write_to_file(&manifest_tmp)?;

        let state_path = self.state_path();
        fs::rename(&state_tmp, &state_path)
            .map_err(|e| SnapshotError::io_error_at_path(&state_path, e))?;
        let manifest_path = self.manifest_path();
        fs::rename(&manifest_tmp, &manifest_path)
            .map_err(|e| SnapshotError::io_error_at_path(&manifest_path, e))?;

        fsync_dir(&self.dir)
    }

    fn deserialize(&self) -> SnapshotResult<Option<SnapshotInfo>> {
        let manifest_path = self.manifest_path();
        if !manifest_path.exists() {
            return Ok(None);
        }

        let manifest = SnapshotManifest::read_from_file(&manifest_path)?;
        let state_path = self.state_path();
        let state =
            fs::read(&state_path).map_err(|e| SnapshotError::io_error_at_path(&state_path, e))?;

        let expected = parse_checksum(&manifest.state_checksum).ok_or_else(|| {
            SnapshotError::manifest_error(format!(
                "Invalid checksum format: {}",
                manifest.state_checksum
            ))
        })?;
        let actual = compute_checksum(&state);
        if actual != expected {
            return Err(SnapshotError::corrupt(format!(
                "state checksum mismatch for snapshot {}",
                manifest.snapshot_id
            ))
            .with_details(format!(
                "expected {}, found {}",
                manifest.state_checksum,
                format_checksum(actual)
            )));
        }

        let created_at = DateTime::parse_from_rfc3339(&manifest.created_at)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| {
                SnapshotError::manifest_error(format!("Invalid created_at timestamp: {}", e))
            })?;

        Ok(Some(SnapshotInfo {
            snapshot_id: manifest.snapshot_id,
            created_at,
            offset_during_snapshot: manifest.offset_during_snapshot,
            state,
        }))
    }
}
