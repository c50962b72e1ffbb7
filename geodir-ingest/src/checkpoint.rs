//! Durable byte-offset checkpoint.
//!
//! The file holds one decimal integer: the source offset already persisted
//! to the destination. A missing or unreadable file means "start of stream".
//!
//! Writes go to a sibling temp file, are fsynced, then renamed over the
//! checkpoint, so a crash leaves either the old or the new offset.

use crate::error::{IngestError, Result};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Checkpoint file for one dataset. Single-writer.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last durable offset, or 0 when absent or unparsable.
    pub fn read(&self) -> u64 {
        match fs::read_to_string(&self.path) {
            Ok(text) => match text.trim().parse::<u64>() {
                Ok(offset) => offset,
                Err(_) => {
                    warn!(path = %self.path.display(), "unparsable checkpoint, starting from 0");
                    0
                }
            },
            Err(_) => 0,
        }
    }

    /// Durably replace the checkpoint with `offset`. Returns once the data is on disk.
    pub fn write(&self, offset: u64) -> Result<()> {
        let tmp = self.tmp_path();
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(offset.to_string().as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            sync_parent(&self.path);
            Ok(())
        };
        write().map_err(IngestError::Checkpoint)?;
        debug!(offset, "checkpoint written");
        Ok(())
    }

    /// Remove the checkpoint after a completed load. Missing file is fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IngestError::Checkpoint(e)),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(unix)]
fn sync_parent(path: &Path) {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
}

#[cfg(not(unix))]
fn sync_parent(_path: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_reads_zero() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join(".import-checkpoint"));
        assert_eq!(store.read(), 0);
    }

    #[test]
    fn test_write_read_clear() {
        let dir = tempfile::tempdir().unwrap();
        let store = CheckpointStore::new(dir.path().join(".import-checkpoint"));
        store.write(1234).unwrap();
        assert_eq!(store.read(), 1234);
        store.write(99).unwrap();
        assert_eq!(store.read(), 99);
        assert!(!dir.path().join(".import-checkpoint.tmp").exists());

        store.clear().unwrap();
        assert!(!store.path().exists());
        assert_eq!(store.read(), 0);
        store.clear().unwrap();
    }

    #[test]
    fn test_garbage_reads_zero() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cp");
        fs::write(&path, "not a number").unwrap();
        assert_eq!(CheckpointStore::new(path).read(), 0);
    }
}
