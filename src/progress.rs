//! Durable "next batch to attempt" checkpoint.

use crate::error::DrawResult;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

pub trait ProgressStore {
    /// Index of the next batch to attempt, if a usable checkpoint exists.
    fn load(&self) -> Option<usize>;

    fn save(&mut self, next_batch: usize) -> DrawResult<()>;

    fn clear(&mut self) -> DrawResult<()>;
}

#[derive(Debug, Deserialize, PartialEq, Serialize)]
struct Checkpoint {
    batch_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fingerprint: Option<String>,
}

/// JSON checkpoint on disk, `{"batch_index": n, "fingerprint": "..."}`.
///
/// When the store carries a fingerprint, checkpoints written for a different
/// plan are ignored. Checkpoints without one are accepted as is.
pub struct FileProgressStore {
    path: PathBuf,
    fingerprint: Option<String>,
}

impl FileProgressStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            fingerprint: None,
        }
    }

    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

// a crash mid-write leaves the previous checkpoint in place
fn atomic_write(path: &Path, data: &[u8]) -> DrawResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)?;

    Ok(())
}

impl ProgressStore for FileProgressStore {
    fn load(&self) -> Option<usize> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(error) if error.kind() == io::ErrorKind::NotFound => return None,
            Err(error) => {
                warn!(?error, path = %self.path.display(), "unreadable checkpoint, ignoring");
                return None;
            }
        };

        let checkpoint = match serde_json::from_str::<Checkpoint>(&content) {
            Ok(checkpoint) => checkpoint,
            Err(error) => {
                warn!(?error, path = %self.path.display(), "corrupt checkpoint, ignoring");
                return None;
            }
        };

        match (&self.fingerprint, &checkpoint.fingerprint) {
            (Some(expected), Some(found)) if expected != found => {
                warn!(
                    batch_index = checkpoint.batch_index,
                    "checkpoint belongs to a different plan, ignoring"
                );
                None
            }
            _ => Some(checkpoint.batch_index),
        }
    }

    fn save(&mut self, next_batch: usize) -> DrawResult<()> {
        let checkpoint = Checkpoint {
            batch_index: next_batch,
            fingerprint: self.fingerprint.clone(),
        };

        atomic_write(&self.path, &serde_json::to_vec(&checkpoint)?)
    }

    fn clear(&mut self) -> DrawResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}
