use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::CheckpointError;
use crate::core::traits::CheckpointStore;

/// Keeps cursor positions for the life of the process only.
#[derive(Default)]
pub struct MemoryCheckpoints {
    offsets: Mutex<HashMap<String, i64>>,
}

impl MemoryCheckpoints {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpoints {
    fn load(&self, topic: &str) -> Result<Option<i64>, CheckpointError> {
        let offsets = self.offsets.lock().map_err(|_| CheckpointError::Poisoned)?;
        Ok(offsets.get(topic).copied())
    }

    fn save(&self, topic: &str, offset: i64) -> Result<(), CheckpointError> {
        let mut offsets = self.offsets.lock().map_err(|_| CheckpointError::Poisoned)?;
        offsets.insert(topic.to_string(), offset);
        Ok(())
    }
}

/// JSON file of `topic -> last handled offset`, rewritten on every save.
pub struct FileCheckpoints {
    path: PathBuf,
    offsets: Mutex<BTreeMap<String, i64>>,
}

impl FileCheckpoints {
    /// Opens the checkpoint file, starting empty if it does not exist yet.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, CheckpointError> {
        let path = path.into();
        let offsets = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => BTreeMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(err) => return Err(err.into()),
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            offsets: Mutex::new(offsets),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CheckpointStore for FileCheckpoints {
    fn load(&self, topic: &str) -> Result<Option<i64>, CheckpointError> {
        let offsets = self.offsets.lock().map_err(|_| CheckpointError::Poisoned)?;
        Ok(offsets.get(topic).copied())
    }

    fn save(&self, topic: &str, offset: i64) -> Result<(), CheckpointError> {
        let mut offsets = self.offsets.lock().map_err(|_| CheckpointError::Poisoned)?;
        offsets.insert(topic.to_string(), offset);
        let contents = serde_json::to_vec_pretty(&*offsets)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, contents)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_checkpoints_track_latest() {
        let checkpoints = MemoryCheckpoints::new();
        assert_eq!(checkpoints.load("user.login.attempt").unwrap(), None);
        checkpoints.save("user.login.attempt", 3).unwrap();
        checkpoints.save("user.login.attempt", 4).unwrap();
        assert_eq!(checkpoints.load("user.login.attempt").unwrap(), Some(4));
    }

    #[test]
    fn file_checkpoints_survive_reopen() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state").join("checkpoints.json");

        let checkpoints = FileCheckpoints::open(&path).expect("open");
        checkpoints.save("system.audit.event", 11).unwrap();
        checkpoints.save("user.login.attempt", 2).unwrap();
        drop(checkpoints);

        let reopened = FileCheckpoints::open(&path).expect("reopen");
        assert_eq!(reopened.load("system.audit.event").unwrap(), Some(11));
        assert_eq!(reopened.load("user.login.attempt").unwrap(), Some(2));
        assert_eq!(reopened.load("subject.region.document.request").unwrap(), None);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("checkpoints.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            FileCheckpoints::open(&path),
            Err(CheckpointError::Serialization(_))
        ));
    }
}
