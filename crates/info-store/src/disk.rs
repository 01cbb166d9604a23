//! File-backed document store.
//!
//! Layout: one file per key, `<directory>/<key>.json`, holding the tree as
//! pretty-printed JSON. Writes go to a temporary file in the same directory
//! which is then renamed over the target, so readers see either the old or
//! the new document, never a torn one.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::{StoreError, StoreResult};
use crate::key::validate_key;
use crate::traits::DocumentStore;
use crate::Tree;

const EXTENSION: &str = "json";

/// Document store persisting each key as a JSON file.
#[derive(Debug)]
pub struct DiskDocumentStore {
    directory: PathBuf,
    /// `fsync` each file before it replaces the previous version.
    sync: bool,
}

impl DiskDocumentStore {
    /// Open (or create) a store rooted at `directory`.
    pub fn open(directory: impl AsRef<Path>) -> StoreResult<Self> {
        let directory = directory.as_ref().to_path_buf();
        fs::create_dir_all(&directory).map_err(|e| StoreError::io(&directory, e))?;
        debug!(directory = %directory.display(), "opened disk document store");
        Ok(Self {
            directory,
            sync: true,
        })
    }

    /// Disable `fsync` on write. Faster, but a crash may lose the last write.
    pub fn without_sync(mut self) -> Self {
        self.sync = false;
        self
    }

    /// Root directory of the store.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.directory.join(format!("{key}.{EXTENSION}"))
    }
}

impl DocumentStore for DiskDocumentStore {
    fn get(&self, key: &str) -> StoreResult<Tree> {
        validate_key(key)?;
        let path = self.path_for(key);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Tree::new()),
            Err(e) => return Err(StoreError::io(path, e)),
        };

        match serde_json::from_slice::<serde_json::Value>(&bytes) {
            Ok(serde_json::Value::Object(tree)) => Ok(tree),
            Ok(other) => Err(StoreError::CorruptDocument {
                key: key.to_string(),
                reason: format!("expected a JSON object, found {}", kind_of(&other)),
            }),
            Err(e) => Err(StoreError::CorruptDocument {
                key: key.to_string(),
                reason: e.to_string(),
            }),
        }
    }

    fn put(&self, key: &str, tree: &Tree) -> StoreResult<()> {
        validate_key(key)?;
        let path = self.path_for(key);
        let payload = serde_json::to_vec_pretty(tree).map_err(|source| {
            StoreError::Serialization {
                key: key.to_string(),
                source,
            }
        })?;

        let mut tmp = NamedTempFile::new_in(&self.directory)
            .map_err(|e| StoreError::io(&self.directory, e))?;
        tmp.write_all(&payload)
            .map_err(|e| StoreError::io(tmp.path(), e))?;
        if self.sync {
            tmp.as_file()
                .sync_all()
                .map_err(|e| StoreError::io(tmp.path(), e))?;
        }
        tmp.persist(&path)
            .map_err(|e| StoreError::io(&path, e.error))?;

        debug!(key, bytes = payload.len(), "document written");
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let entries =
            fs::read_dir(&self.directory).map_err(|e| StoreError::io(&self.directory, e))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::io(&self.directory, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if validate_key(stem).is_err() {
                warn!(path = %path.display(), "ignoring file with invalid key name");
                continue;
            }
            keys.push(stem.to_string());
        }
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "disk"
    }
}

fn kind_of(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "an object",
    }
}
