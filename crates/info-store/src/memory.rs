use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{StoreError, StoreResult};
use crate::key::validate_key;
use crate::traits::DocumentStore;
use crate::Tree;

/// In-memory, HashMap-based document store.
///
/// Intended for tests and embedding. All documents are held in memory behind
/// a `RwLock`. Trees are cloned on read/write, and lost when the store is
/// dropped.
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<String, Tree>>,
}

impl InMemoryDocumentStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(HashMap::new()),
        }
    }

    /// Number of documents currently stored. Counts through a poisoned lock.
    pub fn len(&self) -> usize {
        self.documents
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove all documents from the store.
    pub fn clear(&self) -> StoreResult<()> {
        self.documents
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?
            .clear();
        Ok(())
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for InMemoryDocumentStore {
    fn get(&self, key: &str) -> StoreResult<Tree> {
        validate_key(key)?;
        let map = self
            .documents
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        Ok(map.get(key).cloned().unwrap_or_default())
    }

    fn put(&self, key: &str, tree: &Tree) -> StoreResult<()> {
        validate_key(key)?;
        let mut map = self
            .documents
            .write()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        map.insert(key.to_string(), tree.clone());
        Ok(())
    }

    fn keys(&self) -> StoreResult<Vec<String>> {
        let map = self
            .documents
            .read()
            .map_err(|e| StoreError::Poisoned(e.to_string()))?;
        let mut keys: Vec<String> = map.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for InMemoryDocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDocumentStore")
            .field("document_count", &self.len())
            .finish()
    }
}
