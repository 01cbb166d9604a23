//! Backend selection by name.
//!
//! The service picks its persistence plugin at startup from configuration.
//! [`open_store`] is the single place that maps a [`StoreKind`] to a concrete
//! [`DocumentStore`].

use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::disk::DiskDocumentStore;
use crate::error::{StoreError, StoreResult};
use crate::memory::InMemoryDocumentStore;
use crate::traits::DocumentStore;

/// Available persistence plugins.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Memory,
    Disk,
}

impl FromStr for StoreKind {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "disk" => Ok(Self::Disk),
            _ => Err(StoreError::UnknownPlugin(s.to_string())),
        }
    }
}

impl std::fmt::Display for StoreKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Memory => write!(f, "memory"),
            Self::Disk => write!(f, "disk"),
        }
    }
}

/// `[persistence]` configuration section.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub plugin: StoreKind,
    /// Root directory for the disk plugin.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
    /// `fsync` every write (disk plugin only).
    pub sync: bool,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            plugin: StoreKind::Memory,
            directory: None,
            sync: true,
        }
    }
}

/// Construct the configured persistence plugin.
pub fn open_store(config: &PersistenceConfig) -> StoreResult<Arc<dyn DocumentStore>> {
    let store: Arc<dyn DocumentStore> = match config.plugin {
        StoreKind::Memory => Arc::new(InMemoryDocumentStore::new()),
        StoreKind::Disk => {
            let directory = config.directory.as_ref().ok_or_else(|| {
                StoreError::Config("disk plugin requires `directory`".into())
            })?;
            let store = DiskDocumentStore::open(directory)?;
            if config.sync {
                Arc::new(store)
            } else {
                Arc::new(store.without_sync())
            }
        }
    };
    info!(plugin = store.name(), "persistence plugin ready");
    Ok(store)
}
