use std::path::PathBuf;

/// Errors from document store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The key is not a legal document key.
    #[error("invalid document key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// A stored document could not be decoded.
    #[error("corrupt document for key {key}: {reason}")]
    CorruptDocument { key: String, reason: String },

    /// Serialization failure while encoding a document.
    #[error("serialization error for key {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// I/O error from the underlying storage backend.
    #[error("I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configured backend name is unknown.
    #[error("unknown persistence plugin: {0}")]
    UnknownPlugin(String),

    /// The backend is missing a required setting.
    #[error("persistence configuration error: {0}")]
    Config(String),

    /// A lock guarding in-process state was poisoned.
    #[error("store lock poisoned: {0}")]
    Poisoned(String),
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
