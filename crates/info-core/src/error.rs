use info_store::StoreError;
use thiserror::Error;

/// Errors returned by document handler operations.
///
/// A missing document is never an error (it reads as an empty tree), and a
/// pairing code that is unknown or not yet satisfied is reported as an empty
/// result rather than an error.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The request body is not a JSON object, or a required value is missing.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The document key is not acceptable.
    #[error("invalid document key {key:?}: {reason}")]
    InvalidKey { key: String, reason: &'static str },

    /// The common name supplied for a pairing request is not usable.
    #[error("invalid common name {0:?}")]
    InvalidCommonName(String),

    /// Delete-by-name found nothing to remove.
    #[error("no entry named {name:?} in document {key:?}")]
    SubtreeNotFound { key: String, name: String },

    /// A unique pairing code could not be generated.
    #[error("could not generate a unique pairing code for {0:?}")]
    PairingCodeExhausted(String),

    /// The persistence plugin failed; nothing was committed.
    #[error("storage failure: {0}")]
    Storage(StoreError),

    /// Serializing a stored tree back to JSON text failed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl HandlerError {
    /// Whether the caller is at fault (as opposed to the service).
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::MalformedInput(_)
                | Self::InvalidKey { .. }
                | Self::InvalidCommonName(_)
                | Self::SubtreeNotFound { .. }
        )
    }
}

impl From<StoreError> for HandlerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidKey { key, reason } => Self::InvalidKey { key, reason },
            other => Self::Storage(other),
        }
    }
}

impl From<serde_json::Error> for HandlerError {
    fn from(err: serde_json::Error) -> Self {
        Self::MalformedInput(err.to_string())
    }
}

pub type HandlerResult<T> = Result<T, HandlerError>;
