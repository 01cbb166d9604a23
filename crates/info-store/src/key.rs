//! Document key validation.
//!
//! Valid document keys:
//! - Must be non-empty and at most [`MAX_KEY_LEN`] characters
//! - May only contain ASCII letters, digits, `_`, `-` and `.`
//! - Must not start with `.`
//!
//! Keys double as file names in the disk backend, so these rules also rule
//! out path traversal and hidden files.

use crate::error::{StoreError, StoreResult};

/// Longest accepted document key.
pub const MAX_KEY_LEN: usize = 128;

/// Validate a document key, returning `Ok(())` if valid.
///
/// # Examples
///
/// ```
/// use info_store::validate_key;
///
/// assert!(validate_key("user").is_ok());
/// assert!(validate_key("pairing").is_ok());
/// assert!(validate_key("").is_err());
/// assert!(validate_key("../etc").is_err());
/// ```
pub fn validate_key(key: &str) -> StoreResult<()> {
    let invalid = |reason| StoreError::InvalidKey {
        key: key.to_string(),
        reason,
    };

    if key.is_empty() {
        return Err(invalid("key must not be empty"));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(invalid("key is too long"));
    }
    if key.starts_with('.') {
        return Err(invalid("key must not start with '.'"));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(invalid("key may only contain [A-Za-z0-9_.-]"));
    }
    Ok(())
}
