//! Merge engine for the Information Service.
//!
//! Implements the right-biased deep union used by merge-on-write updates.
//! For every key in the source tree:
//!
//! - if both sides hold a JSON object at that key, merge recursively;
//! - otherwise the source value replaces the destination value (scalars,
//!   arrays, `null`, and object/scalar swaps in either direction).
//!
//! Keys present only in the destination are never touched. There is no way
//! to delete a field through a merge; removal needs a full overwrite.
//!
//! ```
//! use info_merge::merged;
//! use serde_json::json;
//!
//! let a = json!({"first": {"all_rows": {"pass": "dog", "number": "1"}}});
//! let b = json!({"first": {"all_rows": {"fail": "cat", "number": "5"}}});
//!
//! let out = merged(b.as_object().unwrap(), a.as_object().unwrap());
//! assert_eq!(
//!     serde_json::Value::Object(out),
//!     json!({"first": {"all_rows": {"pass": "dog", "number": "5", "fail": "cat"}}})
//! );
//! ```

use serde_json::{Map, Value};

/// A JSON object tree.
pub type Tree = Map<String, Value>;

/// Merge `source` into `destination` in place.
///
/// `source` is consumed so its subtrees can be moved rather than cloned.
pub fn merge(source: Tree, destination: &mut Tree) {
    for (key, incoming) in source {
        match destination.get_mut(&key) {
            Some(Value::Object(existing)) if incoming.is_object() => {
                if let Value::Object(patch) = incoming {
                    merge(patch, existing);
                }
            }
            _ => {
                tracing::trace!(key = %key, "merge overwrite");
                destination.insert(key, incoming);
            }
        }
    }
}

/// Return a new tree holding `source` merged into a copy of `destination`.
pub fn merged(source: &Tree, destination: &Tree) -> Tree {
    let mut out = destination.clone();
    merge(source.clone(), &mut out);
    out
}
