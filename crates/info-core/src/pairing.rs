//! Pairing entries.
//!
//! A pairing entry mediates one-time delivery of a credential:
//!
//! ```text
//! "pairing": {
//!     "hostA-3kQz9x": {
//!         "cn": "hostA",
//!         "pairingcode": "hostA-3kQz9x",
//!         "created": 1760486400,
//!         "cert": "<base64>",        // filled in later by the issuer
//!         "key": "<base64>"
//!     }
//! }
//! ```
//!
//! The entry name is the pairing code. Lookups go by the `pairingcode`
//! field, so entries written by an issuer under another name still match.
//! These helpers are pure; locking and persistence live in the handler.

use rand::distributions::Alphanumeric;
use rand::Rng;
use serde_json::{json, Value};

use crate::Tree;

/// Reserved document key holding pairing entries.
pub const PAIRING_KEY: &str = "pairing";

/// Length of the random suffix of a pairing code.
pub const CODE_SUFFIX_LEN: usize = 6;

pub const FIELD_CN: &str = "cn";
pub const FIELD_CODE: &str = "pairingcode";
pub const FIELD_CREATED: &str = "created";
pub const FIELD_CERT: &str = "cert";
pub const FIELD_KEY: &str = "key";

/// Build a candidate code `<cn>-<6 alphanumerics>`.
pub fn candidate_code<R: Rng + ?Sized>(cn: &str, rng: &mut R) -> String {
    let suffix: String = rng
        .sample_iter(&Alphanumeric)
        .take(CODE_SUFFIX_LEN)
        .map(char::from)
        .collect();
    format!("{cn}-{suffix}")
}

/// Whether `code` is already taken in `tree`, as an entry name or a code.
pub fn code_in_use(tree: &Tree, code: &str) -> bool {
    tree.contains_key(code) || entries_with_code(tree, code).next().is_some()
}

fn carries_code(entry: &Value, code: &str) -> bool {
    entry.get(FIELD_CODE).and_then(Value::as_str) == Some(code)
}

/// Names of every entry whose `pairingcode` equals `code`, in document order.
pub fn entries_with_code<'a>(tree: &'a Tree, code: &'a str) -> impl Iterator<Item = &'a str> {
    tree.iter()
        .filter(move |(_, entry)| carries_code(entry, code))
        .map(|(name, _)| name.as_str())
}

/// Name of an entry for `code` that already holds its secret.
///
/// A pending request and an issuer's filled-in copy may both carry the
/// code; the filled-in one wins regardless of order.
pub fn find_ready<'a>(tree: &'a Tree, code: &str) -> Option<&'a str> {
    tree.iter()
        .find(|(_, entry)| carries_code(entry, code) && has_secret(entry))
        .map(|(name, _)| name.as_str())
}

/// Whether an entry carries its secret payload yet.
///
/// Both `cert` and `key` must be present and non-null; empty strings count
/// as placeholders, not payload.
pub fn has_secret(entry: &Value) -> bool {
    [FIELD_CERT, FIELD_KEY].iter().all(|field| match entry.get(*field) {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.is_empty(),
        Some(_) => true,
    })
}

/// A fresh entry awaiting its secret.
pub fn new_entry(cn: &str, code: &str, created: i64) -> Value {
    json!({
        FIELD_CN: cn,
        FIELD_CODE: code,
        FIELD_CREATED: created,
    })
}

/// Names of entries created strictly before `cutoff` (UNIX seconds).
///
/// Entries without a numeric `created` field are never considered expired.
pub fn expired_entries(tree: &Tree, cutoff: i64) -> Vec<String> {
    tree.iter()
        .filter(|(_, entry)| {
            entry
                .get(FIELD_CREATED)
                .and_then(Value::as_i64)
                .is_some_and(|created| created < cutoff)
        })
        .map(|(name, _)| name.clone())
        .collect()
}

/// Check a requester's common name.
pub fn valid_common_name(cn: &str) -> bool {
    !cn.is_empty() && cn.len() <= 64 && !cn.chars().any(|c| c.is_whitespace() || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tree(value: Value) -> Tree {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    #[test]
    fn candidate_code_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = candidate_code("hostA", &mut rng);
        let suffix = code.strip_prefix("hostA-").expect("prefix");
        assert_eq!(suffix.len(), CODE_SUFFIX_LEN);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn codes_vary() {
        let mut rng = rand::thread_rng();
        let a = candidate_code("h", &mut rng);
        let b = candidate_code("h", &mut rng);
        let c = candidate_code("h", &mut rng);
        assert!(a != b || b != c);
    }

    #[test]
    fn lookup_matches_field_not_name() {
        let t = tree(json!({
            "jhover4": {"cn": "jhover4", "pairingcode": "jhover4-JPVMCP"},
            "other": {"pairingcode": "other-AAAAAA"}
        }));
        let names: Vec<&str> = entries_with_code(&t, "jhover4-JPVMCP").collect();
        assert_eq!(names, vec!["jhover4"]);
        assert_eq!(entries_with_code(&t, "jhover4").count(), 0);
        assert!(code_in_use(&t, "other"));
        assert!(code_in_use(&t, "other-AAAAAA"));
        assert!(!code_in_use(&t, "nobody-ZZZZZZ"));
    }

    #[test]
    fn lookup_skips_non_object_entries() {
        let t = tree(json!({"junk": "scalar", "n": 3}));
        assert_eq!(entries_with_code(&t, "scalar").count(), 0);
        assert_eq!(find_ready(&t, "scalar"), None);
    }

    #[test]
    fn ready_entry_found_behind_pending_one() {
        let t = tree(json!({
            "hostA-abcdef": {"cn": "hostA", "pairingcode": "hostA-abcdef", "created": 1},
            "hostA": {"cn": "hostA", "pairingcode": "hostA-abcdef", "cert": "C", "key": "K"}
        }));
        assert_eq!(find_ready(&t, "hostA-abcdef"), Some("hostA"));
        assert_eq!(entries_with_code(&t, "hostA-abcdef").count(), 2);
    }

    #[test]
    fn pending_only_is_not_ready() {
        let t = tree(json!({"hostA-abcdef": new_entry("hostA", "hostA-abcdef", 1)}));
        assert_eq!(find_ready(&t, "hostA-abcdef"), None);
    }

    #[test]
    fn secret_detection() {
        assert!(!has_secret(&json!({"pairingcode": "x"})));
        assert!(!has_secret(&json!({"cert": "abc"})));
        assert!(!has_secret(&json!({"cert": "abc", "key": null})));
        assert!(!has_secret(&json!({"cert": "", "key": "k"})));
        assert!(has_secret(&json!({"cert": "abc", "key": "def"})));
    }

    #[test]
    fn new_entry_fields() {
        let e = new_entry("hostA", "hostA-abcdef", 100);
        assert_eq!(e[FIELD_CN], "hostA");
        assert_eq!(e[FIELD_CODE], "hostA-abcdef");
        assert_eq!(e[FIELD_CREATED], 100);
        assert!(!has_secret(&e));
    }

    #[test]
    fn expiry_ignores_entries_without_timestamp() {
        let t = tree(json!({
            "old": {"created": 10},
            "new": {"created": 500},
            "external": {"pairingcode": "x"}
        }));
        assert_eq!(expired_entries(&t, 100), vec!["old".to_string()]);
    }

    #[test]
    fn common_name_rules() {
        assert!(valid_common_name("hostA"));
        assert!(valid_common_name("node-01.example.org"));
        assert!(!valid_common_name(""));
        assert!(!valid_common_name("has space"));
        assert!(!valid_common_name(&"x".repeat(65)));
    }
}
