use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use info_store::{validate_key, DocumentStore};
use serde_json::Value;
use tracing::{debug, info, instrument};

use crate::error::{HandlerError, HandlerResult};
use crate::locks::KeyLocks;
use crate::pairing::{self, PAIRING_KEY};
use crate::Tree;

/// Attempts at drawing an unused pairing code before giving up.
const MAX_CODE_ATTEMPTS: usize = 64;

/// Orchestrates document reads, writes, and pairing delivery on top of a
/// persistence plugin.
///
/// Every mutating operation runs inside the per-key critical section, so
/// concurrent merges never lose updates and a pairing secret is handed out
/// at most once. Reads of whole documents do not lock: plugin writes are
/// atomic.
pub struct DocumentHandler {
    store: Arc<dyn DocumentStore>,
    locks: KeyLocks,
}

impl DocumentHandler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self {
            store,
            locks: KeyLocks::new(),
        }
    }

    /// The persistence plugin backing this handler.
    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Replace the document at `key` with the tree in `body`.
    #[instrument(level = "debug", skip(self, body), fields(plugin = self.store.name()))]
    pub fn store_document(&self, key: &str, body: &str) -> HandlerResult<()> {
        check_key(key)?;
        let tree = parse_tree(body)?;
        self.locks.with_key(key, || -> HandlerResult<()> {
            self.store.put(key, &tree)?;
            debug!(entries = tree.len(), "document stored");
            Ok(())
        })
    }

    /// Deep-merge the patch in `body` into the document at `key`.
    #[instrument(level = "debug", skip(self, body), fields(plugin = self.store.name()))]
    pub fn merge_document(&self, key: &str, body: &str) -> HandlerResult<()> {
        check_key(key)?;
        let patch = parse_tree(body)?;
        self.locks.with_key(key, || -> HandlerResult<()> {
            let mut current = self.store.get(key)?;
            info_merge::merge(patch, &mut current);
            self.store.put(key, &current)?;
            debug!(entries = current.len(), "document merged");
            Ok(())
        })
    }

    /// The document at `key`, or an empty tree.
    pub fn get_tree(&self, key: &str) -> HandlerResult<Tree> {
        check_key(key)?;
        Ok(self.store.get(key)?)
    }

    /// The document at `key` as JSON text (`{}` when absent).
    #[instrument(level = "debug", skip(self), fields(plugin = self.store.name()))]
    pub fn get_document(&self, key: &str) -> HandlerResult<String> {
        let tree = self.get_tree(key)?;
        serde_json::to_string(&tree).map_err(|e| HandlerError::Internal(e.to_string()))
    }

    /// Remove the top-level entries of `key` addressed by `name`.
    ///
    /// An entry matches when its entry name equals `name` or when its own
    /// `"name"` attribute does. Returns the number of entries removed; when
    /// nothing matches the document is left unwritten.
    #[instrument(level = "debug", skip(self), fields(plugin = self.store.name()))]
    pub fn delete_subtree(&self, key: &str, name: &str) -> HandlerResult<usize> {
        check_key(key)?;
        if name.is_empty() {
            return Err(HandlerError::MalformedInput("missing entry name".into()));
        }
        self.locks.with_key(key, || -> HandlerResult<usize> {
            let mut tree = self.store.get(key)?;
            let doomed: Vec<String> = tree
                .iter()
                .filter(|(entry_name, entry)| {
                    entry_name.as_str() == name
                        || entry.get("name").and_then(Value::as_str) == Some(name)
                })
                .map(|(entry_name, _)| entry_name.clone())
                .collect();

            if doomed.is_empty() {
                return Err(HandlerError::SubtreeNotFound {
                    key: key.to_string(),
                    name: name.to_string(),
                });
            }
            for entry_name in &doomed {
                tree.remove(entry_name);
            }
            self.store.put(key, &tree)?;
            debug!(removed = doomed.len(), "subtree deleted");
            Ok(doomed.len())
        })
    }

    /// Register a pairing request for `commonname` and return its code.
    ///
    /// The new entry carries no secret. An external issuer fills in `cert`
    /// and `key` later through an ordinary merge.
    #[instrument(level = "debug", skip(self), fields(plugin = self.store.name()))]
    pub fn request_pairing(&self, commonname: &str) -> HandlerResult<String> {
        if !pairing::valid_common_name(commonname) {
            return Err(HandlerError::InvalidCommonName(commonname.to_string()));
        }
        self.locks.with_key(PAIRING_KEY, || -> HandlerResult<String> {
            let mut tree = self.store.get(PAIRING_KEY)?;
            let mut rng = rand::thread_rng();
            let code = (0..MAX_CODE_ATTEMPTS)
                .map(|_| pairing::candidate_code(commonname, &mut rng))
                .find(|code| !pairing::code_in_use(&tree, code))
                .ok_or_else(|| HandlerError::PairingCodeExhausted(commonname.to_string()))?;

            let entry = pairing::new_entry(commonname, &code, Utc::now().timestamp());
            tree.insert(code.clone(), entry);
            self.store.put(PAIRING_KEY, &tree)?;
            info!(cn = commonname, "pairing requested");
            Ok(code)
        })
    }

    /// Claim the pairing entry in `key` whose code is `code`.
    ///
    /// Returns the full entry exactly once: on the call that finds an entry
    /// for the code with its secret present. That call also deletes every
    /// entry carrying the code. Unknown codes and entries still waiting for
    /// their secret both yield `None` and change nothing.
    #[instrument(level = "debug", skip(self, code), fields(plugin = self.store.name()))]
    pub fn get_pairing(&self, key: &str, code: &str) -> HandlerResult<Option<Value>> {
        check_key(key)?;
        self.locks.with_key(key, || -> HandlerResult<Option<Value>> {
            let mut tree = self.store.get(key)?;
            let Some(name) = pairing::find_ready(&tree, code).map(str::to_owned) else {
                debug!("no pairing ready for code");
                return Ok(None);
            };

            let claimed: Vec<String> = pairing::entries_with_code(&tree, code)
                .map(str::to_owned)
                .collect();
            let entry = tree.remove(&name);
            for other in &claimed {
                tree.remove(other);
            }
            self.store.put(key, &tree)?;
            info!(entry = %name, removed = claimed.len(), "pairing delivered");
            Ok(entry)
        })
    }

    /// Drop pairing entries older than `ttl`. Returns how many were removed.
    pub fn sweep_pairings(&self, ttl: Duration) -> HandlerResult<usize> {
        let ttl = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        self.sweep_pairings_before(Utc::now().timestamp().saturating_sub(ttl))
    }

    /// Drop pairing entries created before `cutoff` (UNIX seconds).
    #[instrument(level = "debug", skip(self), fields(plugin = self.store.name()))]
    pub fn sweep_pairings_before(&self, cutoff: i64) -> HandlerResult<usize> {
        self.locks.with_key(PAIRING_KEY, || -> HandlerResult<usize> {
            let mut tree = self.store.get(PAIRING_KEY)?;
            let expired = pairing::expired_entries(&tree, cutoff);
            if expired.is_empty() {
                return Ok(0);
            }
            for name in &expired {
                tree.remove(name);
            }
            self.store.put(PAIRING_KEY, &tree)?;
            info!(removed = expired.len(), "expired pairing entries swept");
            Ok(expired.len())
        })
    }

    /// Number of keys currently holding a document.
    pub fn document_count(&self) -> HandlerResult<usize> {
        Ok(self.store.keys()?.len())
    }
}

impl std::fmt::Debug for DocumentHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentHandler")
            .field("plugin", &self.store.name())
            .field("locked_keys", &self.locks.len())
            .finish()
    }
}

fn check_key(key: &str) -> HandlerResult<()> {
    validate_key(key).map_err(HandlerError::from)
}

/// Parse a request body that must hold a JSON object.
fn parse_tree(body: &str) -> HandlerResult<Tree> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(tree) => Ok(tree),
        _ => Err(HandlerError::MalformedInput(
            "document must be a JSON object".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use info_store::{DiskDocumentStore, InMemoryDocumentStore, StoreError, StoreResult};
    use serde_json::json;
    use std::sync::Barrier;
    use std::thread;

    fn handler() -> DocumentHandler {
        DocumentHandler::new(Arc::new(InMemoryDocumentStore::new()))
    }

    fn doc(h: &DocumentHandler, key: &str) -> Value {
        serde_json::from_str(&h.get_document(key).unwrap()).unwrap()
    }

    /// Store whose writes always fail.
    struct BrokenStore;

    impl DocumentStore for BrokenStore {
        fn get(&self, _key: &str) -> StoreResult<Tree> {
            Ok(Tree::new())
        }
        fn put(&self, _key: &str, _tree: &Tree) -> StoreResult<()> {
            Err(StoreError::Config("read-only".into()))
        }
        fn keys(&self) -> StoreResult<Vec<String>> {
            Ok(Vec::new())
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    /// Store that serves real content but refuses every write.
    struct FrozenStore {
        inner: InMemoryDocumentStore,
    }

    impl DocumentStore for FrozenStore {
        fn get(&self, key: &str) -> StoreResult<Tree> {
            self.inner.get(key)
        }
        fn put(&self, key: &str, _tree: &Tree) -> StoreResult<()> {
            Err(StoreError::Config(format!("{key}: read-only")))
        }
        fn keys(&self) -> StoreResult<Vec<String>> {
            self.inner.keys()
        }
        fn name(&self) -> &'static str {
            "frozen"
        }
    }

    // -----------------------------------------------------------------------
    // Store / merge / get
    // -----------------------------------------------------------------------

    #[test]
    fn missing_document_is_empty_object() {
        let h = handler();
        assert_eq!(h.get_document("user").unwrap(), "{}");
    }

    #[test]
    fn store_then_get_returns_same_tree() {
        let h = handler();
        let body = json!({"alice": {"email": "a@x.org", "quota": [1, 2], "admin": false}});
        h.store_document("user", &body.to_string()).unwrap();
        assert_eq!(doc(&h, "user"), body);
    }

    #[test]
    fn store_then_merge_keeps_both_entries() {
        let h = handler();
        h.store_document("user", r#"{"alice": {"email": "a@x.org"}}"#)
            .unwrap();
        h.merge_document("user", r#"{"bob": {"email": "b@x.org"}}"#)
            .unwrap();
        assert_eq!(
            doc(&h, "user"),
            json!({"alice": {"email": "a@x.org"}, "bob": {"email": "b@x.org"}})
        );
    }

    #[test]
    fn store_overwrites_whole_document() {
        let h = handler();
        h.store_document("project", r#"{"p1": {}, "p2": {}}"#).unwrap();
        h.store_document("project", r#"{"p3": {}}"#).unwrap();
        assert_eq!(doc(&h, "project"), json!({"p3": {}}));
    }

    #[test]
    fn merge_creates_missing_document() {
        let h = handler();
        h.merge_document("cluster", r#"{"c1": {"size": 3}}"#).unwrap();
        assert_eq!(doc(&h, "cluster"), json!({"c1": {"size": 3}}));
    }

    #[test]
    fn disjoint_merges_commute() {
        let a = handler();
        let b = handler();
        let p1 = r#"{"alice": {"email": "a@x.org"}}"#;
        let p2 = r#"{"bob": {"name": "Bob"}}"#;
        for h in [&a, &b] {
            h.store_document("user", r#"{"carol": {}}"#).unwrap();
        }
        a.merge_document("user", p1).unwrap();
        a.merge_document("user", p2).unwrap();
        b.merge_document("user", p2).unwrap();
        b.merge_document("user", p1).unwrap();
        assert_eq!(doc(&a, "user"), doc(&b, "user"));
    }

    #[test]
    fn malformed_json_rejected_without_write() {
        let h = handler();
        let err = h.merge_document("user", "{not json").unwrap_err();
        assert!(matches!(err, HandlerError::MalformedInput(_)));
        let err = h.store_document("user", "[1, 2]").unwrap_err();
        assert!(matches!(err, HandlerError::MalformedInput(_)));
        assert!(h.store().keys().unwrap().is_empty());
    }

    #[test]
    fn invalid_key_rejected() {
        let h = handler();
        assert!(matches!(
            h.store_document("../etc", "{}"),
            Err(HandlerError::InvalidKey { .. })
        ));
        assert!(matches!(
            h.get_document(""),
            Err(HandlerError::InvalidKey { .. })
        ));
    }

    #[test]
    fn storage_failure_propagates() {
        let h = DocumentHandler::new(Arc::new(BrokenStore));
        let err = h.merge_document("user", "{}").unwrap_err();
        assert!(matches!(err, HandlerError::Storage(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn failed_write_leaves_prior_content() {
        let inner = InMemoryDocumentStore::new();
        let prior = json!({"alice": {"email": "a@x.org"}});
        inner.put("user", prior.as_object().unwrap()).unwrap();
        let h = DocumentHandler::new(Arc::new(FrozenStore { inner }));

        let err = h.merge_document("user", r#"{"bob": {}}"#).unwrap_err();
        assert!(matches!(err, HandlerError::Storage(_)));
        assert!(h.delete_subtree("user", "alice").is_err());
        assert_eq!(doc(&h, "user"), prior);
    }

    #[test]
    fn failed_claim_keeps_pairing_entry() {
        let inner = InMemoryDocumentStore::new();
        let code = "hostA-abcdef";
        let pairing = json!({ code: {"pairingcode": code, "cert": "C", "key": "K"} });
        inner.put(PAIRING_KEY, pairing.as_object().unwrap()).unwrap();
        let h = DocumentHandler::new(Arc::new(FrozenStore { inner }));

        assert!(h.get_pairing(PAIRING_KEY, code).is_err());
        assert_eq!(doc(&h, PAIRING_KEY), pairing);
    }

    #[test]
    fn concurrent_merges_lose_no_update() {
        let h = Arc::new(handler());
        let threads = 8;
        let per_thread = 20;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let h = Arc::clone(&h);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..per_thread {
                        let patch = json!({ format!("entry-{t}-{i}"): {"t": t, "i": i} });
                        h.merge_document("allocation", &patch.to_string()).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let tree = h.get_tree("allocation").unwrap();
        assert_eq!(tree.len(), threads * per_thread);
    }

    #[test]
    fn works_over_disk_plugin() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskDocumentStore::open(dir.path()).unwrap().without_sync();
        let h = DocumentHandler::new(Arc::new(store));
        h.store_document("user", r#"{"alice": {}}"#).unwrap();
        h.merge_document("user", r#"{"bob": {}}"#).unwrap();
        assert_eq!(h.get_tree("user").unwrap().len(), 2);
        assert_eq!(h.document_count().unwrap(), 1);
    }

    // -----------------------------------------------------------------------
    // Subtree delete
    // -----------------------------------------------------------------------

    #[test]
    fn delete_by_entry_name() {
        let h = handler();
        h.store_document("allocation", r#"{"a1": {}, "a2": {}}"#)
            .unwrap();
        assert_eq!(h.delete_subtree("allocation", "a1").unwrap(), 1);
        assert_eq!(doc(&h, "allocation"), json!({"a2": {}}));
    }

    #[test]
    fn delete_by_name_attribute() {
        let h = handler();
        h.store_document(
            "allocation",
            r#"{"x1": {"name": "alice.cluster"}, "x2": {"name": "bob.cluster"}}"#,
        )
        .unwrap();
        assert_eq!(h.delete_subtree("allocation", "bob.cluster").unwrap(), 1);
        assert_eq!(doc(&h, "allocation"), json!({"x1": {"name": "alice.cluster"}}));
    }

    #[test]
    fn delete_missing_reports_not_found() {
        let h = handler();
        h.store_document("allocation", r#"{"a1": {}}"#).unwrap();
        let err = h.delete_subtree("allocation", "zzz").unwrap_err();
        assert!(matches!(err, HandlerError::SubtreeNotFound { .. }));
        assert_eq!(doc(&h, "allocation"), json!({"a1": {}}));
        // Nothing is written for an absent document either.
        assert!(h.delete_subtree("nodes", "n1").is_err());
        assert!(!h.store().keys().unwrap().contains(&"nodes".to_string()));
    }

    #[test]
    fn delete_empty_name_is_malformed() {
        let h = handler();
        assert!(matches!(
            h.delete_subtree("user", ""),
            Err(HandlerError::MalformedInput(_))
        ));
    }

    // -----------------------------------------------------------------------
    // Pairing
    // -----------------------------------------------------------------------

    fn attach_secret(h: &DocumentHandler, code: &str) {
        let patch = json!({ code: {"pairingcode": code, "cert": "Y2VydA==", "key": "a2V5"} });
        h.merge_document(PAIRING_KEY, &patch.to_string()).unwrap();
    }

    #[test]
    fn request_pairing_code_format() {
        let h = handler();
        let code = h.request_pairing("hostA").unwrap();
        let suffix = code.strip_prefix("hostA-").expect("code starts with cn");
        assert_eq!(suffix.len(), 6);
        assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric()));

        let tree = h.get_tree(PAIRING_KEY).unwrap();
        assert_eq!(tree[&code]["cn"], "hostA");
        assert_eq!(tree[&code]["pairingcode"], json!(code));
        assert!(tree[&code]["created"].is_i64());
    }

    #[test]
    fn request_pairing_codes_are_unique() {
        let h = handler();
        let codes: std::collections::HashSet<_> =
            (0..50).map(|_| h.request_pairing("host").unwrap()).collect();
        assert_eq!(codes.len(), 50);
        assert_eq!(h.get_tree(PAIRING_KEY).unwrap().len(), 50);
    }

    #[test]
    fn request_pairing_rejects_bad_common_name() {
        let h = handler();
        assert!(matches!(
            h.request_pairing(""),
            Err(HandlerError::InvalidCommonName(_))
        ));
        assert!(h.request_pairing("two words").is_err());
    }

    #[test]
    fn pending_pairing_is_repeatable() {
        let h = handler();
        let code = h.request_pairing("hostA").unwrap();
        for _ in 0..5 {
            assert_eq!(h.get_pairing(PAIRING_KEY, &code).unwrap(), None);
        }
        assert!(h.get_tree(PAIRING_KEY).unwrap().contains_key(&code));
    }

    #[test]
    fn pairing_delivered_exactly_once() {
        let h = handler();
        let code = h.request_pairing("hostA").unwrap();
        assert_eq!(h.get_pairing(PAIRING_KEY, &code).unwrap(), None);

        attach_secret(&h, &code);

        let payload = h.get_pairing(PAIRING_KEY, &code).unwrap().expect("payload");
        assert_eq!(payload["cert"], "Y2VydA==");
        assert_eq!(payload["key"], "a2V5");
        assert_eq!(payload["cn"], "hostA");

        assert_eq!(h.get_pairing(PAIRING_KEY, &code).unwrap(), None);
        assert!(!h.get_tree(PAIRING_KEY).unwrap().contains_key(&code));
    }

    #[test]
    fn secret_filed_under_common_name_is_delivered() {
        let h = handler();
        let code = h.request_pairing("hostA").unwrap();
        let patch = json!({"hostA": {"cn": "hostA", "pairingcode": code, "cert": "C", "key": "K"}});
        h.merge_document(PAIRING_KEY, &patch.to_string()).unwrap();

        let payload = h.get_pairing(PAIRING_KEY, &code).unwrap().expect("payload");
        assert_eq!(payload["cert"], "C");
        assert_eq!(payload["key"], "K");

        for _ in 0..4 {
            assert_eq!(h.get_pairing(PAIRING_KEY, &code).unwrap(), None);
        }
        // The pending request for the same code is gone too.
        assert!(h.get_tree(PAIRING_KEY).unwrap().is_empty());
    }

    #[test]
    fn unknown_code_is_empty() {
        let h = handler();
        h.request_pairing("hostA").unwrap();
        assert_eq!(h.get_pairing(PAIRING_KEY, "hostA-XXXXXX").unwrap(), None);
        assert_eq!(h.get_pairing("user", "anything").unwrap(), None);
    }

    #[test]
    fn consuming_one_entry_leaves_others() {
        let h = handler();
        let a = h.request_pairing("hostA").unwrap();
        let b = h.request_pairing("hostB").unwrap();
        attach_secret(&h, &a);
        assert!(h.get_pairing(PAIRING_KEY, &a).unwrap().is_some());
        let tree = h.get_tree(PAIRING_KEY).unwrap();
        assert!(tree.contains_key(&b));
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn concurrent_claims_deliver_once() {
        let h = Arc::new(handler());
        let code = h.request_pairing("hostA").unwrap();
        attach_secret(&h, &code);

        let callers = 16;
        let barrier = Arc::new(Barrier::new(callers));
        let handles: Vec<_> = (0..callers)
            .map(|_| {
                let h = Arc::clone(&h);
                let barrier = Arc::clone(&barrier);
                let code = code.clone();
                thread::spawn(move || {
                    barrier.wait();
                    h.get_pairing(PAIRING_KEY, &code).unwrap()
                })
            })
            .collect();

        let delivered = handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(Option::is_some)
            .count();
        assert_eq!(delivered, 1);
        assert!(h.get_tree(PAIRING_KEY).unwrap().is_empty());
    }

    #[test]
    fn sweep_removes_only_expired_requests() {
        let h = handler();
        let code = h.request_pairing("hostA").unwrap();
        h.merge_document(
            PAIRING_KEY,
            r#"{"stale": {"pairingcode": "stale-AAAAAA", "created": 5},
                "manual": {"pairingcode": "manual-BBBBBB"}}"#,
        )
        .unwrap();

        assert_eq!(h.sweep_pairings_before(100).unwrap(), 1);
        let tree = h.get_tree(PAIRING_KEY).unwrap();
        assert!(tree.contains_key(&code));
        assert!(tree.contains_key("manual"));
        assert!(!tree.contains_key("stale"));

        assert_eq!(h.sweep_pairings(Duration::from_secs(3600)).unwrap(), 0);
    }

    #[test]
    fn debug_shows_plugin() {
        let h = handler();
        assert!(format!("{h:?}").contains("memory"));
    }
}
