use crate::error::StoreResult;
use crate::Tree;

/// Key-addressed document store.
///
/// All implementations must satisfy these invariants:
/// - `get` of a key that was never written returns an empty tree.
/// - `put` atomically replaces the entire tree for a key. Once it returns,
///   a subsequent `get` observes exactly what was written.
/// - A failed `put` leaves the previous tree visible.
/// - The store never interprets document contents.
/// - All I/O errors are propagated, never silently ignored.
///
/// Implementations do not serialize read-modify-write sequences; that is the
/// caller's job.
pub trait DocumentStore: Send + Sync {
    /// Read the tree stored under `key`.
    ///
    /// Returns an empty tree if nothing is stored there.
    /// Returns `Err` on I/O failure or a corrupt stored document.
    fn get(&self, key: &str) -> StoreResult<Tree>;

    /// Replace the tree stored under `key`.
    fn put(&self, key: &str, tree: &Tree) -> StoreResult<()>;

    /// List the keys that currently hold a document, sorted.
    fn keys(&self) -> StoreResult<Vec<String>>;

    /// Short backend name used in logs.
    fn name(&self) -> &'static str;
}
