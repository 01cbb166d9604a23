//! Persistence plugins for the Information Service.
//!
//! This crate implements the key-addressed document store that sits under the
//! document handler. Every document is a JSON object (a [`Tree`]) stored under
//! a short logical key such as `user`, `project` or `pairing`. The store never
//! interprets document contents -- it only reads and replaces whole trees.
//!
//! # Storage Backends
//!
//! All backends implement the [`DocumentStore`] trait:
//!
//! - [`InMemoryDocumentStore`] -- `HashMap`-based store for tests and embedding
//! - [`DiskDocumentStore`] -- one JSON file per key, replaced atomically
//!
//! Backends are selected at startup by name through [`open_store`].
//!
//! # Design Rules
//!
//! 1. `get` of an unknown key returns an empty tree, never an error.
//! 2. `put` replaces the whole tree for a key, all-or-nothing.
//! 3. The store performs no read-modify-write locking; callers serialize
//!    writes per key.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod disk;
pub mod error;
pub mod key;
pub mod memory;
pub mod registry;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use disk::DiskDocumentStore;
pub use error::{StoreError, StoreResult};
pub use key::{validate_key, MAX_KEY_LEN};
pub use memory::InMemoryDocumentStore;
pub use registry::{open_store, PersistenceConfig, StoreKind};
pub use traits::DocumentStore;

/// A stored document: a JSON object mapping entry names to values.
pub type Tree = serde_json::Map<String, serde_json::Value>;
