//! Document handler for the Information Service.
//!
//! Sits between the HTTP layer and the persistence plugin. It owns the
//! correctness story of the service:
//!
//! - **Store** replaces a whole document; **merge** deep-unions a patch into
//!   the current document (see `info-merge`).
//! - Every read-modify-write runs under a per-key lock ([`KeyLocks`]), so
//!   concurrent writers to one key never lose updates while writers to
//!   different keys proceed in parallel.
//! - **Pairing** hands a generated credential to its requester exactly once:
//!   the claim that finds the secret deletes the entry in the same critical
//!   section.
//!
//! # Modules
//!
//! - [`handler`] -- [`DocumentHandler`], the operations exposed over REST
//! - [`locks`] -- [`KeyLocks`], the per-key lock table
//! - [`pairing`] -- pairing entry layout and code generation
//! - [`error`] -- [`HandlerError`]

pub mod error;
pub mod handler;
pub mod locks;
pub mod pairing;

pub use error::{HandlerError, HandlerResult};
pub use handler::DocumentHandler;
pub use info_store::Tree;
pub use locks::KeyLocks;
pub use pairing::PAIRING_KEY;
