#![warn(missing_docs)]

//! Storage primitives consumed by the sync tree: the [`NodeHash`] content
//! hash, the [`StorageBackend`] facade over a key/value substrate, and a
//! trivial in-memory backend for tests and emulation.
//!
//! Everything a tree node references is addressed by its hash, so a
//! backend keyed by [`NodeHash`] is all the durability this workspace
//! requires; richer substrates are expected to live behind the same
//! facade.

mod error;
pub use error::*;

mod hash;
pub use hash::*;

mod backend;
pub use backend::*;
