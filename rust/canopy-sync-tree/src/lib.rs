#![warn(missing_docs)]

//! This crate implements a sync tree: a deterministic, content-addressed
//! hash tree over a sorted set of hierarchical names, together with the
//! comparator that reconciles two such trees by exchanging only the ranges
//! that actually differ.
//!
//! Replicas that hold the same logical name set always arrive at the same
//! root hash, no matter the order in which names arrived, because node
//! boundaries are a pure function of the content being split. Comparing two
//! replicas therefore starts (and usually ends) with comparing two hashes;
//! only differing subtrees are fetched and walked.
//!
//! A minimal reconciliation session looks like this:
//!
//! ```rust
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use canopy_sync_tree::{MemoryNodeFetcher, Name, NodeBuilder, Syncer};
//!
//! let names: Vec<Name> = (0u8..100)
//!     .map(|index| Name::from_components([b"item".to_vec(), vec![index]]))
//!     .collect();
//!
//! // A remote replica holds a tree over the name set
//! let remote = MemoryNodeFetcher::default();
//! let root = NodeBuilder::build_with(&names, |node| {
//!     remote.insert_node(node.clone());
//! })?
//! .expect("non-empty set");
//!
//! // A local session discovers every name it does not already hold
//! let mut syncer = Syncer::new(remote);
//! syncer.register_callback(
//!     Box::new(|name: &Name| println!("discovered {name}")),
//!     1,
//!     None,
//!     None,
//! );
//! let entry = syncer.node_cache().intern(root)?;
//! syncer.add_pending(1, entry)?;
//! syncer.run_until_quiescent(1).await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

mod name;
pub use name::*;

mod element;
pub use element::*;

mod io;
pub use io::*;

mod codec;
pub use codec::*;

mod node;
pub use node::*;

mod builder;
pub use builder::*;

mod cursor;
pub use cursor::*;

mod cache;
pub use cache::*;

mod fetch;
pub use fetch::*;

mod compare;
pub use compare::*;

mod session;
pub use session::*;

mod traverse;
pub use traverse::*;

/// Deterministic fixture generators for tests and development.
#[cfg(any(test, feature = "helpers"))]
mod helpers;
#[cfg(any(test, feature = "helpers"))]
pub use helpers::*;
