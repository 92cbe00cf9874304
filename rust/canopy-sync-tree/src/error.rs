use canopy_storage::CanopyStorageError;
use thiserror::Error;

use crate::{FetchError, SessionId};

/// The common error type used by this crate
#[derive(Error, Debug)]
pub enum SyncTreeError {
    /// Bytes failed to parse as a valid node encoding
    #[error("Malformed node: {0}")]
    MalformedNode(String),

    /// A decoded node's recomputed hash does not match the hash used to
    /// request it
    #[error("Node content does not match its hash: {0}")]
    HashMismatch(String),

    /// The network collaborator could not resolve a hash
    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    /// The tree as constructed is not valid
    #[error("Invalid tree construction: {0}")]
    InvalidConstruction(String),

    /// The tree did not match the expected shape
    #[error("Tree did not match expected shape: {0}")]
    UnexpectedTreeShape(String),

    /// There was a problem when accessing storage
    #[error("Storage error: {0}")]
    Storage(#[from] CanopyStorageError),

    /// An operation referenced a session that is not registered
    #[error("Unknown session: {0}")]
    UnknownSession(SessionId),
}
