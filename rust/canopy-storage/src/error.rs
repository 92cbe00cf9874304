use thiserror::Error;

/// The common error type used by this crate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanopyStorageError {
    /// An error that occurs while encoding a block of bytes
    #[error("Failed to encode a block: {0}")]
    EncodeFailed(String),

    /// An error that occurs while decoding a block of bytes
    #[error("Failed to decode a block: {0}")]
    DecodeFailed(String),

    /// An error that occurs when working with a storage backend
    #[error("Storage backend error: {0}")]
    StorageBackend(String),
}
