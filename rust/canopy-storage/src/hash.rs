use std::array::TryFromSliceError;

use base58::ToBase58;

/// The size of a [`NodeHash`] in bytes.
///
/// BLAKE3 produces 256-bit (32-byte) digests by default.
pub const NODE_HASH_SIZE: usize = 32;

/// The BLAKE3 digest that identifies a block of content.
///
/// Hash equality is treated as content equality everywhere in this
/// workspace: two blocks with the same [`NodeHash`] are the same block.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeHash([u8; NODE_HASH_SIZE]);

impl NodeHash {
    /// Computes the BLAKE3 hash of the given bytes.
    pub fn of(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).into())
    }

    /// Computes a single BLAKE3 hash over a sequence of byte chunks, as
    /// though they had been concatenated.
    pub fn of_iter<'a, I>(chunks: I) -> Self
    where
        I: Iterator<Item = &'a [u8]>,
    {
        let mut hasher = blake3::Hasher::new();
        for chunk in chunks {
            hasher.update(chunk);
        }
        Self(hasher.finalize().into())
    }

    /// The raw bytes of this hash.
    pub fn bytes(&self) -> &[u8; NODE_HASH_SIZE] {
        &self.0
    }

    /// An abbreviated display form, suitable for log lines.
    pub fn short(&self) -> String {
        format!("#{}...", self.0[0..6].to_base58())
    }
}

impl From<[u8; NODE_HASH_SIZE]> for NodeHash {
    fn from(value: [u8; NODE_HASH_SIZE]) -> Self {
        NodeHash(value)
    }
}

impl TryFrom<&[u8]> for NodeHash {
    type Error = TryFromSliceError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        Ok(NodeHash(value.try_into()?))
    }
}

impl AsRef<[u8]> for NodeHash {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl std::fmt::Display for NodeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0.to_base58())
    }
}

impl std::fmt::Debug for NodeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "NodeHash({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::NodeHash;

    #[test]
    fn it_hashes_chunks_as_if_concatenated() {
        let whole = NodeHash::of(b"one two");
        let chunked = NodeHash::of_iter([b"one ".as_slice(), b"two".as_slice()].into_iter());
        assert_eq!(whole, chunked);
    }

    #[test]
    fn it_distinguishes_different_content() {
        assert_ne!(NodeHash::of(b"one"), NodeHash::of(b"two"));
    }
}
