use std::{collections::HashMap, sync::Arc};

use canopy_common::SharedCell;
use canopy_storage::NodeHash;

use crate::{Node, SyncTreeError, TreeCursor};

/// The content-addressed store mapping hashes to [`TreeCursor`]s.
///
/// The cache is the single source of truth for resolving a hash into
/// content once it is known. Interning is atomic get-or-create: two
/// sessions discovering the same subtree concurrently converge on one
/// shared cursor rather than racing to create duplicates. Because content
/// addressing guarantees that any two constructions of the same hash are
/// content-identical, a racing resolution is safe: resolution is
/// idempotent.
///
/// No eviction happens at this layer; callers needing bounded memory must
/// wrap it.
#[derive(Clone, Default)]
pub struct NodeCache {
    entries: Arc<SharedCell<HashMap<NodeHash, TreeCursor>>>,
}

impl NodeCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The cursor for `hash`, if one has been interned.
    pub fn get(&self, hash: &NodeHash) -> Option<TreeCursor> {
        self.entries.read().get(hash).cloned()
    }

    /// Intern a resolved node, returning its shared cursor.
    ///
    /// If a cursor for the node's hash already exists it is returned (and
    /// resolved with this content if it was still pending); otherwise a
    /// resolved cursor is created and stored.
    pub fn intern(&self, node: Node) -> Result<TreeCursor, SyncTreeError> {
        let mut entries = self.entries.write();
        match entries.get(&node.hash()) {
            Some(cursor) => {
                let cursor = cursor.clone();
                drop(entries);
                cursor.install(node)?;
                Ok(cursor)
            }
            None => {
                let cursor = TreeCursor::resolved(node);
                entries.insert(cursor.hash(), cursor.clone());
                Ok(cursor)
            }
        }
    }

    /// Get or create an unresolved cursor for `hash`.
    pub fn intern_pending(&self, hash: NodeHash) -> TreeCursor {
        let mut entries = self.entries.write();
        entries
            .entry(hash)
            .or_insert_with(|| TreeCursor::pending(hash))
            .clone()
    }

    /// Transition the cursor for `hash` from pending to resolved.
    ///
    /// Content whose hash does not equal `hash` violates the
    /// content-addressing integrity guarantee: it is rejected and never
    /// stored. Resolving an already-resolved cursor with (necessarily
    /// identical) content is a no-op.
    pub fn resolve(&self, hash: NodeHash, node: Node) -> Result<TreeCursor, SyncTreeError> {
        if node.hash() != hash {
            return Err(SyncTreeError::HashMismatch(format!(
                "{} offered for {}",
                node.hash().short(),
                hash.short()
            )));
        }
        self.intern(node)
    }

    /// The number of interned cursors.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether the cache holds no cursors.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl std::fmt::Debug for NodeCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeCache")
            .field("entries", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use canopy_storage::NodeHash;
    use nonempty::NonEmpty;

    use super::NodeCache;
    use crate::{Element, Name, Node};

    fn leaf(name: &str) -> Node {
        Node::from_elements(NonEmpty::singleton(Element::Leaf(Name::from_components([
            name,
        ]))))
        .unwrap()
    }

    #[test]
    fn interning_twice_returns_the_same_cursor_state() -> Result<()> {
        let cache = NodeCache::new();
        let node = leaf("shared");

        let first = cache.intern(node.clone())?;
        first.set_covered(true);

        let second = cache.intern(node)?;

        assert_eq!(first, second);
        assert!(second.is_covered());
        assert_eq!(cache.len(), 1);
        Ok(())
    }

    #[test]
    fn a_pending_cursor_is_resolved_in_place() -> Result<()> {
        let cache = NodeCache::new();
        let node = leaf("later");

        let pending = cache.intern_pending(node.hash());
        assert!(!pending.is_resolved());
        assert!(pending.is_pending());

        let resolved = cache.resolve(node.hash(), node)?;

        assert_eq!(pending, resolved);
        assert!(pending.is_resolved());
        assert!(!pending.is_pending());
        Ok(())
    }

    #[test]
    fn mismatched_content_is_never_stored() {
        let cache = NodeCache::new();
        let node = leaf("real");
        let bogus_hash = NodeHash::of(b"something else entirely");

        let result = cache.resolve(bogus_hash, node);

        assert!(result.is_err());
        assert!(cache.get(&bogus_hash).is_none());
    }

    #[test]
    fn resolution_is_idempotent() -> Result<()> {
        let cache = NodeCache::new();
        let node = leaf("twice");

        cache.resolve(node.hash(), node.clone())?;
        cache.resolve(node.hash(), node)?;

        assert_eq!(cache.len(), 1);
        Ok(())
    }

    #[test]
    fn clones_share_entries() -> Result<()> {
        let cache = NodeCache::new();
        let observer = cache.clone();

        cache.intern(leaf("visible"))?;

        assert_eq!(observer.len(), 1);
        Ok(())
    }
}
