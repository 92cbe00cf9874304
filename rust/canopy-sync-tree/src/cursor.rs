use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use canopy_common::SharedCell;
use canopy_storage::NodeHash;

use crate::{Element, Node, SyncTreeError};

/// A stateful handle on one node of a sync tree.
///
/// A cursor binds a hash to the node content once it is known, plus an
/// enumeration position and two reconciliation flags: `pending` (a fetch
/// for the content is outstanding) and `covered` (the subtree has been
/// fully reconciled and can be skipped on future passes).
///
/// Cursors are cheap to clone; clones share state. Cursors for identical
/// hashes are interned through the [`NodeCache`](crate::NodeCache) so flag
/// updates made by one session are observed by every other holder. The
/// flags are atomics, so readers polling
/// [`at_end`](TreeCursor::at_end)/[`is_pending`](TreeCursor::is_pending)
/// never block writers.
///
/// Equality between cursors is hash equality alone: equal hash implies
/// equal content, so no deep comparison is ever required.
#[derive(Clone)]
pub struct TreeCursor {
    inner: Arc<CursorInner>,
}

struct CursorInner {
    hash: NodeHash,
    node: SharedCell<Option<Node>>,
    position: AtomicUsize,
    pending: AtomicBool,
    covered: AtomicBool,
}

impl TreeCursor {
    /// Create a cursor over an already resolved node.
    pub fn resolved(node: Node) -> Self {
        TreeCursor {
            inner: Arc::new(CursorInner {
                hash: node.hash(),
                node: SharedCell::new(Some(node)),
                position: AtomicUsize::new(0),
                pending: AtomicBool::new(false),
                covered: AtomicBool::new(false),
            }),
        }
    }

    /// Create a cursor that references a hash whose content is not yet
    /// known. The cursor starts out pending.
    pub fn pending(hash: NodeHash) -> Self {
        TreeCursor {
            inner: Arc::new(CursorInner {
                hash,
                node: SharedCell::new(None),
                position: AtomicUsize::new(0),
                pending: AtomicBool::new(true),
                covered: AtomicBool::new(false),
            }),
        }
    }

    /// The hash this cursor refers to.
    pub fn hash(&self) -> NodeHash {
        self.inner.hash
    }

    /// The resolved node, if its content is known.
    pub fn node(&self) -> Option<Node> {
        self.inner.node.read().clone()
    }

    /// Whether this cursor's content is known.
    pub fn is_resolved(&self) -> bool {
        self.inner.node.read().is_some()
    }

    /// Install the content for this cursor's hash, clearing the pending
    /// flag. Installing identical content twice is a no-op; content whose
    /// hash differs from the cursor's is an integrity violation and is
    /// rejected.
    pub(crate) fn install(&self, node: Node) -> Result<(), SyncTreeError> {
        if node.hash() != self.inner.hash {
            return Err(SyncTreeError::HashMismatch(format!(
                "{} offered for cursor {}",
                node.hash().short(),
                self.inner.hash.short()
            )));
        }
        {
            let mut slot = self.inner.node.write();
            if slot.is_none() {
                *slot = Some(node);
            }
        }
        self.set_pending(false);
        Ok(())
    }

    /// The element at the current enumeration position, or `None` when the
    /// node is unresolved or the position is past the end.
    pub fn current_element(&self) -> Option<Element> {
        let node = self.inner.node.read();
        node.as_ref()
            .and_then(|node| node.element(self.position()).cloned())
    }

    /// Advance the enumeration position by one.
    pub fn advance(&self) {
        self.inner.position.fetch_add(1, Ordering::SeqCst);
    }

    /// Set the enumeration position.
    pub fn set_position(&self, position: usize) {
        self.inner.position.store(position, Ordering::SeqCst);
    }

    /// The current enumeration position.
    pub fn position(&self) -> usize {
        self.inner.position.load(Ordering::SeqCst)
    }

    /// True when the cursor cannot yield another element: either the node
    /// is unresolved (the caller must trigger a fetch) or enumeration has
    /// passed the final element.
    pub fn at_end(&self) -> bool {
        let node = self.inner.node.read();
        match node.as_ref() {
            None => true,
            Some(node) => self.position() >= node.len(),
        }
    }

    /// Whether a fetch for this cursor's content is outstanding.
    pub fn is_pending(&self) -> bool {
        self.inner.pending.load(Ordering::SeqCst)
    }

    /// Mark whether a fetch for this cursor's content is outstanding.
    pub fn set_pending(&self, pending: bool) {
        self.inner.pending.store(pending, Ordering::SeqCst);
    }

    /// Whether this subtree has been fully reconciled.
    pub fn is_covered(&self) -> bool {
        self.inner.covered.load(Ordering::SeqCst)
    }

    /// Mark whether this subtree has been fully reconciled.
    pub fn set_covered(&self, covered: bool) {
        self.inner.covered.store(covered, Ordering::SeqCst);
    }
}

impl PartialEq for TreeCursor {
    fn eq(&self, other: &Self) -> bool {
        self.inner.hash == other.inner.hash
    }
}

impl Eq for TreeCursor {}

impl std::fmt::Debug for TreeCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeCursor")
            .field("hash", &self.inner.hash.short())
            .field("resolved", &self.is_resolved())
            .field("pending", &self.is_pending())
            .field("covered", &self.is_covered())
            .field("position", &self.position())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use canopy_storage::NodeHash;
    use nonempty::NonEmpty;

    use super::TreeCursor;
    use crate::{Element, Name, Node};

    fn leaf(names: &[&str]) -> Node {
        Node::from_elements(
            NonEmpty::from_vec(
                names
                    .iter()
                    .map(|n| Element::Leaf(Name::from_components([*n])))
                    .collect(),
            )
            .unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn an_unresolved_cursor_is_at_its_end() {
        let cursor = TreeCursor::pending(NodeHash::of(b"unknown"));

        assert!(cursor.at_end());
        assert!(cursor.is_pending());
        assert_eq!(cursor.current_element(), None);
    }

    #[test]
    fn it_enumerates_a_resolved_node() {
        let cursor = TreeCursor::resolved(leaf(&["a", "b"]));

        assert!(!cursor.at_end());
        assert_eq!(
            cursor.current_element(),
            Some(Element::Leaf(Name::from_components(["a"])))
        );

        cursor.advance();
        assert_eq!(
            cursor.current_element(),
            Some(Element::Leaf(Name::from_components(["b"])))
        );

        cursor.advance();
        assert!(cursor.at_end());
        assert_eq!(cursor.current_element(), None);
    }

    #[test]
    fn resolution_is_idempotent_and_hash_checked() -> Result<()> {
        let node = leaf(&["x"]);
        let cursor = TreeCursor::pending(node.hash());

        cursor.install(node.clone())?;
        assert!(cursor.is_resolved());
        assert!(!cursor.is_pending());

        // Same content again: fine
        cursor.install(node)?;

        // Content under the wrong hash: rejected
        assert!(cursor.install(leaf(&["y"])).is_err());

        Ok(())
    }

    #[test]
    fn clones_share_flag_state() {
        let cursor = TreeCursor::resolved(leaf(&["a"]));
        let observer = cursor.clone();

        cursor.set_covered(true);

        assert!(observer.is_covered());
        assert_eq!(cursor, observer);
    }
}
