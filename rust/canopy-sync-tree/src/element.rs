use std::fmt::Display;

use canopy_storage::NodeHash;

use crate::Name;

/// A serializable reference to a child [`Node`](crate::Node).
///
/// Alongside the child's hash, a reference caches the minimum and maximum
/// names covered by the referenced subtree. Keeping both bounds here means
/// range questions ("could this subtree contain that name?") never require
/// fetching the child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildRef {
    min: Name,
    max: Name,
    hash: NodeHash,
}

impl ChildRef {
    /// Create a new [`ChildRef`].
    pub fn new(min: Name, max: Name, hash: NodeHash) -> Self {
        ChildRef { min, max, hash }
    }

    /// The smallest name covered by the referenced subtree.
    pub fn min(&self) -> &Name {
        &self.min
    }

    /// The largest name covered by the referenced subtree.
    pub fn max(&self) -> &Name {
        &self.max
    }

    /// The hash of the referenced node.
    pub fn hash(&self) -> NodeHash {
        self.hash
    }

    /// Whether the referenced subtree's range could contain `name`.
    pub fn could_contain(&self, name: &Name) -> bool {
        self.min <= *name && *name <= self.max
    }
}

impl Display for ChildRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.hash.short())
    }
}

/// One slot of a [`Node`](crate::Node): either a name held directly, or a
/// reference to a child subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Element {
    /// A name held directly by a leaf node.
    Leaf(Name),
    /// A reference to a child node covering a range of names.
    Child(ChildRef),
}

impl Element {
    /// The smallest name this element represents: a leaf's own name, or the
    /// child's minimum. Elements within a node ascend strictly by this.
    pub fn min_name(&self) -> &Name {
        match self {
            Element::Leaf(name) => name,
            Element::Child(child) => child.min(),
        }
    }

    /// The largest name this element represents.
    pub fn max_name(&self) -> &Name {
        match self {
            Element::Leaf(name) => name,
            Element::Child(child) => child.max(),
        }
    }

    /// Whether this element is a directly held name.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Element::Leaf(_))
    }

    /// This element's name, if it is a leaf.
    pub fn as_leaf(&self) -> Option<&Name> {
        match self {
            Element::Leaf(name) => Some(name),
            Element::Child(_) => None,
        }
    }

    /// This element's child reference, if it is one.
    pub fn as_child(&self) -> Option<&ChildRef> {
        match self {
            Element::Leaf(_) => None,
            Element::Child(child) => Some(child),
        }
    }
}
