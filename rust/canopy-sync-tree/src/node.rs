use canopy_storage::NodeHash;
use nonempty::NonEmpty;

use crate::{ChildRef, Element, Name, SyncTreeError, codec};

/// An immutable, hash-identified node of a sync tree.
///
/// A node holds a strictly ascending sequence of [`Element`]s: names held
/// directly (a leaf node) or references to child subtrees (an internal
/// node). Its identity is the BLAKE3 hash of its canonical encoding; equal
/// hashes mean equal content, so nodes are never deep-compared. Any logical
/// mutation happens by constructing a new node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Node {
    elements: NonEmpty<Element>,
    encoded: Vec<u8>,
    hash: NodeHash,
}

impl Node {
    /// Construct a [`Node`] from an ordered element sequence, computing its
    /// canonical encoding and hash.
    ///
    /// The result is an error if element ranges are not strictly ascending.
    pub fn from_elements(elements: NonEmpty<Element>) -> Result<Self, SyncTreeError> {
        for window in 0..elements.len().saturating_sub(1) {
            let current = elements
                .get(window)
                .expect("index within element count");
            let next = elements
                .get(window + 1)
                .expect("index within element count");
            if current.max_name() >= next.min_name() {
                return Err(SyncTreeError::InvalidConstruction(format!(
                    "Element ranges out of order at index {window}"
                )));
            }
        }
        for element in &elements {
            if element.min_name() > element.max_name() {
                return Err(SyncTreeError::InvalidConstruction(
                    "Element with inverted bounds".into(),
                ));
            }
        }

        let encoded = codec::encode_elements(&elements)?;
        let hash = NodeHash::of(&encoded);

        Ok(Node {
            elements,
            encoded,
            hash,
        })
    }

    /// Decode a [`Node`] from its canonical bytes.
    ///
    /// Bytes that fail to parse, or that parse into an invalid element
    /// sequence, are rejected as malformed and never become a node.
    pub fn decode(bytes: &[u8]) -> Result<Self, SyncTreeError> {
        let elements = codec::decode_elements(bytes)
            .map_err(|error| SyncTreeError::MalformedNode(format!("{error}")))?;

        Ok(Node {
            elements,
            encoded: bytes.to_vec(),
            hash: NodeHash::of(bytes),
        })
    }

    /// The hash identifying this node.
    pub fn hash(&self) -> NodeHash {
        self.hash
    }

    /// The canonical encoding this node's hash is computed over.
    pub fn canonical_bytes(&self) -> &[u8] {
        &self.encoded
    }

    /// The canonical encoded size of this node in bytes.
    pub fn encoded_len(&self) -> usize {
        self.encoded.len()
    }

    /// The number of elements held by this node.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Always false: nodes hold at least one element.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Whether every element of this node is a directly held name.
    pub fn is_leaf(&self) -> bool {
        self.elements.iter().all(Element::is_leaf)
    }

    /// The elements of this node in ascending order.
    pub fn elements(&self) -> &NonEmpty<Element> {
        &self.elements
    }

    /// The element at `index`, if within bounds.
    pub fn element(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// The first (smallest) element.
    pub fn min_element(&self) -> &Element {
        self.elements.first()
    }

    /// The last (largest) element.
    pub fn max_element(&self) -> &Element {
        self.elements.last()
    }

    /// The smallest name covered by this node's subtree.
    pub fn min_name(&self) -> &Name {
        self.elements.first().min_name()
    }

    /// The largest name covered by this node's subtree.
    pub fn max_name(&self) -> &Name {
        self.elements.last().max_name()
    }

    /// The names held directly by this node, in order.
    pub fn leaf_names(&self) -> impl Iterator<Item = &Name> {
        self.elements.iter().filter_map(Element::as_leaf)
    }

    /// The child references held by this node, in order.
    pub fn child_refs(&self) -> impl Iterator<Item = &ChildRef> {
        self.elements.iter().filter_map(Element::as_child)
    }

    /// A [`ChildRef`] through which a parent node can adopt this node.
    pub fn child_ref(&self) -> ChildRef {
        ChildRef::new(self.min_name().clone(), self.max_name().clone(), self.hash)
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use nonempty::NonEmpty;

    use super::Node;
    use crate::{Element, Name};

    fn leaf_elements(names: &[&str]) -> NonEmpty<Element> {
        NonEmpty::from_vec(
            names
                .iter()
                .map(|n| {
                    Element::Leaf(Name::from_components(
                        n.split('/').map(|part| part.as_bytes().to_vec()),
                    ))
                })
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn its_hash_is_a_function_of_its_canonical_bytes() -> Result<()> {
        let one = Node::from_elements(leaf_elements(&["a/b", "a/c"]))?;
        let two = Node::from_elements(leaf_elements(&["a/b", "a/c"]))?;
        let other = Node::from_elements(leaf_elements(&["a/b", "a/d"]))?;

        assert_eq!(one.hash(), two.hash());
        assert_ne!(one.hash(), other.hash());

        Ok(())
    }

    #[test]
    fn it_round_trips_through_its_canonical_bytes() -> Result<()> {
        let node = Node::from_elements(leaf_elements(&["x/1", "x/2", "y/1"]))?;
        let decoded = Node::decode(node.canonical_bytes())?;

        assert_eq!(node, decoded);
        assert_eq!(node.hash(), decoded.hash());

        Ok(())
    }

    #[test]
    fn it_rejects_out_of_order_elements() {
        let result = Node::from_elements(leaf_elements(&["b", "a"]));
        assert!(result.is_err());
    }

    #[test]
    fn min_and_max_are_first_and_last() -> Result<()> {
        let node = Node::from_elements(leaf_elements(&["a", "m", "z"]))?;

        assert_eq!(node.min_name(), &Name::from_components(["a"]));
        assert_eq!(node.max_name(), &Name::from_components(["z"]));
        for element in node.elements() {
            assert!(element.min_name() >= node.min_name());
            assert!(element.max_name() <= node.max_name());
        }

        Ok(())
    }
}
