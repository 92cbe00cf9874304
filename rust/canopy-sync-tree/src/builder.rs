//! Deterministic construction of sync trees.
//!
//! Node boundaries are content-defined: where one leaf ends and the next
//! begins is a pure function of the names around the boundary, never of
//! insertion order or of which replica performs the split. Two replicas
//! holding the same logical name set therefore always produce bit-identical
//! trees, which is what makes root-hash comparison meaningful without any
//! coordination.

use nonempty::NonEmpty;

use crate::{
    ChildRef, Element, Name, Node, SyncTreeError,
    codec::{NODE_HEADER_LEN, child_element_len, leaf_element_len},
};

/// The wire-level bound on an encoded node.
pub const NODE_SPLIT_TRIGGER: usize = 4000;

/// Soft cap on an encoded leaf: once the running total exceeds this, a
/// split happens regardless of the content rules. Held an eighth below
/// [`NODE_SPLIT_TRIGGER`] so framing can never push a node past the wire
/// bound.
pub const LEAF_SPLIT_CAP: usize = NODE_SPLIT_TRIGGER - NODE_SPLIT_TRIGGER / 8;

/// Minimum encoded size before any split rule is considered.
pub const LEAF_SPLIT_MINIMUM: usize = NODE_SPLIT_TRIGGER / 2;

/// Threshold for the content-defined split rule: a boundary byte below this
/// value ends the node, giving every candidate boundary a 17/256 chance of
/// becoming a split point.
pub const HASH_SPLIT_TRIGGER: u8 = 17;

/// Builds leaves and internal levels of a sync tree from ordered input.
///
/// All functions require their input to be strictly ascending; handing the
/// builder unsorted input is a programming error and is rejected with an
/// assertion rather than an error value.
pub struct NodeBuilder;

impl NodeBuilder {
    /// Build one leaf node from a prefix of `remaining`, returning the node
    /// and how many names were consumed.
    pub fn build_leaf(remaining: &[Name]) -> Result<(Node, usize), SyncTreeError> {
        assert!(
            !remaining.is_empty(),
            "a leaf requires at least one name"
        );

        let consumed = leaf_run(remaining);
        let elements = remaining[..consumed]
            .iter()
            .map(|name| Element::Leaf(name.clone()))
            .collect::<Vec<_>>();
        let elements = NonEmpty::from_vec(elements).ok_or_else(|| {
            SyncTreeError::InvalidConstruction("Leaf with no names".into())
        })?;

        Ok((Node::from_elements(elements)?, consumed))
    }

    /// Apply the leaf splitting policy one level up: group ordered child
    /// references into one or more internal nodes.
    pub fn build_level(children: &[ChildRef]) -> Result<Vec<Node>, SyncTreeError> {
        assert!(
            !children.is_empty(),
            "a level requires at least one child"
        );

        let mut nodes = Vec::new();
        let mut remaining = children;
        while !remaining.is_empty() {
            let consumed = level_run(remaining);
            let elements = remaining[..consumed]
                .iter()
                .map(|child| Element::Child(child.clone()))
                .collect::<Vec<_>>();
            let elements = NonEmpty::from_vec(elements).ok_or_else(|| {
                SyncTreeError::InvalidConstruction("Level with no children".into())
            })?;
            nodes.push(Node::from_elements(elements)?);
            remaining = &remaining[consumed..];
        }

        Ok(nodes)
    }

    /// Build a whole tree over `names`, returning its root.
    ///
    /// Leaves are built until the name set is exhausted; their references
    /// are then grouped level by level until a single node remains. The
    /// empty set has no tree and yields `None`.
    pub fn build(names: &[Name]) -> Result<Option<Node>, SyncTreeError> {
        Self::build_with(names, |_| {})
    }

    /// Build a whole tree over `names`, invoking `observer` for every node
    /// constructed along the way (leaves, internal levels and the root).
    ///
    /// This is how a whole tree is materialized into a store: hand an
    /// observer that writes each node out, and the returned root ties them
    /// together.
    pub fn build_with(
        names: &[Name],
        mut observer: impl FnMut(&Node),
    ) -> Result<Option<Node>, SyncTreeError> {
        if names.is_empty() {
            return Ok(None);
        }

        let mut nodes = Vec::new();
        let mut remaining = names;
        while !remaining.is_empty() {
            let (node, consumed) = Self::build_leaf(remaining)?;
            observer(&node);
            nodes.push(node);
            remaining = &remaining[consumed..];
        }

        while nodes.len() > 1 {
            let level: Vec<ChildRef> = nodes.iter().map(Node::child_ref).collect();
            let next = Self::build_level(&level)?;
            let next = if next.len() >= nodes.len() {
                // A level must shrink; adopt everything under one parent.
                let elements = level.into_iter().map(Element::Child).collect::<Vec<_>>();
                let elements = NonEmpty::from_vec(elements).ok_or_else(|| {
                    SyncTreeError::InvalidConstruction("Level with no children".into())
                })?;
                vec![Node::from_elements(elements)?]
            } else {
                next
            };
            for node in &next {
                observer(node);
            }
            nodes = next;
        }

        Ok(nodes.pop())
    }
}

/// The byte inspected by the content-defined split rule: the second-to-last
/// byte of the name's final component, or its only byte for one-byte
/// components.
fn boundary_byte(name: &Name) -> Option<u8> {
    let component = name.final_component()?;
    if component.is_empty() {
        return None;
    }
    Some(component[component.len().saturating_sub(2)])
}

fn content_split(name: &Name) -> bool {
    matches!(boundary_byte(name), Some(byte) if byte < HASH_SPLIT_TRIGGER)
}

/// How many of `names` belong in the next leaf.
fn leaf_run(names: &[Name]) -> usize {
    let mut total = NODE_HEADER_LEN;
    let mut previous_match: Option<usize> = None;
    let mut taken = 0;

    while taken < names.len() {
        let name = &names[taken];
        if taken > 0 {
            assert!(
                names[taken - 1] < *name,
                "names must be strictly ascending"
            );
        }
        total += leaf_element_len(name);
        taken += 1;

        let Some(next) = names.get(taken) else {
            break;
        };

        let next_match = name.shared_prefix_len(next);
        if total <= LEAF_SPLIT_MINIMUM {
            previous_match = Some(next_match);
            continue;
        }
        if total > LEAF_SPLIT_CAP {
            break;
        }
        if let Some(previous) = previous_match {
            // Keep names that share a hierarchical depth together: a drop in
            // shared prefix, or a jump of more than one level, ends the leaf.
            if next_match < previous || next_match > previous + 1 {
                break;
            }
        }
        previous_match = Some(next_match);
        if content_split(name) {
            break;
        }
    }

    taken
}

/// How many of `children` belong in the next internal node.
fn level_run(children: &[ChildRef]) -> usize {
    let mut total = NODE_HEADER_LEN;
    let mut previous_match: Option<usize> = None;
    let mut taken = 0;

    while taken < children.len() {
        let child = &children[taken];
        if taken > 0 {
            assert!(
                children[taken - 1].max() < child.min(),
                "children must be strictly ascending"
            );
        }
        total += child_element_len(child);
        taken += 1;

        let Some(next) = children.get(taken) else {
            break;
        };

        let next_match = child.min().shared_prefix_len(next.min());
        if total <= LEAF_SPLIT_MINIMUM {
            previous_match = Some(next_match);
            continue;
        }
        if total > LEAF_SPLIT_CAP {
            break;
        }
        if let Some(previous) = previous_match {
            if next_match < previous || next_match > previous + 1 {
                break;
            }
        }
        previous_match = Some(next_match);
        if content_split(child.min()) {
            break;
        }
    }

    taken
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{LEAF_SPLIT_CAP, NODE_SPLIT_TRIGGER, NodeBuilder};
    use crate::{Name, numbered_names};

    #[test]
    fn it_consumes_every_name_into_leaves() -> Result<()> {
        let names = numbered_names("doc", 500);

        let mut remaining = names.as_slice();
        let mut recovered = Vec::new();
        while !remaining.is_empty() {
            let (leaf, consumed) = NodeBuilder::build_leaf(remaining)?;
            assert!(consumed > 0);
            recovered.extend(leaf.leaf_names().cloned());
            remaining = &remaining[consumed..];
        }

        assert_eq!(recovered, names);
        Ok(())
    }

    #[test]
    fn leaf_boundaries_are_independent_of_history() -> Result<()> {
        // The names a leaf ends up holding depend only on the names around
        // its boundaries, so building from mid-sequence reproduces the same
        // runs.
        let names = numbered_names("doc", 2000);

        let (_, first_run) = NodeBuilder::build_leaf(&names)?;
        let (second_leaf, _) = NodeBuilder::build_leaf(&names[first_run..])?;
        let (replayed, _) = NodeBuilder::build_leaf(&names[first_run..])?;

        assert_eq!(second_leaf.hash(), replayed.hash());
        Ok(())
    }

    #[test]
    fn every_leaf_respects_the_size_cap() -> Result<()> {
        let names = numbered_names("a-moderately-long-name-prefix", 3000);

        let mut remaining = names.as_slice();
        while !remaining.is_empty() {
            let (leaf, consumed) = NodeBuilder::build_leaf(remaining)?;
            // The soft cap may be overshot by at most one element, which is
            // exactly the margin kept below the wire bound.
            assert!(
                leaf.encoded_len() <= NODE_SPLIT_TRIGGER,
                "leaf of {} bytes exceeds the wire bound",
                leaf.encoded_len()
            );
            remaining = &remaining[consumed..];
        }
        Ok(())
    }

    #[test]
    fn an_oversized_name_gets_a_leaf_of_its_own() -> Result<()> {
        let giant = Name::from_components([vec![7u8; LEAF_SPLIT_CAP * 2]]);
        let names = vec![giant.clone()];

        let (leaf, consumed) = NodeBuilder::build_leaf(&names)?;

        assert_eq!(consumed, 1);
        assert_eq!(leaf.leaf_names().cloned().collect::<Vec<_>>(), vec![giant]);
        Ok(())
    }

    #[test]
    #[should_panic(expected = "strictly ascending")]
    fn out_of_order_input_is_a_contract_violation() {
        let names = vec![
            Name::from_components(["b"]),
            Name::from_components(["a"]),
        ];
        let _ = NodeBuilder::build_leaf(&names);
    }

    #[test]
    fn it_builds_a_root_over_many_names() -> Result<()> {
        let names = numbered_names("record", 5000);
        let root = NodeBuilder::build(&names)?.expect("non-empty set");

        assert!(!root.is_leaf());
        assert_eq!(root.min_name(), &names[0]);
        assert_eq!(root.max_name(), &names[names.len() - 1]);
        Ok(())
    }

    #[test]
    fn the_empty_set_has_no_tree() -> Result<()> {
        assert!(NodeBuilder::build(&[])?.is_none());
        Ok(())
    }
}
