use std::collections::HashSet;

use anyhow::Result;
use canopy_storage::NodeHash;
use canopy_sync_tree::{NODE_SPLIT_TRIGGER, Name, Node, NodeBuilder};
use rand::{SeedableRng, seq::SliceRandom};

/// A repeatable set of names with varied hierarchical depth.
fn fixture_names(seed: &str, count: usize) -> Vec<Name> {
    let mut names: Vec<Name> = (0..count)
        .map(|index| {
            let digest = blake3::hash(format!("{seed}-{index}").as_bytes());
            let bytes = digest.as_bytes();
            let depth = 1 + (bytes[0] % 3) as usize;
            let mut components = vec![seed.as_bytes().to_vec()];
            for level in 0..depth {
                components.push(bytes[level * 4..level * 4 + 4].to_vec());
            }
            Name::from_components(components)
        })
        .collect();
    names.sort();
    names.dedup();
    names
}

#[test]
fn arrival_order_never_affects_the_root_hash() -> Result<()> {
    let names = fixture_names("orderings", 4000);

    let baseline = NodeBuilder::build(&names)?.expect("non-empty set");

    let mut rng = rand::rngs::StdRng::seed_from_u64(99);
    for _ in 0..3 {
        let mut arrived = names.clone();
        arrived.shuffle(&mut rng);
        arrived.sort();

        let rebuilt = NodeBuilder::build(&arrived)?.expect("non-empty set");
        assert_eq!(rebuilt.hash(), baseline.hash());
    }

    Ok(())
}

#[test]
fn independent_builders_produce_identical_leaf_boundaries() -> Result<()> {
    let names = fixture_names("boundaries", 3000);

    let mut first_boundaries = Vec::new();
    NodeBuilder::build_with(&names, |node| {
        if node.is_leaf() {
            first_boundaries.push((node.min_name().clone(), node.max_name().clone()));
        }
    })?;

    let mut second_boundaries = Vec::new();
    NodeBuilder::build_with(&names, |node| {
        if node.is_leaf() {
            second_boundaries.push((node.min_name().clone(), node.max_name().clone()));
        }
    })?;

    assert!(!first_boundaries.is_empty());
    assert_eq!(first_boundaries, second_boundaries);

    Ok(())
}

#[test]
fn every_leaf_stays_within_the_wire_bound() -> Result<()> {
    let names = fixture_names("sizes", 5000);

    let mut leaf_count = 0;
    NodeBuilder::build_with(&names, |node| {
        if node.is_leaf() {
            leaf_count += 1;
            assert!(
                node.encoded_len() <= NODE_SPLIT_TRIGGER,
                "leaf of {} bytes exceeds the wire bound",
                node.encoded_len()
            );
        }
    })?;

    assert!(leaf_count > 1, "expected the set to split across leaves");
    Ok(())
}

#[test]
fn one_changed_name_changes_the_root_but_little_else() -> Result<()> {
    let names = fixture_names("sharing", 4000);

    let mut changed = names.clone();
    // Flip one bit in the final component of a mid-sequence name
    let victim = changed[names.len() / 2].clone();
    let mut components: Vec<Vec<u8>> = victim.components().to_vec();
    let last = components.last_mut().unwrap();
    let index = last.len() - 1;
    last[index] ^= 1;
    changed[names.len() / 2] = Name::from_components(components);
    changed.sort();
    changed.dedup();

    let mut original_nodes = HashSet::new();
    let original_root = NodeBuilder::build_with(&names, |node| {
        original_nodes.insert(node.hash());
    })?
    .expect("non-empty set");

    let mut changed_nodes = HashSet::new();
    let changed_root = NodeBuilder::build_with(&changed, |node| {
        changed_nodes.insert(node.hash());
    })?
    .expect("non-empty set");

    // The changed leaf and every ancestor up to the root re-hash...
    assert_ne!(original_root.hash(), changed_root.hash());
    assert!(!changed_nodes.contains(&original_root.hash()));

    // ...while the overwhelming majority of nodes are untouched.
    let shared: HashSet<&NodeHash> = original_nodes.intersection(&changed_nodes).collect();
    assert!(
        shared.len() + 16 >= original_nodes.len(),
        "{} of {} nodes survived the edit",
        shared.len(),
        original_nodes.len()
    );

    Ok(())
}

#[test]
fn elements_stay_within_their_node_bounds() -> Result<()> {
    let names = fixture_names("bounds", 3000);

    fn check(node: &Node) {
        let min = node.min_name();
        let max = node.max_name();
        for element in node.elements() {
            assert!(element.min_name() >= min);
            assert!(element.max_name() <= max);
            assert!(element.min_name() <= element.max_name());
        }
    }

    let root = NodeBuilder::build_with(&names, |node| check(node))?.expect("non-empty set");
    check(&root);

    Ok(())
}

#[test]
fn a_tree_covers_exactly_its_input_names() -> Result<()> {
    let names = fixture_names("coverage", 2500);

    let mut leaves = Vec::new();
    NodeBuilder::build_with(&names, |node| {
        if node.is_leaf() {
            leaves.extend(node.leaf_names().cloned());
        }
    })?;

    assert_eq!(leaves, names);
    Ok(())
}
