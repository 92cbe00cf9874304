//! Deterministic fixture generators for tests and development.

use crate::Name;

/// `count` two-component names under `prefix`, ascending by a big-endian
/// index component.
pub fn numbered_names(prefix: &str, count: usize) -> Vec<Name> {
    (0..count)
        .map(|index| {
            Name::from_components([
                prefix.as_bytes().to_vec(),
                (index as u32).to_be_bytes().to_vec(),
            ])
        })
        .collect()
}

/// A sorted, deduplicated set of names with varied hierarchical depth,
/// derived entirely from `seed` so that every call (on any machine)
/// produces the same set.
pub fn hierarchical_names(seed: &str, count: usize) -> Vec<Name> {
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
