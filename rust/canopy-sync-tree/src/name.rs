use std::fmt::{Debug, Display};

use base58::ToBase58;

/// A hierarchical name: an ordered sequence of binary components.
///
/// Names are the opaque keys this engine reconciles. Their total order is
/// byte-lexicographic, component by component, with a shorter name that is
/// a prefix of a longer one ordered first. That order falls directly out of
/// the derived ordering over the component sequence.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Name {
    components: Vec<Vec<u8>>,
}

impl Name {
    /// Create a [`Name`] from an ordered collection of binary components.
    pub fn from_components<I, C>(components: I) -> Self
    where
        I: IntoIterator<Item = C>,
        C: Into<Vec<u8>>,
    {
        Name {
            components: components.into_iter().map(|c| c.into()).collect(),
        }
    }

    /// The components of this name, outermost first.
    pub fn components(&self) -> &[Vec<u8>] {
        &self.components
    }

    /// The number of components in this name.
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether this name has no components.
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// The innermost (last) component, if any.
    pub fn final_component(&self) -> Option<&[u8]> {
        self.components.last().map(|c| c.as_slice())
    }

    /// The number of leading components shared with `other`.
    pub fn shared_prefix_len(&self, other: &Name) -> usize {
        self.components
            .iter()
            .zip(other.components.iter())
            .take_while(|(ours, theirs)| ours == theirs)
            .count()
    }
}

impl From<Vec<Vec<u8>>> for Name {
    fn from(components: Vec<Vec<u8>>) -> Self {
        Name { components }
    }
}

impl Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (index, component) in self.components.iter().enumerate() {
            if index > 0 {
                write!(f, "/")?;
            }
            match std::str::from_utf8(component) {
                Ok(text) if text.chars().all(|c| c.is_ascii_graphic()) => {
                    write!(f, "{text}")?;
                }
                _ => write!(f, "0x{}", component.to_base58())?,
            }
        }
        Ok(())
    }
}

impl Debug for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Name({self})")
    }
}
