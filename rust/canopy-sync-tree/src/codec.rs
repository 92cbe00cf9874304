//! The canonical byte encoding of a node.
//!
//! This layout is the interoperability contract of the whole system: the
//! node hash is defined over exactly these bytes, so every implementation
//! must produce them bit-for-bit identically. All integers are
//! little-endian.
//!
//! ```text
//! node      := u32 element_count, element*
//! element   := u8 tag (0 = leaf, 1 = child), body
//! leaf body := name
//! child body:= name (min), name (max), 32 hash bytes
//! name      := u32 component_count, component*
//! component := u32 length, bytes
//! ```

use canopy_storage::{CanopyStorageError, NODE_HASH_SIZE, NodeHash};
use nonempty::NonEmpty;

use crate::{ChildRef, Element, Name, ReadFrom, Reader, WriteInto, Writer};

const TAG_LEAF: u8 = 0;
const TAG_CHILD: u8 = 1;

impl WriteInto for Name {
    fn write_into(&self, writer: &mut Writer) -> Result<(), CanopyStorageError> {
        writer.write_u32(u32::try_from(self.len()).map_err(|error| {
            CanopyStorageError::EncodeFailed(format!("Too many components: {error}"))
        })?)?;
        for component in self.components() {
            writer.write_slice(component)?;
        }
        Ok(())
    }
}

impl ReadFrom for Name {
    fn read_from(reader: &Reader<'_>) -> Result<Self, CanopyStorageError> {
        let count = reader.read_u32()?;
        let mut components = Vec::with_capacity(count.min(64) as usize);
        for _ in 0..count {
            components.push(reader.read_slice()?.to_vec());
        }
        Ok(Name::from(components))
    }
}

impl WriteInto for Element {
    fn write_into(&self, writer: &mut Writer) -> Result<(), CanopyStorageError> {
        match self {
            Element::Leaf(name) => {
                writer.write_u8(TAG_LEAF)?;
                writer.write(name)
            }
            Element::Child(child) => {
                writer.write_u8(TAG_CHILD)?;
                writer.write(child.min())?;
                writer.write(child.max())?;
                writer.write_bytes(child.hash().bytes())
            }
        }
    }
}

impl ReadFrom for Element {
    fn read_from(reader: &Reader<'_>) -> Result<Self, CanopyStorageError> {
        match reader.read_u8()? {
            TAG_LEAF => Ok(Element::Leaf(reader.read()?)),
            TAG_CHILD => {
                let min: Name = reader.read()?;
                let max: Name = reader.read()?;
                let hash = NodeHash::try_from(reader.read_bytes(NODE_HASH_SIZE)?)
                    .map_err(|error| CanopyStorageError::DecodeFailed(format!("{error}")))?;
                if min > max {
                    return Err(CanopyStorageError::DecodeFailed(
                        "Child reference with inverted bounds".into(),
                    ));
                }
                Ok(Element::Child(ChildRef::new(min, max, hash)))
            }
            tag => Err(CanopyStorageError::DecodeFailed(format!(
                "Byte does not represent an element kind: {tag:x}"
            ))),
        }
    }
}

/// Encode an ordered element sequence into its canonical bytes.
pub fn encode_elements(elements: &NonEmpty<Element>) -> Result<Vec<u8>, CanopyStorageError> {
    let mut writer = Writer::new();
    writer.write_u32(u32::try_from(elements.len()).map_err(|error| {
        CanopyStorageError::EncodeFailed(format!("Too many elements: {error}"))
    })?)?;
    for element in elements {
        writer.write(element)?;
    }
    Ok(writer.into_inner())
}

/// Decode canonical bytes into an element sequence.
///
/// This enforces the structural half of the node invariants: a known tag on
/// every element, at least one element, strictly ascending element ranges,
/// and exact buffer consumption. Bytes that violate any of these never
/// become elements.
pub fn decode_elements(bytes: &[u8]) -> Result<NonEmpty<Element>, CanopyStorageError> {
    let reader = Reader::new(bytes);
    let count = reader.read_u32()?;
    if count == 0 {
        return Err(CanopyStorageError::DecodeFailed(
            "Node seems to have zero elements".into(),
        ));
    }
    let mut elements: Vec<Element> = Vec::with_capacity(count.min(1024) as usize);
    for _ in 0..count {
        let element: Element = reader.read()?;
        if let Some(previous) = elements.last() {
            if previous.max_name() >= element.min_name() {
                return Err(CanopyStorageError::DecodeFailed(
                    "Elements are not strictly ascending".into(),
                ));
            }
        }
        elements.push(element);
    }
    if reader.remaining() != 0 {
        return Err(CanopyStorageError::DecodeFailed(format!(
            "{} trailing bytes after node encoding",
            reader.remaining()
        )));
    }
    NonEmpty::from_vec(elements)
        .ok_or_else(|| CanopyStorageError::DecodeFailed("Node seems to have zero elements".into()))
}

/// The canonical encoded length of a name.
pub fn name_encoded_len(name: &Name) -> usize {
    4 + name
        .components()
        .iter()
        .map(|component| 4 + component.len())
        .sum::<usize>()
}

/// The canonical encoded length of an element.
pub fn element_encoded_len(element: &Element) -> usize {
    match element {
        Element::Leaf(name) => 1 + name_encoded_len(name),
        Element::Child(child) => {
            1 + name_encoded_len(child.min()) + name_encoded_len(child.max()) + NODE_HASH_SIZE
        }
    }
}

/// The canonical encoded length of a leaf element holding `name`.
pub fn leaf_element_len(name: &Name) -> usize {
    1 + name_encoded_len(name)
}

/// The canonical encoded length of a child element referencing `child`.
pub fn child_element_len(child: &ChildRef) -> usize {
    1 + name_encoded_len(child.min()) + name_encoded_len(child.max()) + NODE_HASH_SIZE
}

/// The number of bytes of node framing that precede the elements.
pub const NODE_HEADER_LEN: usize = 4;

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use canopy_storage::NodeHash;
    use nonempty::NonEmpty;

    use super::{decode_elements, element_encoded_len, encode_elements};
    use crate::{ChildRef, Element, Name};

    fn name(text: &str) -> Name {
        Name::from_components(text.split('/').map(|part| part.as_bytes().to_vec()))
    }

    #[test]
    fn it_round_trips_a_mixed_element_sequence() -> Result<()> {
        let elements = NonEmpty::from_vec(vec![
            Element::Leaf(name("repo/alpha")),
            Element::Child(ChildRef::new(
                name("repo/beta"),
                name("repo/delta"),
                NodeHash::of(b"child"),
            )),
            Element::Leaf(name("repo/epsilon")),
        ])
        .unwrap();

        let bytes = encode_elements(&elements)?;
        let decoded = decode_elements(&bytes)?;

        assert_eq!(elements, decoded);
        Ok(())
    }

    #[test]
    fn encoded_length_matches_prediction() -> Result<()> {
        let elements = NonEmpty::from_vec(vec![
            Element::Leaf(name("a/b/c")),
            Element::Child(ChildRef::new(name("d"), name("e/f"), NodeHash::of(b"x"))),
        ])
        .unwrap();

        let bytes = encode_elements(&elements)?;
        let predicted: usize = 4 + elements.iter().map(element_encoded_len).sum::<usize>();

        assert_eq!(bytes.len(), predicted);
        Ok(())
    }

    #[test]
    fn it_rejects_unknown_tags() {
        // element count 1, tag 9
        let bytes = [1, 0, 0, 0, 9];
        assert!(decode_elements(&bytes).is_err());
    }

    #[test]
    fn it_rejects_zero_elements() {
        let bytes = [0, 0, 0, 0];
        assert!(decode_elements(&bytes).is_err());
    }

    #[test]
    fn it_rejects_out_of_order_elements() -> Result<()> {
        let elements = NonEmpty::from_vec(vec![
            Element::Leaf(name("repo/beta")),
            Element::Leaf(name("repo/alpha")),
        ])
        .unwrap();

        // Encode without order enforcement, then decode strictly
        let mut writer = crate::Writer::new();
        writer.write_u32(2)?;
        for element in &elements {
            writer.write(element)?;
        }

        assert!(decode_elements(&writer.into_inner()).is_err());
        Ok(())
    }

    #[test]
    fn it_rejects_trailing_bytes() -> Result<()> {
        let elements = NonEmpty::singleton(Element::Leaf(name("only")));
        let mut bytes = encode_elements(&elements)?;
        bytes.push(0);
        assert!(decode_elements(&bytes).is_err());
        Ok(())
    }
}
