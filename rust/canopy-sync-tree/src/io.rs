use std::{
    cell::Cell,
    io::{Cursor, Write},
};

use canopy_storage::CanopyStorageError;

/// Byte writer used to produce the canonical node encoding.
pub struct Writer {
    cursor: Cursor<Vec<u8>>,
}

impl Default for Writer {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer {
    /// Create a new [`Writer`].
    pub fn new() -> Self {
        Self {
            cursor: Cursor::new(vec![]),
        }
    }

    /// Write a `u8` into the writer.
    pub fn write_u8(&mut self, value: u8) -> Result<(), CanopyStorageError> {
        self.write_bytes(&[value])
    }

    /// Write a `u32` into the writer.
    pub fn write_u32(&mut self, value: u32) -> Result<(), CanopyStorageError> {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Write raw bytes into the writer.
    pub fn write_bytes(&mut self, value: &[u8]) -> Result<(), CanopyStorageError> {
        let _ = self
            .cursor
            .write(value)
            .map_err(|error| CanopyStorageError::EncodeFailed(format!("{error}")))?;
        Ok(())
    }

    /// Write a length-prefixed byte slice into the writer.
    pub fn write_slice(&mut self, value: &[u8]) -> Result<(), CanopyStorageError> {
        self.write_u32(u32::try_from(value.len()).map_err(|error| {
            CanopyStorageError::EncodeFailed(format!("Slice too long: {error}"))
        })?)?;
        self.write_bytes(value)
    }

    /// Write a type implementing [`WriteInto`] into the writer.
    pub fn write<W: WriteInto>(&mut self, target: &W) -> Result<(), CanopyStorageError> {
        target.write_into(self)
    }

    /// Convert this writer into the bytes that were written.
    pub fn into_inner(self) -> Vec<u8> {
        self.cursor.into_inner()
    }
}

/// Types implementing [`WriteInto`] define how they are written via a
/// [`Writer`].
pub trait WriteInto {
    /// Write this value into a [`Writer`].
    fn write_into(&self, writer: &mut Writer) -> Result<(), CanopyStorageError>;
}

/// Read bytes as references from a source byte slice.
pub struct Reader<'a> {
    bytes: &'a [u8],
    index: Cell<usize>,
}

impl<'a> Reader<'a> {
    /// Create a new [`Reader`].
    pub fn new(bytes: &'a [u8]) -> Self {
        Reader {
            bytes,
            index: 0.into(),
        }
    }

    /// Read a `u8` from the reader.
    pub fn read_u8(&self) -> Result<u8, CanopyStorageError> {
        let (index, next) = self.check_indices(1)?;
        self.index.set(next);
        Ok(self.bytes[index])
    }

    /// Read a `u32` from the reader.
    pub fn read_u32(&self) -> Result<u32, CanopyStorageError> {
        let (index, next) = self.check_indices(4)?;
        let mut buffer = [0u8; 4];
        buffer.copy_from_slice(&self.bytes[index..next]);
        self.index.set(next);
        Ok(u32::from_le_bytes(buffer))
    }

    /// Read a sequence of `count` bytes from the reader.
    pub fn read_bytes(&self, count: usize) -> Result<&'a [u8], CanopyStorageError> {
        let (index, next) = self.check_indices(count)?;
        let out = &self.bytes[index..next];
        self.index.set(next);
        Ok(out)
    }

    /// Read a length-prefixed byte slice from the reader.
    pub fn read_slice(&self) -> Result<&'a [u8], CanopyStorageError> {
        let length = self.read_u32()?;
        self.read_bytes(length.try_into().map_err(|error| {
            CanopyStorageError::DecodeFailed(format!("Slice too long: {error}"))
        })?)
    }

    /// Read `R` from the reader.
    pub fn read<R: ReadFrom>(&self) -> Result<R, CanopyStorageError> {
        R::read_from(self)
    }

    /// The number of unread bytes remaining.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.index.get()
    }

    fn check_indices(&self, size: usize) -> Result<(usize, usize), CanopyStorageError> {
        let index = self.index.get();
        let next = index + size;
        if next > self.bytes.len() {
            return Err(CanopyStorageError::DecodeFailed(
                "Attempted to read out of bounds".into(),
            ));
        }
        Ok((index, next))
    }
}

/// Types implementing [`ReadFrom`] define how they can be instantiated from
/// a [`Reader`].
pub trait ReadFrom: Sized {
    /// Instantiate `Self` from a [`Reader`].
    fn read_from(reader: &Reader<'_>) -> Result<Self, CanopyStorageError>;
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::{Reader, Writer};

    #[test]
    fn it_round_trips_integers_and_slices() -> Result<()> {
        let mut writer = Writer::new();
        writer.write_u8(7)?;
        writer.write_u32(64000)?;
        writer.write_slice(b"payload")?;

        let bytes = writer.into_inner();
        let reader = Reader::new(&bytes);

        assert_eq!(reader.read_u8()?, 7);
        assert_eq!(reader.read_u32()?, 64000);
        assert_eq!(reader.read_slice()?, b"payload");
        assert_eq!(reader.remaining(), 0);

        Ok(())
    }

    #[test]
    fn it_rejects_out_of_bounds_reads() {
        let reader = Reader::new(&[1, 2]);
        assert!(reader.read_u32().is_err());
    }
}
