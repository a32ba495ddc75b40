use std::io::{Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::{Error, ErrorKind, Result};

/// A value with a fixed-size big-endian wire representation.
pub trait ReadWire: Sized {
    const WIRE_LEN: usize;

    fn read_wire<R>(r: &mut R) -> Result<Self>
    where
        R: Read;
}

pub trait WriteWire {
    fn wire_len(&self) -> usize;

    fn write_wire<W>(self, w: &mut W) -> Result<()>
    where
        W: Write;
}

impl ReadWire for u8 {
    const WIRE_LEN: usize = 1;

    fn read_wire<R>(r: &mut R) -> Result<Self>
    where
        R: Read,
    {
        Ok(r.read_u8()?)
    }
}

impl WriteWire for u8 {
    fn wire_len(&self) -> usize {
        1
    }

    fn write_wire<W>(self, w: &mut W) -> Result<()>
    where
        W: Write,
    {
        w.write_u8(self)?;
        Ok(())
    }
}

macro_rules! impl_wire_integer {
    ($ty:ty, $len:expr, $read:ident, $write:ident) => {
        impl ReadWire for $ty {
            const WIRE_LEN: usize = $len;

            fn read_wire<R>(r: &mut R) -> Result<Self>
            where
                R: Read,
            {
                Ok(r.$read::<BigEndian>()?)
            }
        }

        impl WriteWire for $ty {
            fn wire_len(&self) -> usize {
                $len
            }

            fn write_wire<W>(self, w: &mut W) -> Result<()>
            where
                W: Write,
            {
                w.$write::<BigEndian>(self)?;
                Ok(())
            }
        }
    };
}

impl_wire_integer!(u16, 2, read_u16, write_u16);
impl_wire_integer!(u32, 4, read_u32, write_u32);
impl_wire_integer!(u64, 8, read_u64, write_u64);

/// Growable output buffer that PDUs are packed into, field by field.
#[derive(Debug, Default)]
pub struct SerializationBuffer {
    data: Vec<u8>,
}

impl SerializationBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    pub fn pack<T>(&mut self, value: T) -> &mut Self
    where
        T: WriteWire,
    {
        // Writes into a Vec cannot fail.
        if let Err(err) = value.write_wire(&mut self.data) {
            error!("Failed to pack value: {}", err);
        }
        self
    }

    pub fn pack_buffer(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Appends zeros until the buffer is at least `length` bytes long.
    pub fn pad_to(&mut self, length: usize) -> &mut Self {
        if self.data.len() < length {
            self.data.resize(length, 0);
        }
        self
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

/// Read cursor over a received frame.
#[derive(Debug)]
pub struct DeserializationBuffer<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> DeserializationBuffer<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.position
    }

    pub fn remaining_data(&self) -> &'a [u8] {
        &self.data[self.position..]
    }

    fn take(&mut self, length: usize) -> Result<&'a [u8]> {
        let remaining = self.remaining();
        if remaining < length {
            return Err(Error {
                kind: ErrorKind::BufferUnderflow {
                    needed: length,
                    remaining,
                },
            });
        }
        let slice = &self.data[self.position..self.position + length];
        self.position += length;
        Ok(slice)
    }

    pub fn unpack<T>(&mut self) -> Result<T>
    where
        T: ReadWire,
    {
        let mut slice = self.take(T::WIRE_LEN)?;
        T::read_wire(&mut slice)
    }

    pub fn unpack_buffer(&mut self, out: &mut [u8]) -> Result<()> {
        let slice = self.take(out.len())?;
        out.copy_from_slice(slice);
        Ok(())
    }

    pub fn unpack_vec(&mut self, length: usize) -> Result<Vec<u8>> {
        Ok(self.take(length)?.to_vec())
    }

    pub fn skip(&mut self, length: usize) -> Result<()> {
        self.take(length).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn packs_big_endian() {
        let mut buffer = SerializationBuffer::new();
        buffer
            .pack(0x01u8)
            .pack(0x0203u16)
            .pack(0x0405_0607u32)
            .pack(0x0809_0a0b_0c0d_0e0fu64);

        assert_eq!(
            buffer.as_slice(),
            &[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]
        );
    }

    #[test]
    fn unpacks_in_order() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9a, 0xbc, 0xde];
        let mut buffer = DeserializationBuffer::new(&data);

        assert_eq!(buffer.unpack::<u16>().unwrap(), 0x1234);
        assert_eq!(buffer.unpack::<u32>().unwrap(), 0x5678_9abc);
        assert_eq!(buffer.remaining(), 1);
        assert_eq!(buffer.remaining_data(), &[0xde]);
    }

    #[test]
    fn underflow_does_not_consume() {
        let data = [0xaa, 0xbb, 0xcc];
        let mut buffer = DeserializationBuffer::new(&data);

        match buffer.unpack::<u32>() {
            Err(Error {
                kind:
                    ErrorKind::BufferUnderflow {
                        needed: 4,
                        remaining: 3,
                    },
            }) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(buffer.position(), 0);
        assert_eq!(buffer.unpack::<u8>().unwrap(), 0xaa);

        let mut out = [0; 2];
        buffer.unpack_buffer(&mut out).unwrap();
        assert_eq!(out, [0xbb, 0xcc]);
        assert!(buffer.skip(1).is_err());
    }

    #[test]
    fn pad_to_only_grows() {
        let mut buffer = SerializationBuffer::with_capacity(8);
        buffer.pack_buffer(&[1, 2, 3]).pad_to(6);
        assert_eq!(buffer.as_slice(), &[1, 2, 3, 0, 0, 0]);
        buffer.pad_to(2);
        assert_eq!(buffer.len(), 6);
    }
}
