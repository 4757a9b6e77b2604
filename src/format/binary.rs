//! Endianness-parameterized binary reader and writer
//!
//! BCSTM and BFSTM are field-for-field identical apart from byte order,
//! so every field-level read and write goes through one abstraction
//! carrying a runtime [`Endian`] value instead of duplicated per-flavor
//! code paths.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Byte order of a container flavor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    /// Little-endian (BCSTM)
    Little,
    /// Big-endian (BFSTM)
    Big,
}

impl Endian {
    fn read_u16(self, buf: &[u8]) -> u16 {
        match self {
            Endian::Little => LittleEndian::read_u16(buf),
            Endian::Big => BigEndian::read_u16(buf),
        }
    }

    fn read_u32(self, buf: &[u8]) -> u32 {
        match self {
            Endian::Little => LittleEndian::read_u32(buf),
            Endian::Big => BigEndian::read_u32(buf),
        }
    }

    fn write_u16(self, buf: &mut [u8], value: u16) {
        match self {
            Endian::Little => LittleEndian::write_u16(buf, value),
            Endian::Big => BigEndian::write_u16(buf, value),
        }
    }

    fn write_u32(self, buf: &mut [u8], value: u32) {
        match self {
            Endian::Little => LittleEndian::write_u32(buf, value),
            Endian::Big => BigEndian::write_u32(buf, value),
        }
    }
}

/// Writer over an in-memory buffer with an explicit cursor
///
/// The cursor is repositioned between chunks; writing past the current
/// end grows the buffer with zero bytes, which is also how alignment
/// padding is produced.
pub struct BinaryWriter {
    buf: Vec<u8>,
    pos: usize,
    endian: Endian,
}

impl BinaryWriter {
    /// Create a writer, pre-sizing the buffer to `capacity` bytes
    ///
    /// Fails with a capacity error if the allocation cannot be made.
    pub fn with_capacity(endian: Endian, capacity: usize) -> Result<Self> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity).map_err(|_| Error::Capacity {
            sink: "output buffer".to_string(),
            needed: capacity,
        })?;
        Ok(BinaryWriter {
            buf,
            pos: 0,
            endian,
        })
    }

    /// Current cursor position
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Reposition the cursor, zero-filling any gap
    pub fn set_position(&mut self, pos: usize) {
        if pos > self.buf.len() {
            self.buf.resize(pos, 0);
        }
        self.pos = pos;
    }

    /// Bytes written so far (buffer length, not cursor position)
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        if end > self.buf.len() {
            self.buf.resize(end, 0);
        }
        self.buf[self.pos..end].copy_from_slice(bytes);
        self.pos = end;
    }

    pub fn write_u8(&mut self, value: u8) {
        self.write_bytes(&[value]);
    }

    pub fn write_u16(&mut self, value: u16) {
        let mut b = [0u8; 2];
        self.endian.write_u16(&mut b, value);
        self.write_bytes(&b);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.write_u16(value as u16);
    }

    pub fn write_u32(&mut self, value: u32) {
        let mut b = [0u8; 4];
        self.endian.write_u32(&mut b, value);
        self.write_bytes(&b);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.write_u32(value as u32);
    }

    /// Write a 4-byte ASCII chunk tag, endianness-independent
    pub fn write_tag(&mut self, tag: &[u8; 4]) {
        self.write_bytes(tag);
    }

    /// Zero-pad from the cursor up to the next multiple of `alignment`
    pub fn align(&mut self, alignment: usize) {
        let rem = self.pos % alignment;
        if rem != 0 {
            self.set_position(self.pos + alignment - rem);
        }
    }

    /// Consume the writer, returning the finished buffer
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

/// Reader over a borrowed byte slice with an explicit cursor
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        BinaryReader {
            data,
            pos: 0,
            endian,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if self.remaining() < count {
            return Err(Error::structural(
                "input",
                format!(
                    "unexpected end of input: need {} bytes at offset {:#x}, have {}",
                    count,
                    self.pos,
                    self.remaining()
                ),
            ));
        }
        let slice = &self.data[self.pos..self.pos + count];
        self.pos += count;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_bytes(2)?;
        Ok(self.endian.read_u16(b))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_bytes(4)?;
        Ok(self.endian.read_u32(b))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Read a 4-byte ASCII chunk tag, endianness-independent
    pub fn read_tag(&mut self) -> Result<[u8; 4]> {
        let b = self.read_bytes(4)?;
        Ok([b[0], b[1], b[2], b[3]])
    }

    /// Peek a u16 without advancing the cursor
    pub fn peek_u16(&self) -> Result<u16> {
        if self.remaining() < 2 {
            return Err(Error::structural(
                "input",
                format!("unexpected end of input at offset {:#x}", self.pos),
            ));
        }
        Ok(self.endian.read_u16(&self.data[self.pos..self.pos + 2]))
    }

    /// Advance the cursor without reading
    pub fn skip(&mut self, count: usize) -> Result<()> {
        self.read_bytes(count)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_endianness() {
        let mut le = BinaryWriter::with_capacity(Endian::Little, 8).unwrap();
        le.write_u32(0x11223344);
        assert_eq!(le.into_bytes(), vec![0x44, 0x33, 0x22, 0x11]);

        let mut be = BinaryWriter::with_capacity(Endian::Big, 8).unwrap();
        be.write_u32(0x11223344);
        assert_eq!(be.into_bytes(), vec![0x11, 0x22, 0x33, 0x44]);
    }

    #[test]
    fn test_writer_align_pads_with_zeros() {
        let mut w = BinaryWriter::with_capacity(Endian::Little, 32).unwrap();
        w.write_bytes(&[0xff; 3]);
        w.align(0x20);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 0x20);
        assert_eq!(&bytes[3..], &[0u8; 29][..]);
    }

    #[test]
    fn test_writer_reposition() {
        let mut w = BinaryWriter::with_capacity(Endian::Little, 16).unwrap();
        w.write_u32(0);
        w.set_position(8);
        w.write_u16(0xbeef);
        w.set_position(0);
        w.write_u32(0xcafe);
        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 10);
        assert_eq!(LittleEndian::read_u32(&bytes[0..4]), 0xcafe);
        assert_eq!(LittleEndian::read_u16(&bytes[8..10]), 0xbeef);
    }

    #[test]
    fn test_reader_roundtrip() {
        let mut w = BinaryWriter::with_capacity(Endian::Big, 16).unwrap();
        w.write_tag(b"FSTM");
        w.write_u16(0xfeff);
        w.write_i16(-5);
        w.write_u32(123456);
        let bytes = w.into_bytes();

        let mut r = BinaryReader::new(&bytes, Endian::Big);
        assert_eq!(r.read_tag().unwrap(), *b"FSTM");
        assert_eq!(r.read_u16().unwrap(), 0xfeff);
        assert_eq!(r.read_i16().unwrap(), -5);
        assert_eq!(r.read_u32().unwrap(), 123456);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_reader_truncation_is_structural() {
        let mut r = BinaryReader::new(&[1, 2], Endian::Little);
        match r.read_u32() {
            Err(Error::Structural { .. }) => {}
            other => panic!("expected structural error, got {:?}", other),
        }
    }
}
