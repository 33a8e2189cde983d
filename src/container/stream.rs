//! Cursor-based reader of typed primitives.

use byteorder::{ByteOrder, LittleEndian};

use super::varint::unpack30;
use crate::util::FormatError;

type Result<T> = std::result::Result<T, FormatError>;

/// Positioned reader over a container buffer.
///
/// Every read advances the cursor; [`set_position`](Self::set_position)
/// jumps anywhere in the buffer for random access.
#[derive(Clone)]
pub struct StreamReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> StreamReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Reader positioned at `pos`.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(n).filter(|&e| e <= self.data.len());
        match end {
            Some(end) => {
                let slice = &self.data[self.pos..end];
                self.pos = end;
                Ok(slice)
            }
            None => Err(FormatError::UnexpectedEof { offset: self.pos, needed: n }),
        }
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.take(2)?))
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        Ok(LittleEndian::read_i64(self.take(8)?))
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    /// Read `N` consecutive f64 values.
    pub fn read_f64_array<const N: usize>(&mut self) -> Result<[f64; N]> {
        let bytes = self.take(8 * N)?;
        let mut out = [0.0; N];
        LittleEndian::read_f64_into(bytes, &mut out);
        Ok(out)
    }

    /// Read `N` consecutive f32 values.
    pub fn read_f32_array<const N: usize>(&mut self) -> Result<[f32; N]> {
        let bytes = self.take(4 * N)?;
        let mut out = [0.0; N];
        LittleEndian::read_f32_into(bytes, &mut out);
        Ok(out)
    }

    /// Read a packed 30-bit unsigned integer.
    pub fn read_unpack30(&mut self) -> Result<u32> {
        let (value, used) = unpack30(&self.data[self.pos.min(self.data.len())..], self.pos)?;
        self.pos += used;
        Ok(value)
    }

    /// Read a packed count as `usize`.
    pub fn read_count(&mut self) -> Result<usize> {
        Ok(self.read_unpack30()? as usize)
    }

    /// Read a packed length followed by that many bytes.
    pub fn read_bytes(&mut self) -> Result<&'a [u8]> {
        let len = self.read_count()?;
        self.take(len)
    }

    /// Read a packed length followed by UTF-8 text.
    pub fn read_short_string(&mut self) -> Result<&'a str> {
        let start = self.pos;
        let bytes = self.read_bytes()?;
        std::str::from_utf8(bytes).map_err(|_| FormatError::InvalidUtf8 { offset: start })
    }

    /// Read a magic marker and fail unless it equals `expected`.
    pub fn match_magic(&mut self, expected: u32) -> Result<()> {
        let offset = self.pos;
        let found = self.read_u32()?;
        if found != expected {
            return Err(FormatError::MagicMismatch { expected, found, offset });
        }
        Ok(())
    }

    /// Peek at the next u32 without advancing.
    pub fn peek_u32(&self) -> Result<u32> {
        self.clone().read_u32()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::format::{magic, BEGIN_OBJ_MAGIC};

    #[test]
    fn test_primitives() {
        let mut bytes = Vec::new();
        bytes.push(7u8);
        bytes.extend_from_slice(&(-2i16).to_le_bytes());
        bytes.extend_from_slice(&(-100_000i32).to_le_bytes());
        bytes.extend_from_slice(&1.5f32.to_le_bytes());
        bytes.extend_from_slice(&(-0.25f64).to_le_bytes());
        bytes.extend_from_slice(&(i64::MIN).to_le_bytes());

        let mut r = StreamReader::new(&bytes);
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.read_i16().unwrap(), -2);
        assert_eq!(r.read_i32().unwrap(), -100_000);
        assert_eq!(r.read_f32().unwrap(), 1.5);
        assert_eq!(r.read_f64().unwrap(), -0.25);
        assert_eq!(r.read_i64().unwrap(), i64::MIN);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_random_access() {
        let bytes = [1u8, 2, 3, 4];
        let mut r = StreamReader::new(&bytes);
        r.set_position(2);
        assert_eq!(r.read_u8().unwrap(), 3);
        assert_eq!(r.position(), 3);
        r.set_position(0);
        assert_eq!(r.read_u8().unwrap(), 1);
    }

    #[test]
    fn test_eof() {
        let bytes = [1u8, 2];
        let mut r = StreamReader::at(&bytes, 1);
        let err = r.read_u32().unwrap_err();
        assert_eq!(err, FormatError::UnexpectedEof { offset: 1, needed: 4 });

        // Cursor beyond the end still reports cleanly.
        let mut r = StreamReader::at(&bytes, 9);
        assert!(matches!(r.read_unpack30(), Err(FormatError::UnexpectedEof { .. })));
    }

    #[test]
    fn test_match_magic() {
        let mut bytes = BEGIN_OBJ_MAGIC.to_le_bytes().to_vec();
        bytes.extend_from_slice(b"nope");
        let mut r = StreamReader::new(&bytes);
        r.match_magic(BEGIN_OBJ_MAGIC).unwrap();
        let err = r.match_magic(BEGIN_OBJ_MAGIC).unwrap_err();
        assert_eq!(
            err,
            FormatError::MagicMismatch { expected: BEGIN_OBJ_MAGIC, found: magic(b"nope"), offset: 4 }
        );
    }

    #[test]
    fn test_short_string() {
        let bytes = [3u8, b'a', b'b', b'c', 2, 0xff, 0xfe];
        let mut r = StreamReader::new(&bytes);
        assert_eq!(r.read_short_string().unwrap(), "abc");
        assert_eq!(r.read_short_string().unwrap_err(), FormatError::InvalidUtf8 { offset: 4 });
    }
}
