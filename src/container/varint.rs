//! Packed 30-bit unsigned integers ("unpack30").
//!
//! Each byte carries 7 payload bits in bits 0-6; bit 7 set means another
//! byte follows. Groups are assembled little-endian, so the first byte holds
//! the least significant bits. Counts, offsets and interned-string ids all
//! use this encoding.

use super::format::{MAX_PACKED, MAX_PACKED_BYTES};
use crate::util::FormatError;

const CONTINUE: u8 = 0x80;
const PAYLOAD: u8 = 0x7f;

/// Decode a packed integer from the start of `bytes`.
///
/// Returns the value and the number of bytes consumed. `base` is the buffer
/// offset of `bytes[0]`, used for error reporting.
pub fn unpack30(bytes: &[u8], base: usize) -> Result<(u32, usize), FormatError> {
    let mut value: u32 = 0;
    for i in 0..MAX_PACKED_BYTES {
        let byte = *bytes.get(i).ok_or(FormatError::UnexpectedEof {
            offset: base + i,
            needed: 1,
        })?;
        let bits = (byte & PAYLOAD) as u64;
        let shifted = bits << (7 * i);
        if shifted > MAX_PACKED as u64 || value as u64 + shifted > MAX_PACKED as u64 {
            return Err(FormatError::VarintOverflow { offset: base });
        }
        value |= shifted as u32;
        if byte & CONTINUE == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(FormatError::VarintOverflow { offset: base })
}

/// Append the packed encoding of `value` to `out`.
///
/// Values above [`MAX_PACKED`] are not representable and are clamped.
pub fn pack30(mut value: u32, out: &mut Vec<u8>) {
    value = value.min(MAX_PACKED);
    loop {
        let byte = (value as u8) & PAYLOAD;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | CONTINUE);
    }
}

/// Number of bytes [`pack30`] emits for `value`.
pub fn packed_len(value: u32) -> usize {
    match value.min(MAX_PACKED) {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0x0fff_ffff => 4,
        _ => 5,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(v: u32) -> u32 {
        let mut buf = Vec::new();
        pack30(v, &mut buf);
        assert_eq!(buf.len(), packed_len(v));
        let (out, used) = unpack30(&buf, 0).unwrap();
        assert_eq!(used, buf.len());
        out
    }

    #[test]
    fn test_boundaries() {
        for v in [0, 1, 127, 128, 16383, 16384, 0x1f_ffff, 0x20_0000, MAX_PACKED] {
            assert_eq!(round_trip(v), v, "value {v}");
        }
    }

    #[test]
    fn test_bit_layout() {
        let mut buf = Vec::new();
        pack30(128, &mut buf);
        assert_eq!(buf, [0x80, 0x01]);

        buf.clear();
        pack30(300, &mut buf);
        assert_eq!(buf, [0xac, 0x02]);

        buf.clear();
        pack30(MAX_PACKED, &mut buf);
        assert_eq!(buf, [0xff, 0xff, 0xff, 0xff, 0x03]);
    }

    #[test]
    fn test_sampled_range() {
        // Stride through the whole domain, hitting every encoded length.
        let mut v: u32 = 0;
        while v <= MAX_PACKED {
            assert_eq!(round_trip(v), v);
            v += 104_729;
        }
    }

    #[test]
    fn test_overflow() {
        // 2^30 needs bit 2 of the fifth group.
        let err = unpack30(&[0x80, 0x80, 0x80, 0x80, 0x04], 7).unwrap_err();
        assert_eq!(err, FormatError::VarintOverflow { offset: 7 });

        // Six bytes with continuation bits never terminate.
        let err = unpack30(&[0xff; 6], 0).unwrap_err();
        assert!(matches!(err, FormatError::VarintOverflow { .. }));
    }

    #[test]
    fn test_truncated() {
        let err = unpack30(&[0x80], 10).unwrap_err();
        assert_eq!(err, FormatError::UnexpectedEof { offset: 11, needed: 1 });
    }
}
