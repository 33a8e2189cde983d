//! Payload encodings of embedded sub-resources.
//!
//! Embedded byte ranges are stored either as-is (`raw`) or as a zlib
//! stream (`deflate`).

use std::borrow::Cow;
use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::util::FormatError;

/// Encoding name for uncompressed payloads.
pub const RAW_ENCODING: &str = "raw";

/// Encoding name for zlib payloads.
pub const DEFLATE_ENCODING: &str = "deflate";

/// Decode an embedded payload according to its encoding.
///
/// `limit` caps the decoded size; `target` names the payload in errors.
pub fn decode_payload<'a>(
    data: &'a [u8],
    encoding: &str,
    limit: usize,
    target: &str,
) -> Result<Cow<'a, [u8]>, FormatError> {
    match encoding {
        "" | RAW_ENCODING => Ok(Cow::Borrowed(data)),
        DEFLATE_ENCODING => inflate(data, limit, target).map(Cow::Owned),
        other => Err(FormatError::UnsupportedEncoding(other.to_string())),
    }
}

/// Decompress a zlib stream of at most `limit` decoded bytes.
pub fn inflate(data: &[u8], limit: usize, target: &str) -> Result<Vec<u8>, FormatError> {
    let decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| FormatError::Decompress { target: target.to_string(), reason: e.to_string() })?;

    if out.len() > limit {
        return Err(FormatError::Decompress {
            target: target.to_string(),
            reason: format!("decoded size exceeds limit of {limit} bytes"),
        });
    }
    Ok(out)
}

/// Compress data as a zlib stream.
///
/// # Arguments
/// * `data` - Data to compress
/// * `level` - Compression level (0-9, where 0 is no compression, 9 is max)
pub fn deflate(data: &[u8], level: u32) -> std::io::Result<Vec<u8>> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    encoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deflate_round_trip() {
        let original = b"embedded texture bytes ".repeat(100);
        let packed = deflate(&original, 6).unwrap();
        assert!(packed.len() < original.len());

        let out = decode_payload(&packed, DEFLATE_ENCODING, 1 << 20, "t.png").unwrap();
        assert_eq!(&*out, &original[..]);
    }

    #[test]
    fn test_raw_is_borrowed() {
        let data = b"plain";
        let out = decode_payload(data, RAW_ENCODING, 0, "p.bin").unwrap();
        assert!(matches!(out, Cow::Borrowed(_)));
    }

    #[test]
    fn test_limit_enforced() {
        let packed = deflate(&[0u8; 4096], 9).unwrap();
        let err = inflate(&packed, 100, "big.bin").unwrap_err();
        assert!(matches!(err, FormatError::Decompress { .. }));
    }

    #[test]
    fn test_corrupt_stream() {
        let err = inflate(b"definitely not zlib", 1024, "x.bin").unwrap_err();
        assert!(matches!(err, FormatError::Decompress { ref target, .. } if target == "x.bin"));
    }

    #[test]
    fn test_unknown_encoding() {
        assert_eq!(
            decode_payload(b"", "lzma", 10, "a").unwrap_err(),
            FormatError::UnsupportedEncoding("lzma".into())
        );
    }
}
