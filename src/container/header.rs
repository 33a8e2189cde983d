//! File header parsing.

use super::format::*;
use super::stream::StreamReader;
use crate::object::Version;
use crate::util::FormatError;

/// Parsed container header.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Version of the writer that produced the buffer.
    pub version: Version,
    /// Offset of the positions (shortcut) section.
    pub positions_offset: i32,
    /// Offset of the thumbnail section, if any.
    pub thumbnail_offset: Option<i32>,
    /// Reserved words, kept for diagnostics.
    pub reserved: [i32; 2],
}

impl Header {
    /// Parse and validate the header at the start of `data`.
    pub fn parse(data: &[u8]) -> Result<Self, FormatError> {
        if data.len() < HEADER_SIZE {
            return Err(FormatError::UnexpectedEof { offset: data.len(), needed: HEADER_SIZE });
        }

        let mut r = StreamReader::new(data);
        r.match_magic(HEADER_MAGIC)?;
        let version = Version::new(r.read_u16()? as u32, r.read_u16()? as u32, r.read_u16()? as u32);
        let positions_offset = r.read_i32()?;
        let thumbnail_offset = r.read_i32()?;
        let reserved = [r.read_i32()?, r.read_i32()?];
        r.match_magic(HEADER_MAGIC)?;

        if !version.is_supported() {
            return Err(FormatError::UnsupportedVersion(version));
        }
        if !is_valid_target(positions_offset, data.len()) {
            return Err(FormatError::InvalidSection { section: "positions", offset: positions_offset });
        }
        let thumbnail_offset = match thumbnail_offset {
            o if o <= 0 => None,
            o if is_valid_target(o, data.len()) => Some(o),
            o => return Err(FormatError::InvalidSection { section: "thumbnail", offset: o }),
        };

        Ok(Self { version, positions_offset, thumbnail_offset, reserved })
    }
}

/// Read the thumbnail section at `offset`.
pub fn read_thumbnail(data: &[u8], offset: i32) -> Result<&[u8], FormatError> {
    let mut r = StreamReader::at(data, offset as usize);
    r.match_magic(THUMBNAIL_MAGIC)?;
    let bytes = r.read_bytes()?;
    r.match_magic(THUMBNAIL_MAGIC)?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header_bytes(version: (u16, u16, u16), positions: i32, thumb: i32) -> Vec<u8> {
        let mut h = Vec::new();
        h.extend_from_slice(&HEADER_MAGIC.to_le_bytes());
        h.extend_from_slice(&version.0.to_le_bytes());
        h.extend_from_slice(&version.1.to_le_bytes());
        h.extend_from_slice(&version.2.to_le_bytes());
        h.extend_from_slice(&positions.to_le_bytes());
        h.extend_from_slice(&thumb.to_le_bytes());
        h.extend_from_slice(&[0u8; 8]);
        h.extend_from_slice(&HEADER_MAGIC.to_le_bytes());
        h.resize(64, 0);
        h
    }

    #[test]
    fn test_header_parsing() {
        let data = header_bytes((3, 1, 0), 40, 0);
        let h = Header::parse(&data).unwrap();
        assert_eq!(h.version, Version::new(3, 1, 0));
        assert_eq!(h.positions_offset, 40);
        assert_eq!(h.thumbnail_offset, None);
    }

    #[test]
    fn test_invalid_magic() {
        let data = [0u8; 64];
        let result = Header::parse(&data);
        assert!(matches!(result, Err(FormatError::MagicMismatch { offset: 0, .. })));
    }

    #[test]
    fn test_trailing_magic_checked() {
        let mut data = header_bytes((3, 0, 0), 40, 0);
        data[HEADER_SIZE - 1] ^= 0xff;
        let result = Header::parse(&data);
        assert!(matches!(result, Err(FormatError::MagicMismatch { offset: 26, .. })));
    }

    #[test]
    fn test_unsupported_version() {
        let data = header_bytes((9, 0, 0), 40, 0);
        assert_eq!(
            Header::parse(&data),
            Err(FormatError::UnsupportedVersion(Version::new(9, 0, 0)))
        );
    }

    #[test]
    fn test_positions_inside_header_rejected() {
        let data = header_bytes((3, 0, 0), 8, 0);
        assert!(matches!(
            Header::parse(&data),
            Err(FormatError::InvalidSection { section: "positions", offset: 8 })
        ));
    }
}
