//! Container format constants and structures.

/// Build a magic marker from its four ASCII bytes.
#[inline]
pub const fn magic(tag: &[u8; 4]) -> u32 {
    u32::from_le_bytes(*tag)
}

/// Header magic; brackets the header at both ends.
pub const HEADER_MAGIC: u32 = magic(b"SCPK");

/// Positions ("shortcuts") section magic.
pub const POSITIONS_MAGIC: u32 = magic(b"POSN");

/// String table magic.
pub const STRINGS_MAGIC: u32 = magic(b"STRT");

/// Thumbnail section magic.
pub const THUMBNAIL_MAGIC: u32 = magic(b"THMB");

/// Start of an encoded object.
pub const BEGIN_OBJ_MAGIC: u32 = magic(b"OBJ{");

/// End of an encoded object.
pub const END_OBJ_MAGIC: u32 = magic(b"}OBJ");

/// End of an inline cross-file reference.
pub const END_XREF_MAGIC: u32 = magic(b"XREF");

/// End of an internalized cross-reference record.
pub const XREF_RECORD_MAGIC: u32 = magic(b"XREC");

/// Size of the file header in bytes.
///
/// magic(4) + version(3 x u16) + positions(i32) + thumbnail(i32)
/// + reserved(2 x i32) + magic(4)
pub const HEADER_SIZE: usize = 4 + 6 + 4 + 4 + 8 + 4;

/// Offset of the writer version in the header.
pub const VERSION_OFFSET: usize = 4;

/// Offset of the positions section pointer in the header.
pub const POSITIONS_PTR_OFFSET: usize = 10;

/// Offset of the thumbnail section pointer in the header.
pub const THUMBNAIL_PTR_OFFSET: usize = 14;

/// Largest value representable by the packed 30-bit integer.
pub const MAX_PACKED: u32 = (1 << 30) - 1;

/// Longest encoding of a packed integer in bytes.
pub const MAX_PACKED_BYTES: usize = 5;

/// Shortcut name of the root object.
pub const ROOT_SHORTCUT: &str = "root";

/// Shortcut name of the string table.
pub const STRINGS_SHORTCUT: &str = "strings";

/// Prefix of internalized cross-reference shortcuts (`xref.0`, `xref.1`, ...).
pub const XREF_SHORTCUT_PREFIX: &str = "xref.";

/// Shortcut name of the n-th internalized cross-reference.
pub fn xref_shortcut(index: usize) -> String {
    format!("{XREF_SHORTCUT_PREFIX}{index}")
}

/// Check that an offset may be the target of a same-buffer reference.
#[inline]
pub const fn is_valid_target(offset: i32, buffer_len: usize) -> bool {
    offset >= HEADER_SIZE as i32 && (offset as usize) < buffer_len
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_magic_bytes() {
        assert_eq!(HEADER_MAGIC.to_le_bytes(), *b"SCPK");
        assert_eq!(BEGIN_OBJ_MAGIC.to_le_bytes(), *b"OBJ{");
        assert_ne!(BEGIN_OBJ_MAGIC, END_OBJ_MAGIC);
    }

    #[test]
    fn test_header_layout() {
        assert_eq!(HEADER_SIZE, 30);
        assert_eq!(THUMBNAIL_PTR_OFFSET + 4 + 8 + 4, HEADER_SIZE);
    }

    #[test]
    fn test_valid_target() {
        assert!(!is_valid_target(0, 100));
        assert!(!is_valid_target(-4, 100));
        assert!(!is_valid_target(HEADER_SIZE as i32 - 1, 100));
        assert!(is_valid_target(HEADER_SIZE as i32, 100));
        assert!(!is_valid_target(100, 100));
    }

    #[test]
    fn test_xref_shortcut() {
        assert_eq!(xref_shortcut(3), "xref.3");
    }
}
