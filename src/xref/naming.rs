//! Deterministic names for anonymous embedded resources.

use xxhash_rust::xxh3::xxh3_128;

use super::record::XRefRecord;

/// Prefix shared by every synthesized name.
pub const ANONYMOUS_PREFIX: &str = "anon/";

/// Synthesize the name of an anonymous embedded resource.
///
/// The name is `anon/{hash}-{seq}.{encoding}/{filename}`. When the record
/// carries no hash, the hex xxh3-128 digest of the embedded bytes stands in,
/// so identical payloads still collapse to one name.
pub fn anonymous_name(record: &XRefRecord, payload: &[u8]) -> String {
    let hash = if record.hash.is_empty() {
        content_hash(payload)
    } else {
        record.hash.to_string()
    };
    let encoding = if record.encoding.is_empty() { "raw" } else { &record.encoding };
    format!("{ANONYMOUS_PREFIX}{hash}-{}.{encoding}/{}", record.hash_id, record.file_name())
}

/// Hex xxh3-128 digest of `bytes`.
pub fn content_hash(bytes: &[u8]) -> String {
    format!("{:032x}", xxh3_128(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xref::XRefStyle;

    fn record(hash: &str, hash_id: u32) -> XRefRecord {
        XRefRecord {
            index: 0,
            offset: 100,
            url: "https://cdn.example.com/tex/wood.png".into(),
            style: XRefStyle::Anonymous,
            hash_id,
            encoding: "raw".into(),
            hash: hash.into(),
            payload: 0..0,
        }
    }

    #[test]
    fn test_name_from_record_hash() {
        let name = anonymous_name(&record("ab12", 3), b"ignored");
        assert_eq!(name, "anon/ab12-3.raw/wood.png");
    }

    #[test]
    fn test_name_from_content() {
        let a = anonymous_name(&record("", 0), b"pixels");
        let b = anonymous_name(&record("", 0), b"pixels");
        let c = anonymous_name(&record("", 0), b"other pixels");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(a.starts_with(ANONYMOUS_PREFIX));
        assert!(a.ends_with("-0.raw/wood.png"));
        assert_eq!(content_hash(b"pixels").len(), 32);
    }

    #[test]
    fn test_sequence_distinguishes() {
        assert_ne!(anonymous_name(&record("ab12", 0), b""), anonymous_name(&record("ab12", 1), b""));
    }
}
