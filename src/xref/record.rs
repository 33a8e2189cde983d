//! Internalized cross-reference records.
//!
//! A record describes a sub-resource whose bytes live inside the current
//! buffer, right after the record's trailing marker.

use std::ops::Range;
use std::sync::Arc;

use super::reference::{file_name, XRefStyle};
use crate::container::{StreamReader, StringTable, XREF_RECORD_MAGIC};
use crate::util::FormatError;

/// Parsed internalized cross-reference record.
#[derive(Clone, Debug, PartialEq)]
pub struct XRefRecord {
    /// Position of the record in the shortcut table.
    pub index: usize,
    /// Byte offset of the record.
    pub offset: usize,
    /// Original url of the embedded resource.
    pub url: Arc<str>,
    pub style: XRefStyle,
    /// Sequence id distinguishing repeated embeddings of the same content.
    pub hash_id: u32,
    /// Payload encoding (`raw`, `deflate`).
    pub encoding: Arc<str>,
    /// Content hash as written by the producer; may be empty.
    pub hash: Arc<str>,
    /// Byte range of the embedded payload.
    pub payload: Range<usize>,
}

impl XRefRecord {
    /// Read record `index` at `offset`.
    pub fn read(data: &[u8], offset: usize, index: usize, strings: &StringTable) -> Result<Self, FormatError> {
        let mut r = StreamReader::at(data, offset);

        let length_offset = r.position();
        let length = r.read_i32()?;
        let length = usize::try_from(length)
            .map_err(|_| FormatError::InvalidSection { section: "xref payload", offset: length_offset as i32 })?;

        let url_offset = r.position();
        let url = strings.require(r.read_unpack30()?, url_offset)?;

        let style_offset = r.position();
        let tag = r.read_u8()?;
        let style = XRefStyle::from_record_tag(tag)
            .ok_or(FormatError::UnknownXRefStyle { style: tag, offset: style_offset })?;

        let hash_id = r.read_unpack30()?;

        let encoding_offset = r.position();
        let encoding = strings
            .resolve(r.read_unpack30()?, encoding_offset)?
            .unwrap_or_else(|| Arc::from(""));
        let hash_offset = r.position();
        let hash = strings
            .resolve(r.read_unpack30()?, hash_offset)?
            .unwrap_or_else(|| Arc::from(""));

        r.match_magic(XREF_RECORD_MAGIC)?;

        let start = r.position();
        r.take(length)?;

        Ok(Self {
            index,
            offset,
            url,
            style,
            hash_id,
            encoding,
            hash,
            payload: start..start + length,
        })
    }

    /// Raw (still encoded) payload bytes.
    pub fn payload<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.payload.clone()]
    }

    pub fn file_name(&self) -> &str {
        file_name(&self.url)
    }
}
