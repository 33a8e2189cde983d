//! Interned string table.

use std::collections::HashMap;
use std::sync::Arc;

use super::format::STRINGS_MAGIC;
use super::stream::StreamReader;
use crate::util::FormatError;

/// All distinct strings of a buffer, keyed by id. Id 0 means "absent".
#[derive(Clone, Debug, Default)]
pub struct StringTable {
    strings: HashMap<u32, Arc<str>>,
}

impl StringTable {
    /// Read the string table section at `offset`.
    pub fn read(data: &[u8], offset: usize) -> Result<Self, FormatError> {
        let mut r = StreamReader::at(data, offset);
        r.match_magic(STRINGS_MAGIC)?;

        let count = r.read_count()?;
        let mut strings = HashMap::with_capacity(count.min(1 << 16));
        for _ in 0..count {
            let text: Arc<str> = Arc::from(r.read_short_string()?);
            let id_offset = r.position();
            let id = r.read_unpack30()?;
            if id == 0 {
                return Err(FormatError::UnknownString { id, offset: id_offset });
            }
            strings.insert(id, text);
        }

        r.match_magic(STRINGS_MAGIC)?;
        Ok(Self { strings })
    }

    /// Look up an id; 0 and unknown ids yield `None`.
    pub fn get(&self, id: u32) -> Option<&Arc<str>> {
        self.strings.get(&id)
    }

    /// Resolve an id read at `offset`: 0 is absent, unknown ids are an error.
    pub fn resolve(&self, id: u32, offset: usize) -> Result<Option<Arc<str>>, FormatError> {
        if id == 0 {
            return Ok(None);
        }
        self.strings
            .get(&id)
            .cloned()
            .map(Some)
            .ok_or(FormatError::UnknownString { id, offset })
    }

    /// Resolve an id that must name a string.
    pub fn require(&self, id: u32, offset: usize) -> Result<Arc<str>, FormatError> {
        self.resolve(id, offset)?.ok_or(FormatError::UnknownString { id, offset })
    }

    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::varint::pack30;

    fn table(entries: &[(&str, u32)]) -> Vec<u8> {
        let mut data = STRINGS_MAGIC.to_le_bytes().to_vec();
        pack30(entries.len() as u32, &mut data);
        for (s, id) in entries {
            pack30(s.len() as u32, &mut data);
            data.extend_from_slice(s.as_bytes());
            pack30(*id, &mut data);
        }
        data.extend_from_slice(&STRINGS_MAGIC.to_le_bytes());
        data
    }

    #[test]
    fn test_read_and_resolve() {
        let data = table(&[("Node", 1), ("children", 2), ("ünïcode", 300)]);
        let t = StringTable::read(&data, 0).unwrap();
        assert_eq!(t.len(), 3);
        assert_eq!(t.resolve(0, 0).unwrap(), None);
        assert_eq!(t.require(300, 0).unwrap().as_ref(), "ünïcode");
        assert_eq!(t.resolve(9, 77).unwrap_err(), FormatError::UnknownString { id: 9, offset: 77 });
        assert!(t.require(0, 5).is_err());
    }

    #[test]
    fn test_zero_id_rejected() {
        let data = table(&[("x", 0)]);
        assert!(matches!(StringTable::read(&data, 0), Err(FormatError::UnknownString { id: 0, .. })));
    }
}
