//! Positions section: named byte offsets for random access.

use std::collections::HashMap;

use super::format::*;
use super::stream::StreamReader;
use crate::util::FormatError;

/// Shortcut table mapping section names to byte offsets.
#[derive(Clone, Debug, Default)]
pub struct ShortcutTable {
    entries: HashMap<String, usize>,
    /// Names in file order, for listing.
    order: Vec<String>,
}

impl ShortcutTable {
    /// Read the positions section at `offset`.
    pub fn read(data: &[u8], offset: usize) -> Result<Self, FormatError> {
        let mut r = StreamReader::at(data, offset);
        r.match_magic(POSITIONS_MAGIC)?;

        let count = r.read_count()?;
        let mut table = Self::default();
        for _ in 0..count {
            let name = r.read_short_string()?.to_string();
            let target = r.read_count()?;
            if target < HEADER_SIZE || target >= data.len() {
                return Err(FormatError::InvalidSection { section: "shortcut", offset: target as i32 });
            }
            if table.entries.insert(name.clone(), target).is_none() {
                table.order.push(name);
            }
        }

        r.match_magic(POSITIONS_MAGIC)?;
        Ok(table)
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.entries.get(name).copied()
    }

    /// Offset of a shortcut that must be present.
    pub fn require(&self, name: &str) -> Result<usize, FormatError> {
        self.get(name).ok_or_else(|| FormatError::MissingShortcut(name.to_string()))
    }

    /// Offsets of the internalized cross-references, ordered by index.
    ///
    /// Indices are contiguous from zero; the first gap ends the list.
    pub fn xref_offsets(&self) -> Vec<usize> {
        (0..)
            .map_while(|i| self.get(&xref_shortcut(i)))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in file order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.order.iter().map(|n| (n.as_str(), self.entries[n]))
    }
}
