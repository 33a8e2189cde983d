//! Documents: one decoded container buffer and its object arena.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::arena::{ObjectArena, ObjectHandle};
use super::decode::{DecodeContext, Decoder};
use super::entity::{DocumentObject, Entity, RefToken};
use super::version::Version;
use crate::container::{
    read_thumbnail, ByteBuffer, Header, ShortcutTable, StringTable, ROOT_SHORTCUT, STRINGS_SHORTCUT,
};
use crate::util::{DecodeOptions, InvariantViolation, Result};
use crate::xref::XRefRecord;

/// Process-unique identity of a loaded document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentId(u64);

impl DocumentId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// A decoded container buffer.
///
/// Opening a document reads the header, the shortcut table, the string
/// table, the internalized cross-reference records and the root object.
/// Everything else is decoded on first access and memoized by byte offset,
/// so a given offset always yields the same [`ObjectHandle`] and the same
/// `Arc<DocumentObject>`.
pub struct Document {
    id: DocumentId,
    name: String,
    buffer: ByteBuffer,
    header: Header,
    shortcuts: ShortcutTable,
    strings: StringTable,
    records: Vec<XRefRecord>,
    records_by_url: HashMap<Arc<str>, usize>,
    options: DecodeOptions,
    arena: RwLock<ObjectArena>,
    root: ObjectHandle,
}

impl Document {
    /// Open a document file.
    pub fn open(path: impl AsRef<Path>, options: DecodeOptions) -> Result<Self> {
        let path = path.as_ref();
        let buffer = ByteBuffer::open(path, options.use_mmap)?;
        Self::from_buffer(path.to_string_lossy(), buffer, options)
    }

    /// Decode a document from bytes in memory.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>, options: DecodeOptions) -> Result<Self> {
        Self::from_buffer(name, ByteBuffer::from_vec(bytes), options)
    }

    /// Decode a document from a shared buffer.
    pub fn from_buffer(name: impl Into<String>, buffer: ByteBuffer, options: DecodeOptions) -> Result<Self> {
        let name = name.into();
        let data = buffer.as_slice();

        let header = Header::parse(data)?;
        let shortcuts = ShortcutTable::read(data, header.positions_offset as usize)?;
        let strings = StringTable::read(data, shortcuts.require(STRINGS_SHORTCUT)?)?;

        let mut arena = ObjectArena::new();
        let mut records = Vec::new();
        let mut records_by_url = HashMap::new();
        for (index, offset) in shortcuts.xref_offsets().into_iter().enumerate() {
            let record = XRefRecord::read(data, offset, index, &strings)?;
            arena.register_record(offset as i32, index)?;
            records_by_url.entry(record.url.clone()).or_insert(index);
            records.push(record);
        }

        let root_offset = shortcuts.require(ROOT_SHORTCUT)?;
        let root = {
            let ctx = DecodeContext {
                data,
                strings: &strings,
                version: header.version,
                options: &options,
                records: &records,
                records_by_url: &records_by_url,
            };
            let (root, staging) = Decoder::new(&ctx, &arena).decode_object_at(root_offset as i32, 0)?;
            arena.commit(staging);
            root
        };

        debug!(
            name = %name,
            version = %header.version,
            shortcuts = shortcuts.len(),
            strings = strings.len(),
            xrefs = records.len(),
            "opened document"
        );

        let doc = Self {
            id: DocumentId::next(),
            name,
            buffer,
            header,
            shortcuts,
            strings,
            records,
            records_by_url,
            options,
            arena: RwLock::new(arena),
            root,
        };

        if doc.options.validate_on_open {
            let count = doc.decode_all()?;
            debug!(name = %doc.name, objects = count, "validated document");
        }
        Ok(doc)
    }

    #[inline]
    pub fn id(&self) -> DocumentId {
        self.id
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    #[inline]
    pub fn version(&self) -> Version {
        self.header.version
    }

    #[inline]
    pub fn shortcuts(&self) -> &ShortcutTable {
        &self.shortcuts
    }

    #[inline]
    pub fn strings(&self) -> &StringTable {
        &self.strings
    }

    #[inline]
    pub fn buffer(&self) -> &ByteBuffer {
        &self.buffer
    }

    #[inline]
    pub fn options(&self) -> &DecodeOptions {
        &self.options
    }

    /// Internalized cross-reference records, by index.
    pub fn records(&self) -> &[XRefRecord] {
        &self.records
    }

    pub fn record(&self, index: usize) -> Option<&XRefRecord> {
        self.records.get(index)
    }

    pub fn record_for_url(&self, url: &str) -> Option<&XRefRecord> {
        self.records_by_url.get(url).map(|&i| &self.records[i])
    }

    /// Thumbnail bytes, if the buffer has a thumbnail section.
    pub fn thumbnail(&self) -> Result<Option<&[u8]>> {
        match self.header.thumbnail_offset {
            Some(offset) => Ok(Some(read_thumbnail(&self.buffer, offset)?)),
            None => Ok(None),
        }
    }

    /// Handle of the root object.
    #[inline]
    pub fn root(&self) -> ObjectHandle {
        self.root
    }

    /// Get a decoded object by handle.
    pub fn object(&self, handle: ObjectHandle) -> Result<Arc<DocumentObject>> {
        self.arena
            .read()
            .get(handle)
            .cloned()
            .ok_or_else(|| InvariantViolation::StaleHandle(handle.index()).into())
    }

    pub fn root_object(&self) -> Result<Arc<DocumentObject>> {
        self.object(self.root)
    }

    /// Number of objects decoded so far.
    pub fn cached_objects(&self) -> usize {
        self.arena.read().len()
    }

    /// Check whether the object at `offset` has been decoded.
    pub fn is_cached(&self, offset: i32) -> bool {
        matches!(self.arena.read().object_at(offset), Ok(Some(_)))
    }

    /// Decode (or fetch from cache) the object at `offset`.
    ///
    /// `at` is the offset the request originates from, for diagnostics.
    pub fn object_at(&self, offset: i32, at: usize) -> Result<ObjectHandle> {
        if let Some(h) = self.arena.read().object_at(offset)? {
            return Ok(h);
        }

        let mut arena = self.arena.write();
        // Another reader may have decoded it between the two locks.
        if let Some(h) = arena.object_at(offset)? {
            return Ok(h);
        }
        let ctx = self.context();
        let (handle, staging) = Decoder::new(&ctx, &arena).decode_object_at(offset, at)?;
        arena.commit(staging);
        Ok(handle)
    }

    /// Resolve a same-buffer reference.
    pub fn resolve_ref(&self, token: RefToken) -> Result<ObjectHandle> {
        self.object_at(token.target, token.at)
    }

    /// Resolve an entity that names an object: inline objects and references.
    pub fn resolve(&self, entity: &Entity) -> Result<Option<ObjectHandle>> {
        match entity {
            Entity::Object(h) => Ok(Some(*h)),
            Entity::Ref(token) => self.resolve_ref(*token).map(Some),
            _ => Ok(None),
        }
    }

    /// Resolve the object named by field `key` of `handle`.
    pub fn resolve_field(&self, handle: ObjectHandle, key: &str) -> Result<Option<ObjectHandle>> {
        let obj = self.object(handle)?;
        match obj.get(key) {
            Some(entity) => self.resolve(entity),
            None => Ok(None),
        }
    }

    /// Resolve every object in array field `key` of `handle`.
    ///
    /// Entries that do not name an object are skipped.
    pub fn resolve_array(&self, handle: ObjectHandle, key: &str) -> Result<Vec<ObjectHandle>> {
        let obj = self.object(handle)?;
        let mut out = Vec::new();
        if let Some(items) = obj.get_array(key) {
            for item in items {
                if let Some(h) = self.resolve(item)? {
                    out.push(h);
                }
            }
        }
        Ok(out)
    }

    /// Decode every object reachable from the root.
    ///
    /// Walks with an explicit stack, so reference chains of any depth are
    /// fine. Returns the number of reachable objects.
    pub fn decode_all(&self) -> Result<usize> {
        let mut seen = HashSet::new();
        let mut stack = vec![self.root];
        while let Some(handle) = stack.pop() {
            if !seen.insert(handle) {
                continue;
            }
            let obj = self.object(handle)?;
            let mut pending: Vec<&Entity> = obj.fields.values().collect();
            while let Some(entity) = pending.pop() {
                match entity {
                    Entity::Array(items) => pending.extend(items.iter()),
                    Entity::Object(h) => stack.push(*h),
                    Entity::Ref(token) => stack.push(self.resolve_ref(*token)?),
                    _ => {}
                }
            }
        }
        Ok(seen.len())
    }

    fn context(&self) -> DecodeContext<'_> {
        DecodeContext {
            data: self.buffer.as_slice(),
            strings: &self.strings,
            version: self.header.version,
            options: &self.options,
            records: &self.records,
            records_by_url: &self.records_by_url,
        }
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("version", &self.header.version)
            .field("objects", &self.cached_objects())
            .finish()
    }
}
