//! Offset-indexed arena of decoded objects.
//!
//! Every offset decodes at most once. Objects live in a flat vector and are
//! addressed by [`ObjectHandle`]; a second offset-keyed map gives O(1)
//! lookup when the same offset is referenced again. Decoding stages new
//! objects in a [`Staging`] batch, which only reaches the arena if the whole
//! decode succeeds.

use std::collections::HashMap;
use std::sync::Arc;

use super::entity::DocumentObject;
use crate::util::InvariantViolation;

/// Stable index of an object in its document's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectHandle(u32);

impl ObjectHandle {
    #[inline]
    pub fn index(self) -> u32 {
        self.0
    }
}

/// What a cached offset decoded to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CachedAt {
    Object(ObjectHandle),
    /// Internalized cross-reference record, by record index.
    XRefRecord(usize),
}

impl CachedAt {
    fn kind(&self) -> &'static str {
        match self {
            Self::Object(_) => "object",
            Self::XRefRecord(_) => "xref record",
        }
    }
}

#[derive(Default)]
pub(crate) struct ObjectArena {
    objects: Vec<Arc<DocumentObject>>,
    by_offset: HashMap<i32, CachedAt>,
}

impl ObjectArena {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Handle of the object cached at `offset`, if any.
    pub(crate) fn object_at(&self, offset: i32) -> Result<Option<ObjectHandle>, InvariantViolation> {
        match self.by_offset.get(&offset) {
            None => Ok(None),
            Some(CachedAt::Object(h)) => Ok(Some(*h)),
            Some(other) => Err(InvariantViolation::CachedKindMismatch {
                offset,
                cached: other.kind(),
                requested: "object",
            }),
        }
    }

    /// Record that `offset` holds an internalized cross-reference record.
    pub(crate) fn register_record(&mut self, offset: i32, index: usize) -> Result<(), InvariantViolation> {
        match self.by_offset.get(&offset) {
            None => {
                self.by_offset.insert(offset, CachedAt::XRefRecord(index));
                Ok(())
            }
            Some(CachedAt::XRefRecord(i)) if *i == index => Ok(()),
            Some(other) => Err(InvariantViolation::CachedKindMismatch {
                offset,
                cached: other.kind(),
                requested: "xref record",
            }),
        }
    }

    pub(crate) fn get(&self, handle: ObjectHandle) -> Option<&Arc<DocumentObject>> {
        self.objects.get(handle.0 as usize)
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }

    /// Start a staging batch on top of the current contents.
    pub(crate) fn stage(&self) -> Staging {
        Staging {
            base: self.objects.len() as u32,
            objects: Vec::new(),
            offsets: HashMap::new(),
        }
    }

    /// Move a successful batch into the arena.
    pub(crate) fn commit(&mut self, staging: Staging) {
        debug_assert_eq!(staging.base as usize, self.objects.len());
        for obj in staging.objects {
            let handle = ObjectHandle(self.objects.len() as u32);
            self.by_offset.insert(obj.offset, CachedAt::Object(handle));
            self.objects.push(Arc::new(obj));
        }
    }
}

/// Objects decoded by one in-progress decode.
pub(crate) struct Staging {
    base: u32,
    objects: Vec<DocumentObject>,
    offsets: HashMap<i32, ObjectHandle>,
}

impl Staging {
    /// Handle of an object staged at `offset` in this batch.
    pub(crate) fn object_at(&self, offset: i32) -> Option<ObjectHandle> {
        self.offsets.get(&offset).copied()
    }

    /// End offset of a staged object.
    pub(crate) fn end_of(&self, handle: ObjectHandle) -> Option<usize> {
        let i = handle.0.checked_sub(self.base)? as usize;
        self.objects.get(i).map(|o| o.end)
    }

    /// Reserve the handle the next staged object will receive.
    pub(crate) fn next_handle(&self) -> ObjectHandle {
        ObjectHandle(self.base + self.objects.len() as u32)
    }

    /// Stage a decoded object; returns its handle.
    pub(crate) fn push(&mut self, obj: DocumentObject) -> ObjectHandle {
        let handle = self.next_handle();
        self.offsets.insert(obj.offset, handle);
        self.objects.push(obj);
        handle
    }

    pub(crate) fn len(&self) -> usize {
        self.objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn obj(offset: i32) -> DocumentObject {
        DocumentObject {
            offset,
            end: offset as usize + 12,
            type_name: "Node".into(),
            id: None,
            fields: HashMap::new(),
        }
    }

    #[test]
    fn test_stage_and_commit() {
        let mut arena = ObjectArena::new();
        let mut batch = arena.stage();
        let a = batch.push(obj(40));
        let b = batch.push(obj(60));
        assert_eq!(batch.object_at(60), Some(b));
        assert_eq!(arena.object_at(40).unwrap(), None);

        arena.commit(batch);
        assert_eq!(arena.object_at(40).unwrap(), Some(a));
        assert_eq!(arena.get(b).unwrap().offset(), 60);
        assert_eq!(arena.len(), 2);

        // A later batch continues numbering.
        let mut batch = arena.stage();
        let c = batch.push(obj(80));
        assert_eq!(c.index(), 2);
        assert_eq!(batch.end_of(c), Some(92));
    }

    #[test]
    fn test_dropped_batch_leaves_nothing() {
        let arena = ObjectArena::new();
        let mut batch = arena.stage();
        batch.push(obj(40));
        drop(batch);
        assert_eq!(arena.object_at(40).unwrap(), None);
        assert_eq!(arena.len(), 0);
    }

    #[test]
    fn test_kind_mismatch() {
        let mut arena = ObjectArena::new();
        arena.register_record(100, 0).unwrap();
        let err = arena.object_at(100).unwrap_err();
        assert_eq!(
            err,
            InvariantViolation::CachedKindMismatch { offset: 100, cached: "xref record", requested: "object" }
        );

        let mut batch = arena.stage();
        batch.push(obj(40));
        arena.commit(batch);
        assert!(arena.register_record(40, 1).is_err());
    }
}
