//! Shared, immutable byte buffers backing a document.

use std::fs::File;
use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use memmap2::Mmap;

use crate::util::{Error, Result};

/// Immutable bytes of one container.
///
/// Cloning is cheap: both variants share the underlying storage.
#[derive(Clone)]
pub struct ByteBuffer {
    inner: BufferInner,
}

#[derive(Clone)]
enum BufferInner {
    /// Memory-mapped file (preferred for large files)
    Mmap(Arc<Mmap>),
    /// Bytes owned in memory
    Shared(Arc<[u8]>),
}

impl ByteBuffer {
    /// Wrap bytes already in memory.
    pub fn from_vec(bytes: Vec<u8>) -> Self {
        Self { inner: BufferInner::Shared(bytes.into()) }
    }

    /// Open a file, memory-mapped or read fully into memory.
    pub fn open(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::FileNotFound(path.to_path_buf())
            } else {
                Error::Io(e)
            }
        })?;

        let size = file.metadata()?.len();
        if use_mmap && size > 0 {
            // Safety: the map is read-only and never outlives the buffer handle.
            let mmap = unsafe { Mmap::map(&file) }.map_err(|e| Error::MmapFailed(e.to_string()))?;
            Ok(Self { inner: BufferInner::Mmap(Arc::new(mmap)) })
        } else {
            Ok(Self::from_vec(std::fs::read(path)?))
        }
    }

    /// Check whether the buffer is memory-mapped.
    #[inline]
    pub fn is_mapped(&self) -> bool {
        matches!(self.inner, BufferInner::Mmap(_))
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match &self.inner {
            BufferInner::Mmap(m) => &m[..],
            BufferInner::Shared(b) => &b[..],
        }
    }
}

impl Deref for ByteBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from_vec(bytes)
    }
}

impl std::fmt::Debug for ByteBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteBuffer")
            .field("len", &self.len())
            .field("mapped", &self.is_mapped())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_open_mapped_and_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"scenepack").unwrap();

        let mapped = ByteBuffer::open(file.path(), true).unwrap();
        assert!(mapped.is_mapped());
        assert_eq!(&mapped[..], b"scenepack");

        let owned = ByteBuffer::open(file.path(), false).unwrap();
        assert!(!owned.is_mapped());
        assert_eq!(owned.as_slice(), mapped.as_slice());
    }

    #[test]
    fn test_missing_file() {
        let err = ByteBuffer::open("/definitely/not/here.scp", true).unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}
