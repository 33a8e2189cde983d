//! Byte sources for external cross-file references.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::util::ResourceError;

/// Supplies the bytes behind an external url.
///
/// Implementations do not retry; a failure is reported once and the
/// caller decides what to do.
#[async_trait]
pub trait ByteSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ResourceError>;
}

/// Reads urls as paths relative to a root directory.
#[derive(Clone, Debug)]
pub struct FileSource {
    root: PathBuf,
}

impl FileSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, url: &str) -> PathBuf {
        let rel = url.strip_prefix("file://").unwrap_or(url);
        let rel = rel.split(['?', '#']).next().unwrap_or(rel);
        let rel = Path::new(rel);
        if rel.is_absolute() {
            rel.to_path_buf()
        } else {
            self.root.join(rel)
        }
    }
}

#[async_trait]
impl ByteSource for FileSource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ResourceError> {
        let path = self.path_for(url);
        tokio::fs::read(&path).await.map_err(|e| ResourceError::FetchFailed {
            url: url.to_string(),
            reason: format!("{}: {e}", path.display()),
        })
    }
}

/// In-memory url → bytes map.
///
/// Counts fetches and can delay each one, which makes in-flight
/// behaviour observable.
#[derive(Debug, Default)]
pub struct MemorySource {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    delay: Option<Duration>,
    fetches: AtomicUsize,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep for `delay` inside every fetch.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn insert(&self, url: impl Into<String>, bytes: Vec<u8>) {
        self.entries.write().insert(url.into(), bytes);
    }

    pub fn remove(&self, url: &str) -> Option<Vec<u8>> {
        self.entries.write().remove(url)
    }

    /// Number of fetches started so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, ResourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.entries.read().get(url).cloned().ok_or_else(|| ResourceError::FetchFailed {
            url: url.to_string(),
            reason: "not found".to_string(),
        })
    }
}
